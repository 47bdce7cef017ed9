//! StaticPriceOracle - settable spot rates and prices

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::{Result, TrueFiError};
use crate::interfaces::{Price, PriceOracle};
use crate::types::address::Address;

#[derive(Debug, Default)]
pub struct StaticPriceOracle {
    rates: RwLock<HashMap<Address, u128>>,
    prices: RwLock<HashMap<Address, Price>>,
}

impl StaticPriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_spot_rate(&self, asset: Address, rate: u128) {
        self.rates.write().insert(asset, rate);
    }

    pub fn set_price(&self, asset: Address, price: Price) {
        self.prices.write().insert(asset, price);
    }
}

impl PriceOracle for StaticPriceOracle {
    fn spot_rate(&self, asset: &Address) -> Result<u128> {
        self.rates
            .read()
            .get(asset)
            .copied()
            .ok_or_else(|| TrueFiError::Collaborator(format!("no spot rate for {}", asset)))
    }

    fn latest_price(&self, asset: &Address) -> Result<Price> {
        self.prices
            .read()
            .get(asset)
            .copied()
            .ok_or_else(|| TrueFiError::Collaborator(format!("no price for {}", asset)))
    }
}
