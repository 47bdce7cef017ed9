//! Fee swapping
//!
//! Protocol fees are collected in the loan currency and paid to stakers in
//! the stake token. [`FeeSwapper`] is the seam; [`OracleSwapper`] fills
//! swaps at the oracle price out of its own stake token reserve.

use std::sync::Arc;

use tracing::debug;

use truefi_common::math;
use truefi_common::{Address, PriceOracle, Result, TokenLedger, TrueFiError};

pub trait FeeSwapper: Send + Sync {
    /// Account pulling the input currency; holders approve it before a swap
    fn address(&self) -> Address;

    /// Stake tokens `amount` of `currency` buys right now
    fn quote(&self, currency: &dyn TokenLedger, amount: u128) -> Result<u128>;

    /// Pull `amount` of `currency` from `holder`, deliver stake tokens to `recipient`
    fn swap(
        &self,
        currency: &dyn TokenLedger,
        holder: &Address,
        amount: u128,
        recipient: &Address,
    ) -> Result<u128>;
}

/// Fills swaps at the oracle price, treating the loan currency as worth one dollar
pub struct OracleSwapper {
    address: Address,
    stake_token: Arc<dyn TokenLedger>,
    stake_asset: Address,
    price_oracle: Arc<dyn PriceOracle>,
}

impl OracleSwapper {
    pub fn new(
        address: Address,
        stake_token: Arc<dyn TokenLedger>,
        stake_asset: Address,
        price_oracle: Arc<dyn PriceOracle>,
    ) -> Self {
        Self {
            address,
            stake_token,
            stake_asset,
            price_oracle,
        }
    }

    /// Stake tokens left to sell
    pub fn reserve(&self) -> u128 {
        self.stake_token.balance_of(&self.address)
    }
}

impl FeeSwapper for OracleSwapper {
    fn address(&self) -> Address {
        self.address
    }

    fn quote(&self, currency: &dyn TokenLedger, amount: u128) -> Result<u128> {
        let price = self.price_oracle.latest_price(&self.stake_asset)?;
        if price.value == 0 {
            return Err(TrueFiError::Collaborator("stake token price is zero".to_string()));
        }
        let usd = math::to_normalized(amount, currency.decimals())?;
        let stake = math::mul_div(usd, math::pow10(price.decimals)?, price.value)?;
        let out = math::from_normalized(stake, self.stake_token.decimals())?;

        let reserve = self.reserve();
        if out > reserve {
            return Err(TrueFiError::InsufficientBalance {
                required: out,
                available: reserve,
            });
        }
        Ok(out)
    }

    fn swap(
        &self,
        currency: &dyn TokenLedger,
        holder: &Address,
        amount: u128,
        recipient: &Address,
    ) -> Result<u128> {
        let out = self.quote(currency, amount)?;
        currency.transfer_from(&self.address, holder, &self.address, amount)?;
        if let Err(err) = self.stake_token.transfer(&self.address, recipient, out) {
            currency.transfer(&self.address, holder, amount)?;
            return Err(err);
        }

        debug!(
            holder = %holder.short(),
            recipient = %recipient.short(),
            amount,
            out,
            "fee swapped into stake token"
        );
        Ok(out)
    }
}
