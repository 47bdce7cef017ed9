//! Collaborator interfaces
//!
//! The engine reaches the outside world only through these traits. Any call
//! may fail and the failure aborts the calling operation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::address::Address;

/// Fungible token ledger (currency, stake token, reward token)
///
/// Transfers name the sender explicitly; `transfer_from` spends an
/// allowance that `from` granted to `spender`.
pub trait TokenLedger: Send + Sync {
    fn symbol(&self) -> &str;

    fn decimals(&self) -> u8;

    fn total_supply(&self) -> u128;

    fn balance_of(&self, account: &Address) -> u128;

    fn allowance(&self, owner: &Address, spender: &Address) -> u128;

    fn transfer(&self, from: &Address, to: &Address, amount: u128) -> Result<()>;

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: u128,
    ) -> Result<()>;

    fn approve(&self, owner: &Address, spender: &Address, amount: u128) -> Result<()>;

    /// Mint new tokens; `caller` must hold minting rights
    fn mint(&self, caller: &Address, to: &Address, amount: u128) -> Result<()>;

    /// Destroy tokens held by `holder`
    fn burn(&self, holder: &Address, amount: u128) -> Result<()>;
}

/// Fixed-point price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub value: u128,
    pub decimals: u8,
}

impl Price {
    pub fn new(value: u128, decimals: u8) -> Self {
        Self { value, decimals }
    }
}

/// Untrusted external price/rate source
pub trait PriceOracle: Send + Sync {
    /// Current spot lending rate for `asset`, in the oracle's rate units
    fn spot_rate(&self, asset: &Address) -> Result<u128>;

    /// Latest USD price of `asset`
    fn latest_price(&self, asset: &Address) -> Result<Price>;
}

/// Liquidity pool funding loans
pub trait LiquidityPool: Send + Sync {
    fn address(&self) -> Address;

    /// Token the pool lends out
    fn currency(&self) -> Arc<dyn TokenLedger>;

    fn decimals(&self) -> u8 {
        self.currency().decimals()
    }

    /// Total value held by the pool in native units
    fn pool_value(&self) -> Result<u128>;

    /// Liquid share of pool value in bp after withdrawing `hypothetical_withdrawal`
    fn liquid_ratio(&self, hypothetical_withdrawal: u128) -> Result<u128>;

    /// Send `amount` of liquidity to `recipient` as new lending
    fn borrow(&self, recipient: &Address, amount: u128) -> Result<()>;

    /// Return `amount` of liquidity from `payer` to the pool
    fn repay(&self, payer: &Address, amount: u128) -> Result<()>;
}

/// Externally attested borrower scores
pub trait CreditOracle: Send + Sync {
    /// Credit score in `[0, 255]`, `None` when the borrower was never scored
    fn score(&self, borrower: &Address) -> Option<u8>;
}

/// Stake a borrower has locked as collateral
pub trait StakingVault: Send + Sync {
    fn staked_amount(&self, borrower: &Address) -> u128;
}

/// External source of rater rewards
pub trait RewardDistributor: Send + Sync {
    /// Reward tokens currently available for distribution
    fn remaining(&self) -> Result<u128>;

    /// Send `amount` reward tokens to `recipient`
    fn distribute(&self, recipient: &Address, amount: u128) -> Result<()>;
}
