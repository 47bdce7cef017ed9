//! Score and stake books
//!
//! Plain maps standing in for the credit-score oracle and the staking vault.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::interfaces::{CreditOracle, StakingVault};
use crate::types::address::Address;

#[derive(Debug, Default)]
pub struct ScoreBook {
    scores: RwLock<HashMap<Address, u8>>,
}

impl ScoreBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_score(&self, borrower: Address, score: u8) {
        self.scores.write().insert(borrower, score);
    }
}

impl CreditOracle for ScoreBook {
    fn score(&self, borrower: &Address) -> Option<u8> {
        self.scores.read().get(borrower).copied()
    }
}

#[derive(Debug, Default)]
pub struct StakeBook {
    stakes: RwLock<HashMap<Address, u128>>,
}

impl StakeBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_stake(&self, borrower: Address, amount: u128) {
        self.stakes.write().insert(borrower, amount);
    }
}

impl StakingVault for StakeBook {
    fn staked_amount(&self, borrower: &Address) -> u128 {
        self.stakes.read().get(borrower).copied().unwrap_or(0)
    }
}
