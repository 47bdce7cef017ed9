//! LinearDistributor - reward supply released linearly over time
//!
//! The distributor holds `total` reward tokens and releases them evenly
//! between `start` and `start + duration`. Anything released and not yet
//! distributed is available to the rating agency.

use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use truefi_common::math;
use truefi_common::{Address, Clock, Result, RewardDistributor, TokenLedger, TrueFiError};

pub struct LinearDistributor {
    address: Address,
    token: Arc<dyn TokenLedger>,
    total: u128,
    start: u64,
    duration: u64,
    clock: Arc<dyn Clock>,
    distributed: RwLock<u128>,
}

impl LinearDistributor {
    pub fn new(
        address: Address,
        token: Arc<dyn TokenLedger>,
        total: u128,
        start: u64,
        duration: u64,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        if duration == 0 {
            return Err(TrueFiError::InvalidArgument("distribution duration is zero".to_string()));
        }
        Ok(Self {
            address,
            token,
            total,
            start,
            duration,
            clock,
            distributed: RwLock::new(0),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Tokens released so far
    pub fn released(&self) -> Result<u128> {
        let elapsed = self.clock.now().saturating_sub(self.start).min(self.duration);
        Ok(math::mul_div(self.total, elapsed as u128, self.duration as u128)?)
    }

    pub fn distributed(&self) -> u128 {
        *self.distributed.read()
    }
}

impl RewardDistributor for LinearDistributor {
    fn remaining(&self) -> Result<u128> {
        Ok(self.released()?.saturating_sub(self.distributed()))
    }

    fn distribute(&self, recipient: &Address, amount: u128) -> Result<()> {
        let mut distributed = self.distributed.write();
        let available = self.released()?.saturating_sub(*distributed);
        if amount > available {
            return Err(TrueFiError::InsufficientBalance {
                required: amount,
                available,
            });
        }

        self.token.transfer(&self.address, recipient, amount)?;
        *distributed += amount;

        debug!(recipient = %recipient.short(), amount, "rewards distributed");
        Ok(())
    }
}
