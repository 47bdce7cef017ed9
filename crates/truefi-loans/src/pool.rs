//! Liquidity pools
//!
//! [`PoolRegistry`] tracks the pools the protocol lends from and sums their
//! value for TVL-based limits. [`ReservePool`] is an in-memory pool holding
//! a single currency.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info};

use truefi_common::math::{self, BASIS_POINTS};
use truefi_common::{
    Address, EventBus, LiquidityPool, ProtocolEvent, Result, TokenLedger, TrueFiError,
};

/// Registered liquidity pools
pub struct PoolRegistry {
    owner: Address,
    events: Arc<EventBus>,
    pools: RwLock<BTreeMap<Address, Arc<dyn LiquidityPool>>>,
}

impl PoolRegistry {
    pub fn new(owner: Address, events: Arc<EventBus>) -> Self {
        Self {
            owner,
            events,
            pools: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, caller: &Address, pool: Arc<dyn LiquidityPool>) -> Result<()> {
        if *caller != self.owner {
            return Err(TrueFiError::unauthorized(caller, "registry owner"));
        }
        let address = pool.address();
        self.pools.write().insert(address, pool);

        info!(pool = %address.short(), "pool registered");
        self.events
            .publish(ProtocolEvent::config_changed("PoolRegistry", "pool_added", address));
        Ok(())
    }

    pub fn remove(&self, caller: &Address, pool: &Address) -> Result<()> {
        if *caller != self.owner {
            return Err(TrueFiError::unauthorized(caller, "registry owner"));
        }
        if self.pools.write().remove(pool).is_none() {
            return Err(TrueFiError::UnknownPool(*pool));
        }
        self.events
            .publish(ProtocolEvent::config_changed("PoolRegistry", "pool_removed", pool));
        Ok(())
    }

    pub fn is_supported(&self, pool: &Address) -> bool {
        self.pools.read().contains_key(pool)
    }

    pub fn pool(&self, pool: &Address) -> Result<Arc<dyn LiquidityPool>> {
        self.pools
            .read()
            .get(pool)
            .cloned()
            .ok_or(TrueFiError::UnknownPool(*pool))
    }

    pub fn pools(&self) -> Vec<Arc<dyn LiquidityPool>> {
        self.pools.read().values().cloned().collect()
    }

    /// Value of all pools, 18-decimal
    pub fn total_tvl(&self) -> Result<u128> {
        let mut total = 0u128;
        for pool in self.pools.read().values() {
            let value = math::to_normalized(pool.pool_value()?, pool.decimals())?;
            total = math::add(total, value)?;
        }
        Ok(total)
    }
}

#[derive(Debug, Default)]
struct ReserveState {
    /// Principal currently out on loan
    lent: u128,
}

/// Pool backed by its own currency balance
///
/// Pool value is the idle balance plus the principal out on loan; repayments
/// above the outstanding principal count as earnings.
pub struct ReservePool {
    address: Address,
    currency: Arc<dyn TokenLedger>,
    /// Only this address may draw liquidity
    borrower: Address,
    state: RwLock<ReserveState>,
}

impl ReservePool {
    pub fn new(address: Address, currency: Arc<dyn TokenLedger>, borrower: Address) -> Self {
        Self {
            address,
            currency,
            borrower,
            state: RwLock::new(ReserveState::default()),
        }
    }

    /// Pull liquidity from a provider (spending its allowance to the pool)
    pub fn deposit(&self, provider: &Address, amount: u128) -> Result<()> {
        self.currency
            .transfer_from(&self.address, provider, &self.address, amount)?;
        debug!(pool = %self.address.short(), provider = %provider.short(), amount, "liquidity deposited");
        Ok(())
    }

    pub fn liquid_value(&self) -> u128 {
        self.currency.balance_of(&self.address)
    }

    pub fn lent(&self) -> u128 {
        self.state.read().lent
    }
}

impl LiquidityPool for ReservePool {
    fn address(&self) -> Address {
        self.address
    }

    fn currency(&self) -> Arc<dyn TokenLedger> {
        self.currency.clone()
    }

    fn pool_value(&self) -> Result<u128> {
        Ok(math::add(self.liquid_value(), self.state.read().lent)?)
    }

    fn liquid_ratio(&self, hypothetical_withdrawal: u128) -> Result<u128> {
        let value = self.pool_value()?;
        if value == 0 {
            return Ok(BASIS_POINTS);
        }
        let liquid = self.liquid_value().saturating_sub(hypothetical_withdrawal);
        Ok(math::mul_div(liquid, BASIS_POINTS, value)?)
    }

    fn borrow(&self, recipient: &Address, amount: u128) -> Result<()> {
        if *recipient != self.borrower {
            return Err(TrueFiError::unauthorized(recipient, "pool borrower"));
        }
        let mut state = self.state.write();
        let lent = math::add(state.lent, amount)?;
        self.currency.transfer(&self.address, recipient, amount)?;
        state.lent = lent;

        debug!(pool = %self.address.short(), amount, lent, "liquidity borrowed");
        Ok(())
    }

    fn repay(&self, payer: &Address, amount: u128) -> Result<()> {
        let mut state = self.state.write();
        self.currency
            .transfer_from(&self.address, payer, &self.address, amount)?;
        state.lent = state.lent.saturating_sub(amount);

        debug!(pool = %self.address.short(), amount, lent = state.lent, "liquidity repaid");
        Ok(())
    }
}
