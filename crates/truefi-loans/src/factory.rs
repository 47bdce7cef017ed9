//! LoanFactory - creates loans and vouches for their provenance

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use truefi_common::{Address, Clock, EventBus, ProtocolEvent, Result, TrueFiError};

use crate::loan::{LoanSettings, LoanTerms, LoanToken};
use crate::pool::PoolRegistry;

#[derive(Default)]
struct FactoryState {
    nonce: u64,
    loans: HashMap<Address, Arc<LoanToken>>,
    order: Vec<Address>,
}

pub struct LoanFactory {
    address: Address,
    /// Lender and liquidator of every loan created here
    lender: Address,
    liquidator: Address,
    settings: LoanSettings,
    pools: Arc<PoolRegistry>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    state: RwLock<FactoryState>,
}

impl LoanFactory {
    pub fn new(
        address: Address,
        lender: Address,
        liquidator: Address,
        settings: LoanSettings,
        pools: Arc<PoolRegistry>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            address,
            lender,
            liquidator,
            settings,
            pools,
            clock,
            events,
            state: RwLock::new(FactoryState::default()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn settings(&self) -> &LoanSettings {
        &self.settings
    }

    /// Create a loan for `borrower` against a registered pool
    pub fn create_loan(
        &self,
        borrower: &Address,
        pool: &Address,
        amount: u128,
        term: u64,
        apy: u128,
    ) -> Result<Arc<LoanToken>> {
        if amount == 0 || term == 0 {
            return Err(TrueFiError::InvalidArgument(format!(
                "loan amount and term must be positive, got {} / {}",
                amount, term
            )));
        }
        let liquidity = self.pools.pool(pool)?;

        let mut state = self.state.write();
        let address = Address::derive(&self.address, state.nonce);
        let terms = LoanTerms {
            pool: *pool,
            borrower: *borrower,
            lender: self.lender,
            liquidator: self.liquidator,
            amount,
            term,
            apy,
        };
        let loan = Arc::new(LoanToken::new(
            address,
            terms,
            self.settings.clone(),
            liquidity.currency(),
            self.clock.clone(),
            self.events.clone(),
        )?);

        state.nonce += 1;
        state.loans.insert(address, loan.clone());
        state.order.push(address);
        drop(state);

        info!(loan = %address.short(), borrower = %borrower.short(), amount, term, apy, "loan created");
        self.events.publish(ProtocolEvent::LoanCreated {
            loan: address,
            pool: *pool,
            borrower: *borrower,
            amount,
            term,
            apy,
        });
        Ok(loan)
    }

    /// Whether `loan` was created by this factory
    pub fn is_loan(&self, loan: &Address) -> bool {
        self.state.read().loans.contains_key(loan)
    }

    pub fn loan(&self, loan: &Address) -> Result<Arc<LoanToken>> {
        self.state
            .read()
            .loans
            .get(loan)
            .cloned()
            .ok_or(TrueFiError::UnknownLoan(*loan))
    }

    /// Every loan in creation order
    pub fn loans(&self) -> Vec<Arc<LoanToken>> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|address| state.loans.get(address).cloned())
            .collect()
    }
}
