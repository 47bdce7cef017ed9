//! LendingAgency - funds rated loans out of the pools
//!
//! The agency is the lender of every loan the factory creates. A borrower
//! asks it to fund a loan once the rating vote has run its course; the
//! agency checks the loan against its bounds, the vote and the credit
//! model, takes the borrower's mutex, borrows from the pool and funds the
//! loan. Settled loans are reclaimed with a protocol fee on the interest;
//! defaulted ones are liquidated and their claims handed to recovery.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, info, instrument, warn};

use truefi_common::math;
use truefi_common::{
    Address, Clock, CreditOracle, EventBus, LiquidityPool, ProtocolEvent, Result, StakingVault,
    TokenLedger, TrueFiError,
};
use truefi_credit::{combined_rate, CreditModel};
use truefi_loans::{BorrowingMutex, LoanFactory, LoanStatus, LoanToken, PoolRegistry};
use truefi_rating::RatingAgency;

use crate::config::LendingConfig;
use crate::swap::FeeSwapper;

/// Accounts the agency answers to or pays out to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingRoles {
    pub owner: Address,
    /// Only party allowed to liquidate defaulted loans
    pub liquidator: Address,
    /// Receives the claims of liquidated loans
    pub recovery: Address,
    /// Receives the swapped protocol fees
    pub stakers: Address,
}

pub struct LendingCollaborators {
    pub factory: Arc<LoanFactory>,
    pub pools: Arc<PoolRegistry>,
    pub rating: Arc<RatingAgency>,
    pub credit_model: Arc<CreditModel>,
    pub credit_oracle: Arc<dyn CreditOracle>,
    pub staking: Arc<dyn StakingVault>,
    pub mutex: Arc<BorrowingMutex>,
    pub swapper: Arc<dyn FeeSwapper>,
}

#[derive(Debug, Default)]
struct LendingState {
    /// Open loans per pool, in funding order
    pool_loans: HashMap<Address, Vec<Address>>,
}

pub struct LendingAgency {
    address: Address,
    roles: LendingRoles,
    collaborators: LendingCollaborators,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    config: RwLock<LendingConfig>,
    state: RwLock<LendingState>,
}

impl LendingAgency {
    pub fn new(
        address: Address,
        roles: LendingRoles,
        config: LendingConfig,
        collaborators: LendingCollaborators,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            address,
            roles,
            collaborators,
            clock,
            events,
            config: RwLock::new(config),
            state: RwLock::new(LendingState::default()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn roles(&self) -> LendingRoles {
        self.roles
    }

    pub fn config(&self) -> LendingConfig {
        self.config.read().clone()
    }

    pub fn set_config(&self, caller: &Address, config: LendingConfig) -> Result<()> {
        if *caller != self.roles.owner {
            return Err(TrueFiError::unauthorized(caller, "lending agency owner"));
        }
        config.validate()?;
        let value = serde_json::to_string(&config)?;
        *self.config.write() = config;

        info!(config = %value, "lending config updated");
        self.events
            .publish(ProtocolEvent::config_changed("LendingAgency", "config", value));
        Ok(())
    }

    /// Open loans funded from `pool`
    pub fn pool_loans(&self, pool: &Address) -> Vec<Address> {
        self.state
            .read()
            .pool_loans
            .get(pool)
            .cloned()
            .unwrap_or_default()
    }

    /// Principal of the borrower's open loans, 18-decimal
    pub fn borrowed(&self, borrower: &Address) -> Result<u128> {
        let mut total = 0u128;
        for loan in self.open_loans() {
            if loan.borrower() == *borrower {
                let amount = math::to_normalized(loan.amount(), loan.currency().decimals())?;
                total = math::add(total, amount)?;
            }
        }
        Ok(total)
    }

    /// Worth of the agency's claims on the pool's open loans, pool decimals
    pub fn value(&self, pool: &Address) -> Result<u128> {
        let mut total = 0u128;
        for address in self.pool_loans(pool) {
            let loan = self.collaborators.factory.loan(&address)?;
            let worth = loan.value(loan.claim_balance(&self.address))?;
            total = math::add(total, worth)?;
        }
        Ok(total)
    }

    /// Lowest apy the agency accepts for the loan
    ///
    /// An unscored borrower is priced at score 0.
    pub fn required_rate(
        &self,
        pool: &dyn LiquidityPool,
        borrower: &Address,
        amount: u128,
        term: u64,
    ) -> Result<u128> {
        let model = &self.collaborators.credit_model;
        let score = self.collaborators.credit_oracle.score(borrower).unwrap_or(0);
        let staked = self.collaborators.staking.staked_amount(borrower);

        let pro_forma = math::add(
            self.borrowed(borrower)?,
            math::to_normalized(amount, pool.decimals())?,
        )?;
        let effective = model.effective_score(score, staked, pro_forma)?;
        let rate = model.rate(pool, effective, amount)?;
        Ok(combined_rate(rate, model.fixed_term_loan_adjustment(term)))
    }

    fn open_loans(&self) -> Vec<Arc<LoanToken>> {
        let state = self.state.read();
        state
            .pool_loans
            .values()
            .flatten()
            .filter_map(|address| self.collaborators.factory.loan(address).ok())
            .collect()
    }

    fn ensure_open(&self, loan: &LoanToken) -> Result<()> {
        let listed = self
            .state
            .read()
            .pool_loans
            .get(&loan.pool())
            .map(|loans| loans.contains(&loan.address()))
            .unwrap_or(false);
        if !listed {
            return Err(TrueFiError::UnknownLoan(loan.address()));
        }
        Ok(())
    }

    fn remove_loan(&self, loan: &LoanToken) {
        let mut state = self.state.write();
        if let Some(loans) = state.pool_loans.get_mut(&loan.pool()) {
            loans.retain(|address| *address != loan.address());
        }
    }

    /// Run every funding check
    fn check_fundable(&self, caller: &Address, loan: &LoanToken) -> Result<(Arc<dyn LiquidityPool>, u128)> {
        let c = &self.collaborators;
        let config = self.config();

        if loan.borrower() != *caller {
            return Err(TrueFiError::unauthorized(caller, "loan borrower"));
        }
        if loan.status() != LoanStatus::Awaiting {
            return Err(TrueFiError::invalid_state("fund", loan.status().name()));
        }
        let pool = c.pools.pool(&loan.pool())?;

        let open = self.pool_loans(&pool.address()).len();
        if open >= config.max_loans_per_pool {
            return Err(TrueFiError::LimitExceeded {
                what: "loans per pool",
                value: open as u128 + 1,
                limit: config.max_loans_per_pool as u128,
            });
        }

        let size = math::to_normalized(loan.amount(), pool.decimals())?;
        if size < config.min_size || size > config.max_size {
            return Err(TrueFiError::LimitExceeded {
                what: "loan size",
                value: size,
                limit: if size < config.min_size { config.min_size } else { config.max_size },
            });
        }
        if loan.term() < config.min_term || loan.term() > config.max_term {
            return Err(TrueFiError::LimitExceeded {
                what: "loan term",
                value: loan.term() as u128,
                limit: if loan.term() < config.min_term {
                    config.min_term as u128
                } else {
                    config.max_term as u128
                },
            });
        }

        let (submitted_at, no, yes) = c.rating.results(&loan.address())?;
        let ready_at = submitted_at.saturating_add(config.voting_period);
        let now = self.clock.now();
        if now < ready_at {
            return Err(TrueFiError::TooEarly { ready_at, now });
        }
        if !config.is_credible(yes, no) {
            return Err(TrueFiError::NotCredible { yes, no });
        }

        let borrower = loan.borrower();
        let score = c
            .credit_oracle
            .score(&borrower)
            .ok_or(TrueFiError::UnscoredBorrower { borrower })?;
        if score < config.min_credit_score {
            return Err(TrueFiError::InsufficientCreditScore {
                score,
                minimum: config.min_credit_score,
            });
        }

        let required = self.required_rate(pool.as_ref(), &borrower, loan.amount(), loan.term())?;
        if required > loan.apy() {
            return Err(TrueFiError::LimitExceeded {
                what: "required rate",
                value: required,
                limit: loan.apy(),
            });
        }

        let staked = c.staking.staked_amount(&borrower);
        let total_tvl = c.pools.total_tvl()?;
        let borrowed = self.borrowed(&borrower)?;
        if c.credit_model
            .is_over_limit(pool.as_ref(), score, total_tvl, staked, loan.amount(), borrowed)?
        {
            let limit = c.credit_model.borrow_limit(pool.as_ref(), score, total_tvl, staked, borrowed)?;
            return Err(TrueFiError::LimitExceeded {
                what: "borrow limit",
                value: size,
                limit,
            });
        }

        Ok((pool, required))
    }

    /// Fund `loan` from its pool on the borrower's request
    #[instrument(skip(self, caller, loan), fields(loan = %loan.short()))]
    pub fn fund(&self, caller: &Address, loan: &Address) -> Result<()> {
        let token = self.collaborators.factory.loan(loan)?;
        let (pool, required_rate) = self.check_fundable(caller, &token)?;
        let borrower = token.borrower();
        let received = token.received_amount();
        let currency = token.currency();
        let mutex = &self.collaborators.mutex;

        mutex.lock(&self.address, borrower, *loan)?;

        if let Err(err) = pool.borrow(&self.address, received) {
            mutex.unlock(&self.address, borrower)?;
            return Err(err);
        }

        let funded = currency
            .approve(&self.address, loan, received)
            .and_then(|_| token.fund(&self.address));
        if let Err(err) = funded {
            let returned = currency
                .approve(&self.address, &pool.address(), received)
                .and_then(|_| pool.repay(&self.address, received));
            if let Err(repay_err) = returned {
                warn!(error = %repay_err, "could not return liquidity after failed funding");
            }
            mutex.unlock(&self.address, borrower)?;
            return Err(err);
        }

        self.state
            .write()
            .pool_loans
            .entry(pool.address())
            .or_default()
            .push(*loan);

        info!(borrower = %borrower.short(), received, required_rate, apy = token.apy(), "loan funded by agency");
        self.events.publish(ProtocolEvent::LoanFundedByAgency {
            loan: *loan,
            pool: pool.address(),
            required_rate,
        });
        Ok(())
    }

    /// Redeem a settled loan, pay the protocol fee and return the rest to the pool
    ///
    /// Returns the amount repaid to the pool. The fee swap is quoted before
    /// any claim is burned; a pool that refuses the repayment gets the
    /// redemption reversed and the borrower locked again.
    #[instrument(skip(self, loan), fields(loan = %loan.short()))]
    pub fn reclaim(&self, loan: &Address) -> Result<u128> {
        let token = self.collaborators.factory.loan(loan)?;
        self.ensure_open(&token)?;
        if !matches!(token.status(), LoanStatus::Settled { .. }) {
            return Err(TrueFiError::invalid_state("reclaim", token.status().name()));
        }
        let pool = self.collaborators.pools.pool(&token.pool())?;
        let currency = token.currency();
        let swapper = &self.collaborators.swapper;
        let mutex = &self.collaborators.mutex;
        let borrower = token.borrower();

        let claims = token.claim_balance(&self.address);
        let expected = if token.total_supply() == 0 {
            0
        } else {
            math::mul_div(claims, token.balance(), token.total_supply())?
        };
        let principal = math::mul_div(token.amount(), claims, token.debt())?;
        let fee = math::basis_points(expected.saturating_sub(principal), self.config.read().protocol_fee)?;
        if fee > 0 {
            swapper.quote(currency.as_ref(), fee)?;
        }

        mutex.unlock(&self.address, borrower)?;
        let redeemed = if claims > 0 {
            match token.redeem(&self.address, claims) {
                Ok(redeemed) => redeemed,
                Err(err) => {
                    mutex.lock(&self.address, borrower, *loan)?;
                    return Err(err);
                }
            }
        } else {
            0
        };

        let repaid = redeemed.saturating_sub(fee);
        if repaid > 0 {
            let returned = currency
                .approve(&self.address, &pool.address(), repaid)
                .and_then(|_| pool.repay(&self.address, repaid));
            if let Err(err) = returned {
                self.restore_claims(&token, claims, redeemed)?;
                mutex.lock(&self.address, borrower, *loan)?;
                return Err(err);
            }
        }

        if fee > 0 {
            let swapped = currency
                .approve(&self.address, &swapper.address(), fee)
                .and_then(|_| swapper.swap(currency.as_ref(), &self.address, fee, &self.roles.stakers));
            match swapped {
                Ok(stake_out) => {
                    debug!(fee, stake_out, "protocol fee distributed");
                    self.events.publish(ProtocolEvent::FeeDistributed {
                        loan: *loan,
                        fee,
                        stake_out,
                    });
                }
                Err(err) => {
                    // an unfilled fee goes to the pool
                    warn!(error = %err, fee, "fee swap failed after quote, fee returned to pool");
                    currency.approve(&self.address, &pool.address(), fee)?;
                    pool.repay(&self.address, fee)?;
                }
            }
        }
        self.remove_loan(&token);

        info!(redeemed, fee, repaid, "loan reclaimed by agency");
        self.events.publish(ProtocolEvent::LoanReclaimedByAgency {
            loan: *loan,
            pool: pool.address(),
            redeemed,
            fee,
        });
        Ok(repaid)
    }

    fn restore_claims(&self, token: &LoanToken, claims: u128, redeemed: u128) -> Result<()> {
        if claims == 0 {
            return Ok(());
        }
        token
            .currency()
            .approve(&self.address, &token.address(), redeemed)?;
        token.reverse_redemption(&self.address, claims, redeemed)
    }

    /// Liquidate a defaulted loan and move its claims to recovery
    #[instrument(skip(self, caller, loan), fields(loan = %loan.short()))]
    pub fn liquidate(&self, caller: &Address, loan: &Address) -> Result<()> {
        if *caller != self.roles.liquidator {
            return Err(TrueFiError::unauthorized(caller, "liquidator"));
        }
        let token = self.collaborators.factory.loan(loan)?;
        self.ensure_open(&token)?;
        if !matches!(token.status(), LoanStatus::Defaulted { .. }) {
            return Err(TrueFiError::invalid_state("liquidate", token.status().name()));
        }

        token.liquidate(&self.address)?;
        let claims = token.claim_balance(&self.address);
        token.transfer_claims(&self.address, &self.roles.recovery, claims)?;
        self.collaborators
            .mutex
            .unlock(&self.address, token.borrower())?;
        self.remove_loan(&token);

        warn!(claims, recovery = %self.roles.recovery.short(), "defaulted loan liquidated");
        self.events.publish(ProtocolEvent::ClaimsSeized {
            loan: *loan,
            recovery: self.roles.recovery,
            claims,
        });
        Ok(())
    }
}
