//! LoanToken - a single loan and the claims on its debt
//!
//! Lifecycle:
//! - `Awaiting`: created, waiting for the lender
//! - `Funded`: lender transferred the principal (minus fee), claims minted
//! - `Withdrawn`: borrower took the funds
//! - `Settled` / `Defaulted`: resolved at close from the repaid balance
//! - `Liquidated`: a defaulted loan taken over by the liquidator
//!
//! Claims are denominated in debt units: exactly `debt` claims are minted at
//! funding and redemption only burns them.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use truefi_common::math::{self, BASIS_POINTS};
use truefi_common::{
    Address, ArithmeticError, Clock, EventBus, ProtocolEvent, Result, TokenLedger, TrueFiError, DAY, YEAR,
};

/// Loan status with the timestamps that belong to it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum LoanStatus {
    Awaiting,
    Funded { start: u64 },
    Withdrawn { start: u64 },
    Settled { start: u64, closed_at: u64 },
    Defaulted { start: u64, closed_at: u64 },
    Liquidated { start: u64, closed_at: u64 },
}

impl LoanStatus {
    pub fn name(&self) -> &'static str {
        match self {
            LoanStatus::Awaiting => "Awaiting",
            LoanStatus::Funded { .. } => "Funded",
            LoanStatus::Withdrawn { .. } => "Withdrawn",
            LoanStatus::Settled { .. } => "Settled",
            LoanStatus::Defaulted { .. } => "Defaulted",
            LoanStatus::Liquidated { .. } => "Liquidated",
        }
    }

    /// Funding timestamp, `None` before funding
    pub fn start(&self) -> Option<u64> {
        match *self {
            LoanStatus::Awaiting => None,
            LoanStatus::Funded { start }
            | LoanStatus::Withdrawn { start }
            | LoanStatus::Settled { start, .. }
            | LoanStatus::Defaulted { start, .. }
            | LoanStatus::Liquidated { start, .. } => Some(start),
        }
    }

    /// Funded or withdrawn, term still running or not yet closed
    pub fn is_active(&self) -> bool {
        matches!(self, LoanStatus::Funded { .. } | LoanStatus::Withdrawn { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            LoanStatus::Settled { .. } | LoanStatus::Defaulted { .. } | LoanStatus::Liquidated { .. }
        )
    }
}

/// Parameters fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanTerms {
    pub pool: Address,
    pub borrower: Address,
    /// Only party allowed to fund
    pub lender: Address,
    /// Only party allowed to liquidate after default
    pub liquidator: Address,
    pub amount: u128,
    /// Duration in seconds
    pub term: u64,
    /// Annual rate in bp
    pub apy: u128,
}

/// Loan-wide settings shared by every loan a factory creates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoanSettings {
    /// Origination fee withheld from the principal, in bp
    pub fee: u128,
    /// Seconds after the term end before a loan may be closed
    pub grace_period: u64,
}

impl Default for LoanSettings {
    fn default() -> Self {
        Self {
            fee: 25,
            grace_period: 3 * DAY,
        }
    }
}

impl LoanSettings {
    pub fn validate(&self) -> Result<()> {
        if self.fee > BASIS_POINTS {
            return Err(TrueFiError::InvalidArgument(format!(
                "loan fee {} exceeds 10000 bp",
                self.fee
            )));
        }
        Ok(())
    }
}

/// `amount + amount * apy * term / YEAR / 10000`
pub fn compute_debt(amount: u128, apy: u128, term: u64) -> Result<u128> {
    let scaled = amount.checked_mul(apy).ok_or(ArithmeticError::Overflow)?;
    let interest = math::mul_div(scaled, term as u128, YEAR as u128)? / BASIS_POINTS;
    Ok(math::add(amount, interest)?)
}

#[derive(Debug, Clone, Default)]
struct ClaimLedger {
    balances: HashMap<Address, u128>,
    total_supply: u128,
}

impl ClaimLedger {
    fn balance(&self, holder: &Address) -> u128 {
        self.balances.get(holder).copied().unwrap_or(0)
    }

    fn mint(&mut self, to: Address, amount: u128) -> Result<()> {
        self.total_supply = math::add(self.total_supply, amount)?;
        let balance = self.balance(&to) + amount;
        self.balances.insert(to, balance);
        Ok(())
    }

    fn burn(&mut self, from: &Address, amount: u128) -> Result<()> {
        let available = self.balance(from);
        if available < amount {
            return Err(TrueFiError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        self.balances.insert(*from, available - amount);
        self.total_supply -= amount;
        Ok(())
    }

    fn transfer(&mut self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        let available = self.balance(from);
        if available < amount {
            return Err(TrueFiError::InsufficientBalance {
                required: amount,
                available,
            });
        }
        if from != to {
            self.balances.insert(*from, available - amount);
            let received = self.balance(to) + amount;
            self.balances.insert(*to, received);
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct LoanLedger {
    status: LoanStatus,
    repaid: u128,
    claims: ClaimLedger,
}

/// Restore `snapshot` when the external call failed
fn commit_or_restore(ledger: &mut LoanLedger, snapshot: LoanLedger, outcome: Result<()>) -> Result<()> {
    if outcome.is_err() {
        *ledger = snapshot;
    }
    outcome
}

pub struct LoanToken {
    address: Address,
    terms: LoanTerms,
    settings: LoanSettings,
    debt: u128,
    received_amount: u128,
    currency: Arc<dyn TokenLedger>,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    ledger: RwLock<LoanLedger>,
}

impl LoanToken {
    pub fn new(
        address: Address,
        terms: LoanTerms,
        settings: LoanSettings,
        currency: Arc<dyn TokenLedger>,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        if terms.amount == 0 {
            return Err(TrueFiError::InvalidArgument("loan amount is zero".to_string()));
        }
        if terms.term == 0 {
            return Err(TrueFiError::InvalidArgument("loan term is zero".to_string()));
        }
        settings.validate()?;
        let debt = compute_debt(terms.amount, terms.apy, terms.term)?;
        let received_amount = terms.amount - math::basis_points(terms.amount, settings.fee)?;

        Ok(Self {
            address,
            terms,
            settings,
            debt,
            received_amount,
            currency,
            clock,
            events,
            ledger: RwLock::new(LoanLedger {
                status: LoanStatus::Awaiting,
                repaid: 0,
                claims: ClaimLedger::default(),
            }),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn terms(&self) -> &LoanTerms {
        &self.terms
    }

    pub fn pool(&self) -> Address {
        self.terms.pool
    }

    pub fn borrower(&self) -> Address {
        self.terms.borrower
    }

    pub fn amount(&self) -> u128 {
        self.terms.amount
    }

    pub fn term(&self) -> u64 {
        self.terms.term
    }

    pub fn apy(&self) -> u128 {
        self.terms.apy
    }

    pub fn debt(&self) -> u128 {
        self.debt
    }

    /// Interest owed on top of the principal
    pub fn interest(&self) -> u128 {
        self.debt - self.terms.amount
    }

    pub fn currency(&self) -> Arc<dyn TokenLedger> {
        self.currency.clone()
    }

    /// Principal minus the origination fee
    pub fn received_amount(&self) -> u128 {
        self.received_amount
    }

    pub fn status(&self) -> LoanStatus {
        self.ledger.read().status
    }

    pub fn start(&self) -> Option<u64> {
        self.status().start()
    }

    pub fn repaid(&self) -> u128 {
        self.ledger.read().repaid
    }

    /// Currency held by the loan
    pub fn balance(&self) -> u128 {
        self.currency.balance_of(&self.address)
    }

    pub fn is_repaid(&self) -> bool {
        self.balance() >= self.debt
    }

    pub fn total_supply(&self) -> u128 {
        self.ledger.read().claims.total_supply
    }

    pub fn claim_balance(&self, holder: &Address) -> u128 {
        self.ledger.read().claims.balance(holder)
    }

    /// Earliest timestamp `close` accepts
    pub fn closable_at(&self) -> Option<u64> {
        self.start().map(|start| {
            start
                .saturating_add(self.terms.term)
                .saturating_add(self.settings.grace_period)
        })
    }

    /// Lend the principal; mints `debt` claims to the lender
    #[instrument(skip(self), fields(loan = %self.address.short()))]
    pub fn fund(&self, caller: &Address) -> Result<()> {
        if *caller != self.terms.lender {
            return Err(TrueFiError::unauthorized(caller, "lender"));
        }

        let mut ledger = self.ledger.write();
        if ledger.status != LoanStatus::Awaiting {
            return Err(TrueFiError::invalid_state("fund", ledger.status.name()));
        }

        let snapshot = ledger.clone();
        let start = self.clock.now();
        ledger.claims.mint(*caller, self.debt)?;
        ledger.status = LoanStatus::Funded { start };

        let received = self.received_amount();
        let outcome = self
            .currency
            .transfer_from(&self.address, caller, &self.address, received);
        commit_or_restore(&mut ledger, snapshot, outcome)?;
        drop(ledger);

        info!(lender = %caller.short(), debt = self.debt, received, "loan funded");
        self.events.publish(ProtocolEvent::LoanFunded {
            loan: self.address,
            lender: *caller,
            debt: self.debt,
            received,
        });
        Ok(())
    }

    /// Borrower takes the funds
    #[instrument(skip(self), fields(loan = %self.address.short()))]
    pub fn withdraw(&self, caller: &Address, beneficiary: &Address) -> Result<()> {
        if *caller != self.terms.borrower {
            return Err(TrueFiError::unauthorized(caller, "borrower"));
        }

        let mut ledger = self.ledger.write();
        let start = match ledger.status {
            LoanStatus::Funded { start } => start,
            other => return Err(TrueFiError::invalid_state("withdraw", other.name())),
        };

        let snapshot = ledger.clone();
        ledger.status = LoanStatus::Withdrawn { start };
        let amount = self.received_amount();
        let outcome = self.currency.transfer(&self.address, beneficiary, amount);
        commit_or_restore(&mut ledger, snapshot, outcome)?;
        drop(ledger);

        info!(beneficiary = %beneficiary.short(), amount, "loan withdrawn");
        self.events.publish(ProtocolEvent::LoanWithdrawn {
            loan: self.address,
            beneficiary: *beneficiary,
            amount,
        });
        Ok(())
    }

    /// Pull `amount` of currency from `payer` into the loan
    pub fn repay(&self, payer: &Address, amount: u128) -> Result<()> {
        let mut ledger = self.ledger.write();
        match ledger.status {
            LoanStatus::Withdrawn { .. }
            | LoanStatus::Settled { .. }
            | LoanStatus::Defaulted { .. }
            | LoanStatus::Liquidated { .. } => {}
            other => return Err(TrueFiError::invalid_state("repay", other.name())),
        }

        let snapshot = ledger.clone();
        ledger.repaid = math::add(ledger.repaid, amount)?;
        let outcome = self
            .currency
            .transfer_from(&self.address, payer, &self.address, amount);
        commit_or_restore(&mut ledger, snapshot, outcome)?;
        let repaid = ledger.repaid;
        drop(ledger);

        debug!(loan = %self.address.short(), payer = %payer.short(), amount, repaid, "loan repaid");
        self.events.publish(ProtocolEvent::LoanRepaid {
            loan: self.address,
            payer: *payer,
            amount,
            repaid,
        });
        Ok(())
    }

    /// Close early once the full debt is on the loan
    pub fn settle(&self) -> Result<()> {
        let mut ledger = self.ledger.write();
        let start = match ledger.status {
            LoanStatus::Funded { start } | LoanStatus::Withdrawn { start } => start,
            other => return Err(TrueFiError::invalid_state("settle", other.name())),
        };

        let balance = self.balance();
        if balance < self.debt {
            return Err(TrueFiError::InsufficientBalance {
                required: self.debt,
                available: balance,
            });
        }

        let now = self.clock.now();
        ledger.status = LoanStatus::Settled {
            start,
            closed_at: now,
        };
        drop(ledger);

        self.announce_close("Settled", balance);
        Ok(())
    }

    /// Resolve the loan after term and grace period
    #[instrument(skip(self), fields(loan = %self.address.short()))]
    pub fn close(&self) -> Result<LoanStatus> {
        let mut ledger = self.ledger.write();
        let start = match ledger.status {
            LoanStatus::Funded { start } | LoanStatus::Withdrawn { start } => start,
            other => return Err(TrueFiError::invalid_state("close", other.name())),
        };

        let now = self.clock.now();
        let ready_at = start
            .saturating_add(self.terms.term)
            .saturating_add(self.settings.grace_period);
        if now < ready_at {
            return Err(TrueFiError::TooEarly { ready_at, now });
        }

        let balance = self.balance();
        let status = if balance >= self.debt {
            LoanStatus::Settled {
                start,
                closed_at: now,
            }
        } else {
            LoanStatus::Defaulted {
                start,
                closed_at: now,
            }
        };
        ledger.status = status;
        drop(ledger);

        if matches!(status, LoanStatus::Defaulted { .. }) {
            warn!(balance, debt = self.debt, "loan defaulted");
        }
        self.announce_close(status.name(), balance);
        Ok(status)
    }

    fn announce_close(&self, status: &str, balance: u128) {
        info!(loan = %self.address.short(), status, balance, "loan closed");
        self.events.publish(ProtocolEvent::LoanClosed {
            loan: self.address,
            status: status.to_string(),
            balance,
        });
    }

    /// Accrued worth of `claims`
    ///
    /// Interest accrues linearly from funding; after the term, or once
    /// settled, each claim is worth one unit of debt.
    pub fn value(&self, claims: u128) -> Result<u128> {
        if claims == 0 {
            return Ok(0);
        }
        let start = match self.status() {
            LoanStatus::Awaiting => return Ok(0),
            LoanStatus::Settled { .. } => return Ok(claims),
            status => status.start().unwrap_or_default(),
        };

        let passed = self.clock.now().saturating_sub(start);
        if passed >= self.terms.term {
            return Ok(claims);
        }

        let accrued = compute_debt(self.terms.amount, self.terms.apy, passed)?;
        Ok(math::mul_div(accrued, claims, self.debt)?)
    }

    /// Burn `claims` and pay out their share of the loan balance
    #[instrument(skip(self), fields(loan = %self.address.short()))]
    pub fn redeem(&self, holder: &Address, claims: u128) -> Result<u128> {
        let mut ledger = self.ledger.write();
        match ledger.status {
            LoanStatus::Settled { .. } | LoanStatus::Defaulted { .. } | LoanStatus::Liquidated { .. } => {}
            other => return Err(TrueFiError::invalid_state("redeem", other.name())),
        }
        if ledger.claims.total_supply == 0 {
            return Err(TrueFiError::InsufficientBalance {
                required: claims,
                available: 0,
            });
        }

        let payout = math::mul_div(claims, self.balance(), ledger.claims.total_supply)?;
        let snapshot = ledger.clone();
        ledger.claims.burn(holder, claims)?;
        let outcome = self.currency.transfer(&self.address, holder, payout);
        commit_or_restore(&mut ledger, snapshot, outcome)?;
        drop(ledger);

        info!(holder = %holder.short(), claims, payout, "claims redeemed");
        self.events.publish(ProtocolEvent::LoanRedeemed {
            loan: self.address,
            holder: *holder,
            claims,
            payout,
        });
        Ok(payout)
    }

    /// Take `payout` back from the lender and reissue the `claims` it redeemed
    ///
    /// The lender approves the loan for `payout` first.
    pub fn reverse_redemption(&self, holder: &Address, claims: u128, payout: u128) -> Result<()> {
        if *holder != self.terms.lender {
            return Err(TrueFiError::unauthorized(holder, "lender"));
        }

        let mut ledger = self.ledger.write();
        if !ledger.status.is_closed() {
            return Err(TrueFiError::invalid_state("reverse redemption", ledger.status.name()));
        }
        let snapshot = ledger.clone();
        ledger.claims.mint(*holder, claims)?;
        let outcome = self
            .currency
            .transfer_from(&self.address, holder, &self.address, payout);
        commit_or_restore(&mut ledger, snapshot, outcome)?;
        drop(ledger);

        warn!(loan = %self.address.short(), claims, payout, "redemption reversed");
        Ok(())
    }

    /// Hand a defaulted loan to the liquidator
    pub fn liquidate(&self, caller: &Address) -> Result<()> {
        if *caller != self.terms.liquidator {
            return Err(TrueFiError::unauthorized(caller, "liquidator"));
        }

        let mut ledger = self.ledger.write();
        let (start, closed_at) = match ledger.status {
            LoanStatus::Defaulted { start, closed_at } => (start, closed_at),
            other => return Err(TrueFiError::invalid_state("liquidate", other.name())),
        };
        ledger.status = LoanStatus::Liquidated { start, closed_at };
        drop(ledger);

        warn!(loan = %self.address.short(), liquidator = %caller.short(), "loan liquidated");
        self.events.publish(ProtocolEvent::LoanLiquidated {
            loan: self.address,
            liquidator: *caller,
        });
        Ok(())
    }

    /// Return the residual balance to the borrower once every claim is redeemed
    ///
    /// Accepted in any closed status: Settled, Defaulted or Liquidated.
    pub fn reclaim(&self, caller: &Address) -> Result<u128> {
        if *caller != self.terms.borrower {
            return Err(TrueFiError::unauthorized(caller, "borrower"));
        }

        let ledger = self.ledger.read();
        if !ledger.status.is_closed() {
            return Err(TrueFiError::invalid_state("reclaim", ledger.status.name()));
        }
        if ledger.claims.total_supply > 0 {
            return Err(TrueFiError::invalid_state("reclaim", "claims outstanding"));
        }
        let amount = self.balance();
        if amount == 0 {
            return Err(TrueFiError::InsufficientBalance {
                required: 1,
                available: 0,
            });
        }

        self.currency.transfer(&self.address, caller, amount)?;
        drop(ledger);

        info!(loan = %self.address.short(), amount, "surplus reclaimed by borrower");
        self.events.publish(ProtocolEvent::LoanReclaimed {
            loan: self.address,
            borrower: *caller,
            amount,
        });
        Ok(amount)
    }

    /// Move claims between holders
    pub fn transfer_claims(&self, from: &Address, to: &Address, amount: u128) -> Result<()> {
        self.ledger.write().claims.transfer(from, to, amount)?;
        debug!(loan = %self.address.short(), from = %from.short(), to = %to.short(), amount, "claims transferred");
        Ok(())
    }
}

impl std::fmt::Debug for LoanToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoanToken")
            .field("address", &self.address)
            .field("terms", &self.terms)
            .field("debt", &self.debt)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truefi_common::memory::InMemoryToken;
    use truefi_common::{EventLog, ManualClock};

    const START: u64 = 1_700_000_000;

    struct Fixture {
        clock: Arc<ManualClock>,
        token: Arc<InMemoryToken>,
        loan: LoanToken,
        lender: Address,
        borrower: Address,
        minter: Address,
        log: Arc<EventLog>,
    }

    fn fixture(amount: u128, apy: u128, term: u64) -> Fixture {
        let clock = Arc::new(ManualClock::new(START));
        let minter = Address::from_label("minter");
        let token = Arc::new(InMemoryToken::new("TUSD", 18).with_minter(minter));
        let events = Arc::new(EventBus::silent(clock.clone()));
        let log = Arc::new(EventLog::new());
        events.add_sink(log.clone());

        let lender = Address::from_label("lender");
        let borrower = Address::from_label("borrower");
        let terms = LoanTerms {
            pool: Address::from_label("pool"),
            borrower,
            lender,
            liquidator: Address::from_label("liquidator"),
            amount,
            term,
            apy,
        };
        let loan = LoanToken::new(
            Address::from_label("loan"),
            terms,
            LoanSettings::default(),
            token.clone(),
            clock.clone(),
            events,
        )
        .unwrap();

        token.mint(&minter, &lender, amount).unwrap();
        token.approve(&lender, &loan.address(), amount).unwrap();

        Fixture {
            clock,
            token,
            loan,
            lender,
            borrower,
            minter,
            log,
        }
    }

    fn repay_in_full(f: &Fixture) {
        let owed = f.loan.debt() - f.loan.balance();
        f.token.mint(&f.minter, &f.borrower, owed).unwrap();
        f.token.approve(&f.borrower, &f.loan.address(), owed).unwrap();
        f.loan.repay(&f.borrower, owed).unwrap();
    }

    #[test]
    fn test_debt_and_fee() {
        let f = fixture(1000, 1000, YEAR);
        assert_eq!(f.loan.debt(), 1100);
        assert_eq!(f.loan.interest(), 100);

        f.loan.fund(&f.lender).unwrap();
        // 25 bp of 1000 is 2.5, truncated
        assert_eq!(f.loan.received_amount(), 998);
        assert_eq!(f.token.balance_of(&f.loan.address()), 998);
        assert_eq!(f.loan.claim_balance(&f.lender), 1100);
        assert_eq!(f.loan.total_supply(), 1100);
        assert_eq!(f.loan.start(), Some(START));
    }

    #[test]
    fn test_value_accrues_linearly() {
        let f = fixture(1000, 1000, YEAR);
        assert_eq!(f.loan.value(1100).unwrap(), 0);

        f.loan.fund(&f.lender).unwrap();
        assert_eq!(f.loan.value(1100).unwrap(), 1000);

        f.clock.advance(YEAR / 2);
        assert_eq!(f.loan.value(1100).unwrap(), 1050);
        assert_eq!(f.loan.value(550).unwrap(), 525);

        f.clock.advance(YEAR);
        assert_eq!(f.loan.value(1100).unwrap(), 1100);
    }

    #[test]
    fn test_value_and_redeem_at_token_scale() {
        let unit = 10u128.pow(18);
        let f = fixture(1000 * unit, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();

        f.clock.advance(YEAR / 2);
        assert_eq!(f.loan.value(1100 * unit).unwrap(), 1050 * unit);
        assert_eq!(f.loan.value(550 * unit).unwrap(), 525 * unit);

        repay_in_full(&f);
        f.loan.settle().unwrap();
        assert_eq!(f.loan.redeem(&f.lender, 550 * unit).unwrap(), 550 * unit);
        assert_eq!(f.loan.redeem(&f.lender, 550 * unit).unwrap(), 550 * unit);
        assert_eq!(
            f.token.balance_of(&f.lender),
            1000 * unit - f.loan.received_amount() + 1100 * unit
        );
    }

    #[test]
    fn test_only_lender_funds_once() {
        let f = fixture(1000, 1000, YEAR);
        assert_eq!(f.loan.fund(&f.borrower).unwrap_err().code(), "UNAUTHORIZED");
        f.loan.fund(&f.lender).unwrap();
        assert_eq!(f.loan.fund(&f.lender).unwrap_err().code(), "INVALID_STATE");
    }

    #[test]
    fn test_failed_funding_transfer_leaves_loan_untouched() {
        let f = fixture(1000, 1000, YEAR);
        f.token.approve(&f.lender, &f.loan.address(), 10).unwrap();

        assert_eq!(f.loan.fund(&f.lender).unwrap_err().code(), "INSUFFICIENT_ALLOWANCE");
        assert_eq!(f.loan.status(), LoanStatus::Awaiting);
        assert_eq!(f.loan.total_supply(), 0);
        assert_eq!(f.log.count("LoanFunded"), 0);
    }

    #[test]
    fn test_withdraw() {
        let f = fixture(1000, 1000, YEAR);
        assert_eq!(
            f.loan.withdraw(&f.borrower, &f.borrower).unwrap_err().code(),
            "INVALID_STATE"
        );
        f.loan.fund(&f.lender).unwrap();
        assert_eq!(
            f.loan.withdraw(&f.lender, &f.lender).unwrap_err().code(),
            "UNAUTHORIZED"
        );

        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();
        assert_eq!(f.token.balance_of(&f.borrower), 998);
        assert_eq!(f.loan.status(), LoanStatus::Withdrawn { start: START });
    }

    #[test]
    fn test_close_too_early_then_default() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();

        f.clock.advance(YEAR);
        assert_eq!(f.loan.close().unwrap_err().code(), "TOO_EARLY");

        f.clock.advance(3 * DAY);
        let status = f.loan.close().unwrap();
        assert!(matches!(status, LoanStatus::Defaulted { .. }));
        assert_eq!(f.loan.close().unwrap_err().code(), "INVALID_STATE");
    }

    #[test]
    fn test_close_settles_repaid_loan() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();
        repay_in_full(&f);
        assert!(f.loan.is_repaid());

        f.clock.advance(YEAR + 3 * DAY);
        assert!(matches!(f.loan.close().unwrap(), LoanStatus::Settled { .. }));
        assert_eq!(f.log.count("LoanClosed"), 1);
    }

    #[test]
    fn test_settle_early() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();
        assert_eq!(f.loan.settle().unwrap_err().code(), "INSUFFICIENT_BALANCE");

        repay_in_full(&f);
        f.loan.settle().unwrap();
        assert_eq!(f.loan.value(1100).unwrap(), 1100);
        assert_eq!(f.loan.redeem(&f.lender, 1100).unwrap(), 1100);
        assert_eq!(f.loan.total_supply(), 0);
    }

    #[test]
    fn test_partial_default_redeems_pro_rata() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();

        let other = Address::from_label("other");
        f.loan.transfer_claims(&f.lender, &other, 550).unwrap();

        f.token.approve(&f.borrower, &f.loan.address(), 440).unwrap();
        f.loan.repay(&f.borrower, 440).unwrap();
        f.clock.advance(YEAR + 3 * DAY);
        f.loan.close().unwrap();

        // 550 of 1100 claims over a balance of 440
        assert_eq!(f.loan.redeem(&f.lender, 550).unwrap(), 220);
        assert_eq!(f.loan.redeem(&other, 550).unwrap(), 220);
        assert_eq!(f.loan.repaid(), 440);
    }

    #[test]
    fn test_repayments_after_default_still_reach_holders() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();
        f.clock.advance(YEAR + 3 * DAY);
        f.loan.close().unwrap();

        f.token.approve(&f.borrower, &f.loan.address(), 998).unwrap();
        f.loan.repay(&f.borrower, 998).unwrap();
        assert_eq!(f.loan.redeem(&f.lender, 1100).unwrap(), 998);
    }

    #[test]
    fn test_reverse_redemption_restores_claims() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();
        repay_in_full(&f);
        f.loan.settle().unwrap();

        let payout = f.loan.redeem(&f.lender, 1100).unwrap();
        assert_eq!(
            f.loan.reverse_redemption(&f.borrower, 1100, payout).unwrap_err().code(),
            "UNAUTHORIZED"
        );
        assert_eq!(
            f.loan.reverse_redemption(&f.lender, 1100, payout).unwrap_err().code(),
            "INSUFFICIENT_ALLOWANCE"
        );
        assert_eq!(f.loan.total_supply(), 0);

        f.token.approve(&f.lender, &f.loan.address(), payout).unwrap();
        f.loan.reverse_redemption(&f.lender, 1100, payout).unwrap();
        assert_eq!(f.loan.claim_balance(&f.lender), 1100);
        assert_eq!(f.loan.balance(), 1100);
    }

    #[test]
    fn test_liquidate() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        let liquidator = Address::from_label("liquidator");
        assert_eq!(f.loan.liquidate(&liquidator).unwrap_err().code(), "INVALID_STATE");

        f.clock.advance(YEAR + 3 * DAY);
        f.loan.close().unwrap();
        assert_eq!(f.loan.liquidate(&f.lender).unwrap_err().code(), "UNAUTHORIZED");
        f.loan.liquidate(&liquidator).unwrap();
        assert!(matches!(f.loan.status(), LoanStatus::Liquidated { .. }));
    }

    #[test]
    fn test_reclaim_overpayment() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();

        f.token.mint(&f.minter, &f.borrower, 1000).unwrap();
        f.token.approve(&f.borrower, &f.loan.address(), 1200).unwrap();
        f.loan.repay(&f.borrower, 1200).unwrap();
        f.loan.settle().unwrap();

        assert_eq!(f.loan.reclaim(&f.borrower).unwrap_err().code(), "INVALID_STATE");
        // settled claims are paid against the whole balance
        assert_eq!(f.loan.redeem(&f.lender, 1100).unwrap(), 1200);
        assert_eq!(f.loan.reclaim(&f.borrower).unwrap_err().code(), "INSUFFICIENT_BALANCE");
    }

    #[test]
    fn test_reclaim_after_partial_redemption_flow() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();
        repay_in_full(&f);
        f.loan.settle().unwrap();
        f.loan.redeem(&f.lender, 1100).unwrap();

        // late overpayment after every claim is gone
        f.token.mint(&f.minter, &f.borrower, 5).unwrap();
        f.token.approve(&f.borrower, &f.loan.address(), 5).unwrap();
        f.loan.repay(&f.borrower, 5).unwrap();

        assert_eq!(f.loan.reclaim(&f.lender).unwrap_err().code(), "UNAUTHORIZED");
        assert_eq!(f.loan.reclaim(&f.borrower).unwrap(), 5);
    }

    #[test]
    fn test_reclaim_from_defaulted_loan() {
        let f = fixture(1000, 1000, YEAR);
        f.loan.fund(&f.lender).unwrap();
        f.loan.withdraw(&f.borrower, &f.borrower).unwrap();
        f.token.mint(&f.minter, &f.borrower, 500).unwrap();
        f.token.approve(&f.borrower, &f.loan.address(), 500).unwrap();
        f.loan.repay(&f.borrower, 500).unwrap();

        f.clock.advance(YEAR + 3 * DAY);
        assert!(matches!(f.loan.close().unwrap(), LoanStatus::Defaulted { .. }));
        assert_eq!(f.loan.redeem(&f.lender, 1100).unwrap(), 500);

        f.token.mint(&f.minter, &f.borrower, 7).unwrap();
        f.token.approve(&f.borrower, &f.loan.address(), 7).unwrap();
        f.loan.repay(&f.borrower, 7).unwrap();
        assert_eq!(f.loan.reclaim(&f.borrower).unwrap(), 7);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let clock = Arc::new(ManualClock::new(START));
        let token = Arc::new(InMemoryToken::new("TUSD", 18));
        let terms = LoanTerms {
            pool: Address::ZERO,
            borrower: Address::ZERO,
            lender: Address::ZERO,
            liquidator: Address::ZERO,
            amount: 0,
            term: YEAR,
            apy: 100,
        };
        let events = Arc::new(EventBus::silent(clock.clone()));
        let result = LoanToken::new(Address::ZERO, terms, LoanSettings::default(), token, clock, events);
        assert_eq!(result.unwrap_err().code(), "INVALID_ARGUMENT");
    }
}
