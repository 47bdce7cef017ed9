//! RatingAgency - staked yes/no votes on loan applications
//!
//! Borrowers submit loans created by the factory; stakers lock tokens on
//! either side while the loan awaits funding. Once the loan closes, the side
//! that called it right takes the redistributable part of the losing stake
//! and the rest of the lost stake is burned. Funded loans also earn raters a
//! reward, priced from the loan interest and vesting over the term.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use truefi_common::math;
use truefi_common::{
    Address, Clock, EventBus, PriceOracle, ProtocolEvent, Result, RewardDistributor, TokenLedger,
    TrueFiError,
};
use truefi_loans::{LoanFactory, LoanStatus, LoanToken};

use crate::config::RatingConfig;

/// A voter's position on one loan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Vote {
    #[default]
    None,
    Yes(u128),
    No(u128),
}

impl Vote {
    pub fn amount(&self) -> u128 {
        match *self {
            Vote::None => 0,
            Vote::Yes(amount) | Vote::No(amount) => amount,
        }
    }

    pub fn is_yes(&self) -> bool {
        matches!(self, Vote::Yes(_))
    }

    /// Same side with `amount` less
    fn reduced(self, amount: u128) -> Vote {
        match self {
            Vote::Yes(current) if current > amount => Vote::Yes(current - amount),
            Vote::No(current) if current > amount => Vote::No(current - amount),
            _ => Vote::None,
        }
    }
}

/// Rating status, derived from the submission and the loan state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RatingStatus {
    Void,
    Pending,
    Retracted,
    Running,
    Settled,
    Defaulted,
}

/// Voting record of one submitted loan
#[derive(Debug, Clone)]
pub struct LoanRating {
    pub creator: Address,
    pub submitted_at: u64,
    pub retracted: bool,
    pub yes_total: u128,
    pub no_total: u128,
    pub votes: HashMap<Address, Vote>,
    /// Fixed on the first claim after funding
    pub reward: Option<u128>,
    pub claimed: HashMap<Address, u128>,
    /// Winner bonuses paid so far
    pub redistributed: u128,
}

impl LoanRating {
    fn new(creator: Address, submitted_at: u64) -> Self {
        Self {
            creator,
            submitted_at,
            retracted: false,
            yes_total: 0,
            no_total: 0,
            votes: HashMap::new(),
            reward: None,
            claimed: HashMap::new(),
            redistributed: 0,
        }
    }

    fn vote(&self, voter: &Address) -> Vote {
        self.votes.get(voter).copied().unwrap_or_default()
    }
}

/// External dependencies of the agency
pub struct RatingCollaborators {
    pub factory: Arc<LoanFactory>,
    pub stake_token: Arc<dyn TokenLedger>,
    /// Asset id of the stake token at the price oracle
    pub stake_asset: Address,
    pub reward_token: Arc<dyn TokenLedger>,
    pub distributor: Arc<dyn RewardDistributor>,
    pub price_oracle: Arc<dyn PriceOracle>,
}

#[derive(Debug, Default)]
struct AgencyState {
    ratings: HashMap<Address, LoanRating>,
}

pub struct RatingAgency {
    address: Address,
    owner: Address,
    collaborators: RatingCollaborators,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
    config: RwLock<RatingConfig>,
    paused: RwLock<bool>,
    state: RwLock<AgencyState>,
}

impl RatingAgency {
    pub fn new(
        address: Address,
        owner: Address,
        config: RatingConfig,
        collaborators: RatingCollaborators,
        clock: Arc<dyn Clock>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            address,
            owner,
            collaborators,
            clock,
            events,
            config: RwLock::new(config),
            paused: RwLock::new(false),
            state: RwLock::new(AgencyState::default()),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn config(&self) -> RatingConfig {
        self.config.read().clone()
    }

    pub fn submissions_paused(&self) -> bool {
        *self.paused.read()
    }

    fn ensure_owner(&self, caller: &Address) -> Result<()> {
        if *caller != self.owner {
            return Err(TrueFiError::unauthorized(caller, "rating agency owner"));
        }
        Ok(())
    }

    fn update_config<F>(&self, caller: &Address, setting: &str, value: u128, apply: F) -> Result<()>
    where
        F: FnOnce(&mut RatingConfig),
    {
        self.ensure_owner(caller)?;
        let mut config = self.config.write();
        let mut next = config.clone();
        apply(&mut next);
        next.validate()?;
        *config = next;
        drop(config);

        info!(setting, value, "rating parameter changed");
        self.events
            .publish(ProtocolEvent::config_changed("RatingAgency", setting, value));
        Ok(())
    }

    pub fn set_loss_factor(&self, caller: &Address, loss_factor: u128) -> Result<()> {
        self.update_config(caller, "loss_factor", loss_factor, |c| c.loss_factor = loss_factor)
    }

    pub fn set_burn_factor(&self, caller: &Address, burn_factor: u128) -> Result<()> {
        self.update_config(caller, "burn_factor", burn_factor, |c| c.burn_factor = burn_factor)
    }

    pub fn set_reward_multiplier(&self, caller: &Address, multiplier: u128) -> Result<()> {
        self.update_config(caller, "reward_multiplier", multiplier, |c| {
            c.reward_multiplier = multiplier
        })
    }

    pub fn pause_submissions(&self, caller: &Address, paused: bool) -> Result<()> {
        self.ensure_owner(caller)?;
        *self.paused.write() = paused;

        info!(paused, "rating submissions pause toggled");
        self.events.publish(ProtocolEvent::config_changed(
            "RatingAgency",
            "submissions_paused",
            paused,
        ));
        Ok(())
    }

    fn loan(&self, loan: &Address) -> Result<Arc<LoanToken>> {
        self.collaborators.factory.loan(loan)
    }

    fn derive_status(rating: Option<&LoanRating>, loan: &LoanToken) -> RatingStatus {
        let rating = match rating {
            Some(rating) => rating,
            None => return RatingStatus::Void,
        };
        if rating.retracted {
            return RatingStatus::Retracted;
        }
        match loan.status() {
            LoanStatus::Awaiting => RatingStatus::Pending,
            LoanStatus::Funded { .. } | LoanStatus::Withdrawn { .. } => RatingStatus::Running,
            LoanStatus::Settled { .. } => RatingStatus::Settled,
            LoanStatus::Defaulted { .. } | LoanStatus::Liquidated { .. } => RatingStatus::Defaulted,
        }
    }

    pub fn status(&self, loan: &Address) -> Result<RatingStatus> {
        let token = self.loan(loan)?;
        let state = self.state.read();
        Ok(Self::derive_status(state.ratings.get(loan), &token))
    }

    /// `(submitted_at, no_total, yes_total)`
    pub fn results(&self, loan: &Address) -> Result<(u64, u128, u128)> {
        let state = self.state.read();
        let rating = state.ratings.get(loan).ok_or(TrueFiError::UnknownLoan(*loan))?;
        Ok((rating.submitted_at, rating.no_total, rating.yes_total))
    }

    pub fn vote_of(&self, loan: &Address, voter: &Address) -> Vote {
        self.state
            .read()
            .ratings
            .get(loan)
            .map(|rating| rating.vote(voter))
            .unwrap_or_default()
    }

    /// Open voting on a loan
    pub fn submit(&self, caller: &Address, loan: &Address) -> Result<()> {
        if self.submissions_paused() {
            return Err(TrueFiError::SubmissionsPaused);
        }
        let token = self.loan(loan)?;
        if token.borrower() != *caller {
            return Err(TrueFiError::unauthorized(caller, "loan borrower"));
        }

        let mut state = self.state.write();
        if let Some(existing) = state.ratings.get(loan) {
            let status = Self::derive_status(Some(existing), &token);
            return Err(TrueFiError::invalid_state("submit", status));
        }
        if token.status() != LoanStatus::Awaiting {
            return Err(TrueFiError::invalid_state("submit", token.status().name()));
        }
        state
            .ratings
            .insert(*loan, LoanRating::new(*caller, self.clock.now()));
        drop(state);

        info!(loan = %loan.short(), creator = %caller.short(), "loan submitted for rating");
        self.events.publish(ProtocolEvent::LoanSubmitted {
            loan: *loan,
            creator: *caller,
        });
        Ok(())
    }

    /// Withdraw a pending submission; terminal
    pub fn retract(&self, caller: &Address, loan: &Address) -> Result<()> {
        let token = self.loan(loan)?;
        let mut state = self.state.write();
        let status = Self::derive_status(state.ratings.get(loan), &token);
        if status != RatingStatus::Pending {
            return Err(TrueFiError::invalid_state("retract", status));
        }
        let rating = state
            .ratings
            .get_mut(loan)
            .ok_or(TrueFiError::UnknownLoan(*loan))?;
        if rating.creator != *caller {
            return Err(TrueFiError::unauthorized(caller, "loan creator"));
        }

        rating.retracted = true;
        rating.yes_total = 0;
        rating.no_total = 0;
        drop(state);

        info!(loan = %loan.short(), "loan submission retracted");
        self.events.publish(ProtocolEvent::LoanRetracted { loan: *loan });
        Ok(())
    }

    pub fn yes(&self, voter: &Address, loan: &Address, amount: u128) -> Result<()> {
        self.vote(voter, loan, amount, true)
    }

    pub fn no(&self, voter: &Address, loan: &Address, amount: u128) -> Result<()> {
        self.vote(voter, loan, amount, false)
    }

    fn vote(&self, voter: &Address, loan: &Address, amount: u128, yes: bool) -> Result<()> {
        if amount == 0 {
            return Err(TrueFiError::InvalidArgument("vote amount is zero".to_string()));
        }
        let token = self.loan(loan)?;

        let mut state = self.state.write();
        let status = Self::derive_status(state.ratings.get(loan), &token);
        if status != RatingStatus::Pending {
            return Err(TrueFiError::invalid_state("vote", status));
        }
        let rating = state
            .ratings
            .get_mut(loan)
            .ok_or(TrueFiError::UnknownLoan(*loan))?;

        let snapshot = rating.clone();
        let current = rating.vote(voter);
        let next = match (current, yes) {
            (Vote::None, true) => Vote::Yes(amount),
            (Vote::None, false) => Vote::No(amount),
            (Vote::Yes(held), true) => Vote::Yes(math::add(held, amount)?),
            (Vote::No(held), false) => Vote::No(math::add(held, amount)?),
            _ => return Err(TrueFiError::ConflictingVote { voter: *voter }),
        };
        if yes {
            rating.yes_total = math::add(rating.yes_total, amount)?;
        } else {
            rating.no_total = math::add(rating.no_total, amount)?;
        }
        rating.votes.insert(*voter, next);

        let outcome = self
            .collaborators
            .stake_token
            .transfer_from(&self.address, voter, &self.address, amount);
        if let Err(err) = outcome {
            *rating = snapshot;
            return Err(err);
        }
        drop(state);

        debug!(loan = %loan.short(), voter = %voter.short(), yes, amount, "vote cast");
        self.events.publish(ProtocolEvent::Voted {
            loan: *loan,
            voter: *voter,
            yes,
            amount,
        });
        Ok(())
    }

    /// Take `amount` of stake back, with the payout the loan outcome dictates
    ///
    /// On a closed loan the voter's pending reward is paid in the same step.
    /// Returns the stake-token amount paid to the voter.
    #[instrument(skip(self, voter, loan), fields(loan = %loan.short(), voter = %voter.short()))]
    pub fn withdraw(&self, voter: &Address, loan: &Address, amount: u128) -> Result<u128> {
        let token = self.loan(loan)?;
        let config = self.config();

        let mut state = self.state.write();
        let status = Self::derive_status(state.ratings.get(loan), &token);
        if matches!(status, RatingStatus::Void | RatingStatus::Running) {
            return Err(TrueFiError::invalid_state("withdraw votes", status));
        }
        let rating = state
            .ratings
            .get_mut(loan)
            .ok_or(TrueFiError::UnknownLoan(*loan))?;
        let vote = rating.vote(voter);
        if amount > vote.amount() {
            return Err(TrueFiError::InsufficientStake {
                requested: amount,
                available: vote.amount(),
            });
        }

        let closed = matches!(status, RatingStatus::Settled | RatingStatus::Defaulted);
        if closed {
            self.allocate_reward(rating, loan, &token)?;
        }
        let snapshot = rating.clone();
        let reward = if closed {
            self.accrue_claim(rating, &token, voter)?
        } else {
            0
        };

        let (payout, burned) = match status {
            RatingStatus::Pending => {
                if vote.is_yes() {
                    rating.yes_total -= amount;
                } else {
                    rating.no_total -= amount;
                }
                (amount, 0)
            }
            RatingStatus::Settled | RatingStatus::Defaulted => {
                let won = vote.is_yes() == (status == RatingStatus::Settled);
                let (winner_total, loser_total) = if status == RatingStatus::Settled {
                    (rating.yes_total, rating.no_total)
                } else {
                    (rating.no_total, rating.yes_total)
                };

                if won {
                    let redistributable =
                        redistributable(loser_total, config.loss_factor, config.burn_factor)?;
                    let share = if winner_total == 0 {
                        0
                    } else {
                        math::mul_div(redistributable, amount, winner_total)?
                    };
                    let bonus = share.min(redistributable.saturating_sub(rating.redistributed));
                    let payout = math::add(amount, bonus)?;
                    rating.redistributed += bonus;
                    (payout, 0)
                } else {
                    let lost = math::basis_points(amount, config.loss_factor)?;
                    let handed_over = math::basis_points(lost, config.burn_factor)?;
                    (amount - lost, lost - handed_over)
                }
            }
            _ => (amount, 0),
        };
        rating.votes.insert(*voter, vote.reduced(amount));

        if let Err(err) = self.pay_out(voter, payout, burned, reward) {
            *rating = snapshot;
            return Err(err);
        }
        drop(state);

        if reward > 0 {
            debug!(loan = %loan.short(), voter = %voter.short(), amount = reward, "reward claimed");
            self.events.publish(ProtocolEvent::RewardClaimed {
                loan: *loan,
                voter: *voter,
                beneficiary: *voter,
                amount: reward,
            });
        }
        info!(amount, payout, burned, reward, "votes withdrawn");
        self.events.publish(ProtocolEvent::VoteWithdrawn {
            loan: *loan,
            voter: *voter,
            amount,
            payout,
            burned,
        });
        Ok(payout)
    }

    /// Check every balance first, then burn and pay
    fn pay_out(&self, voter: &Address, payout: u128, burned: u128, reward: u128) -> Result<()> {
        let stake = &self.collaborators.stake_token;
        let rewards = &self.collaborators.reward_token;

        let mut required = math::add(payout, burned)?;
        if reward > 0 {
            if same_ledger(stake, rewards) {
                required = math::add(required, reward)?;
            } else {
                ensure_held(rewards.as_ref(), &self.address, reward)?;
            }
        }
        ensure_held(stake.as_ref(), &self.address, required)?;

        if burned > 0 {
            stake.burn(&self.address, burned)?;
        }
        stake.transfer(&self.address, voter, payout)?;
        if reward > 0 {
            rewards.transfer(&self.address, voter, reward)?;
        }
        Ok(())
    }

    /// Pay the caller's vested share of the loan reward to `beneficiary`
    pub fn claim(&self, caller: &Address, loan: &Address, beneficiary: &Address) -> Result<u128> {
        let token = self.loan(loan)?;
        if token.start().is_none() {
            return Err(TrueFiError::NotFunded { loan: *loan });
        }

        let mut state = self.state.write();
        let rating = state
            .ratings
            .get_mut(loan)
            .ok_or(TrueFiError::UnknownLoan(*loan))?;
        self.allocate_reward(rating, loan, &token)?;

        let snapshot = rating.clone();
        let amount = self.accrue_claim(rating, &token, caller)?;
        if amount == 0 {
            return Ok(0);
        }
        let outcome = self
            .collaborators
            .reward_token
            .transfer(&self.address, beneficiary, amount);
        if let Err(err) = outcome {
            *rating = snapshot;
            return Err(err);
        }
        drop(state);

        debug!(loan = %loan.short(), voter = %caller.short(), amount, "reward claimed");
        self.events.publish(ProtocolEvent::RewardClaimed {
            loan: *loan,
            voter: *caller,
            beneficiary: *beneficiary,
            amount,
        });
        Ok(amount)
    }

    /// Reward currently claimable by `voter`
    pub fn claimable(&self, loan: &Address, voter: &Address) -> Result<u128> {
        let token = self.loan(loan)?;
        if token.start().is_none() {
            return Ok(0);
        }
        let state = self.state.read();
        let rating = match state.ratings.get(loan) {
            Some(rating) => rating,
            None => return Ok(0),
        };
        let reward = match rating.reward {
            Some(reward) => reward,
            None => self.total_reward(&token)?,
        };
        self.voter_share(rating, &token, voter, reward)
    }

    /// Fix the loan reward and pull it from the distributor, once per loan
    fn allocate_reward(&self, rating: &mut LoanRating, loan: &Address, token: &LoanToken) -> Result<u128> {
        if let Some(reward) = rating.reward {
            return Ok(reward);
        }
        let reward = self.total_reward(token)?;
        if reward > 0 {
            self.collaborators.distributor.distribute(&self.address, reward)?;
        }
        rating.reward = Some(reward);

        debug!(loan = %loan.short(), reward, "rating reward allocated");
        self.events.publish(ProtocolEvent::RewardAllocated { loan: *loan, reward });
        Ok(reward)
    }

    /// Book the voter's vested, unclaimed reward as claimed
    fn accrue_claim(&self, rating: &mut LoanRating, token: &LoanToken, voter: &Address) -> Result<u128> {
        let reward = rating.reward.unwrap_or_default();
        let amount = self.voter_share(rating, token, voter, reward)?;
        if amount > 0 {
            let claimed = rating.claimed.get(voter).copied().unwrap_or(0);
            rating.claimed.insert(*voter, math::add(claimed, amount)?);
        }
        Ok(amount)
    }

    /// Loan interest priced into reward tokens, capped by the distributor
    fn total_reward(&self, token: &LoanToken) -> Result<u128> {
        let interest = token.interest();
        if interest == 0 {
            return Ok(0);
        }
        let price = self
            .collaborators
            .price_oracle
            .latest_price(&self.collaborators.stake_asset)?;

        let interest_usd = math::to_normalized(interest, token.currency().decimals())?;
        let in_stake = math::mul_div(interest_usd, math::pow10(price.decimals)?, price.value)?;
        let in_stake = math::from_normalized(in_stake, self.collaborators.stake_token.decimals())?;

        let multiplier = self.config.read().reward_multiplier;
        let uncapped = in_stake.saturating_mul(multiplier);
        Ok(uncapped.min(self.collaborators.distributor.remaining()?))
    }

    fn voter_share(&self, rating: &LoanRating, token: &LoanToken, voter: &Address, reward: u128) -> Result<u128> {
        let total_votes = math::add(rating.yes_total, rating.no_total)?;
        if total_votes == 0 {
            return Ok(0);
        }

        let vested = if token.status().is_closed() {
            reward
        } else {
            let start = token.start().unwrap_or_default();
            let passed = self.clock.now().saturating_sub(start).min(token.term());
            math::mul_div(reward, passed as u128, token.term() as u128)?
        };

        let share = math::mul_div(vested, rating.vote(voter).amount(), total_votes)?;
        let claimed = rating.claimed.get(voter).copied().unwrap_or(0);
        Ok(share.saturating_sub(claimed))
    }
}

fn same_ledger(a: &Arc<dyn TokenLedger>, b: &Arc<dyn TokenLedger>) -> bool {
    Arc::as_ptr(a) as *const u8 == Arc::as_ptr(b) as *const u8
}

fn ensure_held(ledger: &dyn TokenLedger, holder: &Address, required: u128) -> Result<()> {
    let available = ledger.balance_of(holder);
    if available < required {
        return Err(TrueFiError::InsufficientBalance { required, available });
    }
    Ok(())
}

/// `loser_total * loss_factor * burn_factor / 10000^2`
pub fn redistributable(loser_total: u128, loss_factor: u128, burn_factor: u128) -> Result<u128> {
    let lost = math::basis_points(loser_total, loss_factor)?;
    Ok(math::basis_points(lost, burn_factor)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use truefi_common::memory::InMemoryToken;
    use truefi_loans::{LoanSettings, PoolRegistry, ReservePool};
    use truefi_common::{LiquidityPool, ManualClock, Price, YEAR};

    use crate::distributor::LinearDistributor;

    const TRU: u128 = 100_000_000;

    struct Fixture {
        clock: Arc<ManualClock>,
        tru: Arc<InMemoryToken>,
        agency: RatingAgency,
        factory: Arc<LoanFactory>,
        pool: Address,
        borrower: Address,
        owner: Address,
        minter: Address,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let events = Arc::new(EventBus::silent(clock.clone()));
        let owner = Address::from_label("owner");
        let minter = Address::from_label("minter");
        let lender = Address::from_label("lender");

        let usd = Arc::new(InMemoryToken::new("TUSD", 18).with_minter(minter));
        let tru = Arc::new(InMemoryToken::new("TRU", 8).with_minter(minter));

        let registry = Arc::new(PoolRegistry::new(owner, events.clone()));
        let pool = Arc::new(ReservePool::new(Address::from_label("pool"), usd, lender));
        let pool_address = pool.address();
        registry.register(&owner, pool).unwrap();
        let factory = Arc::new(
            LoanFactory::new(
                Address::from_label("factory"),
                lender,
                lender,
                LoanSettings::default(),
                registry,
                clock.clone(),
                events.clone(),
            )
            .unwrap(),
        );

        let distributor_address = Address::from_label("distributor");
        tru.mint(&minter, &distributor_address, 1_000_000 * TRU).unwrap();
        let distributor = Arc::new(
            LinearDistributor::new(
                distributor_address,
                tru.clone(),
                1_000_000 * TRU,
                0,
                10 * YEAR,
                clock.clone(),
            )
            .unwrap(),
        );

        let prices = Arc::new(truefi_common::memory::StaticPriceOracle::new());
        let tru_asset = Address::from_label("TRU");
        prices.set_price(tru_asset, Price::new(25_000_000, 8));

        let agency = RatingAgency::new(
            Address::from_label("rating"),
            owner,
            RatingConfig::default(),
            RatingCollaborators {
                factory: factory.clone(),
                stake_token: tru.clone(),
                stake_asset: tru_asset,
                reward_token: tru.clone(),
                distributor,
                price_oracle: prices,
            },
            clock.clone(),
            events,
        )
        .unwrap();

        Fixture {
            clock,
            tru,
            agency,
            factory,
            pool: pool_address,
            borrower: Address::from_label("borrower"),
            owner,
            minter,
        }
    }

    fn voter(f: &Fixture, label: &str, stake: u128) -> Address {
        let voter = Address::from_label(label);
        f.tru.mint(&f.minter, &voter, stake).unwrap();
        f.tru.approve(&voter, &f.agency.address(), stake).unwrap();
        voter
    }

    fn submitted_loan(f: &Fixture) -> Arc<LoanToken> {
        let loan = f
            .factory
            .create_loan(&f.borrower, &f.pool, 1000 * 10u128.pow(18), YEAR, 1000)
            .unwrap();
        f.agency.submit(&f.borrower, &loan.address()).unwrap();
        loan
    }

    #[test]
    fn test_submit_rules() {
        let f = fixture();
        let loan = f
            .factory
            .create_loan(&f.borrower, &f.pool, 1000, YEAR, 1000)
            .unwrap();
        let id = loan.address();

        assert_eq!(f.agency.status(&id).unwrap(), RatingStatus::Void);
        assert_eq!(
            f.agency.submit(&f.owner, &id).unwrap_err().code(),
            "UNAUTHORIZED"
        );
        assert_eq!(
            f.agency.submit(&f.borrower, &Address::from_label("forged")).unwrap_err().code(),
            "UNKNOWN_LOAN"
        );

        f.agency.pause_submissions(&f.owner, true).unwrap();
        assert_eq!(f.agency.submit(&f.borrower, &id).unwrap_err().code(), "SUBMISSIONS_PAUSED");
        f.agency.pause_submissions(&f.owner, false).unwrap();

        f.agency.submit(&f.borrower, &id).unwrap();
        assert_eq!(f.agency.status(&id).unwrap(), RatingStatus::Pending);
        assert_eq!(f.agency.submit(&f.borrower, &id).unwrap_err().code(), "INVALID_STATE");
    }

    #[test]
    fn test_conflicting_vote() {
        let f = fixture();
        let loan = submitted_loan(&f);
        let alice = voter(&f, "alice", 2000 * TRU);

        f.agency.yes(&alice, &loan.address(), 1000 * TRU).unwrap();
        assert_eq!(
            f.agency.no(&alice, &loan.address(), 1000 * TRU).unwrap_err(),
            TrueFiError::ConflictingVote { voter: alice }
        );
        f.agency.yes(&alice, &loan.address(), 500 * TRU).unwrap();
        assert_eq!(f.agency.vote_of(&loan.address(), &alice), Vote::Yes(1500 * TRU));
    }

    #[test]
    fn test_pending_withdraw_then_revote_round_trips() {
        let f = fixture();
        let loan = submitted_loan(&f);
        let id = loan.address();
        let alice = voter(&f, "alice", 1000 * TRU);

        f.agency.yes(&alice, &id, 1000 * TRU).unwrap();
        let before = f.agency.results(&id).unwrap();

        assert_eq!(f.agency.withdraw(&alice, &id, 400 * TRU).unwrap(), 400 * TRU);
        f.tru.approve(&alice, &f.agency.address(), 400 * TRU).unwrap();
        f.agency.yes(&alice, &id, 400 * TRU).unwrap();
        assert_eq!(f.agency.results(&id).unwrap(), before);

        assert_eq!(
            f.agency.withdraw(&alice, &id, 1001 * TRU).unwrap_err().code(),
            "INSUFFICIENT_STAKE"
        );
    }

    #[test]
    fn test_failed_stake_transfer_rolls_back_vote() {
        let f = fixture();
        let loan = submitted_loan(&f);
        let poor = Address::from_label("poor");

        assert!(f.agency.yes(&poor, &loan.address(), 10).is_err());
        assert_eq!(f.agency.vote_of(&loan.address(), &poor), Vote::None);
        assert_eq!(f.agency.results(&loan.address()).unwrap().2, 0);
    }

    #[test]
    fn test_retract() {
        let f = fixture();
        let loan = submitted_loan(&f);
        let id = loan.address();
        let alice = voter(&f, "alice", 1000 * TRU);
        f.agency.no(&alice, &id, 1000 * TRU).unwrap();

        assert_eq!(f.agency.retract(&alice, &id).unwrap_err().code(), "UNAUTHORIZED");
        f.agency.retract(&f.borrower, &id).unwrap();
        assert_eq!(f.agency.status(&id).unwrap(), RatingStatus::Retracted);
        assert_eq!(f.agency.results(&id).unwrap().1, 0);

        // principal survives retraction
        assert_eq!(f.agency.vote_of(&id, &alice), Vote::No(1000 * TRU));
        assert_eq!(f.agency.yes(&alice, &id, 1).unwrap_err().code(), "INVALID_STATE");
        assert_eq!(f.agency.no(&alice, &id, 1).unwrap_err().code(), "INVALID_STATE");
        assert_eq!(f.agency.withdraw(&alice, &id, 1000 * TRU).unwrap(), 1000 * TRU);
        assert_eq!(f.agency.submit(&f.borrower, &id).unwrap_err().code(), "INVALID_STATE");
    }

    #[test]
    fn test_claim_requires_funding() {
        let f = fixture();
        let loan = submitted_loan(&f);
        let alice = voter(&f, "alice", 1000 * TRU);
        f.agency.yes(&alice, &loan.address(), 1000 * TRU).unwrap();

        assert_eq!(
            f.agency.claim(&alice, &loan.address(), &alice).unwrap_err().code(),
            "NOT_FUNDED"
        );
        assert_eq!(f.agency.claimable(&loan.address(), &alice).unwrap(), 0);
    }

    #[test]
    fn test_setters() {
        let f = fixture();
        let stranger = Address::from_label("stranger");
        assert_eq!(f.agency.set_loss_factor(&stranger, 1).unwrap_err().code(), "UNAUTHORIZED");
        assert_eq!(
            f.agency.set_burn_factor(&f.owner, 10_001).unwrap_err().code(),
            "INVALID_ARGUMENT"
        );
        f.agency.set_reward_multiplier(&f.owner, 3).unwrap();
        assert_eq!(f.agency.config().reward_multiplier, 3);
    }

    #[test]
    fn test_redistributable() {
        assert_eq!(redistributable(1000 * TRU, 2500, 7500).unwrap(), 18_750_000_000);
        assert_eq!(redistributable(0, 2500, 7500).unwrap(), 0);
    }
}
