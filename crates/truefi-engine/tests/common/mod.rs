//! Shared protocol fixture for the engine tests

#![allow(dead_code)]

use std::sync::Arc;

use truefi_common::memory::{InMemoryToken, ScoreBook, StakeBook, StaticPriceOracle};
use truefi_common::{Address, EventLog, LiquidityPool, ManualClock, Price, TokenLedger, DAY, YEAR};
use truefi_engine::{Engine, EngineAccounts, EngineCollaborators, EngineConfig};
use truefi_lending::{FeeSwapper, OracleSwapper};
use truefi_loans::{LoanToken, ReservePool};
use truefi_rating::LinearDistributor;

pub const TRU: u128 = 100_000_000;
pub const USD: u128 = 1_000_000_000_000_000_000;

pub struct Protocol {
    pub engine: Engine,
    pub clock: Arc<ManualClock>,
    pub usd: Arc<InMemoryToken>,
    pub tru: Arc<InMemoryToken>,
    pub scores: Arc<ScoreBook>,
    pub pool: Arc<ReservePool>,
    pub log: Arc<EventLog>,
    pub minter: Address,
}

impl Protocol {
    /// 10,000 TUSD pool with a 5% base rate and a TRU price of $0.25
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    pub fn with_config(adjust: impl FnOnce(&mut EngineConfig)) -> Self {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let minter = Address::from_label("minter");
        let owner = Address::from_label("owner");

        let usd = Arc::new(InMemoryToken::new("TUSD", 18).with_minter(minter));
        let tru = Arc::new(InMemoryToken::new("TRU", 8).with_minter(minter));
        let reward = Arc::new(InMemoryToken::new("TRU-REWARD", 8).with_minter(minter));

        let prices = Arc::new(StaticPriceOracle::new());
        let tru_asset = Address::from_label("TRU");
        let base_asset = Address::from_label("base-rate");
        prices.set_price(tru_asset, Price::new(25_000_000, 8));
        prices.set_spot_rate(base_asset, 500);

        let distributor_address = Address::from_label("distributor");
        reward.mint(&minter, &distributor_address, 1_000_000 * TRU).unwrap();
        let distributor = Arc::new(
            LinearDistributor::new(
                distributor_address,
                reward.clone(),
                1_000_000 * TRU,
                0,
                10 * YEAR,
                clock.clone(),
            )
            .unwrap(),
        );

        let swapper = Arc::new(OracleSwapper::new(
            Address::from_label("swapper"),
            tru.clone(),
            tru_asset,
            prices.clone(),
        ));
        tru.mint(&minter, &swapper.address(), 1000 * TRU).unwrap();

        let scores = Arc::new(ScoreBook::new());

        let mut config = EngineConfig::default();
        config.lending.min_votes = 1000 * TRU;
        config.lending.min_size = 100 * USD;
        config.lending.max_size = 5000 * USD;
        adjust(&mut config);

        let engine = Engine::bootstrap(
            config,
            EngineAccounts::from_owner(owner),
            EngineCollaborators {
                clock: clock.clone(),
                stake_token: tru.clone(),
                stake_asset: tru_asset,
                reward_token: reward,
                distributor,
                price_oracle: prices,
                credit_oracle: scores.clone(),
                staking: Arc::new(StakeBook::new()),
                swapper,
            },
        )
        .unwrap();

        let log = Arc::new(EventLog::new());
        engine.events.add_sink(log.clone());

        let pool = Arc::new(ReservePool::new(
            Address::from_label("pool"),
            usd.clone(),
            Engine::lending_address(),
        ));
        let provider = Address::from_label("provider");
        usd.mint(&minter, &provider, 10_000 * USD).unwrap();
        usd.approve(&provider, &pool.address(), 10_000 * USD).unwrap();
        pool.deposit(&provider, 10_000 * USD).unwrap();

        // a week of daily samples fills the weekly window
        let oracle = engine.rate_oracle(base_asset).unwrap();
        for _ in 0..7 {
            clock.advance(DAY);
            oracle.update().unwrap();
        }
        engine.add_pool(pool.clone(), oracle).unwrap();

        Self {
            engine,
            clock,
            usd,
            tru,
            scores,
            pool,
            log,
            minter,
        }
    }

    pub fn borrower(&self, label: &str, score: u8) -> Address {
        let borrower = Address::from_label(label);
        self.scores.set_score(borrower, score);
        borrower
    }

    pub fn voter(&self, label: &str, stake: u128) -> Address {
        let voter = Address::from_label(label);
        self.tru.mint(&self.minter, &voter, stake).unwrap();
        self.tru
            .approve(&voter, &Engine::rating_address(), stake)
            .unwrap();
        voter
    }

    /// Create and submit a loan, then cast `yes` and `no` stake on it
    pub fn rated_loan(&self, borrower: &Address, amount: u128, apy: u128, yes: u128, no: u128) -> Arc<LoanToken> {
        let loan = self
            .engine
            .factory
            .create_loan(borrower, &self.pool.address(), amount, YEAR, apy)
            .unwrap();
        let rating = &self.engine.rating;
        rating.submit(borrower, &loan.address()).unwrap();
        if yes > 0 {
            let voter = self.voter(&format!("yes-{}", loan.address().short()), yes);
            rating.yes(&voter, &loan.address(), yes).unwrap();
        }
        if no > 0 {
            let voter = self.voter(&format!("no-{}", loan.address().short()), no);
            rating.no(&voter, &loan.address(), no).unwrap();
        }
        loan
    }

    pub fn end_voting(&self) {
        self.clock.advance(self.engine.config.lending.voting_period);
    }

    /// Credible 1000 TUSD loan at 10%, funded and withdrawn
    pub fn funded_loan(&self, borrower: &Address) -> Arc<LoanToken> {
        let loan = self.rated_loan(borrower, 1000 * USD, 1000, 2000 * TRU, 0);
        self.end_voting();
        self.engine.lending.fund(borrower, &loan.address()).unwrap();
        loan.withdraw(borrower, borrower).unwrap();
        loan
    }

    pub fn repay_in_full(&self, borrower: &Address, loan: &LoanToken) {
        let debt = loan.debt();
        self.usd.mint(&self.minter, borrower, debt).unwrap();
        self.usd.approve(borrower, &loan.address(), debt).unwrap();
        loan.repay(borrower, debt).unwrap();
    }
}
