//! CreditModel service
//!
//! Owns the live [`CreditModelConfig`] and the per-pool base rate oracles,
//! and evaluates the curves against live pool and oracle data. Parameter
//! changes go through [`CreditModel::update_config`], which checks the
//! administrator, validates the result and publishes `ConfigChanged`.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use truefi_common::math;
use truefi_common::{
    Address, EventBus, LiquidityPool, PriceOracle, ProtocolEvent, Result, TrueFiError,
};

use crate::config::{
    BorrowLimitConfig, CreditModelConfig, CreditScoreRateConfig, StakingConfig,
    UtilizationRateConfig,
};
use crate::curves::{self, LimitInputs};
use crate::oracle::BaseRateOracle;

/// Token borrowers stake as collateral
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralAsset {
    pub address: Address,
    pub decimals: u8,
}

/// Rate broken into its components, all bp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateQuote {
    pub secured_rate: u128,
    pub risk_premium: u128,
    pub credit_score_adjustment: u128,
    pub utilization_adjustment: u128,
    pub rate: u128,
}

pub struct CreditModel {
    admin: Address,
    config: RwLock<CreditModelConfig>,
    base_rate_oracles: RwLock<HashMap<Address, Arc<dyn BaseRateOracle>>>,
    price_oracle: Arc<dyn PriceOracle>,
    collateral: CollateralAsset,
    events: Arc<EventBus>,
}

impl CreditModel {
    pub fn new(
        admin: Address,
        config: CreditModelConfig,
        price_oracle: Arc<dyn PriceOracle>,
        collateral: CollateralAsset,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            admin,
            config: RwLock::new(config),
            base_rate_oracles: RwLock::new(HashMap::new()),
            price_oracle,
            collateral,
            events,
        })
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    /// Snapshot of the current parameters
    pub fn config(&self) -> CreditModelConfig {
        self.config.read().clone()
    }

    pub fn collateral(&self) -> CollateralAsset {
        self.collateral
    }

    fn ensure_admin(&self, caller: &Address) -> Result<()> {
        if *caller != self.admin {
            return Err(TrueFiError::unauthorized(caller, "credit model admin"));
        }
        Ok(())
    }

    /// Single mutation entry point for every parameter
    ///
    /// The change is applied to a copy, validated and only then stored.
    pub fn update_config<F>(&self, caller: &Address, setting: &str, value: String, apply: F) -> Result<()>
    where
        F: FnOnce(&mut CreditModelConfig),
    {
        self.ensure_admin(caller)?;

        let mut config = self.config.write();
        let mut next = config.clone();
        apply(&mut next);
        next.validate()?;
        *config = next;
        drop(config);

        info!(setting, value = %value, "credit model parameter changed");
        self.events
            .publish(ProtocolEvent::config_changed("CreditModel", setting, value));
        Ok(())
    }

    pub fn set_risk_premium(&self, caller: &Address, risk_premium: u128) -> Result<()> {
        self.update_config(caller, "risk_premium", risk_premium.to_string(), |c| {
            c.risk_premium = risk_premium
        })
    }

    pub fn set_credit_score_rate_config(&self, caller: &Address, coefficient: u128, power: u32) -> Result<()> {
        self.update_config(
            caller,
            "credit_score_rate",
            format!("coefficient={} power={}", coefficient, power),
            |c| c.credit_score_rate = CreditScoreRateConfig { coefficient, power },
        )
    }

    pub fn set_utilization_rate_config(&self, caller: &Address, coefficient: u128, power: u32) -> Result<()> {
        self.update_config(
            caller,
            "utilization_rate",
            format!("coefficient={} power={}", coefficient, power),
            |c| c.utilization_rate = UtilizationRateConfig { coefficient, power },
        )
    }

    pub fn set_borrow_limit_config(&self, caller: &Address, limits: BorrowLimitConfig) -> Result<()> {
        self.update_config(
            caller,
            "borrow_limit",
            format!(
                "score_floor={} limit_adjustment_power={} tvl_limit_coefficient={} pool_value_limit_coefficient={}",
                limits.score_floor,
                limits.limit_adjustment_power,
                limits.tvl_limit_coefficient,
                limits.pool_value_limit_coefficient
            ),
            |c| c.borrow_limit = limits,
        )
    }

    pub fn set_staking_config(&self, caller: &Address, staking: StakingConfig) -> Result<()> {
        self.update_config(
            caller,
            "staking",
            format!(
                "ltv_ratio={} effective_score_power={}",
                staking.ltv_ratio, staking.effective_score_power
            ),
            |c| c.staking = staking,
        )
    }

    pub fn set_fixed_term_loan_adjustment_coefficient(&self, caller: &Address, coefficient: u128) -> Result<()> {
        self.update_config(
            caller,
            "fixed_term_loan_adjustment_coefficient",
            coefficient.to_string(),
            |c| c.fixed_term_loan_adjustment_coefficient = coefficient,
        )
    }

    /// Attach the base rate oracle used as the secured rate of `pool`
    pub fn set_base_rate_oracle(
        &self,
        caller: &Address,
        pool: Address,
        oracle: Arc<dyn BaseRateOracle>,
    ) -> Result<()> {
        self.ensure_admin(caller)?;
        self.base_rate_oracles.write().insert(pool, oracle);

        info!(pool = %pool.short(), "base rate oracle set");
        self.events.publish(ProtocolEvent::config_changed(
            "CreditModel",
            "base_rate_oracle",
            pool,
        ));
        Ok(())
    }

    /// Weekly average base rate of the pool's oracle
    pub fn secured_rate(&self, pool: &dyn LiquidityPool) -> Result<u128> {
        let address = pool.address();
        let oracle = self
            .base_rate_oracles
            .read()
            .get(&address)
            .cloned()
            .ok_or(TrueFiError::UnknownPool(address))?;
        oracle.weekly_apy()
    }

    pub fn credit_score_adjustment_rate(&self, score: u8) -> Result<u128> {
        curves::credit_score_adjustment_rate(&self.config.read().credit_score_rate, score)
    }

    /// Utilization premium once `pro_forma_amount` has left the pool
    pub fn utilization_adjustment_rate(&self, pool: &dyn LiquidityPool, pro_forma_amount: u128) -> Result<u128> {
        let liquid_ratio = pool.liquid_ratio(pro_forma_amount)?;
        curves::utilization_adjustment_rate(&self.config.read().utilization_rate, liquid_ratio)
    }

    pub fn fixed_term_loan_adjustment(&self, term: u64) -> u128 {
        curves::fixed_term_loan_adjustment(
            self.config.read().fixed_term_loan_adjustment_coefficient,
            term,
        )
    }

    pub fn borrow_limit_adjustment(&self, score: u8) -> Result<u128> {
        curves::borrow_limit_adjustment(&self.config.read().borrow_limit, score)
    }

    /// Full rate breakdown for a borrower in `pool`
    #[instrument(skip(self, pool), fields(pool = %pool.address().short()))]
    pub fn quote(&self, pool: &dyn LiquidityPool, score: u8, pro_forma_amount: u128) -> Result<RateQuote> {
        let secured_rate = self.secured_rate(pool)?;
        let config = self.config();
        let liquid_ratio = pool.liquid_ratio(pro_forma_amount)?;

        let credit_score_adjustment =
            curves::credit_score_adjustment_rate(&config.credit_score_rate, score)?;
        let utilization_adjustment =
            curves::utilization_adjustment_rate(&config.utilization_rate, liquid_ratio)?;
        let rate = curves::total_rate(&[
            secured_rate,
            config.risk_premium,
            credit_score_adjustment,
            utilization_adjustment,
        ]);

        debug!(secured_rate, credit_score_adjustment, utilization_adjustment, rate, "rate quoted");
        Ok(RateQuote {
            secured_rate,
            risk_premium: config.risk_premium,
            credit_score_adjustment,
            utilization_adjustment,
            rate,
        })
    }

    /// Borrow rate in bp, never above `MAX_RATE`
    pub fn rate(&self, pool: &dyn LiquidityPool, score: u8, pro_forma_amount: u128) -> Result<u128> {
        Ok(self.quote(pool, score, pro_forma_amount)?.rate)
    }

    /// Rate components that do not depend on the borrower
    pub fn pool_basic_rate(&self, pool: &dyn LiquidityPool, pro_forma_amount: u128) -> Result<u128> {
        let secured_rate = self.secured_rate(pool)?;
        let risk_premium = self.config.read().risk_premium;
        let utilization = self.utilization_adjustment_rate(pool, pro_forma_amount)?;
        Ok(curves::total_rate(&[secured_rate, risk_premium, utilization]))
    }

    /// 18-decimal USD value of staked collateral after the LTV haircut
    pub fn conservative_collateral_value(&self, staked: u128) -> Result<u128> {
        if staked == 0 {
            return Ok(0);
        }
        let price = self.price_oracle.latest_price(&self.collateral.address)?;
        curves::conservative_collateral_value(
            &self.config.read().staking,
            staked,
            self.collateral.decimals,
            price,
        )
    }

    /// Score raised by the collateral coverage of `borrowed` (18-decimal)
    pub fn effective_score(&self, score: u8, staked: u128, borrowed: u128) -> Result<u8> {
        let collateral_value = self.conservative_collateral_value(staked)?;
        curves::effective_score(&self.config.read().staking, score, collateral_value, borrowed)
    }

    /// Remaining credit for a borrower, 18-decimal
    ///
    /// `total_tvl` and `borrowed` are already normalized; the pool value is
    /// normalized here from `pool.decimals()`.
    pub fn borrow_limit(
        &self,
        pool: &dyn LiquidityPool,
        score: u8,
        total_tvl: u128,
        staked: u128,
        borrowed: u128,
    ) -> Result<u128> {
        let config = self.config();
        if score < config.borrow_limit.score_floor {
            return Ok(0);
        }

        let pool_value = math::to_normalized(pool.pool_value()?, pool.decimals())?;
        let inputs = LimitInputs {
            score,
            pool_value,
            total_tvl,
            collateral_value: self.conservative_collateral_value(staked)?,
            borrowed,
        };
        curves::borrow_limit(&config, &inputs)
    }

    /// Whether borrowing `amount` (pool decimals) on top of `borrowed` (18-decimal) exceeds the limit
    pub fn is_over_limit(
        &self,
        pool: &dyn LiquidityPool,
        score: u8,
        total_tvl: u128,
        staked: u128,
        amount: u128,
        borrowed: u128,
    ) -> Result<bool> {
        let normalized = math::to_normalized(amount, pool.decimals())?;
        Ok(normalized > self.borrow_limit(pool, score, total_tvl, staked, borrowed)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use truefi_common::memory::{InMemoryToken, StaticPriceOracle};
    use truefi_common::{EventLog, ManualClock, Price, TokenLedger, MAX_RATE};

    struct FixedRate(u128);

    impl BaseRateOracle for FixedRate {
        fn weekly_apy(&self) -> Result<u128> {
            Ok(self.0)
        }
    }

    struct FakePool {
        address: Address,
        token: Arc<InMemoryToken>,
        value: u128,
        liquid: u128,
    }

    impl LiquidityPool for FakePool {
        fn address(&self) -> Address {
            self.address
        }
        fn currency(&self) -> Arc<dyn TokenLedger> {
            self.token.clone()
        }
        fn pool_value(&self) -> Result<u128> {
            Ok(self.value)
        }
        fn liquid_ratio(&self, _hypothetical_withdrawal: u128) -> Result<u128> {
            Ok(self.liquid)
        }
        fn borrow(&self, _recipient: &Address, _amount: u128) -> Result<()> {
            Ok(())
        }
        fn repay(&self, _payer: &Address, _amount: u128) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        admin: Address,
        model: CreditModel,
        pool: FakePool,
        prices: Arc<StaticPriceOracle>,
        log: Arc<EventLog>,
    }

    fn fixture() -> Fixture {
        let admin = Address::from_label("admin");
        let clock = Arc::new(ManualClock::new(0));
        let events = Arc::new(EventBus::silent(clock));
        let log = Arc::new(EventLog::new());
        events.add_sink(log.clone());

        let prices = Arc::new(StaticPriceOracle::new());
        let tru = CollateralAsset {
            address: Address::from_label("TRU"),
            decimals: 8,
        };
        prices.set_price(tru.address, Price::new(25_000_000, 8));

        let model = CreditModel::new(admin, CreditModelConfig::default(), prices.clone(), tru, events)
            .unwrap();
        let pool = FakePool {
            address: Address::from_label("pool"),
            token: Arc::new(InMemoryToken::new("TUSD", 18)),
            value: 10_000_000,
            liquid: 5_000,
        };
        model
            .set_base_rate_oracle(&admin, pool.address, Arc::new(FixedRate(300)))
            .unwrap();

        Fixture {
            admin,
            model,
            pool,
            prices,
            log,
        }
    }

    #[test]
    fn test_rate_components() {
        let f = fixture();
        let quote = f.model.quote(&f.pool, 191, 1_000).unwrap();
        assert_eq!(quote.secured_rate, 300);
        assert_eq!(quote.risk_premium, 200);
        assert_eq!(quote.credit_score_adjustment, 335);
        assert_eq!(quote.utilization_adjustment, 50);
        assert_eq!(quote.rate, 885);
        assert_eq!(f.model.pool_basic_rate(&f.pool, 1_000).unwrap(), 550);
    }

    #[test]
    fn test_rate_is_capped_for_huge_premium() {
        let f = fixture();
        f.model.set_risk_premium(&f.admin, u128::MAX - 1).unwrap();
        assert_eq!(f.model.rate(&f.pool, 191, 0).unwrap(), MAX_RATE);
    }

    #[test]
    fn test_unknown_pool_has_no_secured_rate() {
        let f = fixture();
        let other = FakePool {
            address: Address::from_label("other"),
            ..f.pool
        };
        assert_eq!(f.model.rate(&other, 200, 0).unwrap_err().code(), "UNKNOWN_POOL");
    }

    #[test]
    fn test_setters_require_admin() {
        let f = fixture();
        let mallory = Address::from_label("mallory");
        assert_eq!(
            f.model.set_risk_premium(&mallory, 1).unwrap_err().code(),
            "UNAUTHORIZED"
        );
        assert_eq!(f.model.config().risk_premium, 200);
    }

    #[test]
    fn test_setters_emit_config_changed() {
        let f = fixture();
        f.model.set_utilization_rate_config(&f.admin, 100, 3).unwrap();
        f.model.set_fixed_term_loan_adjustment_coefficient(&f.admin, 30).unwrap();

        assert_eq!(f.model.config().utilization_rate.power, 3);
        assert_eq!(f.model.fixed_term_loan_adjustment(60 * truefi_common::DAY), 60);
        // oracle registration in the fixture counts too
        assert_eq!(f.log.count("ConfigChanged"), 3);
    }

    #[test]
    fn test_invalid_update_is_rejected_whole() {
        let f = fixture();
        let result = f.model.set_credit_score_rate_config(&f.admin, 2000, 12);
        assert_eq!(result.unwrap_err().code(), "INVALID_ARGUMENT");
        assert_eq!(f.model.config().credit_score_rate, CreditScoreRateConfig::default());
    }

    #[test]
    fn test_borrow_limit_with_collateral() {
        let f = fixture();
        let base = f.model.borrow_limit(&f.pool, 191, 10_000_000, 0, 0).unwrap();
        assert_eq!(base, 1_207_650);

        // even a dust stake lifts the limit up to the TVL cap
        let staked = 1_000;
        let collateral = f.model.conservative_collateral_value(staked).unwrap();
        assert_eq!(collateral, 1_000 * 10u128.pow(10) / 4 * 4 / 10);
        let limit = f.model.borrow_limit(&f.pool, 191, 10_000_000, staked, 0).unwrap();
        assert_eq!(limit, 1_500_000);
    }

    #[test]
    fn test_is_over_limit() {
        let f = fixture();
        assert!(!f.model.is_over_limit(&f.pool, 191, 10_000_000, 0, 1_207_650, 0).unwrap());
        assert!(f.model.is_over_limit(&f.pool, 191, 10_000_000, 0, 1_207_650, 1).unwrap());
        assert!(f.model.is_over_limit(&f.pool, 10, 10_000_000, 0, 1, 0).unwrap());
    }

    #[test]
    fn test_effective_score_uses_price() {
        let f = fixture();
        // 1000 TRU at $0.25 with 40% LTV covers $100
        let staked = 1_000 * 10u128.pow(8);
        let borrowed = 200 * 10u128.pow(18);
        assert_eq!(f.model.effective_score(100, staked, borrowed).unwrap(), 177);

        f.prices
            .set_price(f.model.collateral().address, Price::new(50_000_000, 8));
        assert_eq!(f.model.effective_score(100, staked, borrowed).unwrap(), 255);
    }
}
