//! Offline rate and limit quotes
//!
//! A [`QuoteScenario`] describes a pool, its base rate history and a
//! prospective borrower. [`quote`] replays the base rates through a
//! time-averaged oracle, one cooldown apart, and evaluates the credit model
//! the way the lending agency does at funding time.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use truefi_common::math::{self, BASIS_POINTS};
use truefi_common::memory::{InMemoryToken, StaticPriceOracle};
use truefi_common::{
    Address, EventBus, LiquidityPool, ManualClock, Price, Result, TokenLedger, TrueFiError,
};
use truefi_credit::{combined_rate, CollateralAsset, CreditModel, RateQuote, TimeAveragedRateOracle};

use crate::config::EngineConfig;

fn default_decimals() -> u8 {
    18
}

fn default_stake_decimals() -> u8 {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteScenario {
    #[serde(default = "default_decimals")]
    pub pool_decimals: u8,
    /// Pool value and its liquid part, pool decimals
    pub pool_value: u128,
    pub liquid_value: u128,
    /// TVL across pools, 18-decimal; the pool value alone when absent
    #[serde(default)]
    pub total_tvl: Option<u128>,
    /// Spot base rates in chronological order, one per oracle cooldown
    pub base_rates: Vec<u128>,
    pub score: u8,
    /// Staked collateral, stake token decimals
    #[serde(default)]
    pub staked: u128,
    #[serde(default = "default_stake_decimals")]
    pub stake_decimals: u8,
    #[serde(default)]
    pub stake_price: Option<Price>,
    /// Already borrowed, 18-decimal
    #[serde(default)]
    pub borrowed: u128,
    /// Requested amount, pool decimals
    pub amount: u128,
    /// Seconds
    pub term: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteReport {
    pub effective_score: u8,
    pub rate: RateQuote,
    pub fixed_term_adjustment: u128,
    /// Lowest apy a fixed-term loan would be funded at
    pub required_rate: u128,
    /// Remaining credit, 18-decimal
    pub borrow_limit: u128,
    pub borrow_limit_display: Decimal,
    pub over_limit: bool,
}

/// Read-only pool standing in for a live one
struct ScenarioPool {
    address: Address,
    currency: Arc<dyn TokenLedger>,
    value: u128,
    liquid: u128,
}

impl LiquidityPool for ScenarioPool {
    fn address(&self) -> Address {
        self.address
    }

    fn currency(&self) -> Arc<dyn TokenLedger> {
        self.currency.clone()
    }

    fn pool_value(&self) -> Result<u128> {
        Ok(self.value)
    }

    fn liquid_ratio(&self, hypothetical_withdrawal: u128) -> Result<u128> {
        if self.value == 0 {
            return Ok(BASIS_POINTS);
        }
        let liquid = self.liquid.saturating_sub(hypothetical_withdrawal);
        Ok(math::mul_div(liquid, BASIS_POINTS, self.value)?)
    }

    fn borrow(&self, _recipient: &Address, _amount: u128) -> Result<()> {
        Err(TrueFiError::invalid_state("borrow", "quote pool"))
    }

    fn repay(&self, _payer: &Address, _amount: u128) -> Result<()> {
        Err(TrueFiError::invalid_state("repay", "quote pool"))
    }
}

/// Evaluate `scenario` under `config`
pub fn quote(config: &EngineConfig, scenario: &QuoteScenario) -> Result<QuoteReport> {
    if scenario.base_rates.is_empty() {
        return Err(TrueFiError::InvalidArgument("at least one base rate is required".to_string()));
    }
    if scenario.liquid_value > scenario.pool_value {
        return Err(TrueFiError::InvalidArgument(format!(
            "liquid value {} exceeds pool value {}",
            scenario.liquid_value, scenario.pool_value
        )));
    }

    let clock = Arc::new(ManualClock::new(0));
    let events = Arc::new(EventBus::silent(clock.clone()));
    let admin = Address::from_label("quote/admin");
    let base_asset = Address::from_label("quote/base-rate");
    let stake_asset = Address::from_label("quote/stake");

    let prices = Arc::new(StaticPriceOracle::new());
    if let Some(price) = scenario.stake_price {
        prices.set_price(stake_asset, price);
    }

    let oracle = Arc::new(TimeAveragedRateOracle::new(
        base_asset,
        prices.clone(),
        clock.clone(),
        events.clone(),
        config.oracle.clone(),
    )?);
    for rate in &scenario.base_rates {
        clock.advance(config.oracle.cooldown_time.max(1));
        prices.set_spot_rate(base_asset, *rate);
        oracle.update()?;
    }

    let pool = Arc::new(ScenarioPool {
        address: Address::from_label("quote/pool"),
        currency: Arc::new(InMemoryToken::new("QUOTE", scenario.pool_decimals)),
        value: scenario.pool_value,
        liquid: scenario.liquid_value,
    });

    let model = CreditModel::new(
        admin,
        config.credit.clone(),
        prices,
        CollateralAsset {
            address: stake_asset,
            decimals: scenario.stake_decimals,
        },
        events,
    )?;
    // the weekly window when the history is long enough, the whole history otherwise
    let window = (oracle.recorded() as usize - 1).min(7);
    let secured_rate = oracle.calculate_average_apy(window)?;
    model.set_base_rate_oracle(&admin, pool.address(), Arc::new(FixedBaseRate(secured_rate)))?;

    let amount_normalized = math::to_normalized(scenario.amount, scenario.pool_decimals)?;
    let pro_forma = math::add(scenario.borrowed, amount_normalized)?;
    let effective_score = model.effective_score(scenario.score, scenario.staked, pro_forma)?;

    let rate = model.quote(pool.as_ref(), effective_score, scenario.amount)?;
    let fixed_term_adjustment = model.fixed_term_loan_adjustment(scenario.term);
    let required_rate = combined_rate(rate.rate, fixed_term_adjustment);

    let total_tvl = match scenario.total_tvl {
        Some(tvl) => tvl,
        None => math::to_normalized(scenario.pool_value, scenario.pool_decimals)?,
    };
    let borrow_limit = model.borrow_limit(
        pool.as_ref(),
        scenario.score,
        total_tvl,
        scenario.staked,
        scenario.borrowed,
    )?;

    debug!(effective_score, required_rate, borrow_limit, "scenario quoted");
    Ok(QuoteReport {
        effective_score,
        rate,
        fixed_term_adjustment,
        required_rate,
        borrow_limit,
        borrow_limit_display: math::to_decimal(borrow_limit, 18)?,
        over_limit: amount_normalized > borrow_limit,
    })
}

/// Secured rate already averaged from the replayed history
struct FixedBaseRate(u128);

impl truefi_credit::BaseRateOracle for FixedBaseRate {
    fn weekly_apy(&self) -> Result<u128> {
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use truefi_common::YEAR;

    const UNIT: u128 = 1_000_000_000_000_000_000;

    fn scenario() -> QuoteScenario {
        QuoteScenario {
            pool_decimals: 18,
            pool_value: 10_000_000 * UNIT,
            liquid_value: 10_000_000 * UNIT,
            total_tvl: None,
            base_rates: vec![100, 200],
            score: 191,
            staked: 0,
            stake_decimals: 8,
            stake_price: None,
            borrowed: 0,
            amount: 100_000 * UNIT,
            term: YEAR,
        }
    }

    #[test]
    fn test_quote_scenario() {
        let report = quote(&EngineConfig::default(), &scenario()).unwrap();

        assert_eq!(report.rate.secured_rate, 150);
        assert_eq!(report.rate.risk_premium, 200);
        // 1000 * 255 / 191 - 1000
        assert_eq!(report.rate.credit_score_adjustment, 335);
        assert_eq!(report.fixed_term_adjustment, 300);
        assert_eq!(report.effective_score, 191);
        assert_eq!(report.borrow_limit_display, dec!(1207650));
        assert!(!report.over_limit);
        assert_eq!(
            report.required_rate,
            report.rate.rate + report.fixed_term_adjustment
        );
    }

    #[test]
    fn test_quote_from_json() {
        let json = r#"{
            "pool_value": 1000000000000000000000,
            "liquid_value": 500000000000000000000,
            "base_rates": [300],
            "score": 255,
            "amount": 100000000000000000000,
            "term": 2592000
        }"#;
        let scenario: QuoteScenario = serde_json::from_str(json).unwrap();
        let report = quote(&EngineConfig::default(), &scenario).unwrap();

        assert_eq!(report.rate.secured_rate, 300);
        assert_eq!(report.rate.credit_score_adjustment, 0);
        // 40% liquid after the loan: 50 * 6000^2 / 4000^2
        assert_eq!(report.rate.utilization_adjustment, 112);
        assert_eq!(report.fixed_term_adjustment, 25);
    }

    #[test]
    fn test_quote_rejects_bad_scenarios() {
        let mut bad = scenario();
        bad.base_rates.clear();
        assert_eq!(
            quote(&EngineConfig::default(), &bad).unwrap_err().code(),
            "INVALID_ARGUMENT"
        );

        let mut bad = scenario();
        bad.liquid_value = bad.pool_value + 1;
        assert!(quote(&EngineConfig::default(), &bad).is_err());
    }
}
