//! Rate and limit curves
//!
//! Pure functions over [`CreditModelConfig`]. Rates are basis points capped at
//! [`MAX_RATE`]; limits are 18-decimal fixed point amounts.

use truefi_common::math::{self, BASIS_POINTS};
use truefi_common::{ArithmeticError, Price, Result, DAY, MAX_CREDIT_SCORE, MAX_RATE};

use crate::config::{
    BorrowLimitConfig, CreditModelConfig, CreditScoreRateConfig, StakingConfig,
    UtilizationRateConfig,
};

/// Width of one fixed-term adjustment step
pub const FIXED_TERM_STEP: u64 = 30 * DAY;

const SCORE_SCALE: u128 = MAX_CREDIT_SCORE as u128;

/// `a * b / c`, saturating to `MAX_RATE` when the product overflows
fn capped_mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    match math::mul_div(a, b, c) {
        Ok(value) => Ok(value.min(MAX_RATE)),
        Err(ArithmeticError::Overflow) => Ok(MAX_RATE),
        Err(err) => Err(err.into()),
    }
}

/// Premium for a credit score; non-increasing in `score`
pub fn credit_score_adjustment_rate(config: &CreditScoreRateConfig, score: u8) -> Result<u128> {
    if score == 0 {
        return Ok(MAX_RATE);
    }
    if score == MAX_CREDIT_SCORE {
        return Ok(0);
    }

    let top = math::power(SCORE_SCALE, config.power)?;
    let bottom = math::power(score as u128, config.power)?;
    match math::mul_div(config.coefficient, top, bottom) {
        Ok(scaled) => Ok(scaled.saturating_sub(config.coefficient).min(MAX_RATE)),
        // overflow implies a value far beyond the cap for any score below 255
        Err(ArithmeticError::Overflow) => Ok(MAX_RATE),
        Err(err) => Err(err.into()),
    }
}

/// Premium for pool utilization after a withdrawal leaving `liquid_ratio` bp liquid
pub fn utilization_adjustment_rate(config: &UtilizationRateConfig, liquid_ratio: u128) -> Result<u128> {
    if liquid_ratio == 0 {
        return Ok(MAX_RATE);
    }
    let utilization = BASIS_POINTS.saturating_sub(liquid_ratio);
    if utilization == 0 {
        return Ok(0);
    }

    let numerator = math::power(utilization, config.power)?;
    let denominator = math::power(liquid_ratio, config.power)?;
    capped_mul_div(config.coefficient, numerator, denominator)
}

/// `min(a + b, MAX_RATE)`
pub fn combined_rate(a: u128, b: u128) -> u128 {
    a.saturating_add(b).min(MAX_RATE)
}

/// Coefficient per full 30-day period of the term
pub fn fixed_term_loan_adjustment(coefficient: u128, term: u64) -> u128 {
    coefficient.saturating_mul((term / FIXED_TERM_STEP) as u128)
}

/// Share of the pool-value cap granted to a score, in bp
pub fn borrow_limit_adjustment(config: &BorrowLimitConfig, score: u8) -> Result<u128> {
    Ok(math::fractional_power_bp(
        score as u128,
        SCORE_SCALE,
        config.limit_adjustment_power,
    )?)
}

/// Staked collateral in 18-decimal USD after the LTV haircut
pub fn conservative_collateral_value(
    config: &StakingConfig,
    staked: u128,
    stake_decimals: u8,
    price: Price,
) -> Result<u128> {
    if staked == 0 {
        return Ok(0);
    }
    let normalized = math::to_normalized(staked, stake_decimals)?;
    let usd = math::mul_div(normalized, price.value, math::pow10(price.decimals)?)?;
    Ok(math::basis_points(usd, config.ltv_ratio)?)
}

/// Raise `score` toward 255 by the collateral coverage of `borrowed`
pub fn effective_score(config: &StakingConfig, score: u8, collateral_value: u128, borrowed: u128) -> Result<u8> {
    let ratio = if borrowed == 0 {
        if collateral_value > 0 {
            BASIS_POINTS
        } else {
            0
        }
    } else {
        match math::mul_div(collateral_value, BASIS_POINTS, borrowed) {
            Ok(value) => value.min(BASIS_POINTS),
            Err(ArithmeticError::Overflow) => BASIS_POINTS,
            Err(err) => return Err(err.into()),
        }
    };

    let power = config.effective_score_power;
    let headroom = SCORE_SCALE - score as u128;
    let boost = math::mul_div(
        headroom,
        math::power(ratio, power)?,
        math::power(BASIS_POINTS, power)?,
    )?;
    Ok((score as u128 + boost).min(SCORE_SCALE) as u8)
}

/// Inputs of a borrow-limit computation, all 18-decimal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitInputs {
    pub score: u8,
    pub pool_value: u128,
    pub total_tvl: u128,
    pub collateral_value: u128,
    pub borrowed: u128,
}

/// Remaining credit for a borrower, floored at zero
pub fn borrow_limit(config: &CreditModelConfig, inputs: &LimitInputs) -> Result<u128> {
    let limits = &config.borrow_limit;
    if inputs.score < limits.score_floor {
        return Ok(0);
    }

    let pool_cap = math::basis_points(inputs.pool_value, limits.pool_value_limit_coefficient)?;
    let adjusted = math::basis_points(pool_cap, borrow_limit_adjustment(limits, inputs.score)?)?;
    let secured = adjusted.saturating_add(inputs.collateral_value);
    let tvl_cap = math::basis_points(inputs.total_tvl, limits.tvl_limit_coefficient)?;

    Ok(secured.min(tvl_cap).saturating_sub(inputs.borrowed))
}

/// Sum of the rate components, capped
pub fn total_rate(components: &[u128]) -> u128 {
    components
        .iter()
        .fold(0u128, |acc, c| acc.saturating_add(*c))
        .min(MAX_RATE)
}
