//! Credit model parameters
//!
//! All values are basis points unless noted. The defaults are the
//! production parameters of the protocol.

use serde::{Deserialize, Serialize};
use truefi_common::{Result, TrueFiError};

/// Highest exponent accepted for the polynomial curves
pub const MAX_CURVE_POWER: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditScoreRateConfig {
    pub coefficient: u128,
    pub power: u32,
}

impl Default for CreditScoreRateConfig {
    fn default() -> Self {
        Self {
            coefficient: 1000,
            power: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtilizationRateConfig {
    pub coefficient: u128,
    pub power: u32,
}

impl Default for UtilizationRateConfig {
    fn default() -> Self {
        Self {
            coefficient: 50,
            power: 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowLimitConfig {
    /// Scores below this floor get no credit at all
    pub score_floor: u8,
    /// Exponent of the limit curve, in bp (7500 = 0.75)
    pub limit_adjustment_power: u128,
    /// Share of total TVL a single borrower may take
    pub tvl_limit_coefficient: u128,
    /// Share of one pool's value a single borrower may take
    pub pool_value_limit_coefficient: u128,
}

impl Default for BorrowLimitConfig {
    fn default() -> Self {
        Self {
            score_floor: 40,
            limit_adjustment_power: 7500,
            tvl_limit_coefficient: 1500,
            pool_value_limit_coefficient: 1500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakingConfig {
    /// Loan-to-value applied to staked collateral
    pub ltv_ratio: u128,
    pub effective_score_power: u32,
}

impl Default for StakingConfig {
    fn default() -> Self {
        Self {
            ltv_ratio: 4000,
            effective_score_power: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditModelConfig {
    pub risk_premium: u128,
    pub credit_score_rate: CreditScoreRateConfig,
    pub utilization_rate: UtilizationRateConfig,
    /// Rate added per full 30 days of a fixed-term loan
    pub fixed_term_loan_adjustment_coefficient: u128,
    pub borrow_limit: BorrowLimitConfig,
    pub staking: StakingConfig,
}

impl Default for CreditModelConfig {
    fn default() -> Self {
        Self {
            risk_premium: 200,
            credit_score_rate: CreditScoreRateConfig::default(),
            utilization_rate: UtilizationRateConfig::default(),
            fixed_term_loan_adjustment_coefficient: 25,
            borrow_limit: BorrowLimitConfig::default(),
            staking: StakingConfig::default(),
        }
    }
}

impl CreditModelConfig {
    /// Reject parameters the curves cannot evaluate
    pub fn validate(&self) -> Result<()> {
        if self.credit_score_rate.power > MAX_CURVE_POWER {
            return Err(TrueFiError::InvalidArgument(format!(
                "credit score rate power {} exceeds {}",
                self.credit_score_rate.power, MAX_CURVE_POWER
            )));
        }
        if self.utilization_rate.power > MAX_CURVE_POWER {
            return Err(TrueFiError::InvalidArgument(format!(
                "utilization rate power {} exceeds {}",
                self.utilization_rate.power, MAX_CURVE_POWER
            )));
        }
        if self.staking.effective_score_power > MAX_CURVE_POWER {
            return Err(TrueFiError::InvalidArgument(format!(
                "effective score power {} exceeds {}",
                self.staking.effective_score_power, MAX_CURVE_POWER
            )));
        }

        let shares = [
            ("tvl_limit_coefficient", self.borrow_limit.tvl_limit_coefficient),
            ("pool_value_limit_coefficient", self.borrow_limit.pool_value_limit_coefficient),
            ("ltv_ratio", self.staking.ltv_ratio),
        ];
        for (name, value) in shares {
            if value > truefi_common::math::BASIS_POINTS {
                return Err(TrueFiError::InvalidArgument(format!(
                    "{} {} exceeds 10000 bp",
                    name, value
                )));
            }
        }

        // exponents above 4.0 flatten the curve to zero for every score
        if self.borrow_limit.limit_adjustment_power > 4 * truefi_common::math::BASIS_POINTS {
            return Err(TrueFiError::InvalidArgument(format!(
                "limit adjustment power {} exceeds 40000 bp",
                self.borrow_limit.limit_adjustment_power
            )));
        }
        Ok(())
    }
}
