//! Funding bounds of the loan agency

use serde::{Deserialize, Serialize};

use truefi_common::math::BASIS_POINTS;
use truefi_common::{Result, TrueFiError, DAY, YEAR};

/// One unit of an 18-decimal amount
const UNIT: u128 = 1_000_000_000_000_000_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LendingConfig {
    /// Yes stake a loan needs, in stake token units
    pub min_votes: u128,
    /// Yes share of all votes a loan needs, in bp
    pub min_ratio: u128,
    /// Seconds between submission and funding
    pub voting_period: u64,
    /// Loan size bounds, 18-decimal
    pub min_size: u128,
    pub max_size: u128,
    pub min_term: u64,
    pub max_term: u64,
    pub max_loans_per_pool: usize,
    pub min_credit_score: u8,
    /// Share of loan interest taken for stakers, in bp
    pub protocol_fee: u128,
}

impl Default for LendingConfig {
    fn default() -> Self {
        Self {
            min_votes: 15_000_000 * 100_000_000,
            min_ratio: 8000,
            voting_period: 7 * DAY,
            min_size: 1_000_000 * UNIT,
            max_size: 10_000_000 * UNIT,
            min_term: 30 * DAY,
            max_term: YEAR,
            max_loans_per_pool: 100,
            min_credit_score: 192,
            protocol_fee: 1000,
        }
    }
}

impl LendingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_size > self.max_size {
            return Err(TrueFiError::InvalidArgument(format!(
                "min loan size {} above max {}",
                self.min_size, self.max_size
            )));
        }
        if self.min_term > self.max_term {
            return Err(TrueFiError::InvalidArgument(format!(
                "min loan term {} above max {}",
                self.min_term, self.max_term
            )));
        }
        if self.min_ratio > BASIS_POINTS || self.protocol_fee > BASIS_POINTS {
            return Err(TrueFiError::InvalidArgument(
                "min ratio and protocol fee are capped at 10000 bp".to_string(),
            ));
        }
        if self.max_loans_per_pool == 0 {
            return Err(TrueFiError::InvalidArgument("max loans per pool is zero".to_string()));
        }
        Ok(())
    }

    /// `yes` stake passes both the absolute and the ratio threshold
    pub fn is_credible(&self, yes: u128, no: u128) -> bool {
        if yes < self.min_votes {
            return false;
        }
        let all = yes.saturating_add(no);
        yes.saturating_mul(BASIS_POINTS) >= self.min_ratio.saturating_mul(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_validate() {
        assert!(LendingConfig::default().validate().is_ok());

        let inverted = LendingConfig {
            min_term: YEAR,
            max_term: DAY,
            ..LendingConfig::default()
        };
        assert_eq!(inverted.validate().unwrap_err().code(), "INVALID_ARGUMENT");

        let greedy = LendingConfig {
            protocol_fee: 10_001,
            ..LendingConfig::default()
        };
        assert!(greedy.validate().is_err());
    }

    #[test]
    fn test_credibility() {
        let config = LendingConfig {
            min_votes: 100,
            min_ratio: 8000,
            ..LendingConfig::default()
        };
        assert!(config.is_credible(800, 200));
        assert!(!config.is_credible(799, 201));
        assert!(!config.is_credible(99, 0));
        assert!(config.is_credible(100, 0));
    }
}
