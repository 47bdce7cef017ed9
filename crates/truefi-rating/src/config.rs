//! Rating market parameters

use serde::{Deserialize, Serialize};

use truefi_common::math::BASIS_POINTS;
use truefi_common::{Result, TrueFiError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatingConfig {
    /// Share of the losing stake taken from losers, in bp
    pub loss_factor: u128,
    /// Share of the lost stake handed to the winners, in bp
    pub burn_factor: u128,
    /// Reward tokens per stake-token worth of loan interest
    pub reward_multiplier: u128,
}

impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            loss_factor: 2500,
            burn_factor: 7500,
            reward_multiplier: 1,
        }
    }
}

impl RatingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.loss_factor > BASIS_POINTS {
            return Err(TrueFiError::InvalidArgument(format!(
                "loss factor {} exceeds 10000 bp",
                self.loss_factor
            )));
        }
        if self.burn_factor > BASIS_POINTS {
            return Err(TrueFiError::InvalidArgument(format!(
                "burn factor {} exceeds 10000 bp",
                self.burn_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RatingConfig::default();
        assert_eq!(config.loss_factor, 2500);
        assert_eq!(config.burn_factor, 7500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_deserializes() {
        let config: RatingConfig = serde_json::from_str(r#"{"loss_factor": 5000}"#).unwrap();
        assert_eq!(config.loss_factor, 5000);
        assert_eq!(config.reward_multiplier, 1);

        let bad = RatingConfig {
            loss_factor: 10_001,
            ..RatingConfig::default()
        };
        assert_eq!(bad.validate().unwrap_err().code(), "INVALID_ARGUMENT");
    }
}
