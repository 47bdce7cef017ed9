//! # TrueFi Credit
//!
//! Interest rates and borrow limits for credit-scored borrowers.
//!
//! - [`oracle`]: time-averaged base rate oracle over a circular sample buffer
//! - [`curves`]: pure rate and limit curves over [`CreditModelConfig`]
//! - [`model`]: the administered [`CreditModel`] service evaluating the curves
//!   against live pools and oracles

pub mod config;
pub mod curves;
pub mod model;
pub mod oracle;

pub use config::{
    BorrowLimitConfig, CreditModelConfig, CreditScoreRateConfig, StakingConfig,
    UtilizationRateConfig,
};
pub use curves::{combined_rate, LimitInputs};
pub use model::{CollateralAsset, CreditModel, RateQuote};
pub use oracle::{BaseRateOracle, OracleSettings, RateSample, TimeAveragedRateOracle, MAX_BUFFER_SIZE};
