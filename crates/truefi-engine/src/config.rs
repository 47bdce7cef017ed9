//! Engine configuration
//!
//! Every group has defaults. [`EngineConfig::load`] layers an optional TOML
//! file and `TRUEFI__`-prefixed environment variables over them, e.g.
//! `TRUEFI__LENDING__MIN_RATIO=9000` or `TRUEFI__CREDIT__RISK_PREMIUM=250`.

use std::path::Path;

use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use truefi_common::{Result, TrueFiError};
use truefi_credit::{CreditModelConfig, OracleSettings};
use truefi_lending::LendingConfig;
use truefi_loans::LoanSettings;
use truefi_rating::RatingConfig;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "TRUEFI";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub credit: CreditModelConfig,
    pub oracle: OracleSettings,
    pub loans: LoanSettings,
    pub rating: RatingConfig,
    pub lending: LendingConfig,
}

impl EngineConfig {
    /// Load from `.env`, then `path` if given, then the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let mut builder = Config::builder();
        if let Some(path) = path {
            debug!(path = %path.display(), "reading engine config file");
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        Self::from_layers(builder.build())
    }

    /// Parse a TOML document on top of the defaults
    pub fn from_toml(source: &str) -> Result<Self> {
        Self::from_layers(
            Config::builder()
                .add_source(File::from_str(source, FileFormat::Toml))
                .build(),
        )
    }

    /// Merged layers are read back through a JSON tree, which carries `u128` amounts
    fn from_layers(built: std::result::Result<Config, ConfigError>) -> Result<Self> {
        let tree: serde_json::Value = built
            .and_then(|config| config.try_deserialize())
            .map_err(|err| TrueFiError::Config(err.to_string()))?;
        let config: EngineConfig = serde_json::from_value(tree)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.credit.validate()?;
        self.oracle.validate()?;
        self.loans.validate()?;
        self.rating.validate()?;
        self.lending.validate()?;
        Ok(())
    }
}
