//! # TrueFi Engine
//!
//! Layered configuration, service wiring and offline quotes.
//!
//! - [`config`]: [`EngineConfig`] loaded from TOML files and `TRUEFI__*` variables
//! - [`engine`]: [`Engine::bootstrap`] connecting factory, rating agency,
//!   credit model and lending agency
//! - [`quote`]: rate and borrow-limit reports for hypothetical borrowers

pub mod config;
pub mod engine;
pub mod quote;

pub use config::{EngineConfig, ENV_PREFIX};
pub use engine::{Engine, EngineAccounts, EngineCollaborators};
pub use quote::{quote, QuoteReport, QuoteScenario};
