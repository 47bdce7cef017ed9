//! # TrueFi Common
//!
//! Shared types, errors and collaborator interfaces for the TrueFi credit engine.
//!
//! ## Core Types
//!
//! - [`Address`]: 20-byte account / contract identifier
//! - [`Clock`]: injected monotonic time source
//! - [`TrueFiError`]: unified error with stable codes
//!
//! ## Math
//!
//! - [`math`]: checked basis-point arithmetic on `u128`
//!
//! ## Collaborators
//!
//! - [`interfaces`]: token ledger, price oracle, liquidity pool, credit oracle,
//!   staking vault and reward distributor traits
//! - [`memory`]: in-memory implementations for simulations and tests
//! - [`events`]: protocol event bus

pub mod error;
pub mod events;
pub mod interfaces;
pub mod math;
pub mod memory;
pub mod types;

// Re-export commonly used types at crate root
pub use error::{ArithmeticError, Result, TrueFiError};
pub use events::{EventBus, EventLog, EventRecord, EventSink, ProtocolEvent, TracingSink};
pub use interfaces::{
    CreditOracle, LiquidityPool, Price, PriceOracle, RewardDistributor, StakingVault, TokenLedger,
};
pub use types::{
    address::Address,
    clock::{Clock, ManualClock, SystemClock, DAY, YEAR},
};

/// Engine version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ceiling for every rate the engine quotes (500%)
pub const MAX_RATE: u128 = 50_000;

/// Highest credit score an oracle can attest
pub const MAX_CREDIT_SCORE: u8 = 255;
