//! # TrueFi Lending
//!
//! Fixed-term loan agency sitting between the rating market, the credit
//! model and the liquidity pools.
//!
//! - [`agency`]: [`LendingAgency`] funding, reclaiming and liquidating loans
//! - [`config`]: [`LendingConfig`] funding bounds
//! - [`swap`]: [`FeeSwapper`] turning protocol fees into stake tokens

pub mod agency;
pub mod config;
pub mod swap;

pub use agency::{LendingAgency, LendingCollaborators, LendingRoles};
pub use config::LendingConfig;
pub use swap::{FeeSwapper, OracleSwapper};
