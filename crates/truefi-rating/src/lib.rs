//! # TrueFi Rating
//!
//! Prediction market on loan applications.
//!
//! - [`agency`]: [`RatingAgency`] collecting staked yes/no votes, settling
//!   them against the loan outcome and paying rater rewards
//! - [`config`]: [`RatingConfig`] loss and burn factors
//! - [`distributor`]: [`LinearDistributor`] releasing the reward supply

pub mod agency;
pub mod config;
pub mod distributor;

pub use agency::{redistributable, LoanRating, RatingAgency, RatingCollaborators, RatingStatus, Vote};
pub use config::RatingConfig;
pub use distributor::LinearDistributor;
