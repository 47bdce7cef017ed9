//! # TrueFi Loans
//!
//! Loan lifecycle and the plumbing around it.
//!
//! - [`loan`]: [`LoanToken`] state machine and its debt claims
//! - [`factory`]: [`LoanFactory`] creating loans against registered pools
//! - [`mutex`]: [`BorrowingMutex`] serializing credit products per borrower
//! - [`pool`]: [`PoolRegistry`] and the in-memory [`ReservePool`]

pub mod factory;
pub mod loan;
pub mod mutex;
pub mod pool;

pub use factory::LoanFactory;
pub use loan::{compute_debt, LoanSettings, LoanStatus, LoanTerms, LoanToken};
pub use mutex::BorrowingMutex;
pub use pool::{PoolRegistry, ReservePool};
