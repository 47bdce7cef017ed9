//! Error types for the TrueFi credit engine
//!
//! Every failure aborts the whole operation. Each variant carries a stable
//! identifier (see [`TrueFiError::code`]) so callers can assert on the cause
//! rather than on the message text.

use thiserror::Error;

use crate::types::address::Address;

/// Result type alias using TrueFiError
pub type Result<T> = std::result::Result<T, TrueFiError>;

/// Unified error type for engine operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrueFiError {
    #[error("Invalid state: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("Unauthorized: {caller} is not the {role}")]
    Unauthorized { caller: Address, role: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Insufficient stake: requested {requested}, recorded {available}")]
    InsufficientStake { requested: u128, available: u128 },

    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: u128, available: u128 },

    #[error("Insufficient allowance: required {required}, approved {approved}")]
    InsufficientAllowance { required: u128, approved: u128 },

    #[error("Limit exceeded: {what} {value} exceeds {limit}")]
    LimitExceeded {
        what: &'static str,
        value: u128,
        limit: u128,
    },

    #[error("Too early: available at {ready_at}, now {now}")]
    TooEarly { ready_at: u64, now: u64 },

    #[error("Cooldown active: next update at {ready_at}, now {now}")]
    CooldownActive { ready_at: u64, now: u64 },

    #[error("Not ready: {required} samples required, {recorded} recorded")]
    NotReady { required: u64, recorded: u64 },

    #[error("Arithmetic error: {0}")]
    Arithmetic(#[from] ArithmeticError),

    #[error("Conflicting vote: {voter} already voted the other side")]
    ConflictingVote { voter: Address },

    #[error("Borrower {borrower} already locked by {holder}")]
    AlreadyLocked { borrower: Address, holder: Address },

    #[error("Loan {loan} was never funded")]
    NotFunded { loan: Address },

    #[error("Loan not credible: {yes} yes / {no} no votes")]
    NotCredible { yes: u128, no: u128 },

    #[error("Credit score {score} below minimum {minimum}")]
    InsufficientCreditScore { score: u8, minimum: u8 },

    #[error("Borrower {borrower} has no credit score")]
    UnscoredBorrower { borrower: Address },

    #[error("Loan submissions are paused")]
    SubmissionsPaused,

    #[error("Unknown loan: {0}")]
    UnknownLoan(Address),

    #[error("Unknown pool: {0}")]
    UnknownPool(Address),

    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Fixed-point arithmetic failures
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("overflow")]
    Overflow,

    #[error("underflow")]
    Underflow,

    #[error("division by zero")]
    DivisionByZero,
}

impl TrueFiError {
    /// Stable identifier for the failure cause
    pub fn code(&self) -> &'static str {
        match self {
            TrueFiError::InvalidState { .. } => "INVALID_STATE",
            TrueFiError::Unauthorized { .. } => "UNAUTHORIZED",
            TrueFiError::InvalidArgument(_) => "INVALID_ARGUMENT",
            TrueFiError::InsufficientStake { .. } => "INSUFFICIENT_STAKE",
            TrueFiError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            TrueFiError::InsufficientAllowance { .. } => "INSUFFICIENT_ALLOWANCE",
            TrueFiError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            TrueFiError::TooEarly { .. } => "TOO_EARLY",
            TrueFiError::CooldownActive { .. } => "COOLDOWN_ACTIVE",
            TrueFiError::NotReady { .. } => "NOT_READY",
            TrueFiError::Arithmetic(_) => "ARITHMETIC_ERROR",
            TrueFiError::ConflictingVote { .. } => "CONFLICTING_VOTE",
            TrueFiError::AlreadyLocked { .. } => "ALREADY_LOCKED",
            TrueFiError::NotFunded { .. } => "NOT_FUNDED",
            TrueFiError::NotCredible { .. } => "NOT_CREDIBLE",
            TrueFiError::InsufficientCreditScore { .. } => "INSUFFICIENT_CREDIT_SCORE",
            TrueFiError::UnscoredBorrower { .. } => "UNSCORED_BORROWER",
            TrueFiError::SubmissionsPaused => "SUBMISSIONS_PAUSED",
            TrueFiError::UnknownLoan(_) => "UNKNOWN_LOAN",
            TrueFiError::UnknownPool(_) => "UNKNOWN_POOL",
            TrueFiError::Collaborator(_) => "COLLABORATOR_FAILURE",
            TrueFiError::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Shorthand for a state-machine rejection
    pub fn invalid_state(operation: &'static str, state: impl std::fmt::Debug) -> Self {
        TrueFiError::InvalidState {
            operation,
            state: format!("{:?}", state),
        }
    }

    /// Shorthand for a role check failure
    pub fn unauthorized(caller: &Address, role: &'static str) -> Self {
        TrueFiError::Unauthorized {
            caller: *caller,
            role,
        }
    }
}

impl From<serde_json::Error> for TrueFiError {
    fn from(err: serde_json::Error) -> Self {
        TrueFiError::Config(err.to_string())
    }
}

impl From<anyhow::Error> for TrueFiError {
    fn from(err: anyhow::Error) -> Self {
        TrueFiError::Collaborator(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TrueFiError::InsufficientStake {
            requested: 10,
            available: 4,
        };
        assert!(err.to_string().contains("requested 10"));
        assert_eq!(err.code(), "INSUFFICIENT_STAKE");
    }

    #[test]
    fn test_arithmetic_conversion() {
        let err: TrueFiError = ArithmeticError::DivisionByZero.into();
        assert_eq!(err.code(), "ARITHMETIC_ERROR");
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_invalid_state_helper() {
        let err = TrueFiError::invalid_state("close", "Settled");
        assert_eq!(err.code(), "INVALID_STATE");
        assert!(err.to_string().contains("close"));
    }
}
