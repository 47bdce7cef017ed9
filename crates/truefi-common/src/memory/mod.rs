//! In-memory collaborators
//!
//! Process-local implementations of the collaborator traits, used by the
//! simulation binary and by tests across the workspace.

pub mod books;
pub mod oracle;
pub mod token;

pub use books::{ScoreBook, StakeBook};
pub use oracle::StaticPriceOracle;
pub use token::InMemoryToken;
