//! Account aggregate: a single live account, its portfolio view and the
//! position set, updated field by field from account pushes.

pub mod account;
pub mod portfolio;
pub mod position;

pub use account::*;
pub use portfolio::*;
pub use position::*;

/// Errors raised while applying account pushes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccountError {
    #[error("Account mismatch: expected {expected}, got {got}")]
    AccountMismatch { expected: String, got: String },
    #[error("Invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
    #[error("Starting cash must be non-zero")]
    ZeroStartingCash,
}
