//! In-process broker used by tests and the CLI's simulated mode.

pub mod market;
pub mod simulated;

pub use market::*;
pub use simulated::*;
