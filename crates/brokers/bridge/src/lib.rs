//! TCP bridge transport.
//!
//! Talks to a broker bridge process over a socket using length-prefixed JSON
//! frames. Reads happen on a background runtime; every decoded push is handed
//! to the inbound sink in arrival order.

pub mod client;
pub mod protocol;

pub use client::*;
pub use protocol::*;
