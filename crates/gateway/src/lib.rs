//! Blocking request/response gateway over an asynchronous, push-based
//! broker connection.
//!
//! A [`Session`] holds all per-connection state. The [`CallbackDispatcher`]
//! is handed to the transport as its inbound sink; the [`Gateway`] is what
//! callers use.

pub mod allocator;
pub mod client;
pub mod config;
pub mod depth;
pub mod dispatcher;
pub mod orders;
pub mod pending;
pub mod reports;
pub mod session;

pub use allocator::*;
pub use client::*;
pub use config::*;
pub use depth::*;
pub use dispatcher::*;
pub use orders::*;
pub use pending::*;
pub use reports::*;
pub use session::*;

use std::sync::Arc;

/// Fresh session state plus the dispatcher that feeds it.
pub fn new_session(config: &GatewayConfig) -> (Arc<Session>, Arc<CallbackDispatcher>) {
    let session = Arc::new(Session::new(config));
    let dispatcher = Arc::new(CallbackDispatcher::new(session.clone()));
    (session, dispatcher)
}
