use crate::events::*;
use crate::models::*;
use crate::requests::*;
use std::time::Duration;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by a transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Transport closed")]
    Closed,
    #[error("Encoding failed: {0}")]
    Encoding(String),
    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(usize),
}

/// Errors surfaced by gateway operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Not connected")]
    NotConnected,
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("{operation} timed out after {waited:?}")]
    Timeout { operation: &'static str, waited: Duration },
    #[error("Broker error {code}: {message}")]
    Broker { code: i32, message: String },
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("Unknown request id: {0}")]
    UnknownId(SlotKey),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Request already in flight: {0}")]
    RequestInFlight(SlotKey),
    #[error("Correlation ids exhausted")]
    IdsExhausted,
}

impl GatewayError {
    /// Broker error code, when the broker rejected the request.
    pub fn broker_code(&self) -> Option<i32> {
        match self {
            GatewayError::Broker { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, GatewayError::Timeout { .. })
    }
}

impl From<BrokerMessage> for GatewayError {
    fn from(msg: BrokerMessage) -> Self {
        GatewayError::Broker { code: msg.code, message: msg.message }
    }
}

// ---------------------------------------------------------------------------
// Transport Trait
// ---------------------------------------------------------------------------

/// Outbound half of a broker connection.
pub trait Transport: Send + Sync {
    /// Fire-and-forget send. Failure is reported synchronously, never queued.
    fn send(&self, request: &OutboundRequest) -> Result<(), TransportError>;

    /// Whether the session is currently established.
    fn is_open(&self) -> bool;

    /// Close the session. Idempotent.
    fn close(&self);
}

// ---------------------------------------------------------------------------
// Inbound Sink Trait
// ---------------------------------------------------------------------------

/// Receives every push from a transport's single delivery context.
///
/// Implementations must not block and must not panic on malformed input.
pub trait InboundSink: Send + Sync {
    /// Called once per inbound push, in delivery order.
    fn on_message(&self, message: InboundMessage);

    /// Called on connect and disconnect.
    fn on_connection(&self, event: ConnectionEvent);
}
