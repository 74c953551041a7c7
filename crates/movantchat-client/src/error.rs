//! Client-side error types.
//!
//! Split by severity: [`ConnectError`] is fatal to the session (no retry),
//! [`PublishError`] is recoverable (the send is reported and the session
//! continues). Per-message decrypt failures are not errors at this layer -
//! they surface as [`crate::ChatEvent::DecryptFailed`] events.

use std::time::Duration;

use thiserror::Error;

/// Transport connect failed. Fatal to the session; no automatic reconnect.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// Socket-level connect or handshake I/O failure.
    #[error("connection failed: {0}")]
    Transport(String),

    /// Broker never acknowledged the connection.
    #[error("no connection acknowledgement within {0:?}")]
    AckTimeout(Duration),
}

/// Transport publish failed. Non-fatal; the session stays connected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The session is not in a state that accepts sends.
    #[error("session is not connected")]
    NotConnected,

    /// The frame could not be handed to the transport.
    #[error("transport send failed: {0}")]
    Transport(String),
}
