//! Broker error types.

use movantchat_proto::ProtoError;
use thiserror::Error;

/// Errors from the broker runtime.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Socket-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A peer sent bytes that do not parse as a frame.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtoError),

    /// Invalid runtime configuration.
    #[error("configuration error: {0}")]
    Config(String),
}
