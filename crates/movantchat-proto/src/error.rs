//! Protocol error types.

use thiserror::Error;

/// Errors from frame encoding and decoding.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Frame does not start with the protocol magic number.
    #[error("bad magic: {found:#010x}")]
    BadMagic {
        /// Value found where the magic was expected.
        found: u32,
    },

    /// Unsupported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Opcode byte does not map to a known opcode.
    #[error("unknown opcode: {0:#04x}")]
    UnknownOpcode(u8),

    /// Topic exceeds the wire limit.
    #[error("topic too long: {len} bytes (max {max})")]
    TopicTooLong {
        /// Actual topic length in bytes.
        len: usize,
        /// Maximum permitted length.
        max: usize,
    },

    /// Topic bytes are not valid UTF-8.
    #[error("topic is not valid UTF-8")]
    TopicNotUtf8,

    /// Payload exceeds the wire limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Actual payload size in bytes.
        size: usize,
        /// Maximum permitted size.
        max: usize,
    },

    /// Input ended before the frame the header describes.
    #[error("frame truncated: expected {expected} body bytes, got {actual}")]
    FrameTruncated {
        /// Body bytes the header claims.
        expected: usize,
        /// Body bytes actually available.
        actual: usize,
    },
}
