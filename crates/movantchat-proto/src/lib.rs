//! Movantchat broker protocol
//!
//! Length-prefixed binary frames exchanged between chat clients and the
//! broker. A frame carries an opcode, an optional topic, and an opaque
//! payload. For `Publish` frames the payload is a sealed message envelope;
//! this layer never looks inside it.
//!
//! # Wire layout
//!
//! ```text
//! [magic: u32 BE] [version: u8] [opcode: u8]
//! [topic_len: u16 BE] [payload_len: u32 BE]
//! [topic: topic_len bytes, UTF-8] [payload: payload_len bytes]
//! ```
//!
//! Size limits are enforced on both encode and decode so a malicious peer
//! cannot make either side allocate unbounded memory.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod frame;

pub use error::ProtoError;
pub use frame::{Frame, FrameHeader, MAGIC, MAX_PAYLOAD_SIZE, MAX_TOPIC_LEN, Opcode, VERSION};

/// Convenience result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtoError>;
