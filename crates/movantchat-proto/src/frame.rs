//! Frame type and wire codec.
//!
//! A [`Frame`] is the unit of transport between client and broker. The
//! header is parsed and validated before any body bytes are read, so
//! malformed input is rejected without allocating for the body.
//!
//! # Invariants
//!
//! - Size consistency: the topic and payload lengths on the wire always
//!   match the actual byte counts. Enforced by [`Frame::encode`] and
//!   verified by [`Frame::decode`].
//! - Size limits: topics are capped at [`MAX_TOPIC_LEN`] and payloads at
//!   [`MAX_PAYLOAD_SIZE`]. Violations are rejected on both directions.

use bytes::{BufMut, Bytes};

use crate::error::ProtoError;

/// Protocol magic number, "MVCH" in ASCII.
pub const MAGIC: u32 = 0x4D56_4348;

/// Protocol version carried in every frame.
pub const VERSION: u8 = 1;

/// Maximum topic length in bytes (1 KiB).
pub const MAX_TOPIC_LEN: usize = 1024;

/// Maximum payload size in bytes (64 KiB).
///
/// Chat messages are small; the cap bounds what a peer can make the other
/// side buffer for a single frame.
pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

/// Frame opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    /// Client -> broker: open a session. Payload is the client identifier.
    Connect = 0x01,
    /// Broker -> client: session accepted.
    ConnAck = 0x02,
    /// Client -> broker: subscribe to a topic.
    Subscribe = 0x03,
    /// Broker -> client: subscription confirmed.
    SubAck = 0x04,
    /// Either direction: a sealed message envelope for a topic.
    Publish = 0x05,
    /// Client -> broker: keepalive probe.
    Ping = 0x06,
    /// Broker -> client: keepalive response.
    Pong = 0x07,
    /// Client -> broker: close the session.
    Disconnect = 0x08,
}

impl Opcode {
    /// Parse an opcode byte.
    pub fn from_u8(value: u8) -> Result<Self, ProtoError> {
        match value {
            0x01 => Ok(Self::Connect),
            0x02 => Ok(Self::ConnAck),
            0x03 => Ok(Self::Subscribe),
            0x04 => Ok(Self::SubAck),
            0x05 => Ok(Self::Publish),
            0x06 => Ok(Self::Ping),
            0x07 => Ok(Self::Pong),
            0x08 => Ok(Self::Disconnect),
            other => Err(ProtoError::UnknownOpcode(other)),
        }
    }

    /// Wire byte for this opcode.
    pub fn to_u8(self) -> u8 {
        self as u8
    }
}

/// Parsed frame header.
///
/// Produced by [`FrameHeader::parse`] from the first [`FrameHeader::SIZE`]
/// bytes of a frame. Stream readers parse the header first, then read
/// exactly [`FrameHeader::body_len`] more bytes before assembling the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Frame opcode.
    pub opcode: Opcode,
    topic_len: u16,
    payload_len: u32,
}

impl FrameHeader {
    /// Header size on the wire: magic + version + opcode + lengths.
    pub const SIZE: usize = 4 + 1 + 1 + 2 + 4;

    /// Parse and validate a header from the start of `bytes`.
    ///
    /// Validates magic, version, opcode, and both size limits before the
    /// caller commits to reading the body.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtoError> {
        if bytes.len() < Self::SIZE {
            return Err(ProtoError::FrameTruncated {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }

        let magic = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if magic != MAGIC {
            return Err(ProtoError::BadMagic { found: magic });
        }

        let version = bytes[4];
        if version != VERSION {
            return Err(ProtoError::UnsupportedVersion(version));
        }

        let opcode = Opcode::from_u8(bytes[5])?;
        let topic_len = u16::from_be_bytes([bytes[6], bytes[7]]);
        let payload_len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);

        if topic_len as usize > MAX_TOPIC_LEN {
            return Err(ProtoError::TopicTooLong { len: topic_len as usize, max: MAX_TOPIC_LEN });
        }

        if payload_len as usize > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge {
                size: payload_len as usize,
                max: MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self { opcode, topic_len, payload_len })
    }

    /// Number of body bytes (topic + payload) following the header.
    pub fn body_len(&self) -> usize {
        self.topic_len as usize + self.payload_len as usize
    }
}

/// Complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame opcode.
    pub opcode: Opcode,
    /// Topic this frame addresses. Empty for control frames.
    pub topic: String,
    /// Opaque payload bytes. For `Publish` this is a sealed envelope.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame with a topic and payload.
    pub fn new(opcode: Opcode, topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self { opcode, topic: topic.into(), payload: payload.into() }
    }

    /// Create a frame with a topic and no payload.
    pub fn with_topic(opcode: Opcode, topic: impl Into<String>) -> Self {
        Self { opcode, topic: topic.into(), payload: Bytes::new() }
    }

    /// Create a control frame with no topic and no payload.
    pub fn control(opcode: Opcode) -> Self {
        Self { opcode, topic: String::new(), payload: Bytes::new() }
    }

    /// Encode the frame into `dst`.
    ///
    /// # Errors
    ///
    /// - [`ProtoError::TopicTooLong`] if the topic exceeds [`MAX_TOPIC_LEN`]
    /// - [`ProtoError::PayloadTooLarge`] if the payload exceeds
    ///   [`MAX_PAYLOAD_SIZE`]
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<(), ProtoError> {
        let topic = self.topic.as_bytes();
        if topic.len() > MAX_TOPIC_LEN {
            return Err(ProtoError::TopicTooLong { len: topic.len(), max: MAX_TOPIC_LEN });
        }

        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(ProtoError::PayloadTooLarge {
                size: self.payload.len(),
                max: MAX_PAYLOAD_SIZE,
            });
        }

        dst.put_u32(MAGIC);
        dst.put_u8(VERSION);
        dst.put_u8(self.opcode.to_u8());
        dst.put_u16(topic.len() as u16);
        dst.put_u32(self.payload.len() as u32);
        dst.put_slice(topic);
        dst.put_slice(&self.payload);

        Ok(())
    }

    /// Decode a complete frame from `bytes`.
    ///
    /// Trailing bytes after the frame are ignored. Use
    /// [`FrameHeader::parse`] + [`Frame::assemble`] when reading from a
    /// stream.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        let header = FrameHeader::parse(bytes)?;
        let body = bytes.get(FrameHeader::SIZE..).unwrap_or(&[]);

        if body.len() < header.body_len() {
            return Err(ProtoError::FrameTruncated {
                expected: header.body_len(),
                actual: body.len(),
            });
        }

        Self::assemble(&header, &body[..header.body_len()])
    }

    /// Assemble a frame from a parsed header and exactly
    /// [`FrameHeader::body_len`] body bytes.
    pub fn assemble(header: &FrameHeader, body: &[u8]) -> Result<Self, ProtoError> {
        if body.len() != header.body_len() {
            return Err(ProtoError::FrameTruncated {
                expected: header.body_len(),
                actual: body.len(),
            });
        }

        let (topic_bytes, payload) = body.split_at(header.topic_len as usize);
        let topic =
            std::str::from_utf8(topic_bytes).map_err(|_| ProtoError::TopicNotUtf8)?.to_owned();

        Ok(Self {
            opcode: header.opcode,
            topic,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}
