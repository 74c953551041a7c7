//! Movantchat cryptographic primitives
//!
//! Pure building blocks for the encrypted chat: passphrase key derivation
//! and the authenticated message envelope. All functions are deterministic -
//! random bytes and timestamps are provided by the caller, which keeps the
//! codec testable without an environment.
//!
//! # Key lifecycle
//!
//! ```text
//! Passphrase (pre-shared out of band)
//!        │
//!        ▼
//! pad/truncate projection → ChatKey (32 bytes, fixed for the session)
//!        │
//!        ▼
//! XChaCha20-Poly1305 → sealed envelope on the wire
//! ```
//!
//! One key is derived per session and shared by every participant holding
//! the passphrase; it is the room's only access control. The key is held in
//! memory for the session lifetime, zeroized on drop, and never serialized
//! or logged.
//!
//! # Security
//!
//! The derivation is a fixed-length projection, NOT a key-derivation
//! function: no salt, no stretching. Peers must derive bit-identical keys
//! from the same passphrase, so the projection constants are part of the
//! compatibility contract. See DESIGN.md for why this weakness is kept.
//!
//! The envelope provides confidentiality and integrity via AEAD; the
//! version/timestamp header is authenticated as associated data, so any
//! modified byte anywhere in an envelope fails authentication.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod envelope;
mod passphrase;

pub use envelope::{
    ENVELOPE_VERSION, EnvelopeError, MAX_CLOCK_SKEW_SECS, MIN_ENVELOPE_LEN, NONCE_LEN, open,
    open_at, seal,
};
pub use passphrase::{ChatKey, KEY_LEN, PAD_BYTE, derive};
