//! Chat session state machine.
//!
//! Manages the connection lifecycle for one room and binds the envelope
//! codec into the message path: outbound text is formatted and sealed
//! before it ever reaches a publish action, inbound payloads are opened
//! before anything is delivered. Uses the action pattern: methods take
//! observations and return actions for the driver to execute, keeping the
//! machine free of I/O.
//!
//! # State machine
//!
//! ```text
//! ┌──────────────┐ connect_started ┌────────────┐ connect_acked ┌───────────┐
//! │ Disconnected │────────────────>│ Connecting │──────────────>│ Connected │
//! └──────────────┘                 └────────────┘               └───────────┘
//!        ▲                               │                            │
//!        │        connect_failed         │                            │ exit_requested
//!        └───────────────────────────────┘                            ▼
//!                 (terminal, no retry)                          ┌───────────┐
//!                                                      closed   │  Closing  │
//!                                                    ┌──────────└───────────┘
//!                                                    ▼
//!                                               ┌────────┐
//!                                               │ Closed │
//!                                               └────────┘
//! ```
//!
//! A `Connected` session is additionally `running` until exit is
//! requested; the flag transitions exactly once, from true to false.
//!
//! # Concurrency
//!
//! Inbound delivery and the operator input loop run on separate tasks.
//! Both read the session key and topic, which are immutable after
//! construction; there is no shared mutable chat state, so the driver
//! needs no locking around this machine beyond owning it.

use movantchat_crypto::{ChatKey, NONCE_LEN, open, seal};
use thiserror::Error;

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No transport connection. Also the terminal state after a connect
    /// failure.
    Disconnected,
    /// Transport connect initiated, broker acknowledgement pending.
    Connecting,
    /// Connected and subscribed (or subscribing) to the room topic.
    Connected,
    /// Exit requested; transport teardown in progress.
    Closing,
    /// Fully closed.
    Closed,
}

/// Actions returned by the session for the driver to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Subscribe to the room topic.
    Subscribe {
        /// Topic to subscribe to.
        topic: String,
    },

    /// Publish a sealed envelope to the room topic.
    Publish {
        /// Topic to publish to.
        topic: String,
        /// Sealed envelope bytes.
        envelope: Vec<u8>,
    },

    /// Deliver decrypted chat text to the operator.
    Deliver {
        /// Topic the message arrived on.
        topic: String,
        /// Decrypted message text.
        text: String,
    },

    /// Report a per-message decrypt failure to the operator.
    ///
    /// Non-fatal: the session stays connected and keeps receiving.
    NotifyDecryptFailure {
        /// Topic the offending payload arrived on.
        topic: String,
        /// Human-readable failure reason. Never contains key material.
        reason: String,
    },

    /// Stop the background delivery loop.
    StopDelivery,

    /// Disconnect the transport.
    CloseTransport,
}

/// Errors from session operations attempted in the wrong state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation is not valid in the current state.
    #[error("invalid state transition: cannot {operation} from {state:?}")]
    InvalidState {
        /// State when the operation was attempted.
        state: SessionState,
        /// Operation that was attempted.
        operation: &'static str,
    },
}

/// State machine for one chat session.
///
/// Binds `{username, topic, key}` for the session lifetime. The key is
/// immutable after construction and shared read-only between the send and
/// delivery paths.
#[derive(Debug)]
pub struct ChatSession {
    state: SessionState,
    running: bool,
    username: String,
    topic: String,
    key: ChatKey,
}

impl ChatSession {
    /// Create a session in [`SessionState::Disconnected`].
    pub fn new(username: impl Into<String>, topic: impl Into<String>, key: ChatKey) -> Self {
        Self {
            state: SessionState::Disconnected,
            running: true,
            username: username.into(),
            topic: topic.into(),
            key,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether the session still accepts local input.
    ///
    /// Transitions once, from true to false, when exit is requested.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Topic this session is bound to.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Record that the driver initiated the transport connection.
    pub fn connect_started(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Disconnected => {
                self.state = SessionState::Connecting;
                Ok(())
            },
            state => Err(SessionError::InvalidState { state, operation: "connect" }),
        }
    }

    /// Broker acknowledged the connection: subscribe to the room topic.
    pub fn connect_acked(&mut self) -> Result<SessionAction, SessionError> {
        match self.state {
            SessionState::Connecting => {
                self.state = SessionState::Connected;
                Ok(SessionAction::Subscribe { topic: self.topic.clone() })
            },
            state => Err(SessionError::InvalidState { state, operation: "ack connect" }),
        }
    }

    /// Transport reported a connect failure.
    ///
    /// Terminal for this session: back to `Disconnected`, no retry.
    pub fn connect_failed(&mut self) {
        self.state = SessionState::Disconnected;
        self.running = false;
    }

    /// An envelope arrived on the subscribed topic.
    ///
    /// Decrypts via the session key. Decrypt failures are per-message and
    /// non-fatal: the returned action reports them and the session stays
    /// connected for subsequent messages. Envelopes that race a close are
    /// still decrypted to completion; only a fully `Closed` or never-
    /// connected session ignores them.
    pub fn envelope_received(&mut self, topic: &str, envelope: &[u8]) -> Option<SessionAction> {
        match self.state {
            SessionState::Connected | SessionState::Closing => {},
            SessionState::Disconnected | SessionState::Connecting | SessionState::Closed => {
                return None;
            },
        }

        let action = match open(&self.key, envelope) {
            Ok(plaintext) => match String::from_utf8(plaintext) {
                Ok(text) => SessionAction::Deliver { topic: topic.to_owned(), text },
                Err(_) => SessionAction::NotifyDecryptFailure {
                    topic: topic.to_owned(),
                    reason: "decrypted message is not valid UTF-8".to_owned(),
                },
            },
            Err(error) => SessionAction::NotifyDecryptFailure {
                topic: topic.to_owned(),
                reason: error.to_string(),
            },
        };

        Some(action)
    }

    /// Operator asked to send `text`.
    ///
    /// Formats `"{username}: {text}"`, seals it, and returns the publish
    /// action. The caller supplies the wall-clock timestamp and fresh
    /// random nonce bytes.
    pub fn send_requested(
        &mut self,
        text: &str,
        timestamp_secs: u64,
        nonce: [u8; NONCE_LEN],
    ) -> Result<SessionAction, SessionError> {
        match self.state {
            SessionState::Connected => {
                let message = format!("{}: {}", self.username, text);
                let envelope = seal(&self.key, message.as_bytes(), timestamp_secs, nonce);
                Ok(SessionAction::Publish { topic: self.topic.clone(), envelope })
            },
            state => Err(SessionError::InvalidState { state, operation: "send" }),
        }
    }

    /// Operator requested exit (explicit command or interrupt).
    ///
    /// Idempotent: the first call transitions `Connected -> Closing` and
    /// returns the teardown actions; repeated calls are no-ops.
    pub fn exit_requested(&mut self) -> Vec<SessionAction> {
        self.running = false;

        match self.state {
            SessionState::Connected => {
                self.state = SessionState::Closing;
                vec![SessionAction::StopDelivery, SessionAction::CloseTransport]
            },
            SessionState::Disconnected | SessionState::Connecting => {
                self.state = SessionState::Closed;
                Vec::new()
            },
            SessionState::Closing | SessionState::Closed => Vec::new(),
        }
    }

    /// Transport teardown completed: the session is fully closed.
    ///
    /// Idempotent.
    pub fn closed(&mut self) {
        self.state = SessionState::Closed;
        self.running = false;
    }
}
