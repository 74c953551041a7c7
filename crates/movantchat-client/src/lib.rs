//! Movantchat client
//!
//! Production glue around the sans-IO session core: a TCP transport to the
//! broker, an in-process broker for tests and simulation, and the [`Chat`]
//! driver that binds the session state machine and envelope codec to a
//! live connection.
//!
//! # Architecture
//!
//! [`transport::connect`] dials the broker and returns a [`BrokerLink`]:
//! a pair of frame channels serviced by a spawned I/O task, plus a stopper
//! for the delivery loop. [`local::LocalBroker`] produces the same link
//! shape over channels with no network, backed by the real broker driver.
//! [`Chat::start`] takes either link, performs the Connect/ConnAck
//! handshake, subscribes to the room topic, and spawns the delivery task
//! that decrypts inbound envelopes into [`ChatEvent`]s.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chat;
mod error;
pub mod local;
pub mod transport;

pub use chat::{CONNACK_TIMEOUT, Chat, ChatEvent};
pub use error::{ConnectError, PublishError};
pub use transport::{BrokerLink, LinkStopper};
