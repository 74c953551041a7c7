//! Chat session driver.
//!
//! Binds the sans-IO session state machine and envelope codec to a live
//! [`BrokerLink`]: drives the Connect/ConnAck handshake, subscribes to the
//! room topic, and runs the background delivery task that turns inbound
//! publishes into [`ChatEvent`]s.
//!
//! Delivery and the caller's input loop run on separate tasks; both go
//! through the shared state machine, whose key and topic are immutable
//! after start. A close races cleanly with delivery: envelopes already
//! handed to the delivery task are decrypted to completion.

use std::{sync::Arc, time::Duration};

use movantchat_core::{
    BrokerConfig, Environment,
    session::{ChatSession, SessionAction, SessionState},
};
use movantchat_crypto::{ChatKey, NONCE_LEN};
use movantchat_proto::{Frame, Opcode};
use tokio::{
    sync::{Mutex, mpsc},
    task::AbortHandle,
};

use crate::{
    error::{ConnectError, PublishError},
    transport::{BrokerLink, LinkStopper},
};

/// How long to wait for the broker's connection acknowledgement.
pub const CONNACK_TIMEOUT: Duration = Duration::from_secs(10);

/// Events surfaced to the operator loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    /// A message decrypted successfully.
    Message {
        /// Topic the message arrived on.
        topic: String,
        /// Decrypted chat text, already `"{username}: {text}"` formatted
        /// by the sender.
        text: String,
    },

    /// An inbound payload failed to decrypt. Non-fatal.
    DecryptFailed {
        /// Topic the offending payload arrived on.
        topic: String,
        /// Failure reason.
        reason: String,
    },

    /// The broker connection went away mid-session. Terminal.
    Disconnected {
        /// What happened.
        reason: String,
    },
}

/// A running chat session bound to one room.
pub struct Chat<E: Environment> {
    session: Arc<Mutex<ChatSession>>,
    to_broker: mpsc::Sender<Frame>,
    events: mpsc::Receiver<ChatEvent>,
    delivery_abort: AbortHandle,
    link_stopper: LinkStopper,
    env: E,
}

impl<E: Environment> Chat<E> {
    /// Start a session over an established link.
    ///
    /// Sends Connect, waits for ConnAck (bounded by [`CONNACK_TIMEOUT`]),
    /// subscribes to `topic`, and spawns the delivery task. On any failure
    /// the session ends where it is - connect errors are terminal, there
    /// is no retry.
    pub async fn start(
        username: impl Into<String>,
        topic: impl Into<String>,
        key: ChatKey,
        config: &BrokerConfig,
        link: BrokerLink,
        env: E,
    ) -> Result<Self, ConnectError> {
        let BrokerLink { to_broker, mut from_broker, stopper } = link;

        let mut session = ChatSession::new(username, topic, key);
        if session.connect_started().is_err() {
            // Fresh sessions are always Disconnected; this cannot happen
            return Err(ConnectError::Transport("session already started".to_owned()));
        }

        let connect_frame =
            Frame::new(Opcode::Connect, "", config.client_id.clone().into_bytes());
        if let Err(e) = to_broker.send(connect_frame).await {
            session.connect_failed();
            stopper.stop();
            return Err(ConnectError::Transport(format!("connect send failed: {e}")));
        }

        if let Err(e) = wait_for_ack(&mut from_broker, Opcode::ConnAck).await {
            session.connect_failed();
            stopper.stop();
            return Err(e);
        }

        let Ok(SessionAction::Subscribe { topic }) = session.connect_acked() else {
            // connect_acked from Connecting always yields Subscribe
            stopper.stop();
            return Err(ConnectError::Transport("session refused acknowledgement".to_owned()));
        };

        tracing::info!("connected to broker, subscribing to '{topic}'");

        let subscribe_frame = Frame::with_topic(Opcode::Subscribe, topic);
        if let Err(e) = to_broker.send(subscribe_frame).await {
            session.connect_failed();
            stopper.stop();
            return Err(ConnectError::Transport(format!("subscribe send failed: {e}")));
        }

        // Wait for the subscription to be live so no publish can race it
        if let Err(e) = wait_for_ack(&mut from_broker, Opcode::SubAck).await {
            session.connect_failed();
            stopper.stop();
            return Err(e);
        }

        let session = Arc::new(Mutex::new(session));
        let (events_tx, events_rx) = mpsc::channel::<ChatEvent>(64);

        let delivery_session = Arc::clone(&session);
        let delivery_handle = tokio::spawn(async move {
            run_delivery(&mut from_broker, &delivery_session, &events_tx).await;
        });

        Ok(Self {
            session,
            to_broker,
            events: events_rx,
            delivery_abort: delivery_handle.abort_handle(),
            link_stopper: stopper,
            env,
        })
    }

    /// Current session state.
    pub async fn state(&self) -> SessionState {
        self.session.lock().await.state()
    }

    /// Send a chat line to the room.
    ///
    /// Formats, seals, and publishes. Failures are non-fatal: report them
    /// and keep the session running.
    pub async fn send(&self, text: &str) -> Result<(), PublishError> {
        let frame = {
            let mut nonce = [0u8; NONCE_LEN];
            self.env.random_bytes(&mut nonce);
            let timestamp_secs = self.env.wall_clock_secs();

            let mut session = self.session.lock().await;
            match session.send_requested(text, timestamp_secs, nonce) {
                Ok(SessionAction::Publish { topic, envelope }) => {
                    Frame::new(Opcode::Publish, topic, envelope)
                },
                Ok(_) | Err(_) => return Err(PublishError::NotConnected),
            }
        };

        self.to_broker
            .send(frame)
            .await
            .map_err(|e| PublishError::Transport(e.to_string()))
    }

    /// Next event from the delivery task.
    ///
    /// `None` once the session is closed and the event stream drained.
    pub async fn next_event(&mut self) -> Option<ChatEvent> {
        self.events.recv().await
    }

    /// Close the session: stop delivery, disconnect the transport.
    ///
    /// Idempotent - closing an already-closed session is a no-op.
    pub async fn close(&mut self) {
        let actions = self.session.lock().await.exit_requested();

        for action in actions {
            match action {
                SessionAction::StopDelivery => {
                    self.delivery_abort.abort();
                },
                SessionAction::CloseTransport => {
                    // Best-effort goodbye; the broker also handles abrupt
                    // closes
                    let _ = self.to_broker.send(Frame::control(Opcode::Disconnect)).await;
                    self.link_stopper.stop();
                },
                _ => {},
            }
        }

        self.session.lock().await.closed();
    }
}

/// Wait for a broker acknowledgement frame, bounded by
/// [`CONNACK_TIMEOUT`].
async fn wait_for_ack(
    from_broker: &mut mpsc::Receiver<Frame>,
    expected: Opcode,
) -> Result<(), ConnectError> {
    let wait = async {
        loop {
            match from_broker.recv().await {
                Some(frame) if frame.opcode == expected => return Ok(()),
                Some(frame) => {
                    tracing::debug!("ignoring pre-ack frame {:?}", frame.opcode);
                },
                None => {
                    return Err(ConnectError::Transport(
                        "connection closed during handshake".to_owned(),
                    ));
                },
            }
        }
    };

    match tokio::time::timeout(CONNACK_TIMEOUT, wait).await {
        Ok(result) => result,
        Err(_) => Err(ConnectError::AckTimeout(CONNACK_TIMEOUT)),
    }
}

/// Delivery loop: decrypt inbound publishes and forward events.
///
/// One bad envelope never stops the loop; only channel closure does.
async fn run_delivery(
    from_broker: &mut mpsc::Receiver<Frame>,
    session: &Arc<Mutex<ChatSession>>,
    events: &mpsc::Sender<ChatEvent>,
) {
    while let Some(frame) = from_broker.recv().await {
        match frame.opcode {
            Opcode::Publish => {
                let action = {
                    let mut session = session.lock().await;
                    session.envelope_received(&frame.topic, &frame.payload)
                };

                let event = match action {
                    Some(SessionAction::Deliver { topic, text }) => {
                        ChatEvent::Message { topic, text }
                    },
                    Some(SessionAction::NotifyDecryptFailure { topic, reason }) => {
                        tracing::warn!("undecryptable message on '{topic}': {reason}");
                        ChatEvent::DecryptFailed { topic, reason }
                    },
                    _ => continue,
                };

                if events.send(event).await.is_err() {
                    break;
                }
            },

            Opcode::SubAck => {
                tracing::debug!("subscription to '{}' confirmed", frame.topic);
            },

            Opcode::Pong => {},

            other => {
                tracing::debug!("ignoring unexpected frame {other:?}");
            },
        }
    }

    let _ = events
        .send(ChatEvent::Disconnected { reason: "broker connection closed".to_owned() })
        .await;
}
