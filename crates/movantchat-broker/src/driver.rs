//! Broker driver.
//!
//! Sans-IO core of the broker: events in, actions out. The runtime (TCP or
//! the client crate's in-process broker) feeds [`BrokerEvent`]s and
//! executes the returned [`BrokerAction`]s. The broker is routing-only: it
//! never inspects publish payloads, which are sealed envelopes only the
//! room's participants can open.

use movantchat_proto::{Frame, Opcode};

use crate::registry::{SessionInfo, SubscriptionRegistry};

/// Severity for [`BrokerAction::Log`] actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug-level detail.
    Debug,
    /// Normal operational events.
    Info,
    /// Suspicious but tolerated events.
    Warn,
}

/// Events the runtime feeds into the driver.
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// A transport connection was accepted.
    ConnectionAccepted {
        /// Runtime-assigned session identifier.
        session_id: u64,
    },

    /// A frame arrived from a connection.
    FrameReceived {
        /// Session the frame came from.
        session_id: u64,
        /// The frame.
        frame: Frame,
    },

    /// A transport connection went away.
    ConnectionClosed {
        /// Session that closed.
        session_id: u64,
    },
}

/// Actions the driver returns for the runtime to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerAction {
    /// Send a frame to one session.
    SendToSession {
        /// Target session.
        session_id: u64,
        /// Frame to send.
        frame: Frame,
    },

    /// Close a session's connection.
    Close {
        /// Session to close.
        session_id: u64,
        /// Reason, for the log.
        reason: String,
    },

    /// Emit a log line.
    Log {
        /// Severity.
        level: LogLevel,
        /// Message.
        message: String,
    },
}

/// Routing state machine for the broker.
///
/// Sessions must complete a Connect/ConnAck handshake before subscribing
/// or publishing. Publishes fan out to every current subscriber of the
/// topic, the publisher included - exactly what a subscriber to its own
/// topic expects.
#[derive(Debug, Default)]
pub struct BrokerDriver {
    registry: SubscriptionRegistry,
}

impl BrokerDriver {
    /// Create a new driver with no sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions that completed the handshake.
    pub fn session_count(&self) -> usize {
        self.registry.session_count()
    }

    /// Process one event, returning the actions to execute.
    pub fn process_event(&mut self, event: BrokerEvent) -> Vec<BrokerAction> {
        match event {
            BrokerEvent::ConnectionAccepted { session_id } => {
                vec![BrokerAction::Log {
                    level: LogLevel::Debug,
                    message: format!("connection accepted: session {session_id:#018x}"),
                }]
            },

            BrokerEvent::FrameReceived { session_id, frame } => {
                self.handle_frame(session_id, frame)
            },

            BrokerEvent::ConnectionClosed { session_id } => {
                match self.registry.unregister_session(session_id) {
                    Some((info, _)) => vec![BrokerAction::Log {
                        level: LogLevel::Info,
                        message: format!("client '{}' disconnected", info.client_id),
                    }],
                    None => Vec::new(),
                }
            },
        }
    }

    fn handle_frame(&mut self, session_id: u64, frame: Frame) -> Vec<BrokerAction> {
        match frame.opcode {
            Opcode::Connect => self.handle_connect(session_id, &frame),

            Opcode::Subscribe => {
                if !self.registry.subscribe(session_id, &frame.topic) {
                    return vec![BrokerAction::Close {
                        session_id,
                        reason: "subscribe before connect".to_owned(),
                    }];
                }

                vec![
                    BrokerAction::Log {
                        level: LogLevel::Info,
                        message: format!(
                            "session {session_id:#018x} subscribed to '{}'",
                            frame.topic
                        ),
                    },
                    BrokerAction::SendToSession {
                        session_id,
                        frame: Frame::with_topic(Opcode::SubAck, frame.topic.clone()),
                    },
                ]
            },

            Opcode::Publish => {
                if !self.registry.is_registered(session_id) {
                    return vec![BrokerAction::Close {
                        session_id,
                        reason: "publish before connect".to_owned(),
                    }];
                }

                // Fan out to every subscriber, the publisher included
                self.registry
                    .subscribers(&frame.topic)
                    .map(|subscriber| BrokerAction::SendToSession {
                        session_id: subscriber,
                        frame: frame.clone(),
                    })
                    .collect()
            },

            Opcode::Ping => {
                vec![BrokerAction::SendToSession {
                    session_id,
                    frame: Frame::control(Opcode::Pong),
                }]
            },

            Opcode::Disconnect => {
                self.registry.unregister_session(session_id);
                vec![BrokerAction::Close { session_id, reason: "client disconnect".to_owned() }]
            },

            // Broker-to-client opcodes arriving from a client are a
            // protocol violation
            Opcode::ConnAck | Opcode::SubAck | Opcode::Pong => {
                vec![BrokerAction::Close {
                    session_id,
                    reason: format!("unexpected opcode {:#04x}", frame.opcode.to_u8()),
                }]
            },
        }
    }

    fn handle_connect(&mut self, session_id: u64, frame: &Frame) -> Vec<BrokerAction> {
        let client_id = String::from_utf8_lossy(&frame.payload).into_owned();

        if !self.registry.register_session(session_id, SessionInfo { client_id: client_id.clone() })
        {
            return vec![BrokerAction::Close {
                session_id,
                reason: "duplicate connect".to_owned(),
            }];
        }

        vec![
            BrokerAction::Log {
                level: LogLevel::Info,
                message: format!("client '{client_id}' connected"),
            },
            BrokerAction::SendToSession { session_id, frame: Frame::control(Opcode::ConnAck) },
        ]
    }
}
