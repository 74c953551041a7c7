//! Movantchat broker.
//!
//! Topic pub/sub broker the chat clients connect to. Routing-only: publish
//! payloads are sealed envelopes the broker cannot open, so it never
//! inspects them - it just fans frames out to topic subscribers.
//!
//! # Architecture
//!
//! [`BrokerDriver`] is the sans-IO core (events in, actions out);
//! [`Broker`] is the production runtime that executes its actions over TCP
//! with Tokio. The client crate reuses the same driver for its in-process
//! broker, which is what keeps end-to-end tests off the network.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod driver;
mod error;
mod registry;

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

pub use driver::{BrokerAction, BrokerDriver, BrokerEvent, LogLevel};
pub use error::BrokerError;
use movantchat_proto::{Frame, FrameHeader};
pub use registry::{SessionInfo, SubscriptionRegistry};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, tcp::OwnedReadHalf},
    sync::{Mutex, RwLock, mpsc},
};

/// Map of session ID to its outbound frame channel.
///
/// Dropping a session's sender ends its writer task.
type OutboundMap = Arc<RwLock<HashMap<u64, mpsc::Sender<Frame>>>>;

/// Broker runtime configuration.
#[derive(Debug, Clone)]
pub struct BrokerRuntimeConfig {
    /// Address to bind to (e.g. "0.0.0.0:1883").
    pub bind_address: String,
    /// Connections silent for longer than this are dropped. Clients ping
    /// on their keepalive interval, so this should comfortably exceed it.
    pub idle_timeout: Duration,
}

impl Default for BrokerRuntimeConfig {
    fn default() -> Self {
        Self { bind_address: "0.0.0.0:1883".to_owned(), idle_timeout: Duration::from_secs(120) }
    }
}

/// Production broker runtime.
///
/// Wraps [`BrokerDriver`] with a TCP accept loop and per-connection read
/// tasks.
pub struct Broker {
    listener: TcpListener,
    config: BrokerRuntimeConfig,
}

impl Broker {
    /// Bind the broker to its configured address.
    pub async fn bind(config: BrokerRuntimeConfig) -> Result<Self, BrokerError> {
        let listener = TcpListener::bind(&config.bind_address).await?;
        tracing::info!("broker bound to {}", config.bind_address);

        Ok(Self { listener, config })
    }

    /// Local address the broker is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, BrokerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Run the broker, accepting connections until the process exits.
    pub async fn run(self) -> Result<(), BrokerError> {
        let driver = Arc::new(Mutex::new(BrokerDriver::new()));
        let outbound: OutboundMap = Arc::new(RwLock::new(HashMap::new()));
        let idle_timeout = self.config.idle_timeout;

        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    tracing::debug!("accepted connection from {peer}");

                    let driver = Arc::clone(&driver);
                    let outbound = Arc::clone(&outbound);

                    tokio::spawn(async move {
                        if let Err(e) =
                            handle_connection(stream, driver, outbound, idle_timeout).await
                        {
                            tracing::debug!("connection ended with error: {e}");
                        }
                    });
                },
                Err(e) => {
                    tracing::error!("accept error: {e}");
                },
            }
        }
    }
}

/// Generate a random session identifier.
#[allow(clippy::expect_used)]
fn random_session_id() -> u64 {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf)
        .expect("invariant: OS RNG failure is unrecoverable for the broker");
    u64::from_be_bytes(buf)
}

/// Handle one client connection for its lifetime.
async fn handle_connection(
    stream: tokio::net::TcpStream,
    driver: Arc<Mutex<BrokerDriver>>,
    outbound: OutboundMap,
    idle_timeout: Duration,
) -> Result<(), BrokerError> {
    let session_id = random_session_id();
    let (mut reader, mut writer) = stream.into_split();

    let (tx, mut rx) = mpsc::channel::<Frame>(32);
    outbound.write().await.insert(session_id, tx);

    let writer_handle = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let mut buf = Vec::new();
            if frame.encode(&mut buf).is_err() {
                tracing::warn!("dropping unencodable outbound frame");
                continue;
            }
            if let Err(e) = writer.write_all(&buf).await {
                tracing::debug!("outbound write failed: {e}");
                break;
            }
        }
    });

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(BrokerEvent::ConnectionAccepted { session_id });
        execute_actions(session_id, actions, &outbound).await;
    }

    loop {
        let frame = match tokio::time::timeout(idle_timeout, read_frame(&mut reader)).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(e)) => {
                tracing::debug!("session {session_id:#018x} read ended: {e}");
                break;
            },
            Err(_) => {
                tracing::info!("session {session_id:#018x} idle for {idle_timeout:?}, dropping");
                break;
            },
        };

        // Actions are executed under the driver lock so acknowledgements
        // are enqueued before any other session can observe the state
        // change (a SubAck always precedes fan-out to the new subscriber)
        let closed = {
            let mut driver = driver.lock().await;
            let actions = driver.process_event(BrokerEvent::FrameReceived { session_id, frame });
            execute_actions(session_id, actions, &outbound).await
        };

        if closed {
            break;
        }
    }

    outbound.write().await.remove(&session_id);
    writer_handle.abort();

    {
        let mut driver = driver.lock().await;
        let actions = driver.process_event(BrokerEvent::ConnectionClosed { session_id });
        execute_actions(session_id, actions, &outbound).await;
    }

    Ok(())
}

/// Read one frame from the socket: header first, then exactly the body it
/// claims.
async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Frame, BrokerError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_buf).await?;

    let header = FrameHeader::parse(&header_buf)?;

    let mut body = vec![0u8; header.body_len()];
    if !body.is_empty() {
        reader.read_exact(&mut body).await?;
    }

    Ok(Frame::assemble(&header, &body)?)
}

/// Execute driver actions. Returns true if the current session was closed.
async fn execute_actions(
    our_session_id: u64,
    actions: Vec<BrokerAction>,
    outbound: &OutboundMap,
) -> bool {
    let mut closed_self = false;

    for action in actions {
        match action {
            BrokerAction::SendToSession { session_id, frame } => {
                // Clone the sender out so the map lock is not held across
                // the channel send
                let tx = outbound.read().await.get(&session_id).cloned();
                match tx {
                    Some(tx) => {
                        if tx.send(frame).await.is_err() {
                            tracing::debug!("send to departed session {session_id:#018x} dropped");
                        }
                    },
                    None => {
                        tracing::debug!("send to unknown session {session_id:#018x} dropped");
                    },
                }
            },

            BrokerAction::Close { session_id, reason } => {
                tracing::info!("closing session {session_id:#018x}: {reason}");
                outbound.write().await.remove(&session_id);
                if session_id == our_session_id {
                    closed_self = true;
                }
            },

            BrokerAction::Log { level, message } => match level {
                LogLevel::Debug => tracing::debug!("{message}"),
                LogLevel::Info => tracing::info!("{message}"),
                LogLevel::Warn => tracing::warn!("{message}"),
            },
        }
    }

    closed_self
}
