//! In-process broker.
//!
//! Runs the real [`BrokerDriver`] over channels - no network, no sockets.
//! Used by the end-to-end tests for deterministic multi-client scenarios
//! and by the CLI's simulation mode. Each [`LocalBroker::connect`] call
//! produces the same [`BrokerLink`] shape the TCP transport does, so the
//! layers above cannot tell the difference.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use movantchat_broker::{BrokerAction, BrokerDriver, BrokerEvent, LogLevel};
use movantchat_proto::Frame;
use tokio::sync::{Mutex, mpsc};

use crate::transport::{BrokerLink, LinkStopper};

/// Shared map of session ID to outbound frame channel.
type OutboundMap = Arc<Mutex<HashMap<u64, mpsc::Sender<Frame>>>>;

/// In-process broker backed by the production driver.
///
/// Cheap to clone-share via its interior `Arc`s; all connected links talk
/// to the same driver, so clients connected to one `LocalBroker` see each
/// other's publishes.
#[derive(Debug, Default)]
pub struct LocalBroker {
    driver: Arc<Mutex<BrokerDriver>>,
    outbound: OutboundMap,
    next_session_id: AtomicU64,
}

impl LocalBroker {
    /// Create an empty in-process broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect a new client, returning its link.
    ///
    /// Spawns a task that feeds the client's frames through the broker
    /// driver; the link's stopper aborts it.
    pub fn connect(&self) -> BrokerLink {
        let session_id = self.next_session_id.fetch_add(1, Ordering::Relaxed);

        let (to_broker_tx, mut to_broker_rx) = mpsc::channel::<Frame>(32);
        let (from_broker_tx, from_broker_rx) = mpsc::channel::<Frame>(32);

        let driver = Arc::clone(&self.driver);
        let outbound = Arc::clone(&self.outbound);

        let handle = tokio::spawn(async move {
            outbound.lock().await.insert(session_id, from_broker_tx);

            {
                let mut driver = driver.lock().await;
                let actions = driver.process_event(BrokerEvent::ConnectionAccepted { session_id });
                drop(driver);
                execute_actions(session_id, actions, &outbound).await;
            }

            while let Some(frame) = to_broker_rx.recv().await {
                // Execute under the driver lock so acknowledgements are
                // enqueued before any other session observes the state
                // change
                let closed = {
                    let mut driver = driver.lock().await;
                    let actions =
                        driver.process_event(BrokerEvent::FrameReceived { session_id, frame });
                    execute_actions(session_id, actions, &outbound).await
                };

                if closed {
                    break;
                }
            }

            outbound.lock().await.remove(&session_id);

            let actions = {
                let mut driver = driver.lock().await;
                driver.process_event(BrokerEvent::ConnectionClosed { session_id })
            };
            execute_actions(session_id, actions, &outbound).await;
        });

        BrokerLink {
            to_broker: to_broker_tx,
            from_broker: from_broker_rx,
            stopper: LinkStopper::new(handle.abort_handle()),
        }
    }
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
                let tx = outbound.lock().await.get(&session_id).cloned();
                if let Some(tx) = tx {
                    if tx.send(frame).await.is_err() {
                        tracing::debug!("local send to departed session {session_id} dropped");
                    }
                }
            },

            BrokerAction::Close { session_id, reason } => {
                tracing::debug!("local broker closing session {session_id}: {reason}");
                outbound.lock().await.remove(&session_id);
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
