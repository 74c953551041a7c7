//! TCP transport to the broker.
//!
//! Provides [`BrokerLink`], a channel-based handle to a connected broker.
//! This is a thin layer that moves frames between the socket and the
//! channels - session logic stays in the sans-IO core. The spawned I/O
//! task also emits keepalive pings on the configured interval.

use std::time::Duration;

use movantchat_core::BrokerConfig;
use movantchat_proto::{Frame, FrameHeader, Opcode, ProtoError};
use thiserror::Error;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpStream, tcp::OwnedReadHalf, tcp::OwnedWriteHalf},
    sync::mpsc,
    task::AbortHandle,
};

use crate::error::ConnectError;

/// Socket-level failures inside the link I/O task.
#[derive(Debug, Error)]
enum LinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Proto(#[from] ProtoError),
}

/// Handle for stopping a link's background delivery loop.
///
/// Stopping is idempotent; a stopped link's channels simply close.
#[derive(Debug, Clone)]
pub struct LinkStopper(Option<AbortHandle>);

impl LinkStopper {
    /// Stopper for a spawned link task.
    pub(crate) fn new(handle: AbortHandle) -> Self {
        Self(Some(handle))
    }

    /// Stop the background delivery loop.
    pub fn stop(&self) {
        if let Some(handle) = &self.0 {
            handle.abort();
        }
    }
}

/// Handle to a connected broker.
///
/// Frames are sent and received via the channels; a background task owns
/// the actual I/O. Both the TCP transport and [`crate::local::LocalBroker`]
/// produce this shape, so everything above it is transport-agnostic.
#[derive(Debug)]
pub struct BrokerLink {
    /// Send frames to the broker.
    pub to_broker: mpsc::Sender<Frame>,
    /// Receive frames from the broker.
    pub from_broker: mpsc::Receiver<Frame>,
    /// Stops the background delivery loop.
    pub stopper: LinkStopper,
}

/// Connect to a broker over TCP.
///
/// Returns a [`BrokerLink`] once the socket is established. The protocol
/// handshake (Connect/ConnAck) is driven by the session layer on top of
/// the returned channels, not here.
///
/// # Errors
///
/// [`ConnectError::Transport`] if the TCP connect fails. Fatal: callers
/// must not retry.
pub async fn connect(config: &BrokerConfig) -> Result<BrokerLink, ConnectError> {
    let addr = format!("{}:{}", config.host, config.port);
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| ConnectError::Transport(format!("connect to {addr} failed: {e}")))?;

    tracing::debug!("connected to broker at {addr}");

    let (to_broker_tx, to_broker_rx) = mpsc::channel::<Frame>(32);
    let (from_broker_tx, from_broker_rx) = mpsc::channel::<Frame>(32);

    let handle = tokio::spawn(run_link(stream, to_broker_rx, from_broker_tx, config.keepalive));

    Ok(BrokerLink {
        to_broker: to_broker_tx,
        from_broker: from_broker_rx,
        stopper: LinkStopper::new(handle.abort_handle()),
    })
}

/// Run the link, bridging between the channels and the socket.
async fn run_link(
    stream: TcpStream,
    mut to_broker: mpsc::Receiver<Frame>,
    from_broker: mpsc::Sender<Frame>,
    keepalive: Duration,
) {
    let (mut reader, mut writer) = stream.into_split();

    let recv_handle = tokio::spawn(async move {
        loop {
            match read_frame(&mut reader).await {
                Ok(frame) => {
                    if from_broker.send(frame).await.is_err() {
                        break;
                    }
                },
                Err(e) => {
                    tracing::debug!("broker read ended: {e}");
                    break;
                },
            }
        }
    });

    // First ping one keepalive interval after connect, not immediately
    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + keepalive, keepalive);

    loop {
        tokio::select! {
            maybe_frame = to_broker.recv() => {
                let Some(frame) = maybe_frame else { break };
                if let Err(e) = write_frame(&mut writer, &frame).await {
                    tracing::warn!("broker write failed: {e}");
                    break;
                }
            }

            _ = ping_interval.tick() => {
                if let Err(e) = write_frame(&mut writer, &Frame::control(Opcode::Ping)).await {
                    tracing::warn!("keepalive ping failed: {e}");
                    break;
                }
            }
        }
    }

    recv_handle.abort();
}

/// Read one frame from the socket.
async fn read_frame(reader: &mut OwnedReadHalf) -> Result<Frame, LinkError> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    reader.read_exact(&mut header_buf).await?;

    let header = FrameHeader::parse(&header_buf)?;

    let mut body = vec![0u8; header.body_len()];
    if !body.is_empty() {
        reader.read_exact(&mut body).await?;
    }

    Ok(Frame::assemble(&header, &body)?)
}

/// Encode and write one frame to the socket.
async fn write_frame(writer: &mut OwnedWriteHalf, frame: &Frame) -> Result<(), LinkError> {
    let mut buf = Vec::new();
    frame.encode(&mut buf)?;
    writer.write_all(&buf).await?;
    Ok(())
}
