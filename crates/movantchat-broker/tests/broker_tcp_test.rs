//! Broker behavior over a real TCP socket.
//!
//! Drives the broker with hand-built frames to pin the wire-level
//! handshake and fan-out behavior independently of the client crate.

use std::time::Duration;

use movantchat_broker::{Broker, BrokerRuntimeConfig};
use movantchat_proto::{Frame, FrameHeader, Opcode};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

const TOPIC: &str = "movantchat/python";

async fn spawn_broker(idle_timeout: Duration) -> u16 {
    let broker = Broker::bind(BrokerRuntimeConfig {
        bind_address: "127.0.0.1:0".to_owned(),
        idle_timeout,
    })
    .await
    .expect("broker should bind");

    let port = broker.local_addr().expect("broker should have an address").port();
    tokio::spawn(broker.run());
    port
}

async fn send_frame(stream: &mut TcpStream, frame: &Frame) {
    let mut buf = Vec::new();
    frame.encode(&mut buf).expect("frame should encode");
    stream.write_all(&buf).await.expect("write should succeed");
}

async fn read_frame(stream: &mut TcpStream) -> std::io::Result<Frame> {
    let mut header_buf = [0u8; FrameHeader::SIZE];
    stream.read_exact(&mut header_buf).await?;

    let header = FrameHeader::parse(&header_buf)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut body = vec![0u8; header.body_len()];
    if !body.is_empty() {
        stream.read_exact(&mut body).await?;
    }

    Frame::assemble(&header, &body)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

async fn connect_client(port: u16, client_id: &str) -> TcpStream {
    let mut stream =
        TcpStream::connect(("127.0.0.1", port)).await.expect("connect should succeed");

    send_frame(&mut stream, &Frame::new(Opcode::Connect, "", client_id.as_bytes().to_vec()))
        .await;

    let ack = read_frame(&mut stream).await.expect("broker should reply");
    assert_eq!(ack.opcode, Opcode::ConnAck);

    stream
}

#[tokio::test]
async fn connect_subscribe_publish_round_trip() {
    let port = spawn_broker(Duration::from_secs(30)).await;
    let mut client = connect_client(port, "movant-raw").await;

    send_frame(&mut client, &Frame::with_topic(Opcode::Subscribe, TOPIC)).await;
    let ack = read_frame(&mut client).await.expect("broker should reply");
    assert_eq!(ack.opcode, Opcode::SubAck);
    assert_eq!(ack.topic, TOPIC);

    // Fan-out includes the publisher
    send_frame(&mut client, &Frame::new(Opcode::Publish, TOPIC, b"sealed bytes".to_vec())).await;
    let echoed = read_frame(&mut client).await.expect("broker should fan out");
    assert_eq!(echoed.opcode, Opcode::Publish);
    assert_eq!(echoed.topic, TOPIC);
    assert_eq!(echoed.payload.as_ref(), b"sealed bytes");
}

#[tokio::test]
async fn publish_reaches_other_subscriber() {
    let port = spawn_broker(Duration::from_secs(30)).await;

    let mut publisher = connect_client(port, "movant-pub").await;
    let mut subscriber = connect_client(port, "movant-sub").await;

    send_frame(&mut subscriber, &Frame::with_topic(Opcode::Subscribe, TOPIC)).await;
    let ack = read_frame(&mut subscriber).await.expect("broker should reply");
    assert_eq!(ack.opcode, Opcode::SubAck);

    send_frame(&mut publisher, &Frame::new(Opcode::Publish, TOPIC, b"hello".to_vec())).await;

    let delivered = read_frame(&mut subscriber).await.expect("subscriber should receive");
    assert_eq!(delivered.opcode, Opcode::Publish);
    assert_eq!(delivered.payload.as_ref(), b"hello");
}

#[tokio::test]
async fn ping_gets_pong() {
    let port = spawn_broker(Duration::from_secs(30)).await;
    let mut client = connect_client(port, "movant-ping").await;

    send_frame(&mut client, &Frame::control(Opcode::Ping)).await;
    let pong = read_frame(&mut client).await.expect("broker should reply");
    assert_eq!(pong.opcode, Opcode::Pong);
}

#[tokio::test]
async fn publish_before_connect_drops_the_connection() {
    let port = spawn_broker(Duration::from_secs(30)).await;
    let mut stream =
        TcpStream::connect(("127.0.0.1", port)).await.expect("connect should succeed");

    send_frame(&mut stream, &Frame::new(Opcode::Publish, TOPIC, b"rogue".to_vec())).await;

    // The broker closes the connection without replying
    let result = read_frame(&mut stream).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn idle_connection_is_dropped() {
    let port = spawn_broker(Duration::from_millis(100)).await;
    let mut client = connect_client(port, "movant-idle").await;

    // Send nothing; the broker should hang up after the idle timeout
    let result = read_frame(&mut client).await;
    assert!(result.is_err());
}
