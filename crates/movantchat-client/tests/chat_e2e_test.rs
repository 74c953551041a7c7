//! End-to-end chat scenarios over the in-process broker.
//!
//! Multiple clients share one `LocalBroker`, so these cover the full
//! pipeline - handshake, subscribe, seal, fan-out, open - with no network.

use std::time::Duration;

use movantchat_client::{Chat, ChatEvent, PublishError, local::LocalBroker};
use movantchat_core::{BrokerConfig, SystemEnv, session::SessionState};
use movantchat_crypto::derive;
use tokio::time::timeout;

const TOPIC: &str = "movantchat/python";
const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

async fn start_chat(broker: &LocalBroker, username: &str, passphrase: &str) -> Chat<SystemEnv> {
    let config = BrokerConfig::new("127.0.0.1", format!("movant-{username}"));
    let link = broker.connect();

    Chat::start(username, TOPIC, derive(passphrase), &config, link, SystemEnv::new())
        .await
        .expect("chat should start")
}

async fn next_event(chat: &mut Chat<SystemEnv>) -> ChatEvent {
    timeout(EVENT_TIMEOUT, chat.next_event())
        .await
        .expect("timed out waiting for event")
        .expect("event stream ended unexpectedly")
}

#[tokio::test]
async fn happy_path_two_sessions_share_a_passphrase() {
    let broker = LocalBroker::new();
    let mut alice = start_chat(&broker, "alice", "secret").await;
    let mut bob = start_chat(&broker, "bob", "secret").await;

    alice.send("hi").await.unwrap();

    let event = next_event(&mut bob).await;
    assert_eq!(
        event,
        ChatEvent::Message { topic: TOPIC.to_owned(), text: "alice: hi".to_owned() }
    );

    // Fan-out includes the publisher: alice sees her own message back
    let event = next_event(&mut alice).await;
    assert_eq!(
        event,
        ChatEvent::Message { topic: TOPIC.to_owned(), text: "alice: hi".to_owned() }
    );
}

#[tokio::test]
async fn mismatched_passphrase_reports_and_session_continues() {
    let broker = LocalBroker::new();
    let alice = start_chat(&broker, "alice", "secret").await;
    let mut carol = start_chat(&broker, "carol", "different").await;
    let dave = start_chat(&broker, "dave", "different").await;

    // Alice's message reaches carol but cannot be opened with carol's key
    alice.send("hello").await.unwrap();

    let event = next_event(&mut carol).await;
    assert!(matches!(
        event,
        ChatEvent::DecryptFailed { ref topic, .. } if topic == TOPIC
    ));
    assert_eq!(carol.state().await, SessionState::Connected);

    // A later message from a peer sharing carol's passphrase still opens
    dave.send("psst").await.unwrap();

    let event = next_event(&mut carol).await;
    assert_eq!(
        event,
        ChatEvent::Message { topic: TOPIC.to_owned(), text: "dave: psst".to_owned() }
    );
}

#[tokio::test]
async fn exit_closes_and_is_idempotent() {
    let broker = LocalBroker::new();
    let mut alice = start_chat(&broker, "alice", "secret").await;

    alice.close().await;
    assert_eq!(alice.state().await, SessionState::Closed);

    // No further sends after exit
    assert_eq!(alice.send("too late").await, Err(PublishError::NotConnected));

    // Repeated exit is a no-op
    alice.close().await;
    assert_eq!(alice.state().await, SessionState::Closed);
}

#[tokio::test]
async fn one_session_closing_does_not_disturb_others() {
    let broker = LocalBroker::new();
    let mut alice = start_chat(&broker, "alice", "secret").await;
    let bob = start_chat(&broker, "bob", "secret").await;
    let mut carol = start_chat(&broker, "carol", "secret").await;

    alice.close().await;

    bob.send("still here").await.unwrap();

    let event = next_event(&mut carol).await;
    assert_eq!(
        event,
        ChatEvent::Message { topic: TOPIC.to_owned(), text: "bob: still here".to_owned() }
    );
}

#[tokio::test]
async fn sessions_on_other_topics_do_not_receive() {
    let broker = LocalBroker::new();
    let mut alice = start_chat(&broker, "alice", "secret").await;

    let config = BrokerConfig::new("127.0.0.1", "movant-eve");
    let mut eve = Chat::start(
        "eve",
        "movantchat/other",
        derive("secret"),
        &config,
        broker.connect(),
        SystemEnv::new(),
    )
    .await
    .expect("chat should start");

    alice.send("room-scoped").await.unwrap();

    // Alice gets her own message back; eve, on another topic, gets nothing
    let event = next_event(&mut alice).await;
    assert!(matches!(event, ChatEvent::Message { .. }));

    let nothing = timeout(Duration::from_millis(200), eve.next_event()).await;
    assert!(nothing.is_err(), "eve should not receive messages for another topic");
}
