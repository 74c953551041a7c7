//! Subscription registry for session and topic tracking.
//!
//! Maintains bidirectional mappings: topic → sessions (for fan-out) and
//! session → topics (for cleanup on disconnect). Unregistering a session
//! removes all its subscriptions from both sides.

use std::collections::{HashMap, HashSet};

/// Information about a registered session.
#[derive(Debug, Clone)]
pub struct SessionInfo {
    /// Client identifier announced in the Connect frame.
    pub client_id: String,
}

/// Registry tracking connected sessions and their topic subscriptions.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Session ID → session info
    sessions: HashMap<u64, SessionInfo>,
    /// Topic → set of subscribed session IDs
    topic_subscribers: HashMap<String, HashSet<u64>>,
    /// Session ID → set of subscribed topics
    session_topics: HashMap<u64, HashSet<String>>,
}

impl SubscriptionRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Returns `false` if the session already exists.
    pub fn register_session(&mut self, session_id: u64, info: SessionInfo) -> bool {
        if self.sessions.contains_key(&session_id) {
            return false;
        }

        self.sessions.insert(session_id, info);
        self.session_topics.insert(session_id, HashSet::new());
        true
    }

    /// Unregister a session and remove all its subscriptions.
    ///
    /// Returns the session info and the topics it was subscribed to, if it
    /// existed.
    pub fn unregister_session(
        &mut self,
        session_id: u64,
    ) -> Option<(SessionInfo, HashSet<String>)> {
        let info = self.sessions.remove(&session_id)?;
        let topics = self.session_topics.remove(&session_id).unwrap_or_default();

        for topic in &topics {
            if let Some(subscribers) = self.topic_subscribers.get_mut(topic) {
                subscribers.remove(&session_id);
                if subscribers.is_empty() {
                    self.topic_subscribers.remove(topic);
                }
            }
        }

        Some((info, topics))
    }

    /// Whether a session has completed the Connect handshake.
    pub fn is_registered(&self, session_id: u64) -> bool {
        self.sessions.contains_key(&session_id)
    }

    /// Session metadata. `None` if the session doesn't exist.
    pub fn session(&self, session_id: u64) -> Option<&SessionInfo> {
        self.sessions.get(&session_id)
    }

    /// Subscribe a session to a topic.
    ///
    /// Returns `false` if the session is not registered; `true` otherwise,
    /// including for repeated subscriptions (idempotent).
    pub fn subscribe(&mut self, session_id: u64, topic: &str) -> bool {
        let Some(topics) = self.session_topics.get_mut(&session_id) else {
            return false;
        };

        topics.insert(topic.to_owned());
        self.topic_subscribers.entry(topic.to_owned()).or_default().insert(session_id);
        true
    }

    /// Sessions currently subscribed to a topic.
    pub fn subscribers(&self, topic: &str) -> impl Iterator<Item = u64> + '_ {
        self.topic_subscribers.get(topic).into_iter().flatten().copied()
    }

    /// Number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
