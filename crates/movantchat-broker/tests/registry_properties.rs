//! Subscription registry property tests.
//!
//! Applies arbitrary operation sequences and checks the bidirectional
//! maps stay consistent: every subscriber of every topic is a registered
//! session, and the session count matches a reference model.

use std::collections::HashSet;

use movantchat_broker::{SessionInfo, SubscriptionRegistry};
use proptest::prelude::*;

const TOPICS: [&str; 3] = ["movantchat/python", "movantchat/rust", "movantchat/ml"];

#[derive(Debug, Clone)]
enum Op {
    Register(u64),
    Unregister(u64),
    Subscribe(u64, usize),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    let session = 0u64..8;
    prop_oneof![
        session.clone().prop_map(Op::Register),
        session.clone().prop_map(Op::Unregister),
        (session, 0usize..TOPICS.len()).prop_map(|(s, t)| Op::Subscribe(s, t)),
    ]
}

proptest! {
    #[test]
    fn registry_stays_consistent(ops in proptest::collection::vec(op_strategy(), 0..64)) {
        let mut registry = SubscriptionRegistry::new();
        let mut model: HashSet<u64> = HashSet::new();

        for op in ops {
            match op {
                Op::Register(session) => {
                    let inserted = registry.register_session(
                        session,
                        SessionInfo { client_id: format!("movant-{session}") },
                    );
                    prop_assert_eq!(inserted, model.insert(session));
                },
                Op::Unregister(session) => {
                    let removed = registry.unregister_session(session).is_some();
                    prop_assert_eq!(removed, model.remove(&session));
                },
                Op::Subscribe(session, topic) => {
                    let subscribed = registry.subscribe(session, TOPICS[topic]);
                    prop_assert_eq!(subscribed, model.contains(&session));
                },
            }
        }

        prop_assert_eq!(registry.session_count(), model.len());

        // Every subscriber of every topic is a live, registered session
        for topic in TOPICS {
            for subscriber in registry.subscribers(topic) {
                prop_assert!(model.contains(&subscriber));
                prop_assert!(registry.is_registered(subscriber));
            }
        }
    }
}
