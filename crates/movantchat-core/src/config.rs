//! Broker connection configuration.
//!
//! Host, port, keepalive, and the process-unique client identifier are
//! fixed at session creation and carried explicitly - nothing here is read
//! from ambient globals.

use std::time::Duration;

use crate::env::Environment;

/// Default broker port.
pub const DEFAULT_PORT: u16 = 1883;

/// Default keepalive interval.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(60);

/// Broker endpoint and session identity for one connection.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker hostname or address.
    pub host: String,
    /// Broker TCP port.
    pub port: u16,
    /// Keepalive interval; the client pings on this cadence and the broker
    /// drops connections silent for much longer than it.
    pub keepalive: Duration,
    /// Process-unique client identifier. Random per process so concurrent
    /// sessions never collide broker-side.
    pub client_id: String,
}

impl BrokerConfig {
    /// Configuration for a broker at `host` with default port and
    /// keepalive.
    pub fn new(host: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            keepalive: DEFAULT_KEEPALIVE,
            client_id: client_id.into(),
        }
    }
}

/// Generate a process-unique client identifier.
///
/// Random per process to avoid broker-side identifier collisions across
/// concurrent sessions sharing a machine.
pub fn random_client_id(env: &impl Environment) -> String {
    format!("movant-{:016x}", env.random_u64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SystemEnv;

    #[test]
    fn new_applies_defaults() {
        let config = BrokerConfig::new("127.0.0.1", "movant-test");

        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.keepalive, DEFAULT_KEEPALIVE);
        assert_eq!(config.client_id, "movant-test");
    }

    #[test]
    fn client_ids_are_process_unique() {
        let env = SystemEnv::new();

        let a = random_client_id(&env);
        let b = random_client_id(&env);

        assert!(a.starts_with("movant-"));
        assert_ne!(a, b);
    }
}
