use std::time::Duration;

use serde::Deserialize;

use crate::broker::{RelayPolicy, RetentionPolicy};

/// Top-level configuration settings for the relay.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub relay: RelaySettings,
}

/// Where the server listens and how many connections it accepts.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub max_connections: usize,
}

/// Relay behavior and the topics brought online at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct RelaySettings {
    pub echo_to_sender: bool,
    pub send_timeout_ms: u64,
    pub queue_capacity: usize,
    pub dynamic_topics: bool,
    pub reap_empty_topics: bool,
    pub topics: Vec<String>,
}

impl RelaySettings {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn policy(&self) -> RelayPolicy {
        RelayPolicy {
            echo_to_sender: self.echo_to_sender,
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        if self.reap_empty_topics {
            RetentionPolicy::ReapEmpty
        } else {
            RetentionPolicy::Retain
        }
    }
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Deserialize, Default)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub relay: Option<PartialRelaySettings>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PartialRelaySettings {
    pub echo_to_sender: Option<bool>,
    pub send_timeout_ms: Option<u64>,
    pub queue_capacity: Option<usize>,
    pub dynamic_topics: Option<bool>,
    pub reap_empty_topics: Option<bool>,
    pub topics: Option<Vec<String>>,
}

impl PartialSettings {
    pub fn merge_onto(self, base: Settings) -> Settings {
        let server = self.server.unwrap_or_default();
        let relay = self.relay.unwrap_or_default();

        Settings {
            server: ServerSettings {
                host: server.host.unwrap_or(base.server.host),
                port: server.port.unwrap_or(base.server.port),
                max_connections: server
                    .max_connections
                    .unwrap_or(base.server.max_connections),
            },
            relay: RelaySettings {
                echo_to_sender: relay.echo_to_sender.unwrap_or(base.relay.echo_to_sender),
                send_timeout_ms: relay.send_timeout_ms.unwrap_or(base.relay.send_timeout_ms),
                queue_capacity: relay.queue_capacity.unwrap_or(base.relay.queue_capacity),
                dynamic_topics: relay.dynamic_topics.unwrap_or(base.relay.dynamic_topics),
                reap_empty_topics: relay
                    .reap_empty_topics
                    .unwrap_or(base.relay.reap_empty_topics),
                topics: relay.topics.unwrap_or(base.relay.topics),
            },
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
                max_connections: 1000,
            },
            relay: RelaySettings {
                echo_to_sender: true,
                send_timeout_ms: 5000,
                queue_capacity: 256,
                dynamic_topics: false,
                reap_empty_topics: false,
                topics: Vec::new(),
            },
        }
    }
}
