//! Configuration surface for the aggregate store.
//!
//! Mirrors the teacher's convention of one `serde`-deserializable struct per
//! concern with a `Default` impl giving sane local-dev values, assembled
//! into a single root config callers load from file or environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which `EventBus` implementation to construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventBusKind {
    /// In-process `InMemoryEventBus`, no external dependency
    Memory,
    /// NATS JetStream-backed `NatsEventBus`
    Broker,
}

impl Default for EventBusKind {
    fn default() -> Self {
        Self::Memory
    }
}

/// Event bus configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventBusConfig {
    /// Which implementation to construct
    #[serde(rename = "type")]
    pub kind: EventBusKind,
    /// Connection string, required when `kind` is `Broker`
    pub broker_uri: Option<String>,
    /// Per-subscriber bounded channel capacity for the in-memory bus
    pub channel_capacity: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            kind: EventBusKind::Memory,
            broker_uri: None,
            channel_capacity: 1024,
        }
    }
}

/// Storage pool and timeout configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Database connection string; ignored by the in-memory stores
    pub url: Option<String>,
    /// Minimum pool size
    pub pool_min: u32,
    /// Maximum pool size
    pub pool_max: u32,
    /// Per-call deadline
    #[serde(with = "humantime_secs")]
    pub query_timeout: Duration,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_min: 1,
            pool_max: 10,
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// Projector retry and dead-letter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectorConfig {
    /// Bus delivery retry ceiling before a message is sent to the dead-letter sink
    pub max_retries: u32,
    /// Storage location tag for poison messages (interpreted by the `DeadLetterSink` in use)
    pub dead_letter_sink: String,
    /// Base delay for exponential backoff between retries
    #[serde(with = "humantime_secs")]
    pub retry_base_delay: Duration,
}

impl Default for ProjectorConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            dead_letter_sink: "in_memory".to_string(),
            retry_base_delay: Duration::from_millis(100),
        }
    }
}

/// Snapshot behavior configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// May be set false for tests that want to force full replay every load
    pub enabled: bool,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Root configuration assembled from the sections above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Event bus settings
    #[serde(default)]
    pub event_bus: EventBusConfig,
    /// Storage settings
    #[serde(default)]
    pub db: DbConfig,
    /// Projector retry settings
    #[serde(default)]
    pub projector: ProjectorConfig,
    /// Snapshot settings
    #[serde(default)]
    pub snapshot: SnapshotConfig,
}

mod humantime_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_local_dev_expectations() {
        let config = AppConfig::default();
        assert_eq!(config.event_bus.kind, EventBusKind::Memory);
        assert_eq!(config.event_bus.channel_capacity, 1024);
        assert_eq!(config.db.pool_max, 10);
        assert_eq!(config.projector.max_retries, 5);
        assert!(config.snapshot.enabled);
    }

    #[test]
    fn config_serde_roundtrip() {
        let config = AppConfig {
            event_bus: EventBusConfig {
                kind: EventBusKind::Broker,
                broker_uri: Some("nats://localhost:4222".to_string()),
                channel_capacity: 2048,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.event_bus.kind, EventBusKind::Broker);
        assert_eq!(back.event_bus.broker_uri.as_deref(), Some("nats://localhost:4222"));
        assert_eq!(back.event_bus.channel_capacity, 2048);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let json = r#"{"projector": {"max_retries": 3, "dead_letter_sink": "postgres", "retry_base_delay": 0.05}}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.projector.max_retries, 3);
        assert_eq!(config.event_bus.kind, EventBusKind::Memory);
    }
}
