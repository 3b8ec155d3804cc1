//! Domain events: the wire-level record the event store persists, and the
//! typed trait concrete aggregate events implement.
//!
//! Events represent facts that have occurred to one aggregate. They are
//! immutable and form the basis of event sourcing: an aggregate's state is
//! nothing more than the fold of its events in version order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Base trait for all concrete domain events produced by an aggregate.
///
/// Each aggregate kind defines its own enum of event structs implementing
/// this trait; the event store never inspects `payload` beyond storing and
/// returning the bytes it was given. Only the owning aggregate's `apply`
/// deserializes it.
pub trait DomainEvent: Send + Sync + std::fmt::Debug {
    /// Short tag naming the kind of transition, e.g. `"ContentRequested"`.
    fn event_type(&self) -> &'static str;

    /// Schema version tag for forward-compatible payload evolution.
    fn schema_version(&self) -> &'static str {
        "v1"
    }
}

/// Cross-cutting context carried alongside an event, orthogonal to its
/// payload: who caused it, and what request it belongs to.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventMetadata {
    /// Correlation id shared by every event produced by one logical command
    pub correlation_id: Option<Uuid>,
    /// Id of the event that caused this one to be raised, if any
    pub causation_id: Option<Uuid>,
    /// Id of the actor (user or system) that triggered the originating command
    pub actor_id: Option<String>,
    /// Free-form additional context
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl EventMetadata {
    /// Metadata for an event caused directly by an external command, with a
    /// fresh correlation id and no causation chain yet.
    pub fn root(correlation_id: Uuid, actor_id: Option<String>) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            causation_id: None,
            actor_id,
            custom: HashMap::new(),
        }
    }

    /// Metadata for an event caused by another event, carrying the same
    /// correlation id forward and setting causation to the triggering event.
    pub fn caused_by(correlation_id: Uuid, causing_event_id: Uuid) -> Self {
        Self {
            correlation_id: Some(correlation_id),
            causation_id: Some(causing_event_id),
            actor_id: None,
            custom: HashMap::new(),
        }
    }
}

/// A single committed (or about-to-be-committed) state transition for one
/// aggregate.
///
/// `(aggregate_id, version)` is unique and dense starting at 1 for every
/// aggregate once events begin committing for it. Events are immutable once
/// committed: nothing in this crate ever updates or removes an `Event` row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Globally unique identifier, assigned at creation via an [`crate::ports::IdGen`]
    pub id: Uuid,
    /// Identifier of the owning aggregate, stable across its lifetime
    pub aggregate_id: Uuid,
    /// Short tag naming the aggregate class, e.g. `"content_generation"`
    pub aggregate_type: String,
    /// Short tag naming the kind of transition, e.g. `"ContentRequested"`
    pub event_type: String,
    /// Opaque, schema-versioned, serialized event-specific fields
    pub payload: serde_json::Value,
    /// Opaque cross-cutting context
    pub metadata: EventMetadata,
    /// Dense 1-based sequence number within `aggregate_id`
    pub version: u64,
    /// Server-assigned commit time, monotonic within an aggregate
    pub timestamp: DateTime<Utc>,
}

impl Event {
    /// Build an event ready to append, leaving `id`/`version`/`timestamp` to
    /// be assigned by the caller (typically `AggregateRepository::save`,
    /// which owns the `IdGen`/`Clock` ports).
    pub fn new(
        aggregate_id: Uuid,
        aggregate_type: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
        metadata: EventMetadata,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            aggregate_id,
            aggregate_type: aggregate_type.into(),
            event_type: event_type.into(),
            payload,
            metadata,
            version: 0,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    /// Deserialize the payload into a concrete event type. Used by
    /// aggregates inside `apply`; never by the store itself.
    pub fn deserialize_payload<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
    struct TestPayload {
        value: String,
    }

    #[test]
    fn event_new_defaults_are_placeholders() {
        let aggregate_id = Uuid::new_v4();
        let event = Event::new(
            aggregate_id,
            "content_generation",
            "ContentRequested",
            serde_json::json!({"topic": "fractions"}),
            EventMetadata::default(),
        );
        assert_eq!(event.aggregate_id, aggregate_id);
        assert_eq!(event.aggregate_type, "content_generation");
        assert_eq!(event.version, 0);
        assert!(event.id.is_nil());
    }

    #[test]
    fn event_payload_roundtrip() {
        let payload = TestPayload {
            value: "hello".to_string(),
        };
        let event = Event::new(
            Uuid::new_v4(),
            "test",
            "TestHappened",
            serde_json::to_value(&payload).unwrap(),
            EventMetadata::default(),
        );
        let decoded: TestPayload = event.deserialize_payload().unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn metadata_root_has_no_causation() {
        let correlation_id = Uuid::new_v4();
        let meta = EventMetadata::root(correlation_id, Some("user-1".to_string()));
        assert_eq!(meta.correlation_id, Some(correlation_id));
        assert!(meta.causation_id.is_none());
        assert_eq!(meta.actor_id.as_deref(), Some("user-1"));
    }

    #[test]
    fn metadata_caused_by_carries_correlation_forward() {
        let correlation_id = Uuid::new_v4();
        let causing_event_id = Uuid::new_v4();
        let meta = EventMetadata::caused_by(correlation_id, causing_event_id);
        assert_eq!(meta.correlation_id, Some(correlation_id));
        assert_eq!(meta.causation_id, Some(causing_event_id));
    }

    #[test]
    fn event_metadata_serde_roundtrip() {
        let meta = EventMetadata::root(Uuid::new_v4(), Some("actor".to_string()));
        let json = serde_json::to_string(&meta).unwrap();
        let back: EventMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(meta, back);
    }
}
