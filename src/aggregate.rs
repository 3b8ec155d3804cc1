//! Aggregate trait: the fold of an event stream into current state.
//!
//! An aggregate's entire state is derived from replaying its events in
//! version order, optionally starting from a snapshot. Aggregates never
//! talk to storage directly; `AggregateRepository` owns that.

use crate::errors::DomainResult;
use crate::events::Event;
use uuid::Uuid;

/// A type whose state is the fold of a stream of events.
///
/// Implementors keep a buffer of events raised but not yet committed
/// (`uncommitted_events`), so a single command can raise several events and
/// have them appended together by the repository in one call.
pub trait Aggregate: Default + Send + Sync {
    /// Short tag naming this aggregate class, matching `Event::aggregate_type`
    const AGGREGATE_TYPE: &'static str;

    /// This aggregate's identity
    fn id(&self) -> Uuid;

    /// Current version: the version of the last event folded into this
    /// aggregate, or 0 if none have been applied yet
    fn version(&self) -> u64;

    /// Fold one historical event into state, advancing `version`.
    ///
    /// Called both during replay (from the repository) and immediately
    /// after `raise` (so command handlers always observe up-to-date
    /// state). Must never fail on an event this aggregate itself produced;
    /// payload shape mismatches are a programmer error, not a domain error.
    fn apply(&mut self, event: &Event);

    /// Events raised since the last `mark_committed`, oldest first
    fn uncommitted_events(&self) -> &[Event];

    /// Clear the uncommitted buffer after the repository has durably
    /// appended them
    fn mark_committed(&mut self);

    /// Rebuild an aggregate from its full history (snapshot state, if any,
    /// has already been applied by the caller; `history` is the event tail
    /// after the snapshot's version).
    fn load_from_history(history: &[Event]) -> Self
    where
        Self: Sized,
    {
        let mut aggregate = Self::default();
        for event in history {
            aggregate.apply(event);
        }
        aggregate
    }
}

/// Helper for aggregate `raise` implementations: builds an `Event` from a
/// concrete payload and metadata, appends it to the given uncommitted
/// buffer, and applies it immediately. `version` is the version the event
/// will occupy once committed (the caller's current version + 1 + however
/// many events are already pending in this command).
pub fn raise_event<T: serde::Serialize>(
    aggregate_id: Uuid,
    aggregate_type: &'static str,
    event_type: &'static str,
    version: u64,
    payload: &T,
    metadata: crate::events::EventMetadata,
) -> DomainResult<Event> {
    let payload = serde_json::to_value(payload)?;
    Ok(Event {
        id: Uuid::nil(),
        aggregate_id,
        aggregate_type: aggregate_type.to_string(),
        event_type: event_type.to_string(),
        payload,
        metadata,
        version,
        timestamp: chrono::DateTime::<chrono::Utc>::UNIX_EPOCH,
    })
}
