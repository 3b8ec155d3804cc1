//! Durable, append-only event log keyed by aggregate identity.
//!
//! Enforces per-aggregate monotonic version and optimistic concurrency.
//! Two implementations are provided: [`InMemoryEventStore`] for tests and
//! single-process deployments, and [`PostgresEventStore`] for production,
//! grounded in the same transaction-then-unique-index pattern sketched in
//! the reference CQRS event store crate this project draws from.

use crate::events::Event;
use crate::ports::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by an `EventStore` implementation.
#[derive(Debug, Error)]
pub enum EventStoreError {
    /// Current max version for the aggregate did not match `expected_version`
    #[error("concurrency conflict for aggregate {aggregate_id}: expected {expected}, found {actual}")]
    ConcurrencyConflict {
        /// Aggregate whose version check failed
        aggregate_id: Uuid,
        /// Version the caller expected
        expected: u64,
        /// Version actually recorded in the store
        actual: u64,
    },

    /// The event batch was empty, had non-contiguous versions, or mixed
    /// aggregate ids
    #[error("invalid event batch: {0}")]
    InvalidBatch(String),

    /// Underlying I/O or serialization failure
    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(feature = "postgres-tests")]
impl From<sqlx::Error> for EventStoreError {
    fn from(err: sqlx::Error) -> Self {
        EventStoreError::Storage(err.to_string())
    }
}

/// Durable, append-only log of domain events.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append a non-empty, contiguous batch of events for one aggregate.
    ///
    /// `expected_version` is the version the caller believes the aggregate
    /// is currently at; the batch's events must carry versions
    /// `expected_version + 1 ..= expected_version + events.len()`.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        events: Vec<Event>,
        expected_version: u64,
    ) -> Result<(), EventStoreError>;

    /// Ordered sequence of events for one aggregate with `version >
    /// from_version`, ascending by version.
    async fn get_events(
        &self,
        aggregate_id: Uuid,
        from_version: u64,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// Events across all aggregates of one type, ordered by `(timestamp,
    /// aggregate_id, version)`, used by projectors recovering from a
    /// checkpoint.
    async fn get_events_by_type(
        &self,
        aggregate_type: &str,
        since_timestamp: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError>;

    /// Current max committed version for an aggregate, 0 if none.
    async fn current_version(&self, aggregate_id: Uuid) -> Result<u64, EventStoreError>;
}

fn validate_batch(aggregate_id: Uuid, events: &[Event], expected_version: u64) -> Result<(), EventStoreError> {
    if events.is_empty() {
        return Err(EventStoreError::InvalidBatch("batch must not be empty".to_string()));
    }
    for (i, event) in events.iter().enumerate() {
        if event.aggregate_id != aggregate_id {
            return Err(EventStoreError::InvalidBatch(format!(
                "event at index {i} has aggregate_id {} but batch is for {aggregate_id}",
                event.aggregate_id
            )));
        }
        let want = expected_version + i as u64 + 1;
        if event.version != want {
            return Err(EventStoreError::InvalidBatch(format!(
                "event at index {i} has version {} but expected {want}",
                event.version
            )));
        }
    }
    Ok(())
}

/// In-process event store backed by a `Mutex<HashMap>`. Ordering within an
/// aggregate's vector is commit order, which is version order since
/// `append_events` rejects out-of-sequence batches.
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<Uuid, Vec<Event>>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryEventStore {
    /// New, empty store with the real system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// New, empty store with an injected clock, for tests asserting on
    /// committed `timestamp` values.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for InMemoryEventStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        mut events: Vec<Event>,
        expected_version: u64,
    ) -> Result<(), EventStoreError> {
        validate_batch(aggregate_id, &events, expected_version)?;
        let mut streams = self.streams.lock().expect("event store mutex poisoned");
        let stream = streams.entry(aggregate_id).or_default();
        let current = stream.last().map(|e| e.version).unwrap_or(0);
        if current != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current,
            });
        }
        let now = self.clock.now();
        for event in &mut events {
            event.timestamp = now;
        }
        stream.append(&mut events);
        Ok(())
    }

    async fn get_events(&self, aggregate_id: Uuid, from_version: u64) -> Result<Vec<Event>, EventStoreError> {
        let streams = self.streams.lock().expect("event store mutex poisoned");
        Ok(streams
            .get(&aggregate_id)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| e.version > from_version)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_events_by_type(
        &self,
        aggregate_type: &str,
        since_timestamp: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError> {
        let streams = self.streams.lock().expect("event store mutex poisoned");
        let mut matches: Vec<Event> = streams
            .values()
            .flatten()
            .filter(|e| e.aggregate_type == aggregate_type)
            .filter(|e| match since_timestamp {
                Some(since) => e.timestamp > since,
                None => true,
            })
            .cloned()
            .collect();
        matches.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.aggregate_id.cmp(&b.aggregate_id))
                .then_with(|| a.version.cmp(&b.version))
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<u64, EventStoreError> {
        let streams = self.streams.lock().expect("event store mutex poisoned");
        Ok(streams
            .get(&aggregate_id)
            .and_then(|events| events.last())
            .map(|e| e.version)
            .unwrap_or(0))
    }
}

/// Postgres-backed event store. Grounded in the reference CQRS crate's
/// `PostgresEventStore`: a single transaction reads the current max
/// version, compares it to `expected_version`, then inserts; the unique
/// index on `(aggregate_id, version)` is the backstop if two transactions
/// race past the read.
#[cfg(feature = "postgres-tests")]
pub struct PostgresEventStore {
    pool: sqlx::PgPool,
    clock: Arc<dyn Clock>,
}

#[cfg(feature = "postgres-tests")]
impl PostgresEventStore {
    /// Wrap an existing pool with the real system clock.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    /// Wrap an existing pool with an injected clock, for tests asserting on
    /// committed `timestamp` values.
    pub fn with_clock(pool: sqlx::PgPool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    /// Access the underlying pool, for migrations and tests.
    pub fn pool(&self) -> &sqlx::PgPool {
        &self.pool
    }
}

#[cfg(feature = "postgres-tests")]
#[async_trait]
impl EventStore for PostgresEventStore {
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        events: Vec<Event>,
        expected_version: u64,
    ) -> Result<(), EventStoreError> {
        validate_batch(aggregate_id, &events, expected_version)?;

        let mut tx = self.pool.begin().await?;

        let current_version: Option<i64> =
            sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
                .bind(aggregate_id)
                .fetch_optional(&mut *tx)
                .await?
                .flatten();
        let current = current_version.unwrap_or(0) as u64;

        if current != expected_version {
            return Err(EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual: current,
            });
        }

        let now = self.clock.now();
        for event in &events {
            sqlx::query(
                r#"
                INSERT INTO events (id, aggregate_id, aggregate_type, event_type, payload, metadata, version, timestamp)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.id)
            .bind(event.aggregate_id)
            .bind(&event.aggregate_type)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(serde_json::to_value(&event.metadata).map_err(|e| EventStoreError::Storage(e.to_string()))?)
            .bind(event.version as i64)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|err| {
                if is_unique_violation(&err) {
                    EventStoreError::ConcurrencyConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual: current,
                    }
                } else {
                    EventStoreError::Storage(err.to_string())
                }
            })?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_events(&self, aggregate_id: Uuid, from_version: u64) -> Result<Vec<Event>, EventStoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, aggregate_id, aggregate_type, event_type, payload, metadata, version, timestamp
            FROM events
            WHERE aggregate_id = $1 AND version > $2
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .bind(from_version as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    async fn get_events_by_type(
        &self,
        aggregate_type: &str,
        since_timestamp: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<Event>, EventStoreError> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, aggregate_id, aggregate_type, event_type, payload, metadata, version, timestamp
            FROM events
            WHERE aggregate_type = $1 AND ($2::timestamptz IS NULL OR timestamp > $2)
            ORDER BY timestamp ASC, aggregate_id ASC, version ASC
            LIMIT $3
            "#,
        )
        .bind(aggregate_type)
        .bind(since_timestamp)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(EventRow::try_into_event).collect()
    }

    async fn current_version(&self, aggregate_id: Uuid) -> Result<u64, EventStoreError> {
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM events WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .fetch_optional(&self.pool)
            .await?
            .flatten();
        Ok(version.unwrap_or(0) as u64)
    }
}

#[cfg(feature = "postgres-tests")]
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err.as_database_error().and_then(|e| e.code()), Some(code) if code == "23505")
}

#[cfg(feature = "postgres-tests")]
#[derive(sqlx::FromRow)]
struct EventRow {
    id: Uuid,
    aggregate_id: Uuid,
    aggregate_type: String,
    event_type: String,
    payload: serde_json::Value,
    metadata: serde_json::Value,
    version: i64,
    timestamp: DateTime<Utc>,
}

#[cfg(feature = "postgres-tests")]
impl EventRow {
    fn try_into_event(self) -> Result<Event, EventStoreError> {
        Ok(Event {
            id: self.id,
            aggregate_id: self.aggregate_id,
            aggregate_type: self.aggregate_type,
            event_type: self.event_type,
            payload: self.payload,
            metadata: serde_json::from_value(self.metadata).map_err(|e| EventStoreError::Storage(e.to_string()))?,
            version: self.version as u64,
            timestamp: self.timestamp,
        })
    }
}
