// Copyright 2025 Cowboy AI, LLC.

//! Per-aggregate-type key-value store of the most recent materialized
//! aggregate state and the version it summarizes.
//!
//! Snapshots are a performance optimization, never a source of truth:
//! losing every snapshot row must not corrupt the system, only slow
//! rehydration back down to a full replay.

use crate::ports::{Clock, SystemClock};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by a `SnapshotStore` implementation.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Underlying I/O or serialization failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Requested snapshot was not found
    #[error("snapshot not found for aggregate {0}")]
    NotFound(Uuid),
}

#[cfg(feature = "postgres-tests")]
impl From<sqlx::Error> for SnapshotError {
    fn from(err: sqlx::Error) -> Self {
        SnapshotError::Storage(err.to_string())
    }
}

/// Materialized state of one aggregate at a specific version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateSnapshot {
    /// Aggregate this snapshot belongs to
    pub aggregate_id: Uuid,
    /// Short tag naming the aggregate class
    pub aggregate_type: String,
    /// Version this snapshot summarizes
    pub version: u64,
    /// Self-describing serialization owned by the aggregate; opaque to the store
    pub state: serde_json::Value,
    /// First time a snapshot was recorded for this aggregate
    pub created_at: DateTime<Utc>,
    /// Time this row was last overwritten
    pub updated_at: DateTime<Utc>,
}

/// Per-aggregate-type key-value store of materialized aggregate state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the current snapshot for an aggregate, if one has been saved.
    async fn load(&self, aggregate_type: &str, aggregate_id: Uuid) -> Result<Option<AggregateSnapshot>, SnapshotError>;

    /// Upsert the snapshot for an aggregate, keyed by `aggregate_id`.
    /// Idempotent on `(aggregate_id, version)`: replaying a save with the
    /// same version overwrites with identical bytes.
    async fn save(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        version: u64,
        state: serde_json::Value,
    ) -> Result<(), SnapshotError>;

    /// Remove a snapshot, used by the snapshot-recovery test scenario and
    /// by operators forcing a full replay.
    async fn delete(&self, aggregate_id: Uuid) -> Result<(), SnapshotError>;
}

/// In-process snapshot store backed by a `Mutex<HashMap>`.
pub struct InMemorySnapshotStore {
    snapshots: Mutex<HashMap<Uuid, AggregateSnapshot>>,
    clock: Arc<dyn Clock>,
}

impl InMemorySnapshotStore {
    /// New, empty store with the real system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// New, empty store with an injected clock, for tests asserting on
    /// `created_at`/`updated_at`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            snapshots: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

impl Default for InMemorySnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn load(&self, _aggregate_type: &str, aggregate_id: Uuid) -> Result<Option<AggregateSnapshot>, SnapshotError> {
        let snapshots = self.snapshots.lock().expect("snapshot store mutex poisoned");
        Ok(snapshots.get(&aggregate_id).cloned())
    }

    async fn save(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        version: u64,
        state: serde_json::Value,
    ) -> Result<(), SnapshotError> {
        let mut snapshots = self.snapshots.lock().expect("snapshot store mutex poisoned");
        let now = self.clock.now();
        let created_at = snapshots.get(&aggregate_id).map(|s| s.created_at).unwrap_or(now);
        snapshots.insert(
            aggregate_id,
            AggregateSnapshot {
                aggregate_id,
                aggregate_type: aggregate_type.to_string(),
                version,
                state,
                created_at,
                updated_at: now,
            },
        );
        Ok(())
    }

    async fn delete(&self, aggregate_id: Uuid) -> Result<(), SnapshotError> {
        let mut snapshots = self.snapshots.lock().expect("snapshot store mutex poisoned");
        snapshots.remove(&aggregate_id);
        Ok(())
    }
}

/// Postgres-backed snapshot store: one physical `snapshots` table carrying
/// an `aggregate_type` column, unique-indexed on `(aggregate_type,
/// aggregate_id)`, rather than a table per type — simpler migrations while
/// still reading as "one logical table per type" through this API.
#[cfg(feature = "postgres-tests")]
pub struct PostgresSnapshotStore {
    pool: sqlx::PgPool,
}

#[cfg(feature = "postgres-tests")]
impl PostgresSnapshotStore {
    /// Wrap an existing pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres-tests")]
#[async_trait]
impl SnapshotStore for PostgresSnapshotStore {
    async fn load(&self, aggregate_type: &str, aggregate_id: Uuid) -> Result<Option<AggregateSnapshot>, SnapshotError> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT aggregate_id, aggregate_type, version, state, created_at, updated_at
            FROM snapshots
            WHERE aggregate_type = $1 AND aggregate_id = $2
            "#,
        )
        .bind(aggregate_type)
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn save(
        &self,
        aggregate_type: &str,
        aggregate_id: Uuid,
        version: u64,
        state: serde_json::Value,
    ) -> Result<(), SnapshotError> {
        sqlx::query(
            r#"
            INSERT INTO snapshots (aggregate_id, aggregate_type, version, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, now(), now())
            ON CONFLICT (aggregate_type, aggregate_id)
            DO UPDATE SET version = EXCLUDED.version, state = EXCLUDED.state, updated_at = now()
            "#,
        )
        .bind(aggregate_id)
        .bind(aggregate_type)
        .bind(version as i64)
        .bind(&state)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, aggregate_id: Uuid) -> Result<(), SnapshotError> {
        sqlx::query("DELETE FROM snapshots WHERE aggregate_id = $1")
            .bind(aggregate_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(feature = "postgres-tests")]
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    aggregate_id: Uuid,
    aggregate_type: String,
    version: i64,
    state: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[cfg(feature = "postgres-tests")]
impl From<SnapshotRow> for AggregateSnapshot {
    fn from(row: SnapshotRow) -> Self {
        Self {
            aggregate_id: row.aggregate_id,
            aggregate_type: row.aggregate_type,
            version: row.version as u64,
            state: row.state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
