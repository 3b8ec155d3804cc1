// Copyright 2025 Cowboy AI, LLC.

//! Bus-independent checkpoint storage tracking how far each projector has
//! replayed the event log, so a restart can resume rather than replay from
//! the beginning and rather than miss events published while it was down.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

/// Errors raised by a `CheckpointStore` implementation.
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// Underlying I/O failure
    #[error("storage error: {0}")]
    Storage(String),
}

#[cfg(feature = "postgres-tests")]
impl From<sqlx::Error> for CheckpointError {
    fn from(err: sqlx::Error) -> Self {
        CheckpointError::Storage(err.to_string())
    }
}

/// A projector's replay position: the timestamp of the newest event it has
/// durably applied, scoped to its own `projector_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectorCheckpoint {
    /// Stable identifier for the projector this checkpoint tracks
    pub projector_id: String,
    /// Timestamp of the newest applied event, `None` before any event has been applied
    pub last_timestamp: Option<DateTime<Utc>>,
    /// Total events applied, for observability
    pub events_processed: u64,
}

impl ProjectorCheckpoint {
    /// Fresh checkpoint for a projector that has never run.
    pub fn new(projector_id: impl Into<String>) -> Self {
        Self {
            projector_id: projector_id.into(),
            last_timestamp: None,
            events_processed: 0,
        }
    }
}

/// Storage for projector checkpoints.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Load a projector's checkpoint, or `None` if it has never run.
    async fn load(&self, projector_id: &str) -> Result<Option<ProjectorCheckpoint>, CheckpointError>;

    /// Persist a projector's checkpoint.
    async fn save(&self, checkpoint: &ProjectorCheckpoint) -> Result<(), CheckpointError>;

    /// Discard a projector's checkpoint, forcing a full replay on next start.
    async fn delete(&self, projector_id: &str) -> Result<(), CheckpointError>;
}

/// In-memory checkpoint store.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Mutex<HashMap<String, ProjectorCheckpoint>>,
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn load(&self, projector_id: &str) -> Result<Option<ProjectorCheckpoint>, CheckpointError> {
        Ok(self
            .checkpoints
            .lock()
            .expect("checkpoint store mutex poisoned")
            .get(projector_id)
            .cloned())
    }

    async fn save(&self, checkpoint: &ProjectorCheckpoint) -> Result<(), CheckpointError> {
        self.checkpoints
            .lock()
            .expect("checkpoint store mutex poisoned")
            .insert(checkpoint.projector_id.clone(), checkpoint.clone());
        Ok(())
    }

    async fn delete(&self, projector_id: &str) -> Result<(), CheckpointError> {
        self.checkpoints
            .lock()
            .expect("checkpoint store mutex poisoned")
            .remove(projector_id);
        Ok(())
    }
}

/// Postgres-backed checkpoint store, for deployments that run projectors out
/// of process from the in-memory bus and need recovery to survive a restart
/// of the projector host itself, not just the bus worker task.
#[cfg(feature = "postgres-tests")]
pub struct PostgresCheckpointStore {
    pool: sqlx::PgPool,
}

#[cfg(feature = "postgres-tests")]
impl PostgresCheckpointStore {
    /// Wrap an existing pool.
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[cfg(feature = "postgres-tests")]
#[async_trait]
impl CheckpointStore for PostgresCheckpointStore {
    async fn load(&self, projector_id: &str) -> Result<Option<ProjectorCheckpoint>, CheckpointError> {
        let row = sqlx::query_as::<_, CheckpointRow>(
            r#"
            SELECT projector_id, last_timestamp, events_processed
            FROM projector_checkpoints
            WHERE projector_id = $1
            "#,
        )
        .bind(projector_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn save(&self, checkpoint: &ProjectorCheckpoint) -> Result<(), CheckpointError> {
        sqlx::query(
            r#"
            INSERT INTO projector_checkpoints (projector_id, last_timestamp, events_processed)
            VALUES ($1, $2, $3)
            ON CONFLICT (projector_id)
            DO UPDATE SET last_timestamp = EXCLUDED.last_timestamp, events_processed = EXCLUDED.events_processed
            "#,
        )
        .bind(&checkpoint.projector_id)
        .bind(checkpoint.last_timestamp)
        .bind(checkpoint.events_processed as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, projector_id: &str) -> Result<(), CheckpointError> {
        sqlx::query("DELETE FROM projector_checkpoints WHERE projector_id = $1")
            .bind(projector_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(feature = "postgres-tests")]
#[derive(sqlx::FromRow)]
struct CheckpointRow {
    projector_id: String,
    last_timestamp: Option<DateTime<Utc>>,
    events_processed: i64,
}

#[cfg(feature = "postgres-tests")]
impl From<CheckpointRow> for ProjectorCheckpoint {
    fn from(row: CheckpointRow) -> Self {
        Self {
            projector_id: row.projector_id,
            last_timestamp: row.last_timestamp,
            events_processed: row.events_processed as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn load_missing_returns_none() {
        let store = InMemoryCheckpointStore::default();
        assert!(store.load("content_request_index").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let store = InMemoryCheckpointStore::default();
        let mut checkpoint = ProjectorCheckpoint::new("content_request_index");
        checkpoint.last_timestamp = Some(Utc::now());
        checkpoint.events_processed = 3;
        store.save(&checkpoint).await.unwrap();
        let loaded = store.load("content_request_index").await.unwrap().unwrap();
        assert_eq!(loaded.events_processed, 3);
    }

    #[tokio::test]
    async fn delete_resets_checkpoint() {
        let store = InMemoryCheckpointStore::default();
        let checkpoint = ProjectorCheckpoint::new("x");
        store.save(&checkpoint).await.unwrap();
        store.delete("x").await.unwrap();
        assert!(store.load("x").await.unwrap().is_none());
    }
}
