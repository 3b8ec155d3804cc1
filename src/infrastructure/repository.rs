//! `AggregateRepository<T>`: binds an aggregate type to persistence, loads
//! by id with snapshot-plus-tail rehydration, and saves with concurrency
//! control, publishing the committed batch to the bus after commit.

use crate::aggregate::Aggregate;
use crate::errors::{DomainError, DomainResult};
use crate::infrastructure::event_bus::{EventBus, EventBusError};
use crate::infrastructure::event_store::{EventStore, EventStoreError};
use crate::infrastructure::snapshot_store::{SnapshotError, SnapshotStore};
use crate::ports::{IdGen, UuidGen};
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

impl From<EventStoreError> for DomainError {
    fn from(err: EventStoreError) -> Self {
        match err {
            EventStoreError::ConcurrencyConflict {
                aggregate_id,
                expected,
                actual,
            } => DomainError::VersionConflict {
                aggregate_id: aggregate_id.to_string(),
                expected,
                actual,
            },
            EventStoreError::InvalidBatch(msg) => DomainError::InvalidBatch(msg),
            EventStoreError::Storage(msg) => DomainError::Storage(msg),
        }
    }
}

impl From<SnapshotError> for DomainError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Storage(msg) => DomainError::Storage(msg),
            SnapshotError::NotFound(id) => DomainError::NotFound(id.to_string()),
        }
    }
}

impl From<EventBusError> for DomainError {
    fn from(err: EventBusError) -> Self {
        match err {
            EventBusError::Unavailable(msg) => DomainError::BusUnavailable(msg),
        }
    }
}

/// Generic loader/saver binding an [`Aggregate`] implementor to the
/// `EventStore` + `SnapshotStore` + `EventBus` triad. One repository
/// instance is constructed per aggregate kind (`content_generation`,
/// `research_problem`, ...); the repository never inspects the concrete
/// aggregate's internals beyond the `Aggregate` trait.
pub struct AggregateRepository<T: Aggregate + Serialize + DeserializeOwned> {
    event_store: Arc<dyn EventStore>,
    snapshot_store: Arc<dyn SnapshotStore>,
    event_bus: Arc<dyn EventBus>,
    id_gen: Arc<dyn IdGen>,
    snapshot_enabled: bool,
    _marker: PhantomData<T>,
}

impl<T: Aggregate + Serialize + DeserializeOwned> AggregateRepository<T> {
    /// Wire a repository from its three collaborators, assigning ids from
    /// `UuidGen` on every save.
    pub fn new(event_store: Arc<dyn EventStore>, snapshot_store: Arc<dyn SnapshotStore>, event_bus: Arc<dyn EventBus>) -> Self {
        Self::with_id_gen(event_store, snapshot_store, event_bus, Arc::new(UuidGen))
    }

    /// Wire a repository with an explicit `IdGen`, for tests that need to
    /// assert on the ids a save produces.
    pub fn with_id_gen(
        event_store: Arc<dyn EventStore>,
        snapshot_store: Arc<dyn SnapshotStore>,
        event_bus: Arc<dyn EventBus>,
        id_gen: Arc<dyn IdGen>,
    ) -> Self {
        Self {
            event_store,
            snapshot_store,
            event_bus,
            id_gen,
            snapshot_enabled: true,
            _marker: PhantomData,
        }
    }

    /// Disable snapshotting, forcing every `load` to do a full replay.
    /// Exposed for tests exercising the replay path without a snapshot.
    pub fn with_snapshots_disabled(mut self) -> Self {
        self.snapshot_enabled = false;
        self
    }

    /// Rehydrate an aggregate from snapshot (if any and enabled) plus the
    /// tail of events since the snapshot's version.
    pub async fn load(&self, id: Uuid) -> DomainResult<T> {
        let snapshot = if self.snapshot_enabled {
            self.snapshot_store.load(T::AGGREGATE_TYPE, id).await?
        } else {
            None
        };
        let snapshot_version = snapshot.as_ref().map(|s| s.version).unwrap_or(0);

        let mut aggregate: T = match snapshot {
            Some(snapshot) => serde_json::from_value(snapshot.state)?,
            None => T::default(),
        };

        let tail = self.event_store.get_events(id, snapshot_version).await?;
        if snapshot_version == 0 && tail.is_empty() {
            return Err(DomainError::NotFound(id.to_string()));
        }
        for event in &tail {
            aggregate.apply(event);
        }
        Ok(aggregate)
    }

    /// Append the aggregate's uncommitted events, upsert its snapshot at
    /// the new version, and publish the committed batch to the bus. On a
    /// version conflict the in-memory aggregate is left untouched; the
    /// caller must reload and retry.
    pub async fn save(&self, aggregate: &mut T) -> DomainResult<()> {
        let mut events = aggregate.uncommitted_events().to_vec();
        if events.is_empty() {
            return Ok(());
        }
        for event in &mut events {
            event.id = self.id_gen.new_id();
        }
        let base = aggregate.version() - events.len() as u64;

        self.event_store.append_events(aggregate.id(), events.clone(), base).await?;

        if self.snapshot_enabled {
            let state = serde_json::to_value(&*aggregate)?;
            self.snapshot_store
                .save(T::AGGREGATE_TYPE, aggregate.id(), aggregate.version(), state)
                .await?;
        }

        aggregate.mark_committed();

        if let Err(err) = self.event_bus.publish(events).await {
            warn!(
                aggregate_type = T::AGGREGATE_TYPE,
                aggregate_id = %aggregate.id(),
                "bus publish failed after commit, durable effect preserved: {err}"
            );
            return Err(err.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ContentGenerationAggregate;
    use crate::infrastructure::event_bus::InMemoryEventBus;
    use crate::infrastructure::event_store::InMemoryEventStore;
    use crate::infrastructure::snapshot_store::InMemorySnapshotStore;

    fn repository() -> AggregateRepository<ContentGenerationAggregate> {
        AggregateRepository::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(InMemoryEventBus::with_defaults()),
        )
    }

    #[tokio::test]
    async fn save_assigns_real_ids_to_every_event() {
        let event_store = Arc::new(InMemoryEventStore::new());
        let repo = AggregateRepository::<ContentGenerationAggregate>::new(
            event_store.clone(),
            Arc::new(InMemorySnapshotStore::new()),
            Arc::new(InMemoryEventBus::with_defaults()),
        );
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "t".to_string(), "d".to_string()).unwrap();
        repo.save(&mut aggregate).await.unwrap();

        let committed = event_store.get_events(id, 0).await.unwrap();
        assert_eq!(committed.len(), 1);
        assert!(!committed[0].id.is_nil());
    }

    #[tokio::test]
    async fn save_then_load_roundtrips() {
        let repo = repository();
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "fractions".to_string(), "easy".to_string())
                .unwrap();
        repo.save(&mut aggregate).await.unwrap();
        assert!(aggregate.uncommitted_events().is_empty());

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.status(), aggregate.status());
    }

    #[tokio::test]
    async fn load_missing_returns_not_found() {
        let repo = repository();
        let err = repo.load(Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn concurrent_save_with_stale_version_conflicts() {
        let repo = repository();
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "t".to_string(), "d".to_string()).unwrap();
        repo.save(&mut aggregate).await.unwrap();

        // Two processes both load the version-1 aggregate...
        let mut process_a = repo.load(id).await.unwrap();
        let mut process_b = repo.load(id).await.unwrap();
        process_a
            .record_generated_content(crate::ports::GeneratedContent {
                provider_request_id: "p-a".to_string(),
                body: "a".to_string(),
            })
            .unwrap();
        process_b
            .record_generated_content(crate::ports::GeneratedContent {
                provider_request_id: "p-b".to_string(),
                body: "b".to_string(),
            })
            .unwrap();

        // ...and race to save at the same expected base version.
        repo.save(&mut process_a).await.unwrap();
        let err = repo.save(&mut process_b).await.unwrap_err();
        assert!(err.is_version_conflict());
    }

    #[tokio::test]
    async fn snapshot_recovery_survives_deleted_snapshot() {
        let event_store = Arc::new(InMemoryEventStore::new());
        let snapshot_store = Arc::new(InMemorySnapshotStore::new());
        let repo = AggregateRepository::<ContentGenerationAggregate>::new(
            event_store,
            snapshot_store.clone(),
            Arc::new(InMemoryEventBus::with_defaults()),
        );
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "t".to_string(), "d".to_string()).unwrap();
        repo.save(&mut aggregate).await.unwrap();

        snapshot_store.delete(id).await.unwrap();

        let loaded = repo.load(id).await.unwrap();
        assert_eq!(loaded.version(), 1);
        assert_eq!(loaded.status(), Some(crate::domain::content_generation::ContentRequestStatus::Requested));
    }
}
