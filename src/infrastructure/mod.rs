// Copyright 2025 Cowboy AI, LLC.

//! Infrastructure layer: storage, bus, and projector-runner implementations
//! plugging into the domain's ports and aggregate trait.

pub mod event_bus;
pub mod event_store;
pub mod nats_client;
/// Bus-independent checkpoint storage for projector crash recovery
pub mod projection_checkpoint;
pub mod projector;
pub mod repository;
pub mod snapshot_store;

pub use event_bus::{
    DeadLetter, DeadLetterSink, EventBus, EventBusError, EventHandler, InMemoryDeadLetterSink, InMemoryEventBus,
    NatsEventBus, RetryPolicy,
};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore};
pub use nats_client::{NatsClient, NatsConfig, NatsError};
pub use projection_checkpoint::{CheckpointError, CheckpointStore, InMemoryCheckpointStore, ProjectorCheckpoint};
pub use projector::{ProjectorRunner, ProjectorState, ReadModelProjector};
pub use repository::AggregateRepository;
pub use snapshot_store::{AggregateSnapshot, InMemorySnapshotStore, SnapshotError, SnapshotStore};

#[cfg(feature = "postgres-tests")]
pub use event_store::PostgresEventStore;
#[cfg(feature = "postgres-tests")]
pub use projection_checkpoint::PostgresCheckpointStore;
#[cfg(feature = "postgres-tests")]
pub use snapshot_store::PostgresSnapshotStore;
