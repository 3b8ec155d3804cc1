// Copyright (c) 2025 - Cowboy AI, LLC.

//! Event-sourced aggregate store for the gamified AI-literacy platform.
//!
//! This crate provides the storage and messaging backbone shared by the
//! platform's aggregates:
//!
//! - [`entity`] / [`aggregate`]: identity, the `Aggregate` trait, and the
//!   load-from-history fold.
//! - [`events`]: the wire-level `Event` envelope and its metadata.
//! - [`errors`]: the crate-wide `DomainError`/`DomainResult`.
//! - [`domain`]: the concrete aggregates — `content_generation` and
//!   `research_problem`.
//! - [`infrastructure`]: `EventStore`, `SnapshotStore`, `EventBus`,
//!   `AggregateRepository`, and the `ProjectorRunner`.
//! - [`projections`]: read-model projectors built on top of `infrastructure`.
//! - [`ports`]: injectable boundaries (`Clock`, `IdGen`, `ContentProvider`).
//! - [`config`]: deserializable runtime configuration.

#![warn(missing_docs)]

pub mod aggregate;
pub mod config;
pub mod domain;
pub mod entity;
pub mod errors;
pub mod events;
pub mod infrastructure;
pub mod ports;
pub mod projections;

pub use aggregate::{raise_event, Aggregate};
pub use config::{AppConfig, DbConfig, EventBusConfig, EventBusKind, ProjectorConfig, SnapshotConfig};
pub use entity::{AggregateRoot, DomainEntity, Entity, EntityId};
pub use errors::{DomainError, DomainResult};
pub use events::{DomainEvent, Event, EventMetadata};

/// Marker types for phantom type parameters.
pub mod markers {
    //! Re-exported for callers that only need the marker types, not the
    //! full `entity` module.
    pub use crate::entity::{AggregateMarker, ContentGenerationMarker, ResearchProblemMarker};
}

/// Aggregate identifier using [`EntityId`] with [`markers::AggregateMarker`].
pub type AggregateId = EntityId<markers::AggregateMarker>;
