//! Entity types with identity and lifecycle

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::time::SystemTime;
use uuid::Uuid;

/// A generic entity with a typed ID
///
/// Entities are domain objects with identity that persists across time.
/// They have a lifecycle with creation and update timestamps.
///
/// # Examples
///
/// ```rust
/// use ailit_event_store::{Entity, EntityId};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// struct Customer;
///
/// let customer = Entity::<Customer>::new();
/// assert_eq!(customer.created_at, customer.updated_at);
///
/// let id = EntityId::<Customer>::new();
/// let customer = Entity::with_id(id);
/// assert_eq!(customer.id, id);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entity<T> {
    /// The unique identifier for this entity
    pub id: EntityId<T>,
    /// When this entity was created
    pub created_at: SystemTime,
    /// When this entity was last updated
    pub updated_at: SystemTime,
}

impl<T> Entity<T> {
    /// Create a new entity with a generated ID
    pub fn new() -> Self {
        let now = SystemTime::now();
        Self {
            id: EntityId::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an entity with a specific ID
    pub fn with_id(id: EntityId<T>) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Update the entity's timestamp
    pub fn touch(&mut self) {
        self.updated_at = SystemTime::now();
    }
}

impl<T> Default for Entity<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed entity ID using phantom types for type safety
///
/// These IDs are globally unique and persistent. The phantom type parameter
/// ensures that IDs for different entity types cannot be mixed up at
/// compile time.
///
/// # Examples
///
/// ```rust
/// use ailit_event_store::EntityId;
///
/// struct ContentGeneration;
/// struct ResearchProblem;
///
/// let content_id = EntityId::<ContentGeneration>::new();
/// let problem_id = EntityId::<ResearchProblem>::new();
///
/// // These are different types - won't compile if mixed up:
/// // let _: EntityId<ContentGeneration> = problem_id; // ERROR!
///
/// let casted: EntityId<ResearchProblem> = content_id.cast();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId<T> {
    id: Uuid,
    #[serde(skip)]
    _phantom: PhantomData<T>,
}

impl<T> EntityId<T> {
    /// Create a new random entity ID
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            _phantom: PhantomData,
        }
    }

    /// Create an entity ID from a UUID
    pub fn from_uuid(id: Uuid) -> Self {
        Self {
            id,
            _phantom: PhantomData,
        }
    }

    /// Get the underlying UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.id
    }

    /// Convert to a different entity ID type (use with caution)
    pub fn cast<U>(self) -> EntityId<U> {
        EntityId {
            id: self.id,
            _phantom: PhantomData,
        }
    }
}

impl<T> fmt::Display for EntityId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl<T> Default for EntityId<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<EntityId<T>> for Uuid {
    fn from(id: EntityId<T>) -> Self {
        id.id
    }
}

impl<T> From<&EntityId<T>> for Uuid {
    fn from(id: &EntityId<T>) -> Self {
        id.id
    }
}

/// Marker trait for aggregate roots
///
/// Aggregate roots are the entry points for modifying aggregates. All
/// changes to entities within an aggregate must go through the root.
pub trait AggregateRoot: Sized {
    /// The type of ID for this aggregate
    type Id: Copy + Eq + Send + Sync;

    /// Get the aggregate's ID
    fn id(&self) -> Self::Id;

    /// Get the aggregate's version for optimistic concurrency
    fn version(&self) -> u64;

    /// Increment the version
    fn increment_version(&mut self);
}

/// Trait for domain entities with identity
pub trait DomainEntity: Sized + Send + Sync {
    /// The marker type for this entity
    type IdType;

    /// Get the entity's ID
    fn id(&self) -> EntityId<Self::IdType>;
}

/// Marker for aggregate entities in general (repository plumbing, tests)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AggregateMarker;

/// Marker for the `ContentGenerationAggregate`'s identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentGenerationMarker;

/// Marker for the `ResearchProblemAggregate`'s identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResearchProblemMarker;

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_entity_new() {
        let entity: Entity<AggregateMarker> = Entity::new();
        assert!(!entity.id.as_uuid().is_nil());
        assert_eq!(entity.created_at, entity.updated_at);
    }

    #[test]
    fn test_entity_with_id() {
        let id = EntityId::<AggregateMarker>::new();
        let entity = Entity::with_id(id);
        assert_eq!(entity.id, id);
        assert_eq!(entity.created_at, entity.updated_at);
    }

    #[test]
    fn test_entity_touch() {
        let mut entity: Entity<AggregateMarker> = Entity::new();
        let original_created = entity.created_at;
        let original_id = entity.id;

        thread::sleep(Duration::from_millis(10));
        entity.touch();

        assert_eq!(entity.id, original_id);
        assert_eq!(entity.created_at, original_created);
        assert!(entity.updated_at > original_created);
    }

    #[test]
    fn test_entity_id_new() {
        let id1 = EntityId::<AggregateMarker>::new();
        let id2 = EntityId::<AggregateMarker>::new();
        assert_ne!(id1, id2);
        assert!(!id1.as_uuid().is_nil());
    }

    #[test]
    fn test_entity_id_display() {
        let uuid = Uuid::new_v4();
        let id = EntityId::<AggregateMarker>::from_uuid(uuid);
        assert_eq!(format!("{id}"), format!("{uuid}"));
    }

    #[test]
    fn test_entity_id_type_safety_cast() {
        let content_id = EntityId::<ContentGenerationMarker>::new();
        let problem_id: EntityId<ResearchProblemMarker> = content_id.cast();
        assert_eq!(content_id.as_uuid(), problem_id.as_uuid());
    }

    #[test]
    fn test_entity_id_serde_roundtrip() {
        let original = EntityId::<AggregateMarker>::new();
        let json = serde_json::to_string(&original).unwrap();
        let deserialized: EntityId<AggregateMarker> = serde_json::from_str(&json).unwrap();
        assert_eq!(original, deserialized);
    }

    #[test]
    fn test_entity_id_as_map_key() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        let id1 = EntityId::<AggregateMarker>::new();
        let id2 = EntityId::<AggregateMarker>::new();
        map.insert(id1, "first");
        map.insert(id2, "second");

        assert_eq!(map.get(&id1), Some(&"first"));
        assert_eq!(map.len(), 2);
    }
}
