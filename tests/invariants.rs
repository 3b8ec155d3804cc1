//! Property tests for the version-density and snapshot-equivalence
//! invariants, run against the in-memory event store and repository.

use ailit_event_store::domain::ContentGenerationAggregate;
use ailit_event_store::infrastructure::{AggregateRepository, InMemoryEventBus, InMemoryEventStore, InMemorySnapshotStore};
use ailit_event_store::ports::GeneratedContent;
use proptest::prelude::*;
use std::sync::Arc;
use uuid::Uuid;

fn repository() -> (
    AggregateRepository<ContentGenerationAggregate>,
    Arc<InMemoryEventStore>,
) {
    let event_store = Arc::new(InMemoryEventStore::new());
    let repo = AggregateRepository::new(
        event_store.clone(),
        Arc::new(InMemorySnapshotStore::new()),
        Arc::new(InMemoryEventBus::with_defaults()),
    );
    (repo, event_store)
}

/// Drives an aggregate through up to `steps` legal transitions, saving after
/// each, and returns the number of events committed.
async fn run_lifecycle(repo: &AggregateRepository<ContentGenerationAggregate>, id: Uuid, steps: u8) -> u64 {
    let mut aggregate =
        ContentGenerationAggregate::request_content_generation(id, "topic".to_string(), "easy".to_string()).unwrap();
    repo.save(&mut aggregate).await.unwrap();
    let mut committed = 1u64;

    if steps >= 1 {
        aggregate
            .record_generated_content(GeneratedContent {
                provider_request_id: "p".to_string(),
                body: "b".to_string(),
            })
            .unwrap();
        repo.save(&mut aggregate).await.unwrap();
        committed += 1;
    }
    if steps >= 2 {
        aggregate.request_ai_detection().unwrap();
        repo.save(&mut aggregate).await.unwrap();
        committed += 1;
    }
    if steps >= 3 {
        aggregate.complete_ai_detection(0.5).unwrap();
        repo.save(&mut aggregate).await.unwrap();
        committed += 1;
    }
    if steps >= 4 {
        aggregate.archive().unwrap();
        repo.save(&mut aggregate).await.unwrap();
        committed += 1;
    }
    committed
}

proptest! {
    /// Invariant 1: for every aggregate id, the committed version set is
    /// exactly `{1, ..., N}` — no gaps, no duplicates, strictly ascending.
    #[test]
    fn version_density_holds_for_any_lifecycle_length(steps in 0u8..=4) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (repo, event_store) = repository();
            let id = Uuid::new_v4();
            let committed = run_lifecycle(&repo, id, steps).await;

            let events = event_store.get_events(id, 0).await.unwrap();
            let versions: Vec<u64> = events.iter().map(|e| e.version).collect();
            let expected: Vec<u64> = (1..=committed).collect();
            prop_assert_eq!(versions, expected);
            Ok(())
        })?;
    }

    /// Invariant 3: replaying from a snapshot taken at version `N` plus the
    /// tail `N+1..M` yields the same serialized state as a full replay from
    /// empty of `1..M`.
    #[test]
    fn snapshot_plus_tail_matches_full_replay(steps in 1u8..=4) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let event_store = Arc::new(InMemoryEventStore::new());
            let snapshotting_repo = AggregateRepository::<ContentGenerationAggregate>::new(
                event_store.clone(),
                Arc::new(InMemorySnapshotStore::new()),
                Arc::new(InMemoryEventBus::with_defaults()),
            );
            let non_snapshotting_repo = AggregateRepository::<ContentGenerationAggregate>::new(
                event_store,
                Arc::new(InMemorySnapshotStore::new()),
                Arc::new(InMemoryEventBus::with_defaults()),
            )
            .with_snapshots_disabled();

            let id = Uuid::new_v4();
            run_lifecycle(&snapshotting_repo, id, steps).await;

            let from_snapshot = snapshotting_repo.load(id).await.unwrap();
            let from_full_replay = non_snapshotting_repo.load(id).await.unwrap();

            prop_assert_eq!(
                serde_json::to_value(&from_snapshot).unwrap(),
                serde_json::to_value(&from_full_replay).unwrap()
            );
            Ok(())
        })?;
    }
}
