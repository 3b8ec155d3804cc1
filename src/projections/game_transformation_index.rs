//! Index over research-problem-to-game transformations.
//!
//! Narrower than [`crate::projections::ResearchProblemIndexProjector`]: it
//! only cares about `ProblemTransformedToGame`, and exists so the gamified
//! front end can query "which problems are playable" without scanning the
//! full research-problem index.

use crate::events::Event;
use crate::infrastructure::ReadModelProjector;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One row of the game-transformation index.
#[derive(Debug, Clone)]
pub struct GameTransformationIndexRow {
    /// Owning aggregate
    pub aggregate_id: Uuid,
    /// Game type the problem was transformed into
    pub game_type: String,
    /// Opaque game-specific payload, as produced by the transformation
    pub game_payload: serde_json::Value,
    /// When the transformation event was recorded
    pub transformed_at: DateTime<Utc>,
    /// Version of the last event folded into this row
    pub last_applied_version: u64,
}

/// Maintains [`GameTransformationIndexRow`]s from `ProblemTransformedToGame`
/// events only; all other `research_problem` events are ignored.
#[derive(Default)]
pub struct GameTransformationIndexProjector {
    rows: Mutex<HashMap<Uuid, GameTransformationIndexRow>>,
}

impl GameTransformationIndexProjector {
    /// New, empty projector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one row, for tests and query handlers.
    pub fn row(&self, aggregate_id: Uuid) -> Option<GameTransformationIndexRow> {
        self.rows.lock().expect("index mutex poisoned").get(&aggregate_id).cloned()
    }

    /// All rows, for tests and query handlers.
    pub fn rows(&self) -> Vec<GameTransformationIndexRow> {
        self.rows.lock().expect("index mutex poisoned").values().cloned().collect()
    }
}

#[async_trait]
impl ReadModelProjector for GameTransformationIndexProjector {
    fn projector_id(&self) -> &str {
        "game_transformation_index"
    }

    fn aggregate_type(&self) -> &str {
        "research_problem"
    }

    async fn apply(&self, event: &Event) -> Result<(), String> {
        if event.event_type != "ProblemTransformedToGame" {
            return Ok(());
        }

        let mut rows = self.rows.lock().expect("index mutex poisoned");
        if let Some(existing) = rows.get(&event.aggregate_id) {
            if event.version <= existing.last_applied_version {
                return Ok(());
            }
        }

        let game_type = event.payload.get("game_type").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let game_payload = event.payload.get("game_payload").cloned().unwrap_or(serde_json::Value::Null);

        rows.insert(
            event.aggregate_id,
            GameTransformationIndexRow {
                aggregate_id: event.aggregate_id,
                game_type,
                game_payload,
                transformed_at: event.timestamp,
                last_applied_version: event.version,
            },
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventMetadata;

    fn event(aggregate_id: Uuid, version: u64, event_type: &str, payload: serde_json::Value) -> Event {
        let mut e = Event::new(aggregate_id, "research_problem", event_type, payload, EventMetadata::default());
        e.version = version;
        e
    }

    #[tokio::test]
    async fn ignores_non_transformation_events() {
        let projector = GameTransformationIndexProjector::new();
        let id = Uuid::new_v4();
        projector
            .apply(&event(id, 1, "ProblemCreated", serde_json::json!({"title": "t", "created_by": "a"})))
            .await
            .unwrap();
        assert!(projector.row(id).is_none());
    }

    #[tokio::test]
    async fn records_transformation_payload() {
        let projector = GameTransformationIndexProjector::new();
        let id = Uuid::new_v4();
        projector
            .apply(&event(
                id,
                2,
                "ProblemTransformedToGame",
                serde_json::json!({"game_type": "sorting_puzzle", "game_payload": {"levels": 3}}),
            ))
            .await
            .unwrap();
        let row = projector.row(id).unwrap();
        assert_eq!(row.game_type, "sorting_puzzle");
        assert_eq!(row.game_payload, serde_json::json!({"levels": 3}));
        assert_eq!(row.last_applied_version, 2);
    }

    #[tokio::test]
    async fn applying_same_event_twice_is_idempotent() {
        let projector = GameTransformationIndexProjector::new();
        let id = Uuid::new_v4();
        let e = event(id, 2, "ProblemTransformedToGame", serde_json::json!({"game_type": "a", "game_payload": {}}));
        projector.apply(&e).await.unwrap();
        projector.apply(&e).await.unwrap();
        assert_eq!(projector.rows().len(), 1);
    }
}
