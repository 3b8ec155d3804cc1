//! Index over research problems, keyed by `aggregate_id`.

use crate::events::Event;
use crate::infrastructure::ReadModelProjector;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One row of the research-problem index.
#[derive(Debug, Clone)]
pub struct ResearchProblemIndexRow {
    /// Owning aggregate
    pub aggregate_id: Uuid,
    /// Problem title
    pub title: String,
    /// Id of the author who created the problem
    pub created_by: String,
    /// Current lifecycle status tag, e.g. `"Draft"`, `"GameReady"`, `"Archived"`
    pub status: String,
    /// Version of the last event folded into this row
    pub last_applied_version: u64,
}

/// Maintains [`ResearchProblemIndexRow`]s from `research_problem` events.
#[derive(Default)]
pub struct ResearchProblemIndexProjector {
    rows: Mutex<HashMap<Uuid, ResearchProblemIndexRow>>,
}

impl ResearchProblemIndexProjector {
    /// New, empty projector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one row, for tests and query handlers.
    pub fn row(&self, aggregate_id: Uuid) -> Option<ResearchProblemIndexRow> {
        self.rows.lock().expect("index mutex poisoned").get(&aggregate_id).cloned()
    }

    /// All rows, for tests and query handlers.
    pub fn rows(&self) -> Vec<ResearchProblemIndexRow> {
        self.rows.lock().expect("index mutex poisoned").values().cloned().collect()
    }
}

#[async_trait]
impl ReadModelProjector for ResearchProblemIndexProjector {
    fn projector_id(&self) -> &str {
        "research_problem_index"
    }

    fn aggregate_type(&self) -> &str {
        "research_problem"
    }

    async fn apply(&self, event: &Event) -> Result<(), String> {
        let mut rows = self.rows.lock().expect("index mutex poisoned");
        let row = rows.entry(event.aggregate_id).or_insert_with(|| ResearchProblemIndexRow {
            aggregate_id: event.aggregate_id,
            title: String::new(),
            created_by: String::new(),
            status: String::new(),
            last_applied_version: 0,
        });

        if event.version <= row.last_applied_version {
            return Ok(());
        }

        match event.event_type.as_str() {
            "ProblemCreated" => {
                row.title = event.payload.get("title").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                row.created_by = event
                    .payload
                    .get("created_by")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                row.status = "Draft".to_string();
            }
            "ProblemTransformedToGame" => row.status = "GameReady".to_string(),
            "ResearchProblemArchived" => row.status = "Archived".to_string(),
            other => return Err(format!("research_problem_index: unrecognized event type {other}")),
        }
        row.last_applied_version = event.version;
        Ok(())
    }
}
