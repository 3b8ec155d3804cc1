//! Index over content-generation requests, keyed by `aggregate_id`.

use crate::events::Event;
use crate::infrastructure::ReadModelProjector;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// One row of the content-request index.
#[derive(Debug, Clone)]
pub struct ContentRequestIndexRow {
    /// Owning aggregate
    pub aggregate_id: Uuid,
    /// Requested topic
    pub topic: String,
    /// Requested difficulty tier
    pub difficulty: String,
    /// Current lifecycle status tag, e.g. `"Requested"`, `"Generated"`, `"Archived"`
    pub status: String,
    /// AI-authorship confidence, once detection has completed
    pub ai_confidence: Option<f64>,
    /// Version of the last event folded into this row
    pub last_applied_version: u64,
}

/// Maintains [`ContentRequestIndexRow`]s from `content_generation` events.
#[derive(Default)]
pub struct ContentRequestIndexProjector {
    rows: Mutex<HashMap<Uuid, ContentRequestIndexRow>>,
}

impl ContentRequestIndexProjector {
    /// New, empty projector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of one row, for tests and query handlers.
    pub fn row(&self, aggregate_id: Uuid) -> Option<ContentRequestIndexRow> {
        self.rows.lock().expect("index mutex poisoned").get(&aggregate_id).cloned()
    }

    /// All rows, for tests and query handlers.
    pub fn rows(&self) -> Vec<ContentRequestIndexRow> {
        self.rows.lock().expect("index mutex poisoned").values().cloned().collect()
    }
}

#[async_trait]
impl ReadModelProjector for ContentRequestIndexProjector {
    fn projector_id(&self) -> &str {
        "content_request_index"
    }

    fn aggregate_type(&self) -> &str {
        "content_generation"
    }

    async fn apply(&self, event: &Event) -> Result<(), String> {
        let mut rows = self.rows.lock().expect("index mutex poisoned");
        let row = rows.entry(event.aggregate_id).or_insert_with(|| ContentRequestIndexRow {
            aggregate_id: event.aggregate_id,
            topic: String::new(),
            difficulty: String::new(),
            status: String::new(),
            ai_confidence: None,
            last_applied_version: 0,
        });

        if event.version <= row.last_applied_version {
            return Ok(());
        }

        match event.event_type.as_str() {
            "ContentRequested" => {
                let payload: serde_json::Value = event.payload.clone();
                row.topic = payload.get("topic").and_then(|v| v.as_str()).unwrap_or_default().to_string();
                row.difficulty = payload
                    .get("difficulty")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                row.status = "Requested".to_string();
            }
            "ContentGenerated" => row.status = "Generated".to_string(),
            "AiDetectionRequested" => row.status = "DetectionRequested".to_string(),
            "AiDetectionCompleted" => {
                row.ai_confidence = event.payload.get("confidence").and_then(|v| v.as_f64());
                row.status = "Detected".to_string();
            }
            "ContentRequestArchived" => row.status = "Archived".to_string(),
            other => return Err(format!("content_request_index: unrecognized event type {other}")),
        }
        row.last_applied_version = event.version;
        Ok(())
    }
}
