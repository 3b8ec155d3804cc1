//! `ContentGenerationAggregate`: tracks one AI content-generation request
//! from submission through generation, optional AI-authorship detection,
//! and archival.

use crate::aggregate::Aggregate;
use crate::errors::{DomainError, DomainResult};
use crate::events::{Event, EventMetadata};
use crate::ports::GeneratedContent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of a content generation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentRequestStatus {
    /// Requested but not yet generated
    Requested,
    /// Generation succeeded and content is available
    Generated,
    /// AI-authorship detection has been requested for the generated content
    DetectionRequested,
    /// Detection completed
    Detected,
    /// Soft-deleted; no further commands accepted
    Archived,
}

/// `ContentRequested` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequested {
    /// Topic to generate content about
    pub topic: String,
    /// Difficulty tier the content should target
    pub difficulty: String,
}

/// `ContentGenerated` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentGenerated {
    /// Provider-assigned identifier for this generation
    pub provider_request_id: String,
    /// Generated body text
    pub body: String,
}

/// `AiDetectionRequested` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDetectionRequested;

/// `AiDetectionCompleted` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiDetectionCompleted {
    /// Detector confidence that the content is AI-generated, in `[0.0, 1.0]`
    pub confidence: f64,
}

/// `ContentRequestArchived` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentRequestArchived;

/// Current materialized state of one content generation request. This is
/// the `state_blob` a `SnapshotStore` persists opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentGenerationAggregate {
    id: Uuid,
    version: u64,
    status: Option<ContentRequestStatus>,
    topic: String,
    difficulty: String,
    generated: Option<GeneratedContent>,
    ai_confidence: Option<f64>,
    #[serde(skip)]
    pending: Vec<Event>,
}

impl ContentGenerationAggregate {
    /// Request status, `None` before the first event has been applied.
    pub fn status(&self) -> Option<ContentRequestStatus> {
        self.status
    }

    /// Generated content, if generation has completed.
    pub fn generated(&self) -> Option<&GeneratedContent> {
        self.generated.as_ref()
    }

    /// AI-authorship confidence, if detection has completed.
    pub fn ai_confidence(&self) -> Option<f64> {
        self.ai_confidence
    }

    fn raise(&mut self, event_type: &'static str, payload: impl Serialize) -> DomainResult<()> {
        let event = crate::aggregate::raise_event(
            self.id,
            Self::AGGREGATE_TYPE,
            event_type,
            self.version + self.pending.len() as u64 + 1,
            &payload,
            EventMetadata::default(),
        )?;
        self.pending.push(event.clone());
        self.apply(&event);
        Ok(())
    }

    /// Start a brand-new request. Only legal on a fresh (version 0) aggregate.
    pub fn request_content_generation(
        id: Uuid,
        topic: String,
        difficulty: String,
    ) -> DomainResult<Self> {
        let mut aggregate = Self {
            id,
            ..Self::default()
        };
        aggregate.raise(
            "ContentRequested",
            ContentRequested { topic, difficulty },
        )?;
        Ok(aggregate)
    }

    /// Record the AI provider's generated content.
    pub fn record_generated_content(&mut self, content: GeneratedContent) -> DomainResult<()> {
        match self.status {
            Some(ContentRequestStatus::Requested) => {}
            Some(ContentRequestStatus::Archived) => {
                return Err(DomainError::InvariantViolation(
                    "cannot generate content for an archived request".to_string(),
                ))
            }
            Some(_) => {
                return Err(DomainError::InvariantViolation(
                    "content has already been generated for this request".to_string(),
                ))
            }
            None => return Err(DomainError::NotFound(self.id.to_string())),
        }
        self.raise(
            "ContentGenerated",
            ContentGenerated {
                provider_request_id: content.provider_request_id,
                body: content.body,
            },
        )
    }

    /// Request AI-authorship detection on the generated content.
    pub fn request_ai_detection(&mut self) -> DomainResult<()> {
        match self.status {
            Some(ContentRequestStatus::Generated) => {}
            Some(ContentRequestStatus::Archived) => {
                return Err(DomainError::InvariantViolation(
                    "cannot request detection for an archived request".to_string(),
                ))
            }
            _ => {
                return Err(DomainError::InvariantViolation(
                    "detection may only be requested after content has been generated".to_string(),
                ))
            }
        }
        self.raise("AiDetectionRequested", AiDetectionRequested)
    }

    /// Record a completed detection result.
    pub fn complete_ai_detection(&mut self, confidence: f64) -> DomainResult<()> {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DomainError::ValidationError(
                "confidence must be within [0.0, 1.0]".to_string(),
            ));
        }
        match self.status {
            Some(ContentRequestStatus::DetectionRequested) => {}
            _ => {
                return Err(DomainError::InvariantViolation(
                    "detection completion requires a prior detection request".to_string(),
                ))
            }
        }
        self.raise("AiDetectionCompleted", AiDetectionCompleted { confidence })
    }

    /// Soft-delete this request. Idempotent in the sense that archiving an
    /// already-archived request is rejected, not silently accepted, since
    /// it is a programmer error at the command layer, not a benign replay.
    pub fn archive(&mut self) -> DomainResult<()> {
        if self.status == Some(ContentRequestStatus::Archived) {
            return Err(DomainError::InvariantViolation(
                "request is already archived".to_string(),
            ));
        }
        if self.status.is_none() {
            return Err(DomainError::NotFound(self.id.to_string()));
        }
        self.raise("ContentRequestArchived", ContentRequestArchived)
    }
}

impl Aggregate for ContentGenerationAggregate {
    const AGGREGATE_TYPE: &'static str = "content_generation";

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> u64 {
        self.version
    }

    fn apply(&mut self, event: &Event) {
        self.id = event.aggregate_id;
        self.version = event.version;
        match event.event_type.as_str() {
            "ContentRequested" => {
                if let Ok(payload) = event.deserialize_payload::<ContentRequested>() {
                    self.topic = payload.topic;
                    self.difficulty = payload.difficulty;
                    self.status = Some(ContentRequestStatus::Requested);
                }
            }
            "ContentGenerated" => {
                if let Ok(payload) = event.deserialize_payload::<ContentGenerated>() {
                    self.generated = Some(GeneratedContent {
                        provider_request_id: payload.provider_request_id,
                        body: payload.body,
                    });
                    self.status = Some(ContentRequestStatus::Generated);
                }
            }
            "AiDetectionRequested" => {
                self.status = Some(ContentRequestStatus::DetectionRequested);
            }
            "AiDetectionCompleted" => {
                if let Ok(payload) = event.deserialize_payload::<AiDetectionCompleted>() {
                    self.ai_confidence = Some(payload.confidence);
                    self.status = Some(ContentRequestStatus::Detected);
                }
            }
            "ContentRequestArchived" => {
                self.status = Some(ContentRequestStatus::Archived);
            }
            _ => {}
        }
    }

    fn uncommitted_events(&self) -> &[Event] {
        &self.pending
    }

    fn mark_committed(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_content_generation_creates_version_one() {
        let id = Uuid::new_v4();
        let aggregate =
            ContentGenerationAggregate::request_content_generation(id, "fractions".to_string(), "easy".to_string())
                .unwrap();
        assert_eq!(aggregate.version(), 1);
        assert_eq!(aggregate.status(), Some(ContentRequestStatus::Requested));
        assert_eq!(aggregate.uncommitted_events().len(), 1);
    }

    #[test]
    fn full_lifecycle_advances_status_and_version() {
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "fractions".to_string(), "easy".to_string())
                .unwrap();
        aggregate
            .record_generated_content(GeneratedContent {
                provider_request_id: "p-1".to_string(),
                body: "content".to_string(),
            })
            .unwrap();
        assert_eq!(aggregate.status(), Some(ContentRequestStatus::Generated));
        aggregate.request_ai_detection().unwrap();
        aggregate.complete_ai_detection(0.2).unwrap();
        assert_eq!(aggregate.ai_confidence(), Some(0.2));
        aggregate.archive().unwrap();
        assert_eq!(aggregate.status(), Some(ContentRequestStatus::Archived));
        assert_eq!(aggregate.version(), 5);
        assert_eq!(aggregate.uncommitted_events().len(), 5);
    }

    #[test]
    fn cannot_archive_twice() {
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "t".to_string(), "d".to_string()).unwrap();
        aggregate.archive().unwrap();
        let err = aggregate.archive().unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn cannot_request_detection_before_generation() {
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "t".to_string(), "d".to_string()).unwrap();
        let err = aggregate.request_ai_detection().unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn detection_confidence_out_of_range_is_rejected() {
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "t".to_string(), "d".to_string()).unwrap();
        aggregate
            .record_generated_content(GeneratedContent {
                provider_request_id: "p".to_string(),
                body: "b".to_string(),
            })
            .unwrap();
        aggregate.request_ai_detection().unwrap();
        let err = aggregate.complete_ai_detection(1.5).unwrap_err();
        assert!(err.is_validation_error());
    }

    #[test]
    fn load_from_history_reproduces_state() {
        let id = Uuid::new_v4();
        let mut aggregate =
            ContentGenerationAggregate::request_content_generation(id, "t".to_string(), "d".to_string()).unwrap();
        aggregate
            .record_generated_content(GeneratedContent {
                provider_request_id: "p".to_string(),
                body: "b".to_string(),
            })
            .unwrap();
        let events = aggregate.uncommitted_events().to_vec();
        let replayed = ContentGenerationAggregate::load_from_history(&events);
        assert_eq!(replayed.version(), aggregate.version());
        assert_eq!(replayed.status(), aggregate.status());
        assert_eq!(replayed.generated(), aggregate.generated());
    }
}
