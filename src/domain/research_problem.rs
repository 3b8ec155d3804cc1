//! `ResearchProblemAggregate`: tracks a research problem from authoring
//! through transformation into a playable game problem, and archival.

use crate::aggregate::Aggregate;
use crate::errors::{DomainError, DomainResult};
use crate::events::{Event, EventMetadata};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle stage of a research problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResearchProblemStatus {
    /// Authored but not yet transformed into a game problem
    Draft,
    /// Transformed into a playable game problem
    GameReady,
    /// Soft-deleted; no further commands accepted
    Archived,
}

/// `ProblemCreated` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemCreated {
    /// Short problem title
    pub title: String,
    /// Full problem statement
    pub description: String,
    /// Id of the author who created the problem
    pub created_by: String,
}

/// `ProblemTransformedToGame` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemTransformedToGame {
    /// Game mechanic this problem was mapped onto, e.g. `"sorting_puzzle"`
    pub game_type: String,
    /// Opaque game-specific configuration derived from the problem
    pub game_payload: serde_json::Value,
}

/// `ResearchProblemArchived` event payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchProblemArchived;

/// Game-problem details recorded once a research problem has been
/// transformed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameProblemDetails {
    /// Game mechanic this problem was mapped onto
    pub game_type: String,
    /// Opaque game-specific configuration
    pub game_payload: serde_json::Value,
}

/// Current materialized state of one research problem.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResearchProblemAggregate {
    id: Uuid,
    version: u64,
    status: Option<ResearchProblemStatus>,
    title: String,
    description: String,
    created_by: String,
    game_problem: Option<GameProblemDetails>,
    #[serde(skip)]
    pending: Vec<Event>,
}

impl ResearchProblemAggregate {
    /// Current status, `None` before the first event has been applied.
    pub fn status(&self) -> Option<ResearchProblemStatus> {
        self.status
    }

    /// Game problem details, once transformed.
    pub fn game_problem(&self) -> Option<&GameProblemDetails> {
        self.game_problem.as_ref()
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

    /// Author a new research problem.
    pub fn create(
        id: Uuid,
        title: String,
        description: String,
        created_by: String,
    ) -> DomainResult<Self> {
        if title.trim().is_empty() {
            return Err(DomainError::ValidationError("title must not be empty".to_string()));
        }
        let mut aggregate = Self {
            id,
            ..Self::default()
        };
        aggregate.raise(
            "ProblemCreated",
            ProblemCreated {
                title,
                description,
                created_by,
            },
        )?;
        Ok(aggregate)
    }

    /// Transform a draft problem into a playable game problem.
    pub fn transform_to_game_problem(
        &mut self,
        game_type: String,
        game_payload: serde_json::Value,
    ) -> DomainResult<()> {
        match self.status {
            Some(ResearchProblemStatus::Draft) => {}
            Some(ResearchProblemStatus::GameReady) => {
                return Err(DomainError::InvariantViolation(
                    "problem has already been transformed into a game problem".to_string(),
                ))
            }
            Some(ResearchProblemStatus::Archived) => {
                return Err(DomainError::InvariantViolation(
                    "cannot transform an archived problem".to_string(),
                ))
            }
            None => return Err(DomainError::NotFound(self.id.to_string())),
        }
        self.raise(
            "ProblemTransformedToGame",
            ProblemTransformedToGame {
                game_type,
                game_payload,
            },
        )
    }

    /// Soft-delete this problem.
    pub fn archive(&mut self) -> DomainResult<()> {
        match self.status {
            None => return Err(DomainError::NotFound(self.id.to_string())),
            Some(ResearchProblemStatus::Archived) => {
                return Err(DomainError::InvariantViolation(
                    "problem is already archived".to_string(),
                ))
            }
            _ => {}
        }
        self.raise("ResearchProblemArchived", ResearchProblemArchived)
    }
}

impl Aggregate for ResearchProblemAggregate {
    const AGGREGATE_TYPE: &'static str = "research_problem";

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
            "ProblemCreated" => {
                if let Ok(payload) = event.deserialize_payload::<ProblemCreated>() {
                    self.title = payload.title;
                    self.description = payload.description;
                    self.created_by = payload.created_by;
                    self.status = Some(ResearchProblemStatus::Draft);
                }
            }
            "ProblemTransformedToGame" => {
                if let Ok(payload) = event.deserialize_payload::<ProblemTransformedToGame>() {
                    self.game_problem = Some(GameProblemDetails {
                        game_type: payload.game_type,
                        game_payload: payload.game_payload,
                    });
                    self.status = Some(ResearchProblemStatus::GameReady);
                }
            }
            "ResearchProblemArchived" => {
                self.status = Some(ResearchProblemStatus::Archived);
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
