// Copyright 2025 Cowboy AI, LLC.

//! Read-model projections: denormalized, query-shaped tables derived from
//! the event stream, each maintained by one [`crate::infrastructure::ReadModelProjector`].
//!
//! Every row carries `last_applied_version` so applying the same event
//! twice is a no-op, making at-least-once bus delivery safe.

pub mod content_request_index;
pub mod game_transformation_index;
pub mod research_problem_index;

pub use content_request_index::{ContentRequestIndexProjector, ContentRequestIndexRow};
pub use game_transformation_index::{GameTransformationIndexProjector, GameTransformationIndexRow};
pub use research_problem_index::{ResearchProblemIndexProjector, ResearchProblemIndexRow};
