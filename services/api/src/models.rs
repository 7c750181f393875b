//! API Models
//!
//! Response bodies for the REST endpoints. Stored data (profiles, session
//! records) is served as-is from `tutor_core`; these types only wrap it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tutor_core::records::SessionSummary;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct LearnerSummary {
    #[schema(example = "Yavuz")]
    pub name: String,
    #[schema(example = "A1")]
    pub level: String,
    pub sessions: u32,
}

#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    pub version: String,
    pub learner: LearnerSummary,
}

#[derive(Serialize, ToSchema, Debug, Clone)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// What a session started now would look like. Nothing is stored.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct SessionPreview {
    #[schema(example = "session_2025-01-15T10:30:00+00:00")]
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    #[schema(example = "A1")]
    pub learner_level: String,
    pub session_number: u32,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}
