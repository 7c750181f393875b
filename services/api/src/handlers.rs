//! Axum Handlers for the REST API
//!
//! Read-only views over the learner profile and stored session records.
//! It uses `utoipa` doc comments to generate OpenAPI documentation.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::sync::Arc;
use tracing::error;
use tutor_core::{LearnerProfile, SessionRecord, records};

use crate::{
    models::{ErrorResponse, HealthResponse, LearnerSummary, SessionListResponse, SessionPreview},
    state::AppState,
};

pub enum ApiError {
    NotFound(String),
    InternalServerError(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::NotFound(message) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse { message })).into_response()
            }
            ApiError::InternalServerError(err) => {
                error!("Internal Server Error: {:?}", err);
                let message = "An internal server error occurred.".to_string();
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse { message }),
                )
                    .into_response()
            }
        }
    }
}

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self::InternalServerError(err.into())
    }
}

/// Service health plus a short summary of the learner.
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is up", body = HealthResponse),
        (status = 500, description = "Profile could not be read", body = ErrorResponse)
    )
)]
pub async fn health(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let profile = state.profiles().load().await?;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        learner: LearnerSummary {
            name: profile.name,
            level: profile.current_level,
            sessions: profile.session_count,
        },
    }))
}

/// The full learner profile.
#[utoipa::path(
    get,
    path = "/api/profile",
    responses(
        (status = 200, description = "Learner profile", body = LearnerProfile),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
) -> Result<Json<LearnerProfile>, ApiError> {
    Ok(Json(state.profiles().load().await?))
}

/// List stored sessions, newest first.
#[utoipa::path(
    get,
    path = "/api/sessions",
    responses(
        (status = 200, description = "List of sessions", body = SessionListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let sessions = state.sessions().list().await?;
    Ok(Json(SessionListResponse { sessions }))
}

/// Preview the session a new connection would open, without creating it.
#[utoipa::path(
    post,
    path = "/api/sessions/new",
    responses(
        (status = 200, description = "Next session metadata", body = SessionPreview),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    )
)]
pub async fn preview_session(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SessionPreview>, ApiError> {
    let profile = state.profiles().load().await?;
    let start_time = Utc::now();
    Ok(Json(SessionPreview {
        session_id: records::session_id_for(start_time),
        start_time,
        learner_level: profile.current_level,
        session_number: profile.session_count + 1,
    }))
}

/// Get a stored session record by its ID.
#[utoipa::path(
    get,
    path = "/api/sessions/{session_id}",
    responses(
        (status = 200, description = "Session record", body = SessionRecord),
        (status = 404, description = "Session not found", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    params(
        ("session_id" = String, Path, description = "Session ID")
    )
)]
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .sessions()
        .get(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Session with id '{session_id}' not found")))?;

    Ok((StatusCode::OK, Json(record)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::to_bytes;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::Value;
    use tutor_core::{
        FileProfileStore, FileSessionStore, ProfileStore, SessionStore, TurnProcessor,
        TurnTimeouts, TutorServices,
        engines::{CompletionEngine, CompletionRequest, Transcriber, TranscriptionHint},
        session::SessionPolicy,
    };

    struct Unused;

    #[async_trait]
    impl Transcriber for Unused {
        async fn transcribe(&self, _: Vec<u8>, _: TranscriptionHint) -> anyhow::Result<String> {
            anyhow::bail!("not used")
        }
    }

    #[async_trait]
    impl CompletionEngine for Unused {
        async fn complete(&self, _: CompletionRequest) -> anyhow::Result<String> {
            anyhow::bail!("not used")
        }
    }

    fn test_state(dir: &std::path::Path) -> Arc<AppState> {
        let processor = TurnProcessor::new(
            Arc::new(Unused),
            Arc::new(Unused),
            TurnTimeouts::default(),
        );
        let profiles = FileProfileStore::new(dir.join("learner_profile.json"), "Anna");
        Arc::new(AppState::new(TutorServices {
            processor: Arc::new(processor),
            profiles: Arc::new(profiles),
            sessions: Arc::new(FileSessionStore::new(dir.join("sessions"))),
            policy: SessionPolicy::default(),
        }))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_default_learner() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let Json(health) = health(State(state)).await.ok().unwrap();
        assert_eq!(health.status, "healthy");
        assert_eq!(health.learner.name, "Anna");
        assert_eq!(health.learner.level, "A1");
        assert_eq!(health.learner.sessions, 0);
    }

    #[tokio::test]
    async fn test_get_profile_returns_stored_profile() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut stored = LearnerProfile::new("Anna");
        stored.current_level = "B1".into();
        stored.session_count = 7;
        state.profiles().save(&stored).await.unwrap();

        let Json(profile) = get_profile(State(state)).await.ok().unwrap();
        assert_eq!(profile, stored);
    }

    #[tokio::test]
    async fn test_list_and_get_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 10, 30, 0).unwrap();
        let record = SessionRecord::new(start, start + Duration::minutes(3), "A1".into(), vec![]);
        state.sessions().save(&record).await.unwrap();

        let Json(list) = list_sessions(State(state.clone())).await.ok().unwrap();
        assert_eq!(list.sessions.len(), 1);
        assert_eq!(list.sessions[0].session_id, record.session_id);

        let response = get_session(State(state), Path(record.session_id.clone()))
            .await
            .ok()
            .unwrap()
            .into_response();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["session_id"], record.session_id.as_str());
        assert_eq!(json["duration_minutes"], 3.0);
    }

    #[tokio::test]
    async fn test_get_unknown_session_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let response = match get_session(State(state), Path("session_nope".into())).await {
            Ok(_) => panic!("Expected NotFound"),
            Err(e) => e.into_response(),
        };
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["message"], "Session with id 'session_nope' not found");
    }

    #[tokio::test]
    async fn test_corrupt_profile_is_internal_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        std::fs::write(dir.path().join("learner_profile.json"), "{ not json").unwrap();

        let response = match get_profile(State(state)).await {
            Ok(_) => panic!("Expected an error"),
            Err(e) => e.into_response(),
        };
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_preview_session_reports_next_number_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let mut stored = LearnerProfile::new("Anna");
        stored.current_level = "A2".into();
        stored.session_count = 7;
        state.profiles().save(&stored).await.unwrap();

        let before = Utc::now();
        let Json(preview) = preview_session(State(state.clone())).await.ok().unwrap();
        assert_eq!(preview.learner_level, "A2");
        assert_eq!(preview.session_number, 8);
        assert!(preview.start_time >= before);
        assert_eq!(
            preview.session_id,
            records::session_id_for(preview.start_time)
        );

        // A preview is not a session: nothing is recorded or counted.
        assert!(state.sessions().list().await.unwrap().is_empty());
        assert_eq!(state.profiles().load().await.unwrap().session_count, 7);
    }

    #[tokio::test]
    async fn test_preview_session_for_new_learner() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());

        let Json(preview) = preview_session(State(state)).await.ok().unwrap();
        assert_eq!(preview.learner_level, "A1");
        assert_eq!(preview.session_number, 1);
        assert!(preview.session_id.starts_with("session_"));
    }
}
