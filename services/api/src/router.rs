//! Axum Router Configuration
//!
//! This module defines the complete HTTP routing for the application,
//! including the REST API, WebSocket endpoint, and OpenAPI documentation.

use crate::{
    handlers,
    models::{ErrorResponse, HealthResponse, LearnerSummary, SessionListResponse, SessionPreview},
    state::AppState,
    ws::ws_handler,
};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tutor_core::{
    ConversationTurn, LearnerProfile, SessionRecord, StructuredReply,
    records::SessionSummary,
    reply::{Correction, CorrectionKind, PronunciationAssessment, PronunciationQuality},
    session::TurnFeedback,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health,
        handlers::get_profile,
        handlers::list_sessions,
        handlers::get_session,
        handlers::preview_session,
    ),
    components(
        schemas(
            HealthResponse, LearnerSummary, SessionListResponse, SessionPreview, ErrorResponse,
            LearnerProfile, SessionRecord, SessionSummary, ConversationTurn,
            StructuredReply, Correction, CorrectionKind, PronunciationAssessment,
            PronunciationQuality, TurnFeedback
        )
    ),
    tags(
        (
            name = "German Tutor API",
            description = "Learner profile and session history for the voice tutor"
        )
    )
)]
pub struct ApiDoc;

/// Creates the main Axum router for the application.
pub fn create_router(app_state: Arc<AppState>) -> Router {
    // Group all routes that require AppState into their own router.
    let api_router = Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/profile", get(handlers::get_profile))
        .route("/api/sessions", get(handlers::list_sessions))
        .route("/api/sessions/new", post(handlers::preview_session))
        .route("/api/sessions/{session_id}", get(handlers::get_session))
        .route("/ws/session", get(ws_handler))
        .with_state(app_state);

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(api_router)
}
