//! Main Entrypoint for the German Tutor API Service
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment.
//! 2. Building the speech, language and storage collaborators.
//! 3. Constructing the Axum router and applying middleware.
//! 4. Starting the web server and handling graceful shutdown, including
//!    waiting for open tutoring sessions to save their records.

use anyhow::Context;
use async_openai::config::OpenAIConfig;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};
use tutor_api::{config::Config, router::create_router, state::AppState};
use tutor_core::{
    FileProfileStore, FileSessionStore, SessionPolicy, TurnProcessor, TurnTimeouts, TutorServices,
    engines::{OpenAICompletionEngine, OpenAISpeechSynthesizer, OpenAITranscriber},
};

/// Headroom on top of one in-flight turn for speech synthesis and teardown.
const SESSION_TEARDOWN_GRACE: Duration = Duration::from_secs(30);

/// Listens for the `Ctrl+C` signal to gracefully shut down the server.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    info!("Received shutdown signal. Shutting down gracefully...");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();
    info!("Configuration loaded. Initializing application state...");

    // --- 3. Initialize Collaborators ---
    let openai_config = OpenAIConfig::new()
        .with_api_key(&config.openai_api_key)
        .with_api_base(&config.openai_api_base);

    let timeouts = TurnTimeouts {
        transcription: config.transcription_timeout,
        completion: config.completion_timeout,
        ..TurnTimeouts::default()
    };
    let mut processor = TurnProcessor::new(
        Arc::new(OpenAITranscriber::new(
            openai_config.clone(),
            config.transcription_model.clone(),
        )),
        Arc::new(OpenAICompletionEngine::new(
            openai_config.clone(),
            config.chat_model.clone(),
        )),
        timeouts,
    );
    if config.tts_enabled {
        info!(voice = %config.tts_voice, "Speech synthesis enabled.");
        let synthesizer = OpenAISpeechSynthesizer::new(openai_config, config.voice()?);
        processor = processor.with_synthesizer(Arc::new(synthesizer));
    }

    // --- 4. Initialize Storage ---
    let profiles = FileProfileStore::new(config.profile_path(), config.learner_name.clone());
    let sessions = FileSessionStore::new(config.sessions_dir());
    info!(
        profile = %config.profile_path().display(),
        sessions = %config.sessions_dir().display(),
        "Using file storage."
    );

    let app_state = Arc::new(AppState::new(TutorServices {
        processor: Arc::new(processor),
        profiles: Arc::new(profiles),
        sessions: Arc::new(sessions),
        policy: SessionPolicy {
            count_empty_sessions: config.count_empty_sessions,
        },
    }));

    // --- 5. Create Router and Apply Middleware ---
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = create_router(app_state.clone()).layer(cors);

    // --- 6. Start Server ---
    info!(
        model = %config.chat_model,
        transcription_model = %config.transcription_model,
        bind_address = %config.bind_address,
        "Service configured. Starting server..."
    );
    let listener = tokio::net::TcpListener::bind(config.bind_address).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // Upgraded sockets outlive the HTTP server; let their teardown finish.
    let grace = config.transcription_timeout + config.completion_timeout + SESSION_TEARDOWN_GRACE;
    info!(
        grace_secs = grace.as_secs(),
        "Waiting for open sessions to be saved..."
    );
    let drained = tokio::time::timeout(grace, app_state.drain_sessions()).await;
    if drained.is_err() {
        warn!("Open sessions did not finish in time; their records may be lost.");
    }

    info!("Server has shut down.");
    Ok(())
}
