//! Session Controller
//!
//! One controller owns one live conversation. It moves through
//! `Initializing -> Active -> Closing -> Closed`:
//!
//! - [`SessionController::start`] loads the profile and emits the welcome status.
//! - [`SessionController::handle`] processes inbound messages one at a time.
//! - [`SessionController::finish`] persists the session record and updates the
//!   profile. The transport must call it however the connection ends.
//!
//! Outbound events go to an `mpsc` channel so the transport can forward them
//! while a turn is still running.

use crate::{
    error::{StorageError, TurnError},
    profile::{LearnerProfile, ProfileStore, SessionTally},
    records::{ConversationTurn, SessionRecord, SessionStore},
    reply::{Correction, PronunciationAssessment},
    turn::TurnProcessor,
};
use base64::{Engine, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

/// Lifecycle of a controller. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Active,
    Closing,
    Closed,
}

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// One complete utterance, base64-encoded.
    Audio { payload: String },
    EndSession,
    /// Anything the transport could not decode.
    Malformed { reason: String },
}

/// What the transport should do after a message was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Close,
}

/// The result of one turn as shown to the learner.
#[derive(Serialize, ToSchema, Debug, Clone, PartialEq)]
pub struct TurnFeedback {
    pub timestamp: DateTime<Utc>,
    pub original_german: String,
    pub corrected_german: String,
    pub english_translation: String,
    pub corrections: Vec<Correction>,
    pub correction_count: usize,
    pub pronunciation: PronunciationAssessment,
    pub agent_response: String,
    pub agent_english: String,
    /// Base64 MP3 of `agent_response`, when speech synthesis is enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_audio: Option<String>,
}

impl TurnFeedback {
    fn new(turn: &ConversationTurn, agent_audio: Option<String>) -> Self {
        let reply = &turn.reply;
        Self {
            timestamp: turn.timestamp,
            original_german: turn.user_input.clone(),
            corrected_german: reply.corrected_german.clone(),
            english_translation: reply.english_translation.clone(),
            corrections: reply.corrections.clone(),
            correction_count: turn.correction_count,
            pronunciation: reply.pronunciation_assessment.clone(),
            agent_response: reply.continue_german.clone(),
            agent_english: reply.continue_english.clone().unwrap_or_default(),
            agent_audio,
        }
    }
}

/// Events emitted towards the learner.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Status {
        message: String,
        level: Option<String>,
        session_number: Option<u32>,
    },
    Correction(Box<TurnFeedback>),
    Error {
        message: String,
    },
}

impl SessionEvent {
    fn status(message: impl Into<String>) -> Self {
        SessionEvent::Status {
            message: message.into(),
            level: None,
            session_number: None,
        }
    }
}

/// Session-level policy knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    /// Whether a session with zero exchanges still bumps the profile counters.
    pub count_empty_sessions: bool,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            count_empty_sessions: true,
        }
    }
}

/// Shared collaborators handed to every controller.
#[derive(Clone)]
pub struct TutorServices {
    pub processor: Arc<TurnProcessor>,
    pub profiles: Arc<dyn ProfileStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub policy: SessionPolicy,
}

/// The per-connection conversation state machine.
pub struct SessionController {
    services: TutorServices,
    events: mpsc::Sender<SessionEvent>,
    state: SessionState,
    profile: LearnerProfile,
    transcript: Vec<ConversationTurn>,
    started_at: DateTime<Utc>,
}

impl SessionController {
    /// Initializing: loads the profile, emits the welcome status, becomes `Active`.
    pub async fn start(
        services: TutorServices,
        events: mpsc::Sender<SessionEvent>,
    ) -> Result<Self, StorageError> {
        let started_at = Utc::now();
        let profile = services.profiles.load().await?;
        let mut controller = Self {
            services,
            events,
            state: SessionState::Initializing,
            profile,
            transcript: Vec::new(),
            started_at,
        };

        info!(
            learner = %controller.profile.name,
            level = %controller.profile.current_level,
            session_number = controller.profile.next_session_number(),
            "Session started"
        );
        controller
            .emit(SessionEvent::Status {
                message: format!(
                    "Welcome back, {}! Ready to practice German. Speak naturally!",
                    controller.profile.name
                ),
                level: Some(controller.profile.current_level.clone()),
                session_number: Some(controller.profile.next_session_number()),
            })
            .await;
        controller.state = SessionState::Active;
        Ok(controller)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    pub fn profile(&self) -> &LearnerProfile {
        &self.profile
    }

    /// Handles one inbound message. Processing errors are reported as `error`
    /// events and never end the session.
    pub async fn handle(&mut self, message: Inbound) -> Flow {
        if self.state != SessionState::Active {
            warn!(state = ?self.state, "Ignoring message for inactive session");
            return Flow::Close;
        }
        match message {
            Inbound::Audio { payload } => {
                if let Err(e) = self.run_turn(&payload).await {
                    if e.is_transcription() {
                        warn!(error = %e, "Turn failed during transcription");
                    } else {
                        error!(error = %e, "Turn failed during completion");
                    }
                    self.emit(SessionEvent::Error {
                        message: e.learner_message(),
                    })
                    .await;
                }
                Flow::Continue
            }
            Inbound::EndSession => {
                info!("Learner ended the session");
                self.state = SessionState::Closing;
                Flow::Close
            }
            Inbound::Malformed { reason } => {
                warn!(%reason, "Malformed inbound message");
                self.emit(SessionEvent::Error {
                    message: format!("Invalid message: {reason}"),
                })
                .await;
                Flow::Continue
            }
        }
    }

    #[instrument(skip_all, fields(turn = self.transcript.len() + 1))]
    async fn run_turn(&mut self, payload: &str) -> Result<(), TurnError> {
        let audio = decode_audio(payload)?;
        self.emit(SessionEvent::status("Processing your speech..."))
            .await;

        let processor = self.services.processor.clone();
        let text = processor.transcribe(audio).await?;
        self.emit(SessionEvent::status(format!("You said: \"{text}\"")))
            .await;

        let reply = processor
            .respond(&text, &self.profile, &self.transcript)
            .await?;
        let agent_audio = processor
            .speak(&reply.continue_german)
            .await
            .map(|bytes| STANDARD.encode(bytes));

        let turn = ConversationTurn::new(text, reply);
        let feedback = TurnFeedback::new(&turn, agent_audio);
        self.transcript.push(turn);
        info!(
            corrections = feedback.correction_count,
            exchanges = self.transcript.len(),
            "Turn complete"
        );
        self.emit(SessionEvent::Correction(Box::new(feedback)))
            .await;
        Ok(())
    }

    /// Closing: persists the session record and updates the profile, then the
    /// controller is gone (`Closed`). Runs for explicit ends and disconnects
    /// alike; storage failures are logged after one retry and do not abort
    /// the teardown.
    pub async fn finish(mut self) -> SessionRecord {
        self.state = SessionState::Closing;
        let ended_at = Utc::now();
        let record = SessionRecord::new(
            self.started_at,
            ended_at,
            self.profile.current_level.clone(),
            std::mem::take(&mut self.transcript),
        );

        let sessions = self.services.sessions.clone();
        if let Err(e) = retry_once("session record", || sessions.save(&record)).await {
            error!(error = %e, session_id = %record.session_id, "Session record was not saved");
        }

        if record.exchanges > 0 || self.services.policy.count_empty_sessions {
            let tally = SessionTally {
                duration_minutes: record.duration_minutes,
                ended_at,
            };
            let profiles = self.services.profiles.clone();
            match retry_once("profile", || profiles.record_session(&tally)).await {
                Ok(profile) => self.profile = profile,
                Err(e) => error!(error = %e, "Profile update was lost"),
            }
        } else {
            info!("Empty session, profile counters unchanged");
        }

        self.state = SessionState::Closed;
        info!(
            exchanges = record.exchanges,
            duration_minutes = record.duration_minutes,
            "Session closed"
        );
        record
    }

    async fn emit(&self, event: SessionEvent) {
        if self.events.send(event).await.is_err() {
            warn!("Event receiver dropped; learner is no longer listening");
        }
    }
}

fn decode_audio(payload: &str) -> Result<Vec<u8>, TurnError> {
    if payload.trim().is_empty() {
        return Err(TurnError::InvalidAudio("no audio in message".to_string()));
    }
    let audio = STANDARD
        .decode(payload.trim())
        .map_err(|e| TurnError::InvalidAudio(e.to_string()))?;
    if audio.is_empty() {
        return Err(TurnError::InvalidAudio("no audio in message".to_string()));
    }
    Ok(audio)
}

async fn retry_once<T, F, Fut>(what: &str, mut op: F) -> Result<T, StorageError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StorageError>>,
{
    match op().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(error = %e, "Saving {what} failed, retrying once");
            op().await
        }
    }
}
