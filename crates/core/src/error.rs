//! Error types shared by the tutoring pipeline.
//!
//! Failures are scoped: a [`TurnError`] ends one turn, a [`StorageError`] ends
//! one persistence step. Neither is fatal to the session or the process.

use std::path::PathBuf;
use std::time::Duration;

/// Shown when speech-to-text hears nothing usable.
const AUDIO_QUALITY_HINT: &str =
    "Untertitelung aufgrund der Audioqualität nicht möglich. / Subtitling not possible due to \
     audio quality. Try speaking closer to the microphone or in a quieter environment.";

/// Why a single conversational turn could not produce a reply.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    /// The inbound audio payload was empty or not valid base64.
    #[error("invalid audio payload: {0}")]
    InvalidAudio(String),
    /// The speech-to-text collaborator was unreachable or rejected the audio.
    #[error("transcription failed: {0}")]
    Transcription(#[source] anyhow::Error),
    /// The speech-to-text collaborator returned only whitespace.
    #[error("transcription returned no text")]
    EmptyTranscript,
    #[error("transcription timed out after {0:?}")]
    TranscriptionTimeout(Duration),
    /// The completion engine was unreachable or failed in transport.
    #[error("completion failed: {0}")]
    Completion(#[source] anyhow::Error),
    #[error("completion timed out after {0:?}")]
    CompletionTimeout(Duration),
}

impl TurnError {
    /// True for failures of the speech-to-text step (including bad input audio).
    pub fn is_transcription(&self) -> bool {
        matches!(
            self,
            TurnError::InvalidAudio(_)
                | TurnError::Transcription(_)
                | TurnError::EmptyTranscript
                | TurnError::TranscriptionTimeout(_)
        )
    }

    /// The human-readable text sent to the learner in an `error` event.
    pub fn learner_message(&self) -> String {
        match self {
            TurnError::InvalidAudio(reason) => {
                format!("Could not read the recorded audio: {reason}")
            }
            TurnError::EmptyTranscript => AUDIO_QUALITY_HINT.to_string(),
            TurnError::Transcription(_) | TurnError::TranscriptionTimeout(_) => {
                format!("Error processing audio: {self}")
            }
            TurnError::Completion(_) | TurnError::CompletionTimeout(_) => {
                format!("Could not generate a tutor reply: {self}")
            }
        }
    }
}

/// Failures of the profile and session-record stores.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("serialization error: {0}")]
    Serialize(#[source] serde_json::Error),
    /// Session records are write-once.
    #[error("record already exists at {0}")]
    AlreadyExists(PathBuf),
}
