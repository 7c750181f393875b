//! Turn Processor
//!
//! Runs one conversational turn: transcribe the utterance, compose the prompt,
//! ask the completion engine, and parse its answer into a [`StructuredReply`].
//! The two collaborator calls are the only suspension points and are each
//! bounded by a timeout.

use crate::{
    engines::{
        CompletionEngine, CompletionRequest, SpeechSynthesizer, Transcriber, TranscriptionHint,
    },
    error::TurnError,
    profile::LearnerProfile,
    prompt,
    records::ConversationTurn,
    reply::{StructuredReply, parse_reply},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Upper bounds on each collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTimeouts {
    pub transcription: Duration,
    pub completion: Duration,
    pub synthesis: Duration,
}

impl Default for TurnTimeouts {
    fn default() -> Self {
        Self {
            transcription: Duration::from_secs(30),
            completion: Duration::from_secs(60),
            synthesis: Duration::from_secs(30),
        }
    }
}

/// Orchestrates the collaborators for a single turn.
pub struct TurnProcessor {
    transcriber: Arc<dyn Transcriber>,
    completion: Arc<dyn CompletionEngine>,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    timeouts: TurnTimeouts,
}

impl TurnProcessor {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        completion: Arc<dyn CompletionEngine>,
        timeouts: TurnTimeouts,
    ) -> Self {
        Self {
            transcriber,
            completion,
            synthesizer: None,
            timeouts,
        }
    }

    /// Enables speech synthesis of the tutor's line for every turn.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// Step 1: speech to text. Whitespace-only output counts as a failure.
    pub async fn transcribe(&self, audio: Vec<u8>) -> Result<String, TurnError> {
        debug!(bytes = audio.len(), "Transcribing utterance");
        let text = timeout(
            self.timeouts.transcription,
            self.transcriber
                .transcribe(audio, TranscriptionHint::german()),
        )
        .await
        .map_err(|_| TurnError::TranscriptionTimeout(self.timeouts.transcription))?
        .map_err(TurnError::Transcription)?;

        let text = text.trim();
        if text.is_empty() {
            return Err(TurnError::EmptyTranscript);
        }
        info!(transcript = %text, "Transcribed");
        Ok(text.to_string())
    }

    /// Steps 2-4: compose, complete, parse. Unparseable output becomes the
    /// fallback reply; only transport failures and timeouts are errors.
    pub async fn respond(
        &self,
        utterance: &str,
        profile: &LearnerProfile,
        transcript: &[ConversationTurn],
    ) -> Result<StructuredReply, TurnError> {
        let request = CompletionRequest {
            prompt: prompt::compose(profile, transcript),
            utterance: utterance.to_string(),
        };
        let raw = timeout(self.timeouts.completion, self.completion.complete(request))
            .await
            .map_err(|_| TurnError::CompletionTimeout(self.timeouts.completion))?
            .map_err(TurnError::Completion)?;

        Ok(parse_reply(&raw, utterance))
    }

    /// The whole pipeline for one utterance. Returns the transcript and reply.
    pub async fn process_turn(
        &self,
        audio: Vec<u8>,
        profile: &LearnerProfile,
        transcript: &[ConversationTurn],
    ) -> Result<(String, StructuredReply), TurnError> {
        let text = self.transcribe(audio).await?;
        let reply = self.respond(&text, profile, transcript).await?;
        Ok((text, reply))
    }

    /// Best-effort audio for the tutor's line. `None` when disabled or failed.
    pub async fn speak(&self, text: &str) -> Option<Vec<u8>> {
        let synthesizer = self.synthesizer.as_ref()?;
        if text.trim().is_empty() {
            return None;
        }
        match timeout(
            self.timeouts.synthesis,
            synthesizer.synthesize(text.to_string()),
        )
        .await
        {
            Ok(Ok(audio)) => {
                debug!(
                    bytes = audio.len(),
                    chars = text.len(),
                    "Synthesized tutor line"
                );
                Some(audio)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Speech synthesis failed, continuing without audio");
                None
            }
            Err(_) => {
                warn!("Speech synthesis timed out, continuing without audio");
                None
            }
        }
    }
}
