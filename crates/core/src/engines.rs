//! External collaborators: speech-to-text, completion, and text-to-speech.
//!
//! The tutoring pipeline only depends on the traits defined here. The
//! `OpenAI*` types implement them against any OpenAI-compatible API.

use crate::prompt::{ChatMessage, ChatRole, Prompt};
use anyhow::{Context, Result};
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        AudioInput, ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateSpeechRequestArgs,
        CreateTranscriptionRequestArgs, ResponseFormat, SpeechModel, SpeechResponseFormat, Voice,
    },
};
use async_trait::async_trait;

/// Hints passed along with every utterance to the speech-to-text engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptionHint {
    /// ISO-639-1 language code.
    pub language: String,
    /// Free-text description of the expected content.
    pub prompt: String,
}

impl TranscriptionHint {
    pub fn german() -> Self {
        Self {
            language: "de".to_string(),
            prompt: "German language learning conversation".to_string(),
        }
    }
}

/// Converts recorded speech into text.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: Vec<u8>, hint: TranscriptionHint) -> Result<String>;
}

/// Everything the completion engine sees for one turn.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: Prompt,
    /// The learner's current utterance.
    pub utterance: String,
}

/// Produces the tutor's reply. Implementations must request strict JSON output.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionEngine: Send + Sync {
    /// Returns the engine's raw text; shape validation is the caller's job.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;
}

/// Turns the tutor's German line into audio.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: String) -> Result<Vec<u8>>;
}

/// Sampling temperature used for every tutoring completion.
pub const COMPLETION_TEMPERATURE: f32 = 0.7;
/// Room for a full JSON reply with several corrections.
pub const COMPLETION_MAX_TOKENS: u32 = 2000;

/// A [`Transcriber`] for OpenAI-compatible audio transcription endpoints.
pub struct OpenAITranscriber {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAITranscriber {
    /// * `config` - API key and base URL.
    /// * `model` - Transcription model, e.g. "whisper-1".
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

#[async_trait]
impl Transcriber for OpenAITranscriber {
    async fn transcribe(&self, audio: Vec<u8>, hint: TranscriptionHint) -> Result<String> {
        // Browsers record WebM/Opus; the file name tells the API the container.
        let request = CreateTranscriptionRequestArgs::default()
            .file(AudioInput::from_vec_u8("utterance.webm".to_string(), audio))
            .model(&self.model)
            .language(hint.language)
            .prompt(hint.prompt)
            .build()?;

        let response = self.client.audio().transcribe(request).await?;
        Ok(response.text)
    }
}

/// A [`CompletionEngine`] for OpenAI-compatible chat completion endpoints.
pub struct OpenAICompletionEngine {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAICompletionEngine {
    /// * `config` - API key and base URL.
    /// * `model` - Chat model identifier, e.g. "gpt-4o".
    pub fn new(config: OpenAIConfig, model: String) -> Self {
        Self {
            client: Client::with_config(config),
            model,
        }
    }
}

fn to_openai_messages(request: CompletionRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
    let mut messages: Vec<ChatCompletionRequestMessage> = vec![
        ChatCompletionRequestSystemMessageArgs::default()
            .content(request.prompt.instructions)
            .build()?
            .into(),
    ];
    for ChatMessage { role, content } in request.prompt.history {
        match role {
            ChatRole::User => messages.push(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
            ),
            ChatRole::Assistant => messages.push(
                ChatCompletionRequestAssistantMessageArgs::default()
                    .content(content)
                    .build()?
                    .into(),
            ),
        }
    }
    messages.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(request.utterance)
            .build()?
            .into(),
    );
    Ok(messages)
}

#[async_trait]
impl CompletionEngine for OpenAICompletionEngine {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(to_openai_messages(request)?)
            .temperature(COMPLETION_TEMPERATURE)
            .max_completion_tokens(COMPLETION_MAX_TOKENS)
            .response_format(ResponseFormat::JsonObject)
            .build()?;

        let response = self.client.chat().create(request).await?;
        let content = response
            .choices
            .first()
            .context("No response choice from completion engine")?
            .message
            .content
            .clone()
            .unwrap_or_default();
        Ok(content)
    }
}

/// A [`SpeechSynthesizer`] for OpenAI-compatible speech endpoints.
pub struct OpenAISpeechSynthesizer {
    client: Client<OpenAIConfig>,
    voice: Voice,
}

impl OpenAISpeechSynthesizer {
    pub fn new(config: OpenAIConfig, voice: Voice) -> Self {
        Self {
            client: Client::with_config(config),
            voice,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAISpeechSynthesizer {
    async fn synthesize(&self, text: String) -> Result<Vec<u8>> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(SpeechModel::Tts1)
            .voice(self.voice.clone())
            .response_format(SpeechResponseFormat::Mp3)
            // Slightly slower than normal speech for learners.
            .speed(0.9)
            .build()?;

        let response = self.client.audio().speech(request).await?;
        Ok(response.bytes.to_vec())
    }
}
