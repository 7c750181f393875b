use async_openai::types::Voice;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub openai_api_key: String,
    pub openai_api_base: String,
    pub chat_model: String,
    pub transcription_model: String,
    pub log_level: Level,
    pub data_dir: PathBuf,
    pub transcription_timeout: Duration,
    pub completion_timeout: Duration,
    pub tts_enabled: bool,
    pub tts_voice: String,
    pub count_empty_sessions: bool,
    pub learner_name: String,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let openai_api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("OPENAI_API_KEY".to_string()))?;
        let openai_api_base = std::env::var("OPENAI_API_BASE")
            .unwrap_or_else(|_| "https://api.openai.com/v1".to_string());

        let chat_model = std::env::var("CHAT_MODEL").unwrap_or_else(|_| "gpt-4o".to_string());
        let transcription_model =
            std::env::var("TRANSCRIPTION_MODEL").unwrap_or_else(|_| "whisper-1".to_string());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let data_dir = std::env::var("DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));

        let transcription_timeout =
            Duration::from_secs(parse_var("TRANSCRIPTION_TIMEOUT_SECS", 30)?);
        let completion_timeout = Duration::from_secs(parse_var("COMPLETION_TIMEOUT_SECS", 60)?);
        let tts_enabled = parse_var("TTS_ENABLED", false)?;
        let tts_voice = std::env::var("TTS_VOICE").unwrap_or_else(|_| "nova".to_string());
        let count_empty_sessions = parse_var("COUNT_EMPTY_SESSIONS", true)?;
        let learner_name = std::env::var("LEARNER_NAME").unwrap_or_else(|_| "Learner".to_string());

        let config = Self {
            bind_address,
            openai_api_key,
            openai_api_base,
            chat_model,
            transcription_model,
            log_level,
            data_dir,
            transcription_timeout,
            completion_timeout,
            tts_enabled,
            tts_voice,
            count_empty_sessions,
            learner_name,
        };
        config.voice()?;
        Ok(config)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.data_dir.join("learner_profile.json")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// The synthesis voice named by `TTS_VOICE`.
    pub fn voice(&self) -> Result<Voice, ConfigError> {
        match self.tts_voice.trim().to_ascii_lowercase().as_str() {
            "alloy" => Ok(Voice::Alloy),
            "echo" => Ok(Voice::Echo),
            "fable" => Ok(Voice::Fable),
            "onyx" => Ok(Voice::Onyx),
            "nova" => Ok(Voice::Nova),
            "shimmer" => Ok(Voice::Shimmer),
            other => Err(ConfigError::InvalidValue(
                "TTS_VOICE".to_string(),
                format!("'{other}' is not a supported voice"),
            )),
        }
    }
}

/// Reads an optional variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}
