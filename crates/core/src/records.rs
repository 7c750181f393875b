//! Session transcripts and their write-once persistence.

use crate::{
    atomic::{self, WriteMode},
    error::StorageError,
    profile::round2,
    reply::StructuredReply,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use utoipa::ToSchema;

/// One completed request/response cycle. Immutable once created.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct ConversationTurn {
    pub timestamp: DateTime<Utc>,
    /// The raw transcript of what the learner said.
    pub user_input: String,
    pub reply: StructuredReply,
    pub correction_count: usize,
}

impl ConversationTurn {
    pub fn new(user_input: String, reply: StructuredReply) -> Self {
        Self {
            timestamp: Utc::now(),
            correction_count: reply.correction_count(),
            user_input,
            reply,
        }
    }
}

/// The persisted record of one finished session.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub learner_level: String,
    pub exchanges: usize,
    pub conversation_log: Vec<ConversationTurn>,
}

impl SessionRecord {
    pub fn new(
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        learner_level: String,
        conversation_log: Vec<ConversationTurn>,
    ) -> Self {
        Self {
            session_id: session_id_for(start_time),
            start_time,
            end_time,
            duration_minutes: duration_minutes(start_time, end_time),
            learner_level,
            exchanges: conversation_log.len(),
            conversation_log,
        }
    }

    /// The file name this record is stored under.
    pub fn file_name(&self) -> String {
        file_name_for(self.start_time)
    }
}

pub fn session_id_for(start_time: DateTime<Utc>) -> String {
    format!("session_{}", start_time.to_rfc3339())
}

fn file_name_for(start_time: DateTime<Utc>) -> String {
    format!("{}.json", start_time.format("%Y%m%d_%H%M%S_%3f"))
}

/// How many alternative names are tried when sessions start in the same millisecond.
const MAX_NAME_SUFFIX: usize = 16;

/// `base` for the first attempt, then `<stem>_<n>.json`.
fn suffixed(base: &str, attempt: usize) -> String {
    if attempt == 0 {
        return base.to_string();
    }
    let stem = base.strip_suffix(".json").unwrap_or(base);
    format!("{stem}_{attempt}.json")
}

/// Elapsed minutes between two instants, rounded to two decimals, never negative.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    let millis = (end - start).num_milliseconds().max(0);
    round2(millis as f64 / 60_000.0)
}

/// Listing entry for a stored session.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub session_id: String,
    pub filename: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: f64,
    pub exchanges: usize,
    pub level: String,
}

/// Contract for persisting finished sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists `record` once; a second save of the same session fails.
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError>;

    /// All readable records, newest first.
    async fn list(&self) -> Result<Vec<SessionSummary>, StorageError>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError>;
}

/// A [`SessionStore`] that keeps one JSON file per session in a directory.
pub struct FileSessionStore {
    dir: PathBuf,
}

impl FileSessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn holds_session(&self, path: &Path, session_id: &str) -> bool {
        matches!(
            atomic::read_json::<SessionRecord>(path).await,
            Ok(Some(record)) if record.session_id == session_id
        )
    }

    /// Reads every record in the directory, skipping files that fail to parse.
    async fn read_all(&self) -> Result<Vec<(String, SessionRecord)>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
            let is_hidden = entry.file_name().to_string_lossy().starts_with('.');
            if !is_json || is_hidden {
                continue;
            }
            match atomic::read_json::<SessionRecord>(&path).await {
                Ok(Some(record)) => {
                    records.push((entry.file_name().to_string_lossy().into_owned(), record))
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable session file")
                }
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, record: &SessionRecord) -> Result<(), StorageError> {
        let base = record.file_name();
        for attempt in 0..=MAX_NAME_SUFFIX {
            let path = self.dir.join(suffixed(&base, attempt));
            match atomic::write_json(&path, record, WriteMode::CreateNew).await {
                Ok(()) => {
                    info!(path = %path.display(), exchanges = record.exchanges, "Session saved");
                    return Ok(());
                }
                Err(StorageError::AlreadyExists(taken)) => {
                    if self.holds_session(&taken, &record.session_id).await {
                        return Err(StorageError::AlreadyExists(taken));
                    }
                    debug!(path = %taken.display(), "File name taken by another session");
                }
                Err(e) => return Err(e),
            }
        }
        Err(StorageError::AlreadyExists(self.dir.join(base)))
    }

    async fn list(&self) -> Result<Vec<SessionSummary>, StorageError> {
        let mut summaries: Vec<SessionSummary> = self
            .read_all()
            .await?
            .into_iter()
            .map(|(filename, record)| SessionSummary {
                session_id: record.session_id,
                filename,
                start_time: record.start_time,
                duration_minutes: record.duration_minutes,
                exchanges: record.exchanges,
                level: record.learner_level,
            })
            .collect();
        summaries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(summaries)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>, StorageError> {
        Ok(self
            .read_all()
            .await?
            .into_iter()
            .map(|(_, record)| record)
            .find(|record| record.session_id == session_id))
    }
}
