//! Learner Profile Store
//!
//! The learner profile is the one long-lived record of this system: who the
//! learner is, how far along they are, and what the tutor should focus on.
//! Exactly one profile exists per installation. It is created with defaults on
//! first access, read at the start of every session, and written back (whole)
//! only when a session ends.

use crate::{
    atomic::{self, WriteMode},
    error::StorageError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::info;
use utoipa::ToSchema;

/// The learner's persistent record.
///
/// `session_count` and `total_minutes` only ever grow. `weaknesses` and
/// `pronunciation_issues` are read by the prompt composer but are maintained by
/// an external analysis step, never by a live session.
#[derive(Serialize, Deserialize, ToSchema, Debug, Clone, PartialEq)]
pub struct LearnerProfile {
    pub name: String,
    /// CEFR level code, e.g. "A1".
    pub current_level: String,
    #[serde(default)]
    pub session_count: u32,
    #[serde(default)]
    pub total_minutes: f64,
    #[serde(default = "Utc::now")]
    pub created_date: DateTime<Utc>,
    #[serde(default)]
    pub last_session: Option<DateTime<Utc>>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub pronunciation_issues: Vec<String>,
    /// Tag -> number of times the mistake was seen.
    #[serde(default)]
    pub vocabulary_errors: HashMap<String, u32>,
    #[serde(default)]
    pub grammar_patterns: HashMap<String, u32>,
    #[serde(default)]
    pub personality_context: String,
    #[serde(default)]
    pub preferred_topics: Vec<String>,
}

impl LearnerProfile {
    /// The record used when no profile has been persisted yet.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            current_level: "A1".to_string(),
            session_count: 0,
            total_minutes: 0.0,
            created_date: Utc::now(),
            last_session: None,
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            pronunciation_issues: Vec::new(),
            vocabulary_errors: HashMap::new(),
            grammar_patterns: HashMap::new(),
            personality_context: String::new(),
            preferred_topics: Vec::new(),
        }
    }

    /// Ordinal of the session that would start now.
    pub fn next_session_number(&self) -> u32 {
        self.session_count + 1
    }

    /// Folds a finished session into the long-term counters.
    pub fn apply_session(&mut self, tally: &SessionTally) {
        self.session_count += 1;
        self.total_minutes = round2(self.total_minutes + tally.duration_minutes.max(0.0));
        self.last_session = Some(tally.ended_at);
    }
}

impl Default for LearnerProfile {
    fn default() -> Self {
        Self::new("Learner")
    }
}

/// What a finished session contributes to the profile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionTally {
    pub duration_minutes: f64,
    pub ended_at: DateTime<Utc>,
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Contract for loading and persisting the learner profile.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Returns the persisted profile, or the default record if none exists.
    ///
    /// Fails only when an existing record cannot be read or parsed.
    async fn load(&self) -> Result<LearnerProfile, StorageError>;

    /// Atomically replaces the persisted profile with `profile`.
    async fn save(&self, profile: &LearnerProfile) -> Result<(), StorageError>;

    /// Re-reads the current profile, applies `tally` and saves it, as one
    /// serialized read-modify-write. Returns the profile as saved.
    async fn record_session(&self, tally: &SessionTally) -> Result<LearnerProfile, StorageError>;
}

/// A [`ProfileStore`] backed by a single JSON file.
///
/// All writes go through one async mutex, so sessions ending at the same time
/// cannot lose each other's counter updates.
pub struct FileProfileStore {
    path: PathBuf,
    default_name: String,
    write_lock: Mutex<()>,
}

impl FileProfileStore {
    /// Creates a store for the profile at `path`.
    ///
    /// `default_name` is the display name given to a freshly created profile.
    pub fn new(path: impl Into<PathBuf>, default_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            default_name: default_name.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<LearnerProfile, StorageError> {
        Ok(atomic::read_json(&self.path)
            .await?
            .unwrap_or_else(|| LearnerProfile::new(self.default_name.clone())))
    }

    async fn write(&self, profile: &LearnerProfile) -> Result<(), StorageError> {
        atomic::write_json(&self.path, profile, WriteMode::Overwrite).await?;
        info!(
            name = %profile.name,
            level = %profile.current_level,
            sessions = profile.session_count,
            "Profile saved"
        );
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for FileProfileStore {
    async fn load(&self) -> Result<LearnerProfile, StorageError> {
        self.read().await
    }

    async fn save(&self, profile: &LearnerProfile) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        self.write(profile).await
    }

    async fn record_session(&self, tally: &SessionTally) -> Result<LearnerProfile, StorageError> {
        let _guard = self.write_lock.lock().await;
        let mut profile = self.read().await?;
        profile.apply_session(tally);
        self.write(&profile).await?;
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::sync::Arc;

    fn tally(minutes: f64) -> SessionTally {
        SessionTally {
            duration_minutes: minutes,
            ended_at: Utc::now(),
        }
    }

    #[test]
    fn test_default_profile() {
        let profile = LearnerProfile::default();
        assert_eq!(profile.name, "Learner");
        assert_eq!(profile.current_level, "A1");
        assert_eq!(profile.session_count, 0);
        assert_eq!(profile.total_minutes, 0.0);
        assert!(profile.last_session.is_none());
        assert!(profile.weaknesses.is_empty());
        assert!(profile.preferred_topics.is_empty());
        assert!(profile.personality_context.is_empty());
        assert_eq!(profile.next_session_number(), 1);
    }

    #[test]
    fn test_apply_session_only_grows_counters() {
        let mut profile = LearnerProfile::new("Anna");
        profile.apply_session(&tally(3.25));
        profile.apply_session(&tally(-1.0));

        assert_eq!(profile.session_count, 2);
        assert_abs_diff_eq!(profile.total_minutes, 3.25, epsilon = 1e-9);
        assert!(profile.last_session.is_some());
    }

    #[test]
    fn test_partial_profile_file_fills_defaults() {
        let json = r#"{"name": "Yavuz", "current_level": "A2", "session_count": 7}"#;
        let profile: LearnerProfile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name, "Yavuz");
        assert_eq!(profile.session_count, 7);
        assert!(profile.vocabulary_errors.is_empty());
        assert!(profile.strengths.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_file_returns_default_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path().join("learner_profile.json"), "Anna");

        let profile = store.load().await.unwrap();
        assert_eq!(profile.name, "Anna");
        assert_eq!(profile.session_count, 0);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn test_load_corrupt_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("learner_profile.json");
        tokio::fs::write(&path, "[1, 2").await.unwrap();
        let store = FileProfileStore::new(path, "Anna");

        assert!(matches!(
            store.load().await,
            Err(StorageError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProfileStore::new(dir.path().join("learner_profile.json"), "Anna");

        let mut profile = store.load().await.unwrap();
        profile.weaknesses = vec!["dative case".into()];
        profile.grammar_patterns.insert("verb position".into(), 3);
        store.save(&profile).await.unwrap();

        assert_eq!(store.load().await.unwrap(), profile);
    }

    #[tokio::test]
    async fn test_concurrent_record_session_loses_no_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileProfileStore::new(
            dir.path().join("learner_profile.json"),
            "Anna",
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.record_session(&tally(0.5)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let profile = store.load().await.unwrap();
        assert_eq!(profile.session_count, 8);
        assert_abs_diff_eq!(profile.total_minutes, 4.0, epsilon = 1e-9);
    }
}
