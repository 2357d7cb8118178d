//! Recommendation sessions and the feedback given on them.
//!
//! A session is written once, when a list is served from a cache miss, and
//! never changed. Feedback rows reference a session by id and are appended
//! without checking that the movie was part of the list.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use data_loader::{MovieId, UserId};
use models::Family;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tracing::warn;
use uuid::Uuid;

pub const SESSIONS_FILE: &str = "sessions.jsonl";
pub const FEEDBACK_FILE: &str = "feedback.jsonl";

/// What produced a served list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Popular,
    Als,
    LightFm,
}

impl Source {
    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Popular => "popular",
            Source::Als => "als",
            Source::LightFm => "lightfm",
        }
    }

    /// The model family behind the list, `None` for the popularity fallback
    pub fn family(&self) -> Option<Family> {
        match self {
            Source::Popular => None,
            Source::Als => Some(Family::Als),
            Source::LightFm => Some(Family::LightFm),
        }
    }
}

impl From<Family> for Source {
    fn from(family: Family) -> Self {
        match family {
            Family::Als => Source::Als,
            Family::LightFm => Source::LightFm,
        }
    }
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationSession {
    pub session_id: Uuid,
    pub user_id: UserId,
    /// Family the request was routed to
    pub model_family: Family,
    pub source: Source,
    pub recommendations: Vec<MovieId>,
    pub created_at: DateTime<Utc>,
}

impl RecommendationSession {
    pub fn new(
        user_id: impl Into<UserId>,
        model_family: Family,
        source: Source,
        recommendations: Vec<MovieId>,
    ) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            user_id: user_id.into(),
            model_family,
            source,
            recommendations,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub session_id: Uuid,
    pub movie_id: MovieId,
    pub liked: bool,
    pub created_at: DateTime<Utc>,
}

impl Feedback {
    pub fn new(session_id: Uuid, movie_id: impl Into<MovieId>, liked: bool) -> Self {
        Self {
            session_id,
            movie_id: movie_id.into(),
            liked,
            created_at: Utc::now(),
        }
    }
}

/// Append-only log of sessions and feedback
#[async_trait]
pub trait SessionLog: Send + Sync {
    async fn create_session(&self, session: &RecommendationSession) -> Result<()>;

    async fn record_feedback(&self, feedback: &Feedback) -> Result<()>;

    async fn sessions(&self) -> Result<Vec<RecommendationSession>>;

    async fn feedback(&self) -> Result<Vec<Feedback>>;
}

#[derive(Debug, Default)]
pub struct MemorySessionLog {
    sessions: RwLock<Vec<RecommendationSession>>,
    feedback: RwLock<Vec<Feedback>>,
}

impl MemorySessionLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionLog for MemorySessionLog {
    async fn create_session(&self, session: &RecommendationSession) -> Result<()> {
        self.sessions.write().await.push(session.clone());
        Ok(())
    }

    async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.feedback.write().await.push(feedback.clone());
        Ok(())
    }

    async fn sessions(&self) -> Result<Vec<RecommendationSession>> {
        Ok(self.sessions.read().await.clone())
    }

    async fn feedback(&self) -> Result<Vec<Feedback>> {
        Ok(self.feedback.read().await.clone())
    }
}

/// Session log kept as two JSON-lines files in one directory
#[derive(Debug)]
pub struct JsonlSessionLog {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlSessionLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    async fn append<T: Serialize>(&self, file: &str, record: &T) -> Result<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.dir.join(file);
        let mut out = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        out.write_all(line.as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }

    async fn read_all<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        parse_lines(&path, &content)
    }
}

/// Parse JSON lines, skipping a torn final line left by an interrupted append
fn parse_lines<T: DeserializeOwned>(path: &Path, content: &str) -> Result<Vec<T>> {
    let lines: Vec<&str> = content.lines().filter(|l| !l.trim().is_empty()).collect();
    let mut records = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) if i + 1 == lines.len() && !content.ends_with('\n') => {
                warn!("Ignoring incomplete last line of {}: {}", path.display(), e);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("{}:{}", path.display(), i + 1));
            }
        }
    }
    Ok(records)
}

#[async_trait]
impl SessionLog for JsonlSessionLog {
    async fn create_session(&self, session: &RecommendationSession) -> Result<()> {
        self.append(SESSIONS_FILE, session).await
    }

    async fn record_feedback(&self, feedback: &Feedback) -> Result<()> {
        self.append(FEEDBACK_FILE, feedback).await
    }

    async fn sessions(&self) -> Result<Vec<RecommendationSession>> {
        self.read_all(SESSIONS_FILE).await
    }

    async fn feedback(&self) -> Result<Vec<Feedback>> {
        self.read_all(FEEDBACK_FILE).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Source::LightFm).unwrap(), "\"lightfm\"");
        assert_eq!(Source::from(Family::Als), Source::Als);
        assert_eq!(Source::Popular.family(), None);
    }

    #[tokio::test]
    async fn test_jsonl_log_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let session = RecommendationSession::new(
            "u1",
            Family::Als,
            Source::Als,
            vec!["m1".into(), "m2".into()],
        );
        let feedback = Feedback::new(session.session_id, "m2", true);

        let log = JsonlSessionLog::new(dir.path().join("sessions"));
        assert!(log.sessions().await.unwrap().is_empty());
        log.create_session(&session).await.unwrap();
        log.record_feedback(&feedback).await.unwrap();

        let reopened = JsonlSessionLog::new(dir.path().join("sessions"));
        assert_eq!(reopened.sessions().await.unwrap(), vec![session]);
        assert_eq!(reopened.feedback().await.unwrap(), vec![feedback]);
    }

    #[tokio::test]
    async fn test_torn_last_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let good = Feedback::new(Uuid::new_v4(), "m1", false);
        let content = format!("{}\n{{\"session_id\":", serde_json::to_string(&good).unwrap());
        tokio::fs::write(dir.path().join(FEEDBACK_FILE), content)
            .await
            .unwrap();

        let log = JsonlSessionLog::new(dir.path());
        assert_eq!(log.feedback().await.unwrap(), vec![good]);
    }

    #[tokio::test]
    async fn test_corrupt_middle_line_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let good = serde_json::to_string(&Feedback::new(Uuid::new_v4(), "m1", true)).unwrap();
        let content = format!("not json\n{}\n", good);
        tokio::fs::write(dir.path().join(FEEDBACK_FILE), content)
            .await
            .unwrap();

        assert!(JsonlSessionLog::new(dir.path()).feedback().await.is_err());
    }
}
