//! File-backed session store: one pretty-printed JSON file per session.
//!
//! Layout under the history directory:
//!
//! ```text
//! <history_dir>/sessions/<session_id>.json
//! <history_dir>/latest_session.txt
//! ```
//!
//! Files are human-inspectable and survive restarts. Corrupt files are
//! skipped with a warning rather than failing the whole listing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use steward_core::error::SessionError;
use steward_core::session::{Session, SessionStore, SessionSummary};
use tracing::{debug, warn};

use crate::check_id;

const LATEST_FILE: &str = "latest_session.txt";

pub struct FileSessionStore {
    root: PathBuf,
}

impl FileSessionStore {
    /// Create a store rooted at `history_dir`. Directories are created lazily.
    pub fn new(history_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: history_dir.into(),
        }
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.root.join("sessions")
    }

    fn session_path(&self, id: &str) -> PathBuf {
        self.sessions_dir().join(format!("{id}.json"))
    }

    fn latest_path(&self) -> PathBuf {
        self.root.join(LATEST_FILE)
    }

    async fn read_session(path: &Path) -> Option<Session> {
        let raw = tokio::fs::read_to_string(path).await.ok()?;
        match serde_json::from_str::<Session>(&raw) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable session file");
                None
            }
        }
    }
}

fn io_err(path: &Path, e: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        check_id(&session.id)?;
        let dir = self.sessions_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| io_err(&dir, e))?;

        let mut doc = session.clone();
        doc.refresh_title();
        let body =
            serde_json::to_string_pretty(&doc).map_err(|e| SessionError::Encoding(e.to_string()))?;

        let path = self.session_path(&session.id);
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| io_err(&path, e))?;

        let latest = self.latest_path();
        tokio::fs::write(&latest, &session.id)
            .await
            .map_err(|e| io_err(&latest, e))?;

        debug!(session_id = %session.id, messages = doc.messages.len(), "Session saved");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        check_id(id)?;
        Ok(Self::read_session(&self.session_path(id)).await)
    }

    async fn latest_id(&self) -> Result<Option<String>, SessionError> {
        let id = match tokio::fs::read_to_string(self.latest_path()).await {
            Ok(raw) => raw.trim().to_string(),
            Err(_) => return Ok(None),
        };
        if id.is_empty() || check_id(&id).is_err() {
            return Ok(None);
        }
        Ok(Some(id))
    }

    async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionError> {
        let dir = self.sessions_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_err(&dir, e)),
        };

        let mut summaries = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| io_err(&dir, e))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(session) = Self::read_session(&path).await {
                summaries.push(session.summary());
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if limit > 0 {
            summaries.truncate(limit);
        }
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool, SessionError> {
        check_id(id)?;
        let path = self.session_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(io_err(&path, e)),
        }
        if self.latest_id().await?.as_deref() == Some(id) {
            let _ = tokio::fs::remove_file(self.latest_path()).await;
        }
        Ok(true)
    }
}
