//! Session domain type and the persistence trait.
//!
//! A session is one conversation plus the provider/model/mode it runs with.
//! It is persisted after every turn and never deleted automatically.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::ExecutionMode;
use crate::error::SessionError;
use crate::message::{Message, Role};

const TITLE_MAX_CHARS: usize = 48;
const DEFAULT_TITLE: &str = "new session";

/// A persisted conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "session_id")]
    pub id: String,

    #[serde(default)]
    pub provider: String,

    #[serde(default)]
    pub model: String,

    #[serde(rename = "build_mode", default)]
    pub mode: ExecutionMode,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,

    /// Derived from the first user message on save.
    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Session {
    /// Start a session holding only the system prompt.
    pub fn new(
        id: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
        mode: ExecutionMode,
        system_prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            provider: provider.into(),
            model: model.into(),
            mode,
            created_at: now,
            updated_at: now,
            title: DEFAULT_TITLE.to_string(),
            messages: vec![Message::system(system_prompt)],
        }
    }

    /// Append a message and bump the update time.
    pub fn push(&mut self, message: Message) {
        self.updated_at = Utc::now();
        self.messages.push(message);
    }

    /// Recompute the title from the current messages.
    pub fn refresh_title(&mut self) {
        self.title = derive_title(&self.messages);
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            build_mode: self.mode,
            updated_at: self.updated_at,
            title: if self.title.is_empty() {
                derive_title(&self.messages)
            } else {
                self.title.clone()
            },
            message_count: self.messages.len(),
        }
    }
}

/// One line of a session listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub build_mode: ExecutionMode,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub message_count: usize,
}

/// First line of the first non-empty user message, cut at 48 chars.
pub fn derive_title(messages: &[Message]) -> String {
    for msg in messages.iter().filter(|m| m.role == Role::User) {
        let text = msg.content.trim();
        if text.is_empty() {
            continue;
        }
        let line = text.lines().next().unwrap_or("").trim();
        if line.chars().count() > TITLE_MAX_CHARS {
            let cut: String = line.chars().take(TITLE_MAX_CHARS).collect();
            return format!("{cut}...");
        }
        return line.to_string();
    }
    DEFAULT_TITLE.to_string()
}

/// Storage for sessions.
///
/// Save failures must reach the caller; silently losing a conversation is
/// never acceptable.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persist the session and mark it as the most recently active one.
    async fn save(&self, session: &Session) -> Result<(), SessionError>;

    /// Load a session. `None` when it does not exist or cannot be decoded.
    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError>;

    /// ID of the most recently saved session.
    async fn latest_id(&self) -> Result<Option<String>, SessionError>;

    /// Summaries, most recently updated first. `limit == 0` means all.
    async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionError>;

    /// Remove a session. Returns whether anything was deleted.
    async fn delete(&self, id: &str) -> Result<bool, SessionError>;
}
