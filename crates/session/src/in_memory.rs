//! In-memory session store: useful for testing and ephemeral gateways.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use steward_core::error::SessionError;
use steward_core::session::{Session, SessionStore, SessionSummary};
use tokio::sync::RwLock;

use crate::check_id;

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    latest: Option<String>,
}

#[derive(Clone, Default)]
pub struct InMemorySessionStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: &Session) -> Result<(), SessionError> {
        check_id(&session.id)?;
        let mut doc = session.clone();
        doc.refresh_title();
        let mut inner = self.inner.write().await;
        inner.latest = Some(doc.id.clone());
        inner.sessions.insert(doc.id.clone(), doc);
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<Session>, SessionError> {
        check_id(id)?;
        Ok(self.inner.read().await.sessions.get(id).cloned())
    }

    async fn latest_id(&self) -> Result<Option<String>, SessionError> {
        Ok(self.inner.read().await.latest.clone())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SessionSummary>, SessionError> {
        let inner = self.inner.read().await;
        let mut summaries: Vec<_> = inner.sessions.values().map(Session::summary).collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if limit > 0 {
            summaries.truncate(limit);
        }
        Ok(summaries)
    }

    async fn delete(&self, id: &str) -> Result<bool, SessionError> {
        check_id(id)?;
        let mut inner = self.inner.write().await;
        let removed = inner.sessions.remove(id).is_some();
        if inner.latest.as_deref() == Some(id) {
            inner.latest = None;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::agent::ExecutionMode;
    use steward_core::message::Message;

    #[tokio::test]
    async fn save_list_delete() {
        let store = InMemorySessionStore::new();
        let mut s = Session::new("s1", "openai", "gpt-4.1-mini", ExecutionMode::Fast, "sys");
        s.push(Message::user("hello there"));
        store.save(&s).await.unwrap();

        let loaded = store.load("s1").await.unwrap().unwrap();
        assert_eq!(loaded.title, "hello there");
        assert_eq!(store.list(0).await.unwrap().len(), 1);
        assert_eq!(store.latest_id().await.unwrap().as_deref(), Some("s1"));

        assert!(store.delete("s1").await.unwrap());
        assert!(store.latest_id().await.unwrap().is_none());
        assert!(store.load("s1").await.unwrap().is_none());
    }
}
