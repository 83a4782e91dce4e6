//! In-memory session storage

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info};

use super::model::Session;
use super::repository::SessionStore;
use crate::{Error, Result};

struct Entry {
    session: Session,
    last_access: Instant,
}

/// Process-resident session store; nothing survives a restart
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Entry>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn save(&self, session: Session) -> Result<Session> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.id) {
            return Err(Error::SessionExists(session.id));
        }
        debug!("Storing session {} ({})", session.id, session.agent_kind);
        sessions.insert(
            session.id.clone(),
            Entry {
                session: session.clone(),
                last_access: Instant::now(),
            },
        );
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.get_mut(id).map(|entry| {
            entry.last_access = Instant::now();
            entry.session.clone()
        }))
    }

    async fn remove(&self, id: &str) -> Result<bool> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(id).is_some())
    }

    async fn evict_idle(&self, ttl: Duration) -> Result<usize> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.last_access.elapsed() < ttl;
            if !keep {
                info!("Session {} idle for more than {:?}, evicting", id, ttl);
            }
            keep
        });
        Ok(before - sessions.len())
    }

    async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentKind;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_save_and_get() {
        let store = InMemorySessionStore::new();
        let session = store.save(Session::new(AgentKind::Codex, "/tmp")).await.unwrap();

        let found = store.get(&session.id).await.unwrap().unwrap();
        assert_eq!(found, session);
        assert!(store.get("missing").await.unwrap().is_none());
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_duplicate_id_rejected() {
        let store = InMemorySessionStore::new();
        let session = store.save(Session::new(AgentKind::Codex, "/tmp")).await.unwrap();
        assert!(store.save(session).await.is_err());
    }

    #[tokio::test]
    async fn test_remove() {
        let store = InMemorySessionStore::new();
        let session = store.save(Session::new(AgentKind::Claude, "/tmp")).await.unwrap();

        assert!(store.remove(&session.id).await.unwrap());
        assert!(!store.remove(&session.id).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_evict_idle_keeps_recent_sessions() {
        let store = InMemorySessionStore::new();
        let old = store.save(Session::new(AgentKind::Codex, "/tmp")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let fresh = store.save(Session::new(AgentKind::Codex, "/tmp")).await.unwrap();

        let evicted = store.evict_idle(Duration::from_millis(150)).await.unwrap();

        assert_eq!(evicted, 1);
        assert!(store.get(&old.id).await.unwrap().is_none());
        assert!(store.get(&fresh.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_get_refreshes_last_access() {
        let store = InMemorySessionStore::new();
        let session = store.save(Session::new(AgentKind::Codex, "/tmp")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        store.get(&session.id).await.unwrap();

        assert_eq!(store.evict_idle(Duration::from_millis(150)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = Arc::new(InMemorySessionStore::new());
        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let session = store.save(Session::new(AgentKind::Codex, "/tmp")).await.unwrap();
                store.get(&session.id).await.unwrap().unwrap()
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len().await, 16);
    }
}
