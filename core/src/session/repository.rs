//! Session store trait
//!
//! Defines the interface for session storage operations.

use std::time::Duration;

use async_trait::async_trait;

use super::model::Session;
use crate::Result;

/// Concurrent storage for sessions, shared by every request and worker
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store a new session
    async fn save(&self, session: Session) -> Result<Session>;

    /// Get a session by ID, refreshing its last-access time
    async fn get(&self, id: &str) -> Result<Option<Session>>;

    /// Remove a session by ID
    async fn remove(&self, id: &str) -> Result<bool>;

    /// Remove sessions not accessed within `ttl`, returning how many were removed
    async fn evict_idle(&self, ttl: Duration) -> Result<usize>;

    /// Number of stored sessions
    async fn len(&self) -> usize;

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
