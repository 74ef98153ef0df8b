//! Chat session storage.
//!
//! Sessions are evicted after an idle TTL. Each session carries a turn lock
//! so that concurrent sends to the same session are processed one at a time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use markit_core::ChatTurn;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown session_id: {0}")]
pub struct SessionNotFound(pub String);

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create an empty session and return its id (32 hex characters).
    async fn create(&self) -> String;

    /// The session's transcript, oldest turn first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionNotFound`] for unknown or expired sessions.
    async fn get(&self, session_id: &str) -> Result<Vec<ChatTurn>, SessionNotFound>;

    /// Append `turns` in order.
    ///
    /// # Errors
    ///
    /// Returns [`SessionNotFound`] for unknown or expired sessions.
    async fn append(&self, session_id: &str, turns: Vec<ChatTurn>) -> Result<(), SessionNotFound>;

    /// Wait for exclusive use of the session for one turn. The turn ends
    /// when the guard is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`SessionNotFound`] for unknown or expired sessions.
    async fn lock_turn(&self, session_id: &str) -> Result<OwnedMutexGuard<()>, SessionNotFound>;

    /// Drop idle sessions; returns how many were removed.
    async fn evict_expired(&self) -> usize;
}

struct SessionEntry {
    transcript: Vec<ChatTurn>,
    last_active: Instant,
    turn_lock: Arc<Mutex<()>>,
}

impl SessionEntry {
    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_active) >= ttl
    }

    /// A turn is in flight while anyone else holds a handle to the lock.
    fn is_busy(&self) -> bool {
        Arc::strong_count(&self.turn_lock) > 1
    }
}

/// Process-local [`SessionStore`].
pub struct InMemorySessionStore {
    ttl: Duration,
    sessions: Mutex<HashMap<String, SessionEntry>>,
}

impl InMemorySessionStore {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }

    /// Run `f` on a live session, refreshing its idle timer.
    async fn with_live<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut SessionEntry) -> T,
    ) -> Result<T, SessionNotFound> {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let expired = match sessions.get(session_id) {
            None => return Err(SessionNotFound(session_id.to_string())),
            Some(entry) => entry.is_expired(now, self.ttl) && !entry.is_busy(),
        };
        if expired {
            sessions.remove(session_id);
            return Err(SessionNotFound(session_id.to_string()));
        }
        let entry = sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionNotFound(session_id.to_string()))?;
        entry.last_active = now;
        Ok(f(entry))
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> String {
        let session_id = uuid::Uuid::new_v4().simple().to_string();
        self.sessions.lock().await.insert(
            session_id.clone(),
            SessionEntry {
                transcript: Vec::new(),
                last_active: Instant::now(),
                turn_lock: Arc::new(Mutex::new(())),
            },
        );
        tracing::debug!(%session_id, "chat session created");
        session_id
    }

    async fn get(&self, session_id: &str) -> Result<Vec<ChatTurn>, SessionNotFound> {
        self.with_live(session_id, |entry| entry.transcript.clone())
            .await
    }

    async fn append(&self, session_id: &str, turns: Vec<ChatTurn>) -> Result<(), SessionNotFound> {
        self.with_live(session_id, |entry| entry.transcript.extend(turns))
            .await
    }

    async fn lock_turn(&self, session_id: &str) -> Result<OwnedMutexGuard<()>, SessionNotFound> {
        let lock = self
            .with_live(session_id, |entry| Arc::clone(&entry.turn_lock))
            .await?;
        Ok(lock.lock_owned().await)
    }

    async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.is_busy() || !entry.is_expired(now, self.ttl));
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::info!(evicted, remaining = sessions.len(), "evicted idle chat sessions");
        }
        evicted
    }
}
