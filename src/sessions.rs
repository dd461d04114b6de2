use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::session::Session;

/// An in-process store of server-held sessions, keyed by the opaque id that
/// travels in the `session_id` cookie.
///
/// The service runs as a single process, so sessions live here rather than in
/// an external store. A session ends at its TTL or on explicit logout; expired
/// entries are dropped lazily on lookup and swept by a background purge.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a session for a user and returns its opaque id.
    pub async fn create(&self, user_id: i64, ttl_hours: i64) -> Uuid {
        let session_id = Uuid::new_v4();
        let now = Utc::now();
        let session = Session {
            user_id,
            created_at: now,
            expires_at: now + Duration::hours(ttl_hours),
        };
        self.inner.write().await.insert(session_id, session);
        session_id
    }

    /// Looks up a live session. An expired entry is removed and reported as
    /// absent.
    pub async fn get(&self, session_id: Uuid) -> Option<Session> {
        let expired = {
            let sessions = self.inner.read().await;
            match sessions.get(&session_id) {
                Some(session) if !session.is_expired() => return Some(session.clone()),
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            self.inner.write().await.remove(&session_id);
        }
        None
    }

    /// Destroys a session. Best-effort: removing an unknown id is a no-op.
    pub async fn remove(&self, session_id: Uuid) {
        self.inner.write().await.remove(&session_id);
    }

    /// Sweeps out expired sessions; returns how many were dropped.
    pub async fn purge_expired(&self) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired());
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_session_resolves_to_user() {
        let store = SessionStore::new();
        let id = store.create(5, 24).await;
        let session = store.get(id).await.unwrap();
        assert_eq!(session.user_id, 5);
    }

    #[tokio::test]
    async fn expired_session_is_absent_and_removed() {
        let store = SessionStore::new();
        let id = store.create(5, -1).await;
        assert!(store.get(id).await.is_none());
        // Lazily removed on lookup, so a purge finds nothing left.
        assert_eq!(store.purge_expired().await, 0);
    }

    #[tokio::test]
    async fn remove_destroys_session() {
        let store = SessionStore::new();
        let id = store.create(5, 24).await;
        store.remove(id).await;
        assert!(store.get(id).await.is_none());
    }

    #[tokio::test]
    async fn purge_drops_only_expired_sessions() {
        let store = SessionStore::new();
        let live = store.create(1, 24).await;
        store.create(2, -1).await;
        assert_eq!(store.purge_expired().await, 1);
        assert!(store.get(live).await.is_some());
    }
}
