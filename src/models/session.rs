use chrono::{DateTime, Utc};

/// Represents a server-held user session.
///
/// Sessions are owned by this process and delivered to the client only as an
/// opaque `session_id` cookie. They expire after a fixed TTL or on logout.
#[derive(Debug, Clone)]
pub struct Session {
    /// The ID of the user this session belongs to.
    pub user_id: i64,
    /// The timestamp when the session was created.
    pub created_at: DateTime<Utc>,
    /// The timestamp when the session expires.
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expires_at
    }
}
