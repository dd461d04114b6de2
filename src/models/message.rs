use chrono::{DateTime, Utc};
use serde::Serialize;

/// The display name substituted for the sender of an anonymous message.
pub const ANONYMOUS_LABEL: &str = "Anonymous";

/// A persisted chat message, as read back from the database (joined with the
/// sender's username).
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// Monotonically increasing id assigned by the database.
    pub id: i64,
    /// The true sender. Nullable in the schema, but always set by this service.
    pub user_id: Option<i64>,
    pub room_id: i64,
    pub content: String,
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    /// The sender's real username, if the sender row still exists.
    pub username: Option<String>,
}

/// The outward-facing shape of a message, used both for live broadcasts and
/// for history pages. Field names match what the frontend consumes.
#[derive(Debug, Clone, Serialize)]
pub struct MessagePayload {
    pub id: i64,
    pub content: String,
    /// The *displayed* name: the sender's username, or [`ANONYMOUS_LABEL`]
    /// when the message is anonymous. The real username is never recoverable
    /// from an anonymous payload.
    pub username: String,
    #[serde(rename = "isAnonymous")]
    pub is_anonymous: bool,
    pub created_at: DateTime<Utc>,
    /// The true sender id. Always present so each client can recognize its
    /// own messages, even anonymous ones.
    #[serde(rename = "userId")]
    pub user_id: Option<i64>,
}

impl From<&StoredMessage> for MessagePayload {
    fn from(msg: &StoredMessage) -> Self {
        let username = if msg.is_anonymous {
            ANONYMOUS_LABEL.to_string()
        } else {
            msg.username.clone().unwrap_or_else(|| "?".to_string())
        };

        Self {
            id: msg.id,
            content: msg.content.clone(),
            username,
            is_anonymous: msg.is_anonymous,
            created_at: msg.created_at,
            user_id: msg.user_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn stored(is_anonymous: bool) -> StoredMessage {
        StoredMessage {
            id: 7,
            user_id: Some(42),
            room_id: 1,
            content: "hello".to_string(),
            is_anonymous,
            created_at: Utc::now(),
            username: Some("carol".to_string()),
        }
    }

    #[test]
    fn named_message_shows_real_username() {
        let payload = MessagePayload::from(&stored(false));
        assert_eq!(payload.username, "carol");
        assert_eq!(payload.user_id, Some(42));
    }

    #[test]
    fn anonymous_message_suppresses_real_username() {
        let payload = MessagePayload::from(&stored(true));
        assert_eq!(payload.username, ANONYMOUS_LABEL);
        assert_ne!(payload.username, "carol");
        // The true sender id is still carried for own-message detection.
        assert_eq!(payload.user_id, Some(42));
    }

    #[test]
    fn payload_serializes_with_frontend_field_names() {
        let payload = MessagePayload::from(&stored(true));
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["isAnonymous"], true);
        assert_eq!(json["userId"], 42);
        assert_eq!(json["username"], ANONYMOUS_LABEL);
        assert!(json.get("is_anonymous").is_none());
    }
}
