use serde::Serialize;

use crate::error::Result;
use crate::models::message::{MessagePayload, StoredMessage};
use crate::models::user::User;
use crate::registry::RoomRegistry;
use crate::repositories::message as message_repo;
use crate::state::AppState;

/// The room a client lands in when it never names one.
pub const DEFAULT_ROOM_ID: i64 = 1;

/// Default page size for history requests.
pub const DEFAULT_HISTORY_LIMIT: i64 = 50;
/// Upper bound on a history page.
pub const MAX_HISTORY_LIMIT: i64 = 200;

/// A server-to-client frame.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A chat message broadcast to a room.
    #[serde(rename = "message")]
    Message(MessagePayload),
    /// An operation failed; reported privately, the connection stays open.
    #[serde(rename = "error")]
    Error { message: String },
}

/// Serializes a private error frame for one connection.
pub fn error_frame(message: &str) -> String {
    sonic_rs::to_string(&ServerEvent::Error {
        message: message.to_string(),
    })
    .unwrap_or_else(|_| r#"{"type":"error","message":"Internal error"}"#.to_string())
}

/// Persists a chat message and fans it out to the sender's room.
///
/// Content is trimmed first; an empty send is a silent no-op, mirroring a
/// chat box send button. Persist and broadcast run under the room's
/// sequencing lock, so a message persisted before another begins persisting
/// is observed first by every recipient. On persistence failure nothing is
/// broadcast and the error propagates to the caller, which reports it to the
/// sending connection only.
pub async fn send_message(
    state: &AppState,
    sender: &User,
    content: &str,
    is_anonymous: bool,
    room_id: Option<i64>,
) -> Result<Option<MessagePayload>> {
    let content = content.trim();
    if content.is_empty() {
        return Ok(None);
    }
    let room_id = room_id.unwrap_or(DEFAULT_ROOM_ID);

    let sequencer = state.rooms.sequencer(room_id).await;
    let result = {
        let _room_order = sequencer.lock().await;
        persist_and_broadcast(state, sender, content, is_anonymous, room_id).await
    };

    // Give the lock back so idle room ids do not accumulate in the registry.
    drop(sequencer);
    state.rooms.release_sequencer(room_id).await;

    result.map(Some)
}

async fn persist_and_broadcast(
    state: &AppState,
    sender: &User,
    content: &str,
    is_anonymous: bool,
    room_id: i64,
) -> Result<MessagePayload> {
    let (id, created_at) =
        message_repo::insert_message(&state.db, sender.id, room_id, content, is_anonymous).await?;

    let stored = StoredMessage {
        id,
        user_id: Some(sender.id),
        room_id,
        content: content.to_string(),
        is_anonymous,
        created_at,
        username: Some(sender.username.clone()),
    };
    let payload = MessagePayload::from(&stored);

    broadcast_message(&state.rooms, room_id, &payload).await;

    tracing::debug!(
        message_id = id,
        room_id,
        sender_id = sender.id,
        "message persisted and broadcast"
    );
    Ok(payload)
}

async fn broadcast_message(rooms: &RoomRegistry, room_id: i64, payload: &MessagePayload) {
    match sonic_rs::to_string(&ServerEvent::Message(payload.clone())) {
        Ok(frame) => rooms.broadcast(room_id, &frame).await,
        Err(e) => tracing::error!("failed to serialize broadcast frame: {}", e),
    }
}

/// Fetches a page of a room's history in display form.
///
/// The page is selected newest-first (`offset` walks backward in time) and
/// then re-ordered chronologically, so each page reads forward. Entries are
/// shaped exactly like live broadcast payloads, anonymity suppression
/// included.
pub async fn history(
    state: &AppState,
    room_id: i64,
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<Vec<MessagePayload>> {
    let limit = limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);
    let offset = offset.unwrap_or(0).max(0);

    let page = message_repo::list_recent(&state.db, room_id, limit, offset).await?;
    Ok(into_chronological(page))
}

/// Projects a newest-first page into chronological display payloads.
fn into_chronological(mut page: Vec<StoredMessage>) -> Vec<MessagePayload> {
    page.reverse();
    page.iter().map(MessagePayload::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::ANONYMOUS_LABEL;
    use chrono::{Duration, Utc};

    fn stored(id: i64, content: &str, is_anonymous: bool) -> StoredMessage {
        StoredMessage {
            id,
            user_id: Some(1),
            room_id: 1,
            content: content.to_string(),
            is_anonymous,
            created_at: Utc::now() + Duration::seconds(id),
            username: Some("dana".to_string()),
        }
    }

    #[test]
    fn history_page_reads_forward() {
        // Repository order: newest first, as list_recent returns it.
        let page = vec![stored(3, "c", false), stored(2, "b", false)];
        let out = into_chronological(page);
        assert_eq!(out[0].content, "b");
        assert_eq!(out[1].content, "c");
    }

    #[test]
    fn history_suppresses_anonymous_usernames() {
        let out = into_chronological(vec![stored(1, "secret", true)]);
        assert_eq!(out[0].username, ANONYMOUS_LABEL);
        assert_eq!(out[0].user_id, Some(1));
    }

    #[test]
    fn error_frame_is_tagged() {
        let frame = error_frame("Failed to send message");
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "error");
        assert_eq!(v["message"], "Failed to send message");
    }

    #[test]
    fn message_frame_is_tagged_with_payload_fields() {
        let payload = MessagePayload::from(&stored(9, "hi", false));
        let frame = sonic_rs::to_string(&ServerEvent::Message(payload)).unwrap();
        let v: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["id"], 9);
        assert_eq!(v["username"], "dana");
    }
}
