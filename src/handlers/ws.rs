use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::user::User,
    services::{auth as auth_service, chat, token},
    state::AppState,
};

/// Query parameters for the WebSocket handshake.
#[derive(Debug, Deserialize)]
pub struct WsConnectParams {
    pub token: Option<String>,
}

/// A client-to-server frame.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ClientEvent {
    /// Join a room (default room when unspecified).
    #[serde(rename = "join")]
    Join {
        #[serde(rename = "roomId")]
        room_id: Option<i64>,
    },
    /// Send a chat message to a room.
    #[serde(rename = "message")]
    SendMessage {
        content: String,
        #[serde(rename = "isAnonymous", default)]
        is_anonymous: bool,
        #[serde(rename = "roomId")]
        room_id: Option<i64>,
    },
}

/// The connection handshake: `GET /ws?token=…` (or an `Authorization: Bearer`
/// header).
///
/// Only a token is accepted here — the handshake is the first frame on a
/// fresh channel, so there is no session to fall back on. A missing,
/// malformed or expired token rejects the upgrade before any room join or
/// message exchange; there are no anonymous connections.
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsConnectParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let bearer = crate::middleware_layer::auth::extract_bearer_token(&headers);

    let Some(presented) = params.token.or(bearer) else {
        tracing::warn!("websocket connect without a token");
        return AppError::Authentication("Access token required".to_string()).into_response();
    };

    let user_id = match token::verify_token(&presented, &state.config.token_secret) {
        Ok(user_id) => user_id,
        Err(e) => {
            tracing::warn!("websocket token verification failed");
            return e.into_response();
        }
    };

    let user = match auth_service::resolve_active_user(&state.db, user_id).await {
        Ok(user) => user,
        Err(AppError::NotFound) => {
            tracing::warn!(user_id, "websocket token for an inactive user");
            return AppError::Authentication("User not found".to_string()).into_response();
        }
        Err(e) => return e.into_response(),
    };

    tracing::info!(user_id = user.id, username = %user.username, "websocket authenticated");
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

/// Drives one authenticated connection until it closes.
///
/// A failure while handling one frame is reported privately and never tears
/// down the process or any other connection. On exit, every room membership
/// is released before the task ends, so later broadcasts cannot target this
/// connection.
async fn handle_socket(socket: WebSocket, state: AppState, user: User) {
    let conn_id = Uuid::new_v4();
    let mut outbox = state.rooms.register(conn_id).await;

    let (mut sender, mut receiver) = socket.split();

    // Forward the outbox into the socket until either side closes.
    let forward_task = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if sender.send(Message::Text(frame.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = receiver.next().await {
        let Message::Text(text) = msg else {
            continue;
        };

        let event = match sonic_rs::from_str::<ClientEvent>(&text) {
            Ok(event) => event,
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, "malformed client frame: {}", e);
                state
                    .rooms
                    .send_to(conn_id, &chat::error_frame("Malformed event"))
                    .await;
                continue;
            }
        };

        match event {
            ClientEvent::Join { room_id } => {
                let room_id = room_id.unwrap_or(chat::DEFAULT_ROOM_ID);
                state.rooms.join(conn_id, room_id).await;
                tracing::info!(username = %user.username, room_id, "joined room");
            }
            ClientEvent::SendMessage {
                content,
                is_anonymous,
                room_id,
            } => {
                if let Err(e) =
                    chat::send_message(&state, &user, &content, is_anonymous, room_id).await
                {
                    tracing::error!(sender_id = user.id, "message send failed: {}", e);
                    state
                        .rooms
                        .send_to(conn_id, &chat::error_frame("Failed to send message"))
                        .await;
                }
            }
        }
    }

    // Membership release is ordered before any subsequent broadcast.
    state.rooms.deregister(conn_id).await;
    forward_task.abort();
    tracing::info!(username = %user.username, "websocket disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_frame_parses_with_default_room() {
        let event: ClientEvent = sonic_rs::from_str(r#"{"type":"join"}"#).unwrap();
        assert!(matches!(event, ClientEvent::Join { room_id: None }));

        let event: ClientEvent = sonic_rs::from_str(r#"{"type":"join","roomId":2}"#).unwrap();
        assert!(matches!(event, ClientEvent::Join { room_id: Some(2) }));
    }

    #[test]
    fn message_frame_parses_with_optional_flags() {
        let event: ClientEvent =
            sonic_rs::from_str(r#"{"type":"message","content":"hi"}"#).unwrap();
        match event {
            ClientEvent::SendMessage {
                content,
                is_anonymous,
                room_id,
            } => {
                assert_eq!(content, "hi");
                assert!(!is_anonymous);
                assert_eq!(room_id, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn unknown_frame_type_is_rejected() {
        assert!(sonic_rs::from_str::<ClientEvent>(r#"{"type":"nope"}"#).is_err());
        assert!(sonic_rs::from_str::<ClientEvent>("not json").is_err());
    }
}
