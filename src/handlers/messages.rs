use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::message::MessagePayload,
    services::chat,
    state::AppState,
};

/// Pagination parameters for history requests.
#[derive(Deserialize, Debug, Default)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Serialize)]
pub struct MessagesResponse {
    pub success: bool,
    pub messages: Vec<MessagePayload>,
}

/// Lists messages for the default room.
#[axum::debug_handler]
pub async fn list_messages(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response> {
    render_history(&state, chat::DEFAULT_ROOM_ID, query).await
}

/// Lists messages for a specific room.
#[axum::debug_handler]
pub async fn list_room_messages(
    State(state): State<AppState>,
    Path(room_id): Path<i64>,
    Query(query): Query<HistoryQuery>,
) -> Result<Response> {
    render_history(&state, room_id, query).await
}

async fn render_history(state: &AppState, room_id: i64, query: HistoryQuery) -> Result<Response> {
    let messages = chat::history(state, room_id, query.limit, query.offset).await?;
    Ok(Json(MessagesResponse {
        success: true,
        messages,
    })
    .into_response())
}
