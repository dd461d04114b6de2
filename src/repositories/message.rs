use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    error::Result,
    models::message::StoredMessage,
};

/// A helper function to map a joined message row to a `StoredMessage`.
fn row_to_message(row: &Row) -> Result<StoredMessage> {
    Ok(StoredMessage {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        room_id: row.try_get("room_id")?,
        content: row.try_get("content")?,
        is_anonymous: row.try_get("is_anonymous")?,
        created_at: row.try_get("created_at")?,
        username: row.try_get("username")?,
    })
}

/// Inserts a new message and returns the id and timestamp assigned by the
/// database. Messages are immutable once this returns.
pub async fn insert_message(
    pool: &Pool,
    user_id: i64,
    room_id: i64,
    content: &str,
    is_anonymous: bool,
) -> Result<(i64, DateTime<Utc>)> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO messages (user_id, room_id, content, is_anonymous)
            VALUES ($1, $2, $3, $4)
            RETURNING id, created_at
            "#,
            &[&user_id, &room_id, &content, &is_anonymous],
        )
        .await?;
    Ok((row.try_get("id")?, row.try_get("created_at")?))
}

/// Fetches the most recent page of a room's messages, newest first.
///
/// `offset` counts backward from the most recent message; the caller is
/// responsible for re-ordering the page chronologically for display.
pub async fn list_recent(
    pool: &Pool,
    room_id: i64,
    limit: i64,
    offset: i64,
) -> Result<Vec<StoredMessage>> {
    let client = pool.get().await?;
    let rows = client
        .query(
            r#"
            SELECT
                m.id,
                m.user_id,
                m.room_id,
                m.content,
                m.is_anonymous,
                m.created_at,
                u.username
            FROM messages m
            LEFT JOIN users u ON m.user_id = u.id
            WHERE m.room_id = $1
            ORDER BY m.created_at DESC, m.id DESC
            LIMIT $2 OFFSET $3
            "#,
            &[&room_id, &limit, &offset],
        )
        .await?;
    rows.iter().map(row_to_message).collect()
}
