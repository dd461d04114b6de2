use deadpool_postgres::Pool;
use tokio_postgres::Row;

use crate::{
    error::Result,
    models::user::User,
};

/// A helper function to map a `tokio_postgres::Row` to a `User`.
fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Creates a new user in the database.
pub async fn create_user(
    pool: &Pool,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<User> {
    let client = pool.get().await?;
    let row = client
        .query_one(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, is_active, created_at
            "#,
            &[&username, &email, &password_hash],
        )
        .await?;
    row_to_user(&row)
}

/// Checks whether a username or email is already taken.
pub async fn username_or_email_exists(pool: &Pool, username: &str, email: &str) -> Result<bool> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT 1 AS present
            FROM users
            WHERE username = $1 OR email = $2
            "#,
            &[&username, &email],
        )
        .await?;
    Ok(row.is_some())
}

/// Finds an active user by their email address.
pub async fn find_active_by_email(pool: &Pool, email: &str) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, username, email, password_hash, is_active, created_at
            FROM users
            WHERE email = $1 AND is_active = true
            "#,
            &[&email],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}

/// Finds an active user by their ID.
///
/// Every identity resolution path (session, bearer token, handshake) goes
/// through this, so deactivated users are rejected even with an otherwise
/// valid credential.
pub async fn find_active_by_id(pool: &Pool, user_id: i64) -> Result<Option<User>> {
    let client = pool.get().await?;
    let row = client
        .query_opt(
            r#"
            SELECT id, username, email, password_hash, is_active, created_at
            FROM users
            WHERE id = $1 AND is_active = true
            "#,
            &[&user_id],
        )
        .await?;
    row.map(|r| row_to_user(&r)).transpose()
}
