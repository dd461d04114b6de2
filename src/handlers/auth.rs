use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tower_cookies::{cookie::time::Duration, Cookie, Cookies};
use uuid::Uuid;

use crate::{
    error::Result,
    middleware_layer::auth::AuthUser,
    models::user::UserInfo,
    services::{auth as auth_service, token},
    state::AppState,
    validation::auth::*,
};

/// The request payload for user registration.
///
/// Fields are optional at the serde level so an absent field is reported as a
/// validation failure rather than a deserialization rejection.
#[derive(Deserialize, Debug)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// The request payload for user login.
#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Unwraps a required request field, or fails with the given message.
fn required(value: Option<String>, message: &str) -> crate::error::Result<String> {
    value.ok_or_else(|| crate::error::AppError::Validation(message.to_string()))
}

const REGISTER_FIELDS_REQUIRED: &str = "Username, email, and password are required";
const LOGIN_FIELDS_REQUIRED: &str = "Email and password are required";

/// The response payload for register and login: the public user record plus a
/// self-contained bearer token for the WebSocket handshake.
#[derive(Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub user: UserInfo,
    pub token: String,
}

/// A bare acknowledgement.
#[derive(Serialize)]
pub struct AckResponse {
    pub success: bool,
    pub message: String,
}

/// The response payload for identity verification.
#[derive(Serialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub user: UserInfo,
}

/// Creates the session cookie (HttpOnly, SameSite=Lax, secure in production).
fn create_session_cookie(session_id: Uuid, ttl_hours: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new("session_id", session_id.to_string());

    let is_production = std::env::var("APP_ENV")
        .unwrap_or_else(|_| "development".to_string())
        == "production";

    cookie.set_http_only(true);
    if is_production {
        cookie.set_secure(true);
    }
    cookie.set_same_site(tower_cookies::cookie::SameSite::Lax);
    cookie.set_max_age(Duration::hours(ttl_hours));
    cookie.set_path("/");

    cookie
}

/// Establishes a session and issues a token for a freshly authenticated user.
async fn open_credentials(
    state: &AppState,
    cookies: &Cookies,
    user_id: i64,
) -> Result<String> {
    let session_id = state
        .sessions
        .create(user_id, state.config.session_ttl_hours)
        .await;
    cookies.add(create_session_cookie(
        session_id,
        state.config.session_ttl_hours,
    ));

    token::issue_token(
        user_id,
        &state.config.token_secret,
        state.config.token_ttl_hours,
    )
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse> {
    let username = required(payload.username, REGISTER_FIELDS_REQUIRED)?;
    let email = required(payload.email, REGISTER_FIELDS_REQUIRED)?;
    let password = required(payload.password, REGISTER_FIELDS_REQUIRED)?;

    tracing::info!("Register attempt: {}", username);
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&password)?;

    let user = auth_service::register_user(&state.db, username, email, password).await?;

    let token = open_credentials(&state, &cookies, user.id).await?;
    tracing::info!("User registered: {}", user.id);

    let response = AuthResponse {
        success: true,
        message: "User registered successfully".to_string(),
        user: UserInfo::from(&user),
        token,
    };
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<LoginRequest>,
) -> Result<Response> {
    let email = required(payload.email, LOGIN_FIELDS_REQUIRED)?;
    let password = required(payload.password, LOGIN_FIELDS_REQUIRED)?;

    tracing::info!("Login attempt: {}", email);

    let user = auth_service::authenticate_user(&state.db, &email, password).await?;

    let token = open_credentials(&state, &cookies, user.id).await?;
    tracing::info!("User logged in: {}", user.id);

    let response = AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserInfo::from(&user),
        token,
    };
    Ok((StatusCode::OK, Json(response)).into_response())
}

/// Reports the authenticated caller's user record (dual-mode gate upstream).
#[axum::debug_handler]
pub async fn verify(Extension(AuthUser(user)): Extension<AuthUser>) -> Response {
    Json(VerifyResponse {
        success: true,
        user: UserInfo::from(&user),
    })
    .into_response()
}

/// Handles user logout: best-effort session destruction.
///
/// Only the session dies here. An outstanding bearer token stays valid until
/// its expiry; there is no revocation list.
#[axum::debug_handler]
pub async fn logout(State(state): State<AppState>, cookies: Cookies) -> Response {
    if let Some(cookie) = cookies.get("session_id") {
        if let Ok(session_id) = Uuid::parse_str(cookie.value()) {
            state.sessions.remove(session_id).await;
            tracing::info!(%session_id, "session destroyed");
        }
    }

    let mut removal = Cookie::new("session_id", "");
    removal.set_max_age(Duration::seconds(0));
    removal.set_path("/");
    cookies.remove(removal);

    Json(AckResponse {
        success: true,
        message: "Logged out successfully".to_string(),
    })
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn register_body_with_absent_field_still_deserializes() {
        let payload: RegisterRequest =
            sonic_rs::from_str(r#"{"username":"alice","email":"a@b.com"}"#).unwrap();
        assert_eq!(payload.username.as_deref(), Some("alice"));
        assert!(payload.password.is_none());
    }

    #[test]
    fn absent_required_field_maps_to_validation_error() {
        let err = required(None, REGISTER_FIELDS_REQUIRED).unwrap_err();
        match err {
            AppError::Validation(msg) => assert_eq!(msg, REGISTER_FIELDS_REQUIRED),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn present_field_passes_through() {
        let value = required(Some("hello".to_string()), LOGIN_FIELDS_REQUIRED).unwrap();
        assert_eq!(value, "hello");
    }
}
