use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, Request},
    middleware::Next,
    response::Response,
};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::User,
    services::{auth as auth_service, token},
    state::AppState,
};

/// The authenticated user, inserted as a request extension by [`require_auth`].
#[derive(Clone, Debug)]
pub struct AuthUser(pub User);

/// Extracts the session id from the request cookies.
fn extract_session_id(cookies: &Cookies) -> Option<Uuid> {
    cookies
        .get("session_id")
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Extracts a bearer token from the `Authorization` header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

/// The dual-mode authentication gate for stateless calls.
///
/// Resolution order: a valid, unexpired session first; otherwise a verified
/// bearer token. Both paths resolve through the same active-user lookup, so a
/// deactivated account is rejected regardless of credential. A missing
/// credential and an invalid one are logged apart but both surface as 401.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response> {
    // Credentials are pulled out of the request up front; the request body
    // must not be borrowed across an await point.
    let session_id = extract_session_id(&cookies);
    let bearer = extract_bearer_token(request.headers());

    let user = resolve_caller(&state, session_id, bearer).await?;

    tracing::debug!(user_id = user.id, "request authenticated");
    request.extensions_mut().insert(AuthUser(user));

    Ok(next.run(request).await)
}

async fn resolve_caller(
    state: &AppState,
    session_id: Option<Uuid>,
    bearer: Option<String>,
) -> Result<User> {
    // 1. Server-side session, if the cookie maps to a live one.
    if let Some(session_id) = session_id {
        if let Some(session) = state.sessions.get(session_id).await {
            match auth_service::resolve_active_user(&state.db, session.user_id).await {
                Ok(user) => return Ok(user),
                Err(AppError::NotFound) => {
                    tracing::warn!(
                        user_id = session.user_id,
                        "session maps to an inactive user; falling through"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    // 2. Bearer token fallback.
    let Some(bearer) = bearer else {
        tracing::debug!("no session or bearer credential on request");
        return Err(AppError::Authentication("Access token required".to_string()));
    };

    let user_id = token::verify_token(&bearer, &state.config.token_secret)?;
    match auth_service::resolve_active_user(&state.db, user_id).await {
        Ok(user) => Ok(user),
        Err(AppError::NotFound) => {
            tracing::warn!(user_id, "valid token for an inactive user");
            Err(AppError::Authentication("User not found".to_string()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_extracted_as_owned_string() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), Some("abc.def".to_string()));
    }

    #[test]
    fn non_bearer_authorization_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers), None);
        assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
    }
}
