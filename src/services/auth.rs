use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, ParamsBuilder,
};
use deadpool_postgres::Pool;
use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroize;

use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::repositories::user as user_repo;

/// The memory cost for Argon2 in MB.
const ARGON2_MEMORY_MB: u32 = 19;
/// The number of iterations for Argon2.
const ARGON2_ITERATIONS: u32 = 3;
/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 2;

/// The error message for failed logins. Identical for an unknown email and a
/// wrong password so account existence is never leaked.
const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// The one rejection every failed login path returns.
fn invalid_credentials() -> AppError {
    AppError::Authentication(INVALID_CREDENTIALS.to_string())
}

/// Hashes a password using Argon2id.
fn hash_password(password: &str) -> Result<String> {
    let mut password_bytes = password.as_bytes().to_vec();

    let mut salt_bytes = [0u8; 16];
    OsRng.fill_bytes(&mut salt_bytes);

    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| AppError::Internal(format!("Salt encoding error: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        ParamsBuilder::new()
            .m_cost(ARGON2_MEMORY_MB * 1024)
            .t_cost(ARGON2_ITERATIONS)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Internal(format!("Argon2 params: {}", e)))?,
    );

    let password_hash = argon2
        .hash_password(&password_bytes, &salt)
        .map_err(|e| AppError::Internal(format!("Argon2 hash error: {}", e)))?
        .to_string();

    password_bytes.zeroize();
    Ok(password_hash)
}

/// Verifies a password against a stored hash.
fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let mut password_bytes = password.as_bytes().to_vec();
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::Internal(format!("Hash parse error: {}", e)))?;
    let result = Argon2::default()
        .verify_password(&password_bytes, &parsed_hash)
        .is_ok();

    password_bytes.zeroize();
    Ok(result)
}

/// Registers a new user with a hashed password.
///
/// Validation of field shapes happens at the handler; this enforces
/// uniqueness and performs the CPU-bound hash on a blocking thread so it
/// cannot stall broadcast delivery to other connections.
pub async fn register_user(
    pool: &Pool,
    username: String,
    email: String,
    password: String,
) -> Result<User> {
    tracing::debug!("Creating user: {}", username);

    if user_repo::username_or_email_exists(pool, &username, &email).await? {
        return Err(AppError::Conflict(
            "Username or email already exists".to_string(),
        ));
    }

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Hash task failed: {}", e)))??;

    let user = match user_repo::create_user(pool, &username, &email, &password_hash).await {
        Ok(user) => user,
        // Backstop for a concurrent register racing past the pre-check.
        Err(AppError::Database(ref e))
            if e.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) =>
        {
            return Err(AppError::Conflict(
                "Username or email already exists".to_string(),
            ));
        }
        Err(e) => return Err(e),
    };

    tracing::info!("User created with id: {}", user.id);
    Ok(user)
}

/// Authenticates a user by email and password.
pub async fn authenticate_user(pool: &Pool, email: &str, password: String) -> Result<User> {
    let user = user_repo::find_active_by_email(pool, email)
        .await?
        .ok_or_else(invalid_credentials)?;

    check_user_password(&user, password).await?;

    tracing::info!("User authenticated: {}", user.id);
    Ok(user)
}

/// Checks a password against a user's stored hash on a blocking thread.
///
/// A mismatch fails with the same rejection as an unknown email.
async fn check_user_password(user: &User, password: String) -> Result<()> {
    let hash = user.password_hash.clone();
    let valid = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verify task failed: {}", e)))??;

    if !valid {
        return Err(invalid_credentials());
    }
    Ok(())
}

/// Resolves a user id to a currently active user.
///
/// The single choke point for identity resolution: sessions, bearer tokens
/// and connection handshakes all come through here, so a deactivated user is
/// rejected no matter how valid the credential looks.
pub async fn resolve_active_user(pool: &Pool, user_id: i64) -> Result<User> {
    user_repo::find_active_by_id(pool, user_id)
        .await?
        .ok_or(AppError::NotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify_round_trip() {
        let hash = hash_password("hunter2plus").unwrap();
        assert!(verify_password("hunter2plus", &hash).unwrap());
        assert!(!verify_password("hunter2wrong", &hash).unwrap());
    }

    #[test]
    fn hashes_are_salted() {
        let a = hash_password("same-password").unwrap();
        let b = hash_password("same-password").unwrap();
        assert_ne!(a, b);
    }

    fn test_user(password_hash: String) -> User {
        User {
            id: 7,
            username: "carol".to_string(),
            email: "carol@example.com".to_string(),
            password_hash,
            is_active: true,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn wrong_password_matches_unknown_email_rejection() {
        let user = test_user(hash_password("right-password").unwrap());

        let wrong_password = check_user_password(&user, "wrong-password".to_string())
            .await
            .unwrap_err();
        let unknown_email = invalid_credentials();

        match (&wrong_password, &unknown_email) {
            (AppError::Authentication(a), AppError::Authentication(b)) => assert_eq!(a, b),
            other => panic!("expected identical authentication errors, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn correct_password_is_accepted() {
        let user = test_user(hash_password("right-password").unwrap());
        check_user_password(&user, "right-password".to_string())
            .await
            .unwrap();
    }
}
