use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Issues a self-contained signed bearer token for a user.
///
/// Token format: `base64url(user_id|expires_unix_secs|hex(hmac_sha256))`.
/// The signature binds the user id to an expiry window; nothing server-side
/// is stored for it. Tokens are never revoked before expiry — logout destroys
/// only the session, and an outstanding token stays valid until it expires.
pub fn issue_token(user_id: i64, secret: &[u8], ttl_hours: i64) -> Result<String> {
    let expires = Utc::now().timestamp() + ttl_hours * 3600;
    let payload = format!("{}|{}", user_id, expires);

    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(format!("HMAC key error: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    let token = format!("{}|{}", payload, hex::encode(signature));
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token.as_bytes()))
}

/// Verifies a signed bearer token and returns the user id it binds.
///
/// Fails with an authentication error on malformed input, a bad signature
/// (compared in constant time), or expiry.
pub fn verify_token(token: &str, secret: &[u8]) -> Result<i64> {
    let invalid = || AppError::Authentication("Invalid token".to_string());

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(token.as_bytes())
        .map_err(|_| invalid())?;
    let token_str = String::from_utf8(decoded).map_err(|_| invalid())?;

    // Parse: user_id|expires|signature_hex
    let parts: Vec<&str> = token_str.splitn(3, '|').collect();
    if parts.len() != 3 {
        return Err(invalid());
    }

    let payload = format!("{}|{}", parts[0], parts[1]);
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|e| AppError::Internal(format!("HMAC key error: {}", e)))?;
    mac.update(payload.as_bytes());
    let expected = mac.finalize().into_bytes();
    let provided = hex::decode(parts[2]).map_err(|_| invalid())?;

    if expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() != 1 {
        return Err(invalid());
    }

    let expires: i64 = parts[1].parse().map_err(|_| invalid())?;
    if Utc::now().timestamp() > expires {
        return Err(AppError::Authentication("Token expired".to_string()));
    }

    parts[0].parse().map_err(|_| invalid())
}
