use std::env;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The URL of the PostgreSQL database.
    pub database_url: String,
    /// The address the HTTP server binds to.
    pub bind_addr: String,
    /// The lifetime of a server-side session in hours.
    pub session_ttl_hours: i64,
    /// The lifetime of a signed bearer token in hours.
    pub token_ttl_hours: i64,
    /// The HMAC key used to sign bearer tokens.
    pub token_secret: Zeroizing<Vec<u8>>,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let mut token_secret_hex = env::var("TOKEN_SECRET")
            .context("TOKEN_SECRET must be set (generate with: openssl rand -hex 32)")?;

        let token_secret_bytes = hex::decode(&token_secret_hex)
            .context("TOKEN_SECRET must be valid hexadecimal")?;

        token_secret_hex.zeroize();

        if token_secret_bytes.len() != 32 {
            anyhow::bail!("TOKEN_SECRET must be exactly 32 bytes (64 hex characters)");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .context("DATABASE_URL must be set")?,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string()),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("Invalid SESSION_TTL_HOURS")?,
            token_ttl_hours: env::var("TOKEN_TTL_HOURS")
                .unwrap_or_else(|_| "24".to_string())
                .parse()
                .context("Invalid TOKEN_TTL_HOURS")?,
            token_secret: Zeroizing::new(token_secret_bytes),
        })
    }
}
