//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Log level
    pub log_level: String,

    /// Allowed CORS origins, comma separated; "*" allows any origin
    pub cors_allowed_origins: String,

    /// Session token lifetime in hours
    pub session_ttl_hours: i64,

    /// Username provisioned for the first-boot administrator account
    pub admin_username: String,

    /// Email for the first-boot administrator account
    pub admin_email: String,

    /// Password for the first-boot administrator account; generated and
    /// logged once when unset
    pub admin_password: Option<String>,
}

// The database URL embeds credentials, so it never reaches Debug output.
redacted_debug!(Config {
    redact database_url,
    show bind_address,
    show log_level,
    show cors_allowed_origins,
    show session_ttl_hours,
    show admin_username,
    show admin_email,
    redact_option admin_password,
});

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .map_err(|_| AppError::Config("DATABASE_URL not set".into()))?,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
            cors_allowed_origins: env::var("CORS_ALLOWED_ORIGINS").unwrap_or_else(|_| "*".into()),
            session_ttl_hours: env::var("SESSION_TTL_HOURS")
                .unwrap_or_else(|_| "72".into())
                .parse()
                .unwrap_or(72),
            admin_username: env::var("ADMIN_USERNAME").unwrap_or_else(|_| "admin".into()),
            admin_email: env::var("ADMIN_EMAIL")
                .unwrap_or_else(|_| "admin@casedesk.local".into()),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
        })
    }
}
