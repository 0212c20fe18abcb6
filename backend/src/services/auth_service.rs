//! Authentication service.
//!
//! Handles password hashing and the session credentials behind bearer
//! tokens. Tokens are opaque: a prefix is stored for lookup and a bcrypt
//! hash for verification, so a leaked sessions table cannot be replayed.
//! Revocation is a committed write and is checked on every resolution,
//! which keeps it immediately visible to the next request.

use std::sync::Arc;

use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::session::{Session, SessionCreated};
use crate::models::user::{UserWithRole, USER_WITH_ROLE_COLUMNS};

/// Authentication service
pub struct AuthService {
    db: PgPool,
    config: Arc<Config>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(db: PgPool, config: Arc<Config>) -> Self {
        Self { db, config }
    }

    /// Authenticate a user with username and password.
    ///
    /// The password is verified before account state is inspected, so a
    /// wrong password never reveals whether an account is deactivated.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<UserWithRole> {
        let user = self
            .fetch_user_by_username(username)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

        let password_hash = user
            .password_hash
            .as_ref()
            .ok_or_else(|| AppError::Authentication("Invalid username or password".to_string()))?;

        if !Self::verify_password(password, password_hash)? {
            return Err(AppError::Authentication(
                "Invalid username or password".to_string(),
            ));
        }

        if !user.is_active {
            return Err(AppError::Authorization("Account is deactivated".to_string()));
        }
        if !user.is_approved {
            return Err(AppError::Authorization(
                "Account is pending approval".to_string(),
            ));
        }

        sqlx::query("UPDATE users SET last_login_at = NOW() WHERE id = $1")
            .bind(user.id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(user)
    }

    /// Issue a session credential for a user.
    pub async fn issue_session(&self, user_id: Uuid) -> Result<SessionCreated> {
        let token = generate_session_token();
        let prefix = &token[..8];
        let token_hash = Self::hash_password(&token)?;
        let expires_at = Utc::now() + Duration::hours(self.config.session_ttl_hours);

        let session = sqlx::query_as::<_, Session>(
            r#"
            INSERT INTO sessions (user_id, token_hash, token_prefix, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, token_prefix, expires_at,
                      revoked_at, last_used_at, created_at
            "#,
        )
        .bind(user_id)
        .bind(&token_hash)
        .bind(prefix)
        .bind(expires_at)
        .fetch_one(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(SessionCreated {
            id: session.id,
            user_id: session.user_id,
            token,
            token_prefix: session.token_prefix,
            expires_at: session.expires_at,
        })
    }

    /// Resolve a bearer token to its session and user.
    ///
    /// Rejects unknown, revoked, and expired credentials as authentication
    /// failures. Deliberately does not filter on account state: the request
    /// gate distinguishes a deactivated account (403 plus revocation) from
    /// a bad credential (401).
    pub async fn resolve_token(&self, token: &str) -> Result<(Session, UserWithRole)> {
        if token.len() < 8 {
            return Err(AppError::Authentication("Invalid session token".to_string()));
        }
        let prefix = &token[..8];

        // The prefix is not unique by construction, so verify against every
        // candidate row.
        let candidates = sqlx::query_as::<_, Session>(
            r#"
            SELECT id, user_id, token_hash, token_prefix, expires_at,
                   revoked_at, last_used_at, created_at
            FROM sessions
            WHERE token_prefix = $1
            "#,
        )
        .bind(prefix)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        let mut session = None;
        for candidate in candidates {
            if Self::verify_password(token, &candidate.token_hash)? {
                session = Some(candidate);
                break;
            }
        }
        let session = session
            .ok_or_else(|| AppError::Authentication("Invalid session token".to_string()))?;

        if session.revoked_at.is_some() {
            return Err(AppError::Authentication("Session revoked".to_string()));
        }
        if session.expires_at < Utc::now() {
            return Err(AppError::Authentication("Session expired".to_string()));
        }

        sqlx::query("UPDATE sessions SET last_used_at = NOW() WHERE id = $1")
            .bind(session.id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let user = self
            .fetch_user_by_id(session.user_id)
            .await?
            .ok_or_else(|| AppError::Authentication("User not found".to_string()))?;

        Ok((session, user))
    }

    /// Revoke a session. Idempotent; a revoked session stays revoked.
    pub async fn revoke_session(&self, session_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE sessions SET revoked_at = NOW() WHERE id = $1 AND revoked_at IS NULL")
            .bind(session_id)
            .execute(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    /// Revoke every live session of a user (password change, deletion).
    pub async fn revoke_sessions_for_user(&self, user_id: Uuid) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE sessions SET revoked_at = NOW() WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .execute(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(result.rows_affected())
    }

    /// Hash a password
    pub fn hash_password(password: &str) -> Result<String> {
        hash(password, DEFAULT_COST)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a hash
    pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
        verify(password, hash)
            .map_err(|e| AppError::Internal(format!("Password verification failed: {}", e)))
    }

    async fn fetch_user_by_username(&self, username: &str) -> Result<Option<UserWithRole>> {
        let query = format!(
            "SELECT {USER_WITH_ROLE_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.username = $1"
        );
        sqlx::query_as::<_, UserWithRole>(&query)
            .bind(username)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    async fn fetch_user_by_id(&self, user_id: Uuid) -> Result<Option<UserWithRole>> {
        let query = format!(
            "SELECT {USER_WITH_ROLE_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1"
        );
        sqlx::query_as::<_, UserWithRole>(&query)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

/// Session tokens have the shape `prefix_secret`; the first eight characters
/// form the stored lookup prefix.
fn generate_session_token() -> String {
    format!(
        "{}_{}",
        &Uuid::new_v4().to_string()[..8],
        Uuid::new_v4().to_string().replace("-", "")
    )
}
