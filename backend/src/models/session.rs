//! Session model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// Session entity backing a bearer credential.
///
/// Tokens are stored as bcrypt hashes with only a prefix stored in plaintext
/// for lookup. The full token is returned once at login and cannot be
/// retrieved later. A session with `revoked_at` set never authenticates
/// again; revocation is irreversible for that credential.
#[derive(Clone, FromRow, Serialize)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub token_prefix: String,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

redacted_debug!(Session {
    show id,
    show user_id,
    redact token_hash,
    show token_prefix,
    show expires_at,
    show revoked_at,
});

impl Session {
    /// Whether the credential is still usable at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// Result of issuing a session (includes the actual token only once).
#[derive(Clone, Serialize)]
pub struct SessionCreated {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub token_prefix: String,
    pub expires_at: DateTime<Utc>,
}

redacted_debug!(SessionCreated {
    show id,
    show user_id,
    redact token,
    show token_prefix,
    show expires_at,
});
