//! User model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

/// User entity. Every user references exactly one role.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: Uuid,
    pub role_id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_approved: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub full_name: String,
}

/// Column list that hydrates a [`UserWithRole`] from `users u JOIN roles r`.
pub const USER_WITH_ROLE_COLUMNS: &str = r#"
    u.id, u.role_id, u.username, u.email, u.password_hash,
    u.is_active, u.is_approved, u.last_login_at, u.created_at, u.updated_at,
    u.full_name, r.name AS role_name, r.code AS role_code
"#;

/// User row joined with its role's name and code.
///
/// This is what credential resolution and user listings work with: the role
/// code decides the super-admin bypass, so it travels with the user row.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserWithRole {
    pub id: Uuid,
    pub role_id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub is_approved: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub full_name: String,
    pub role_name: String,
    pub role_code: String,
}
