//! Role and permission models.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Role code whose holders bypass permission checks entirely.
pub const SUPER_ADMIN_ROLE_CODE: &str = "super_admin";

/// Role entity
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[schema(example = "engineer")]
    pub code: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Whether this role carries the unconditional bypass.
    pub fn is_super_admin(&self) -> bool {
        self.code == SUPER_ADMIN_ROLE_CODE
    }
}

/// Permission catalog entry describing one grantable action.
///
/// Seeded by migration and administered rarely; handlers treat the catalog
/// as read-only reference data.
#[derive(Debug, Clone, FromRow, Serialize, ToSchema)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    #[schema(example = "complaint.create")]
    pub code: String,
    #[schema(example = "complaint")]
    pub module: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Role to permission join row. The (role, permission) pair is unique.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RolePermission {
    pub role_id: Uuid,
    pub permission_id: Uuid,
}
