//! Role-based authorization: principal snapshots, permission sources, and
//! the authorizer that decides whether a principal may perform an action.

pub mod authorizer;
pub mod provider;

pub use authorizer::Authorizer;
pub use provider::{InMemoryPermissionSource, PermissionCache, PermissionSource};

use uuid::Uuid;

use crate::models::role::SUPER_ADMIN_ROLE_CODE;
use crate::models::user::UserWithRole;

// Permission codes wired to routes. Must match the seeded catalog.
pub const PERM_USERS_VIEW: &str = "users.view";
pub const PERM_USERS_CREATE: &str = "users.create";
pub const PERM_USERS_UPDATE: &str = "users.update";
pub const PERM_USERS_DELETE: &str = "users.delete";
pub const PERM_ROLES_VIEW: &str = "roles.view";
pub const PERM_ROLES_CREATE: &str = "roles.create";
pub const PERM_ROLES_UPDATE: &str = "roles.update";
pub const PERM_ROLES_DELETE: &str = "roles.delete";
pub const PERM_ROLES_ASSIGN: &str = "roles.assign";
pub const PERM_PERMISSIONS_VIEW: &str = "permissions.view";
pub const PERM_COMPLAINT_VIEW: &str = "complaint.view";
pub const PERM_COMPLAINT_CREATE: &str = "complaint.create";
pub const PERM_COMPLAINT_UPDATE: &str = "complaint.update";
pub const PERM_COMPLAINT_ASSIGN: &str = "complaint.assign";
pub const PERM_COMPLAINT_DELETE: &str = "complaint.delete";

/// Read-only snapshot of the authenticated actor, taken at credential
/// resolution time. Authorization decisions are pure functions of this
/// snapshot plus the role's permission set; nothing here is re-read from
/// the store mid-decision.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: Uuid,
    pub role_id: Uuid,
    pub role_code: String,
    pub username: String,
    pub full_name: String,
    pub is_active: bool,
    pub is_approved: bool,
}

impl Principal {
    /// Whether the principal holds the role that bypasses permission checks.
    pub fn is_super_admin(&self) -> bool {
        self.role_code == SUPER_ADMIN_ROLE_CODE
    }

    /// Whether the account may act at all. Inactive or unapproved accounts
    /// are denied every protected action regardless of grants.
    pub fn is_account_usable(&self) -> bool {
        self.is_active && self.is_approved
    }
}

impl From<&UserWithRole> for Principal {
    fn from(user: &UserWithRole) -> Self {
        Self {
            id: user.id,
            role_id: user.role_id,
            role_code: user.role_code.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            is_active: user.is_active,
            is_approved: user.is_approved,
        }
    }
}
