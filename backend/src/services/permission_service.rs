//! Permission set storage: the SQL-backed source behind the authorizer,
//! atomic replacement of a role's grants, and cache invalidation.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::{PermissionCache, PermissionSource};
use crate::error::{AppError, Result};
use crate::models::role::Permission;
use crate::models::user::UserWithRole;

/// Store-backed permission source: one join per (uncached) lookup.
pub struct PgPermissionSource {
    db: PgPool,
}

impl PgPermissionSource {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PermissionSource for PgPermissionSource {
    async fn codes_for_role(&self, role_id: Uuid) -> Result<Arc<HashSet<String>>> {
        let codes: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT p.code
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(Arc::new(codes.into_iter().collect()))
    }
}

/// Administration of role permission sets.
pub struct PermissionService {
    db: PgPool,
    cache: Arc<PermissionCache>,
}

impl PermissionService {
    pub fn new(db: PgPool, cache: Arc<PermissionCache>) -> Self {
        Self { db, cache }
    }

    /// Replace the full permission set of a role with `codes`.
    ///
    /// The delete and insert run in one transaction, so a concurrent reader
    /// resolves either the old complete set or the new complete set, never
    /// a partial one. The cache entry is invalidated after commit.
    pub async fn replace_role_permissions(
        &self,
        role_id: Uuid,
        codes: &[String],
    ) -> Result<Vec<Permission>> {
        let role_exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM roles WHERE id = $1")
            .bind(role_id)
            .fetch_optional(&self.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        if role_exists.is_none() {
            return Err(AppError::NotFound("Role not found".to_string()));
        }

        let permissions = self.resolve_codes(codes).await?;

        let mut tx = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM role_permissions WHERE role_id = $1")
            .bind(role_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for permission in &permissions {
            sqlx::query(
                "INSERT INTO role_permissions (role_id, permission_id) VALUES ($1, $2)",
            )
            .bind(role_id)
            .bind(permission.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        self.cache.invalidate(role_id).await;

        Ok(permissions)
    }

    /// Catalog entries currently granted to a role, for display.
    pub async fn permissions_for_role(&self, role_id: Uuid) -> Result<Vec<Permission>> {
        sqlx::query_as::<_, Permission>(
            r#"
            SELECT p.id, p.name, p.code, p.module, p.description, p.created_at
            FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            WHERE rp.role_id = $1
            ORDER BY p.module, p.code
            "#,
        )
        .bind(role_id)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Effective permission codes for a user, sorted for stable output.
    /// Super admins report the entire catalog.
    pub async fn codes_for_user(&self, user: &UserWithRole) -> Result<Vec<String>> {
        let mut codes: Vec<String> = if user.role_code == crate::models::role::SUPER_ADMIN_ROLE_CODE
        {
            sqlx::query_scalar("SELECT code FROM permissions")
                .fetch_all(&self.db)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
        } else {
            self.cache
                .codes_for_role(user.role_id)
                .await?
                .iter()
                .cloned()
                .collect()
        };
        codes.sort();
        Ok(codes)
    }

    /// Map permission codes to catalog entries, rejecting unknown codes.
    ///
    /// Unknown codes here are an administration mistake and get a
    /// validation error naming them; at evaluation time unknown codes are
    /// silently just "no grant".
    async fn resolve_codes(&self, codes: &[String]) -> Result<Vec<Permission>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let permissions = sqlx::query_as::<_, Permission>(
            r#"
            SELECT id, name, code, module, description, created_at
            FROM permissions
            WHERE code = ANY($1)
            ORDER BY module, code
            "#,
        )
        .bind(codes)
        .fetch_all(&self.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        if permissions.len() != unique_count(codes) {
            let known: HashSet<&str> = permissions.iter().map(|p| p.code.as_str()).collect();
            let mut unknown: Vec<&str> = codes
                .iter()
                .map(|c| c.as_str())
                .filter(|c| !known.contains(c))
                .collect();
            unknown.sort_unstable();
            unknown.dedup();
            return Err(AppError::Validation(format!(
                "Unknown permission codes: {}",
                unknown.join(", ")
            )));
        }

        Ok(permissions)
    }
}

fn unique_count(codes: &[String]) -> usize {
    codes.iter().collect::<HashSet<_>>().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_count_ignores_duplicates() {
        let codes = vec![
            "complaint.view".to_string(),
            "complaint.view".to_string(),
            "complaint.create".to_string(),
        ];
        assert_eq!(unique_count(&codes), 2);
    }
}
