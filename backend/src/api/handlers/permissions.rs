//! Permission catalog handlers.
//!
//! The permission catalog is seeded by migrations and read-only over the
//! API; grants are edited per role via the role handlers.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};

use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::role::Permission;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListPermissionsQuery {
    /// Restrict to one module (e.g. "complaint")
    pub module: Option<String>,
    /// Matches against code and name
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionListResponse {
    pub items: Vec<Permission>,
    /// Distinct module names present in `items`, sorted
    pub modules: Vec<String>,
}

/// List the permission catalog
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/permissions",
    tag = "permissions",
    params(ListPermissionsQuery),
    responses(
        (status = 200, description = "Permission catalog", body = PermissionListResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(
    State(state): State<SharedState>,
    Query(query): Query<ListPermissionsQuery>,
) -> Result<Json<PermissionListResponse>> {
    let search_pattern = query.search.as_ref().map(|s| format!("%{}%", s));

    let items: Vec<Permission> = sqlx::query_as(
        r#"
        SELECT id, name, code, module, description, created_at
        FROM permissions
        WHERE ($1::text IS NULL OR module = $1)
          AND ($2::text IS NULL OR code ILIKE $2 OR name ILIKE $2)
        ORDER BY module, code
        "#,
    )
    .bind(&query.module)
    .bind(&search_pattern)
    .fetch_all(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    let modules = distinct_modules(&items);

    Ok(Json(PermissionListResponse { items, modules }))
}

fn distinct_modules(items: &[Permission]) -> Vec<String> {
    let mut modules: Vec<String> = items.iter().map(|p| p.module.clone()).collect();
    modules.sort();
    modules.dedup();
    modules
}

#[derive(OpenApi)]
#[openapi(
    paths(list_permissions),
    components(schemas(Permission, PermissionListResponse))
)]
pub struct PermissionsApiDoc;
