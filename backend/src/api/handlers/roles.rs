//! Role management handlers.
//!
//! Roles carry the permission grants evaluated by the authorizer, so every
//! mutation here that touches a role's permission set goes through the
//! permission service, which keeps the evaluation cache coherent.

use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::handlers::auth::RoleSummary;
use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::role::{Permission, Role};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    #[schema(example = "Engineer")]
    pub name: String,
    /// Stable machine identifier; immutable after creation
    #[schema(example = "engineer")]
    pub code: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReplaceRolePermissionsRequest {
    /// The complete permission set for the role. Codes not listed here are
    /// removed.
    pub codes: Vec<String>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct RoleRow {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub description: Option<String>,
    pub permission_count: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RoleListResponse {
    pub items: Vec<RoleRow>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RolePermissionsResponse {
    pub role: RoleSummary,
    pub permissions: Vec<Permission>,
}

const ROLE_ROW_SQL: &str = r#"
    SELECT r.id, r.name, r.code, r.description, r.created_at, r.updated_at,
           COUNT(rp.permission_id) AS permission_count
    FROM roles r
    LEFT JOIN role_permissions rp ON rp.role_id = r.id
"#;

/// Role codes are lowercase snake case: they end up in config, logs and
/// permission checks, never in UI copy.
fn valid_role_code(code: &str) -> bool {
    let mut chars = code.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

async fn fetch_role(state: &SharedState, id: Uuid) -> Result<Role> {
    sqlx::query_as::<_, Role>(
        "SELECT id, name, code, description, created_at, updated_at FROM roles WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?
    .ok_or_else(|| AppError::NotFound("Role not found".to_string()))
}

/// List roles
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/roles",
    tag = "roles",
    responses(
        (status = 200, description = "List of roles", body = RoleListResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(State(state): State<SharedState>) -> Result<Json<RoleListResponse>> {
    let sql = format!("{ROLE_ROW_SQL} GROUP BY r.id ORDER BY r.name");
    let items: Vec<RoleRow> = sqlx::query_as(&sql)
        .fetch_all(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(RoleListResponse { items }))
}

/// Create role
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/roles",
    tag = "roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 200, description = "Role created", body = RoleRow),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Role code already exists"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<CreateRoleRequest>,
) -> Result<Json<RoleRow>> {
    if payload.name.trim().is_empty() {
        return Err(AppError::Validation("Role name must not be empty".to_string()));
    }
    if !valid_role_code(&payload.code) {
        return Err(AppError::Validation(
            "Role code must be lowercase snake case (e.g. \"duty_officer\")".to_string(),
        ));
    }

    let role: Role = sqlx::query_as(
        r#"
        INSERT INTO roles (name, code, description)
        VALUES ($1, $2, $3)
        RETURNING id, name, code, description, created_at, updated_at
        "#,
    )
    .bind(payload.name.trim())
    .bind(&payload.code)
    .bind(&payload.description)
    .fetch_one(&state.db)
    .await
    .map_err(|e| {
        let msg = e.to_string();
        if msg.contains("duplicate key") {
            AppError::Conflict("Role code already exists".to_string())
        } else {
            AppError::Database(msg)
        }
    })?;

    tracing::info!(code = %role.code, created_by = %auth.principal.username, "Role created");

    Ok(Json(RoleRow {
        id: role.id,
        name: role.name,
        code: role.code,
        description: role.description,
        permission_count: 0,
        created_at: role.created_at,
        updated_at: role.updated_at,
    }))
}

/// Get role details
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(
        ("id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Role details", body = RoleRow),
        (status = 404, description = "Role not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RoleRow>> {
    let sql = format!("{ROLE_ROW_SQL} WHERE r.id = $1 GROUP BY r.id");
    let role: RoleRow = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("Role not found".to_string()))?;

    Ok(Json(role))
}

/// Update role name or description
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(
        ("id" = Uuid, Path, description = "Role ID"),
    ),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleRow),
        (status = 404, description = "Role not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> Result<Json<RoleRow>> {
    // The code is the stable identifier grants key on; it cannot change.
    let role: Role = sqlx::query_as(
        r#"
        UPDATE roles
        SET name = COALESCE($2, name),
            description = COALESCE($3, description),
            updated_at = NOW()
        WHERE id = $1
        RETURNING id, name, code, description, created_at, updated_at
        "#,
    )
    .bind(id)
    .bind(&payload.name)
    .bind(&payload.description)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?
    .ok_or_else(|| AppError::NotFound("Role not found".to_string()))?;

    let permission_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM role_permissions WHERE role_id = $1")
            .bind(id)
            .fetch_one(&state.db)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

    tracing::info!(code = %role.code, updated_by = %auth.principal.username, "Role updated");

    Ok(Json(RoleRow {
        id: role.id,
        name: role.name,
        code: role.code,
        description: role.description,
        permission_count,
        created_at: role.created_at,
        updated_at: role.updated_at,
    }))
}

/// Delete role
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(
        ("id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Role deleted"),
        (status = 400, description = "The super administrator role cannot be deleted"),
        (status = 404, description = "Role not found"),
        (status = 409, description = "Role is assigned to users"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    let role = fetch_role(&state, id).await?;
    if role.is_super_admin() {
        return Err(AppError::Validation(
            "The super administrator role cannot be deleted".to_string(),
        ));
    }

    let user_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role_id = $1")
        .bind(id)
        .fetch_one(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;
    if user_count > 0 {
        return Err(AppError::Conflict(format!(
            "Role is assigned to {user_count} user(s)"
        )));
    }

    sqlx::query("DELETE FROM roles WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("violates foreign key") {
                AppError::Conflict("Role is assigned to existing users".to_string())
            } else {
                AppError::Database(msg)
            }
        })?;

    // Drop any cached permission set for the deleted role.
    state.permission_cache.invalidate(id).await;

    tracing::info!(code = %role.code, deleted_by = %auth.principal.username, "Role deleted");

    Ok(())
}

/// Get the permission set of a role
#[utoipa::path(
    get,
    path = "/{id}/permissions",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(
        ("id" = Uuid, Path, description = "Role ID"),
    ),
    responses(
        (status = 200, description = "Permissions granted to the role", body = RolePermissionsResponse),
        (status = 404, description = "Role not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role_permissions(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RolePermissionsResponse>> {
    let role = fetch_role(&state, id).await?;
    let permissions = state.permission_service.permissions_for_role(id).await?;

    Ok(Json(RolePermissionsResponse {
        role: RoleSummary {
            id: role.id,
            name: role.name,
            code: role.code,
        },
        permissions,
    }))
}

/// Replace the permission set of a role
#[utoipa::path(
    put,
    path = "/{id}/permissions",
    context_path = "/api/v1/roles",
    tag = "roles",
    params(
        ("id" = Uuid, Path, description = "Role ID"),
    ),
    request_body = ReplaceRolePermissionsRequest,
    responses(
        (status = 200, description = "Permission set replaced", body = RolePermissionsResponse),
        (status = 400, description = "Unknown permission codes"),
        (status = 404, description = "Role not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn replace_role_permissions(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReplaceRolePermissionsRequest>,
) -> Result<Json<RolePermissionsResponse>> {
    let role = fetch_role(&state, id).await?;
    let permissions = state
        .permission_service
        .replace_role_permissions(id, &payload.codes)
        .await?;

    tracing::info!(
        code = %role.code,
        permission_count = permissions.len(),
        updated_by = %auth.principal.username,
        "Role permission set replaced"
    );

    Ok(Json(RolePermissionsResponse {
        role: RoleSummary {
            id: role.id,
            name: role.name,
            code: role.code,
        },
        permissions,
    }))
}

#[derive(OpenApi)]
#[openapi(
    paths(
        list_roles,
        create_role,
        get_role,
        update_role,
        delete_role,
        get_role_permissions,
        replace_role_permissions,
    ),
    components(schemas(
        CreateRoleRequest,
        UpdateRoleRequest,
        ReplaceRolePermissionsRequest,
        RoleRow,
        RoleListResponse,
        RolePermissionsResponse,
    ))
)]
pub struct RolesApiDoc;
