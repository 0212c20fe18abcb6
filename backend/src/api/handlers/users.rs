//! User management handlers.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::dto::{Pagination, PaginationQuery};
use crate::api::handlers::auth::RoleSummary;
use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::role::Role;
use crate::models::user::{User, UserWithRole, USER_WITH_ROLE_COLUMNS};
use crate::services::auth_service::AuthService;
use crate::services::metrics_service::record_session_revoked;

const USER_COLUMNS: &str = r#"
    id, role_id, username, email, password_hash,
    is_active, is_approved, last_login_at, created_at, updated_at, full_name
"#;

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListUsersQuery {
    /// Matches against username, email and full name
    pub search: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role_id: Uuid,
    /// Optional - a password is generated when absent
    pub password: Option<String>,
    /// New accounts start unapproved unless set here
    pub is_approved: Option<bool>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub role_id: Option<Uuid>,
    pub is_active: Option<bool>,
    pub is_approved: Option<bool>,
    /// Setting a password revokes every session of the user
    pub password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdminUserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: RoleSummary,
    pub is_active: bool,
    pub is_approved: bool,
    pub last_login_at: Option<chrono::DateTime<chrono::Utc>>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreateUserResponse {
    pub user: AdminUserResponse,
    /// Only returned when the password was auto-generated
    pub generated_password: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub items: Vec<AdminUserResponse>,
    pub pagination: Pagination,
}

/// Generate a random password for accounts created without one
pub(crate) fn generate_password() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789!@#$%&*";
    let mut rng = rand::rng();
    (0..16)
        .map(|_| {
            let idx = rng.random_range(0..CHARSET.len());
            CHARSET[idx] as char
        })
        .collect()
}

fn joined_to_response(user: UserWithRole) -> AdminUserResponse {
    AdminUserResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        full_name: user.full_name,
        role: RoleSummary {
            id: user.role_id,
            name: user.role_name,
            code: user.role_code,
        },
        is_active: user.is_active,
        is_approved: user.is_approved,
        last_login_at: user.last_login_at,
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}

fn user_to_response(user: User, role: &Role) -> AdminUserResponse {
    AdminUserResponse {
        id: user.id,
        username: user.username,
        email: user.email,
        full_name: user.full_name,
        role: RoleSummary {
            id: role.id,
            name: role.name.clone(),
            code: role.code.clone(),
        },
        is_active: user.is_active,
        is_approved: user.is_approved,
        last_login_at: user.last_login_at,
        created_at: user.created_at,
        updated_at: user.updated_at,
    }
}

/// Map constraint violations from user writes onto API errors.
fn map_user_write_error(e: sqlx::Error) -> AppError {
    let msg = e.to_string();
    if msg.contains("duplicate key") {
        if msg.contains("username") {
            AppError::Conflict("Username already exists".to_string())
        } else if msg.contains("email") {
            AppError::Conflict("Email already exists".to_string())
        } else {
            AppError::Conflict("User already exists".to_string())
        }
    } else if msg.contains("violates foreign key") {
        AppError::Validation("Role does not exist".to_string())
    } else {
        AppError::Database(msg)
    }
}

async fn fetch_role(state: &SharedState, role_id: Uuid) -> Result<Option<Role>> {
    sqlx::query_as::<_, Role>(
        "SELECT id, name, code, description, created_at, updated_at FROM roles WHERE id = $1",
    )
    .bind(role_id)
    .fetch_optional(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))
}

/// List users
#[utoipa::path(
    get,
    path = "",
    context_path = "/api/v1/users",
    tag = "users",
    params(ListUsersQuery),
    responses(
        (status = 200, description = "List of users", body = UserListResponse),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<SharedState>,
    Query(query): Query<ListUsersQuery>,
) -> Result<Json<UserListResponse>> {
    let paging = PaginationQuery {
        page: query.page,
        per_page: query.per_page,
    };
    let search_pattern = query.search.as_ref().map(|s| format!("%{}%", s));

    let sql = format!(
        r#"
        SELECT {USER_WITH_ROLE_COLUMNS}
        FROM users u
        JOIN roles r ON r.id = u.role_id
        WHERE ($1::text IS NULL OR u.username ILIKE $1 OR u.email ILIKE $1 OR u.full_name ILIKE $1)
          AND ($2::uuid IS NULL OR u.role_id = $2)
          AND ($3::boolean IS NULL OR u.is_active = $3)
        ORDER BY u.username
        OFFSET $4
        LIMIT $5
        "#
    );

    let users: Vec<UserWithRole> = sqlx::query_as(&sql)
        .bind(&search_pattern)
        .bind(query.role_id)
        .bind(query.is_active)
        .bind(paging.offset())
        .bind(paging.limit())
        .fetch_all(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM users u
        WHERE ($1::text IS NULL OR u.username ILIKE $1 OR u.email ILIKE $1 OR u.full_name ILIKE $1)
          AND ($2::uuid IS NULL OR u.role_id = $2)
          AND ($3::boolean IS NULL OR u.is_active = $3)
        "#,
    )
    .bind(&search_pattern)
    .bind(query.role_id)
    .bind(query.is_active)
    .fetch_one(&state.db)
    .await
    .map_err(|e| AppError::Database(e.to_string()))?;

    Ok(Json(UserListResponse {
        items: users.into_iter().map(joined_to_response).collect(),
        pagination: Pagination::from_query_and_total(&paging, total),
    }))
}

/// Create user
#[utoipa::path(
    post,
    path = "",
    context_path = "/api/v1/users",
    tag = "users",
    request_body = CreateUserRequest,
    responses(
        (status = 200, description = "User created", body = CreateUserResponse),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Username or email already exists"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<CreateUserResponse>> {
    if payload.username.trim().is_empty() {
        return Err(AppError::Validation("Username must not be empty".to_string()));
    }

    let role = fetch_role(&state, payload.role_id)
        .await?
        .ok_or_else(|| AppError::Validation("Role does not exist".to_string()))?;

    let (password, auto_generated) = match payload.password {
        Some(ref p) if p.len() >= 8 => (p.clone(), false),
        Some(_) => {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        None => (generate_password(), true),
    };
    let password_hash = AuthService::hash_password(&password)?;

    let sql = format!(
        r#"
        INSERT INTO users (role_id, username, email, full_name, password_hash, is_approved)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {USER_COLUMNS}
        "#
    );

    let user: User = sqlx::query_as(&sql)
        .bind(payload.role_id)
        .bind(&payload.username)
        .bind(&payload.email)
        .bind(&payload.full_name)
        .bind(&password_hash)
        .bind(payload.is_approved.unwrap_or(false))
        .fetch_one(&state.db)
        .await
        .map_err(map_user_write_error)?;

    tracing::info!(
        username = %user.username,
        role = %role.code,
        created_by = %auth.principal.username,
        "User created"
    );

    Ok(Json(CreateUserResponse {
        user: user_to_response(user, &role),
        generated_password: if auto_generated { Some(password) } else { None },
    }))
}

/// Get user details
#[utoipa::path(
    get,
    path = "/{id}",
    context_path = "/api/v1/users",
    tag = "users",
    params(
        ("id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User details", body = AdminUserResponse),
        (status = 404, description = "User not found"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AdminUserResponse>> {
    let sql = format!(
        "SELECT {USER_WITH_ROLE_COLUMNS} FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1"
    );

    let user: UserWithRole = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(joined_to_response(user)))
}

/// Update user
#[utoipa::path(
    patch,
    path = "/{id}",
    context_path = "/api/v1/users",
    tag = "users",
    params(
        ("id" = Uuid, Path, description = "User ID"),
    ),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = AdminUserResponse),
        (status = 404, description = "User not found"),
        (status = 409, description = "Email already exists"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<AdminUserResponse>> {
    let password_hash = match payload.password {
        Some(ref p) if p.len() >= 8 => Some(AuthService::hash_password(p)?),
        Some(_) => {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        None => None,
    };

    let sql = format!(
        r#"
        UPDATE users
        SET
            email = COALESCE($2, email),
            full_name = COALESCE($3, full_name),
            role_id = COALESCE($4, role_id),
            is_active = COALESCE($5, is_active),
            is_approved = COALESCE($6, is_approved),
            password_hash = COALESCE($7, password_hash),
            updated_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#
    );

    let user: User = sqlx::query_as(&sql)
        .bind(id)
        .bind(&payload.email)
        .bind(&payload.full_name)
        .bind(payload.role_id)
        .bind(payload.is_active)
        .bind(payload.is_approved)
        .bind(&password_hash)
        .fetch_optional(&state.db)
        .await
        .map_err(map_user_write_error)?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    // A password change rotates the credential, so old sessions die here.
    // Deactivation deliberately does not: the request gate revokes the
    // credential the next time it is presented, which keeps the inactive
    // denial observable and the revocation in one place.
    if password_hash.is_some() {
        let revoked = state.auth_service.revoke_sessions_for_user(id).await?;
        if revoked > 0 {
            record_session_revoked("password_change");
        }
    }

    let role = fetch_role(&state, user.role_id)
        .await?
        .ok_or_else(|| AppError::NotFound("Role not found".to_string()))?;

    tracing::info!(
        username = %user.username,
        updated_by = %auth.principal.username,
        "User updated"
    );

    Ok(Json(user_to_response(user, &role)))
}

/// Delete user
#[utoipa::path(
    delete,
    path = "/{id}",
    context_path = "/api/v1/users",
    tag = "users",
    params(
        ("id" = Uuid, Path, description = "User ID"),
    ),
    responses(
        (status = 200, description = "User deleted"),
        (status = 400, description = "Cannot delete yourself"),
        (status = 404, description = "User not found"),
        (status = 409, description = "User is referenced by complaints"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<()> {
    if auth.principal.id == id {
        return Err(AppError::Validation("Cannot delete yourself".to_string()));
    }

    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(id)
        .execute(&state.db)
        .await
        .map_err(|e| {
            let msg = e.to_string();
            if msg.contains("violates foreign key") {
                AppError::Conflict(
                    "User is referenced by existing complaints".to_string(),
                )
            } else {
                AppError::Database(msg)
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = %id, deleted_by = %auth.principal.username, "User deleted");

    Ok(())
}

#[derive(OpenApi)]
#[openapi(
    paths(list_users, create_user, get_user, update_user, delete_user),
    components(schemas(
        CreateUserRequest,
        UpdateUserRequest,
        AdminUserResponse,
        CreateUserResponse,
        UserListResponse,
    ))
)]
pub struct UsersApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Password generation
    // -----------------------------------------------------------------------

    #[test]
    fn test_generate_password_length_and_charset() {
        let password = generate_password();
        assert_eq!(password.len(), 16);
        // No ambiguous characters (0, O, 1, l, I) in the charset.
        assert!(!password.contains('0'));
        assert!(!password.contains('O'));
        assert!(!password.contains('1'));
        assert!(!password.contains('l'));
        assert!(!password.contains('I'));
    }

    #[test]
    fn test_generate_password_is_random() {
        assert_ne!(generate_password(), generate_password());
    }

    // -----------------------------------------------------------------------
    // Write error mapping
    // -----------------------------------------------------------------------

    #[test]
    fn test_map_user_write_error_duplicate_username() {
        let err = sqlx::Error::Protocol(
            "duplicate key value violates unique constraint \"users_username_key\"".to_string(),
        );
        match map_user_write_error(err) {
            AppError::Conflict(msg) => assert!(msg.contains("Username")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_map_user_write_error_duplicate_email() {
        let err = sqlx::Error::Protocol(
            "duplicate key value violates unique constraint \"users_email_key\"".to_string(),
        );
        match map_user_write_error(err) {
            AppError::Conflict(msg) => assert!(msg.contains("Email")),
            other => panic!("expected conflict, got {other:?}"),
        }
    }

    #[test]
    fn test_map_user_write_error_unknown_role() {
        let err = sqlx::Error::Protocol(
            "insert or update on table \"users\" violates foreign key constraint".to_string(),
        );
        assert!(matches!(
            map_user_write_error(err),
            AppError::Validation(_)
        ));
    }

    // -----------------------------------------------------------------------
    // Query deserialization
    // -----------------------------------------------------------------------

    #[test]
    fn test_list_users_query_empty() {
        let query: ListUsersQuery = serde_json::from_str("{}").unwrap();
        assert!(query.search.is_none());
        assert!(query.role_id.is_none());
        assert!(query.is_active.is_none());
    }

    #[test]
    fn test_create_user_request_minimal() {
        let req: CreateUserRequest = serde_json::from_str(
            r#"{
                "username": "jdoe",
                "email": "jdoe@example.com",
                "full_name": "Jane Doe",
                "role_id": "8f14e45f-ceea-467f-a0f9-f2b1f2c4a111"
            }"#,
        )
        .unwrap();
        assert!(req.password.is_none());
        assert!(req.is_approved.is_none());
    }
}
