//! Authentication handlers.

use axum::{
    extract::{Extension, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

use crate::api::middleware::auth::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::user::{UserWithRole, USER_WITH_ROLE_COLUMNS};
use crate::services::metrics_service::{record_login, record_session_revoked};

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "jdoe")]
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    /// Opaque bearer credential; present it as `Authorization: Bearer <token>`
    pub token: String,
    pub token_type: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserSummary,
}

/// Role fields exposed alongside a user.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoleSummary {
    pub id: Uuid,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: RoleSummary,
    pub is_active: bool,
    pub is_approved: bool,
    pub last_login_at: Option<DateTime<Utc>>,
}

impl From<&UserWithRole> for UserSummary {
    fn from(user: &UserWithRole) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: RoleSummary {
                id: user.role_id,
                name: user.role_name.clone(),
                code: user.role_code.clone(),
            },
            is_active: user.is_active,
            is_approved: user.is_approved,
            last_login_at: user.last_login_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GrantedPermissionsResponse {
    /// Role code the grants were resolved for
    pub role: String,
    /// Permission codes, sorted. Empty for roles with no grants.
    pub codes: Vec<String>,
}

/// Login with credentials
#[utoipa::path(
    post,
    path = "/login",
    context_path = "/api/v1/auth",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session token issued", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account deactivated or pending approval"),
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let user = match state
        .auth_service
        .authenticate(&payload.username, &payload.password)
        .await
    {
        Ok(user) => user,
        Err(err) => {
            record_login(false);
            return Err(err);
        }
    };

    let session = state.auth_service.issue_session(user.id).await?;
    record_login(true);
    tracing::info!(username = %user.username, "User logged in");

    Ok(Json(LoginResponse {
        token: session.token,
        token_type: "Bearer".to_string(),
        expires_at: session.expires_at,
        user: UserSummary::from(&user),
    }))
}

/// Logout current session
#[utoipa::path(
    post,
    path = "/logout",
    context_path = "/api/v1/auth",
    tag = "auth",
    responses(
        (status = 200, description = "Session revoked"),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<()> {
    state.auth_service.revoke_session(auth.session_id).await?;
    record_session_revoked("logout");
    tracing::info!(username = %auth.principal.username, "User logged out");
    Ok(())
}

/// Get current user info
#[utoipa::path(
    get,
    path = "/me",
    context_path = "/api/v1/auth",
    tag = "auth",
    responses(
        (status = 200, description = "Current user", body = UserSummary),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<UserSummary>> {
    let user = fetch_user(&state, auth.principal.id).await?;
    Ok(Json(UserSummary::from(&user)))
}

/// Get the permission codes granted to the current user
#[utoipa::path(
    get,
    path = "/me/permissions",
    context_path = "/api/v1/auth",
    tag = "auth",
    responses(
        (status = 200, description = "Granted permission codes", body = GrantedPermissionsResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_current_user_permissions(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<GrantedPermissionsResponse>> {
    let user = fetch_user(&state, auth.principal.id).await?;
    let codes = state.permission_service.codes_for_user(&user).await?;

    Ok(Json(GrantedPermissionsResponse {
        role: user.role_code,
        codes,
    }))
}

async fn fetch_user(state: &SharedState, id: Uuid) -> Result<UserWithRole> {
    let sql = format!(
        "SELECT {USER_WITH_ROLE_COLUMNS}
         FROM users u
         JOIN roles r ON r.id = u.role_id
         WHERE u.id = $1"
    );

    sqlx::query_as::<_, UserWithRole>(&sql)
        .bind(id)
        .fetch_optional(&state.db)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

#[derive(OpenApi)]
#[openapi(
    paths(login, logout, get_current_user, get_current_user_permissions),
    components(schemas(
        LoginRequest,
        LoginResponse,
        RoleSummary,
        UserSummary,
        GrantedPermissionsResponse,
    ))
)]
pub struct AuthApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Response shapes
    // -----------------------------------------------------------------------

    #[test]
    fn test_user_summary_from_user_with_role() {
        let user = UserWithRole {
            id: Uuid::new_v4(),
            role_id: Uuid::new_v4(),
            username: "jdoe".to_string(),
            email: "jdoe@example.com".to_string(),
            password_hash: Some("$2b$12$secret".to_string()),
            full_name: "Jane Doe".to_string(),
            is_active: true,
            is_approved: true,
            last_login_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            role_name: "Engineer".to_string(),
            role_code: "engineer".to_string(),
        };

        let summary = UserSummary::from(&user);
        assert_eq!(summary.username, "jdoe");
        assert_eq!(summary.role.code, "engineer");

        // The password hash must never reach a response body.
        let json = serde_json::to_value(&summary).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"]["name"], "Engineer");
    }

    #[test]
    fn test_login_request_deserialize() {
        let req: LoginRequest =
            serde_json::from_str(r#"{"username": "jdoe", "password": "hunter22"}"#).unwrap();
        assert_eq!(req.username, "jdoe");
        assert_eq!(req.password, "hunter22");
    }
}
