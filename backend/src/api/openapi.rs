//! OpenAPI specification generated from handler annotations via utoipa.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

/// Top-level OpenAPI document for the CaseDesk API.
///
/// Each handler module contributes its own paths and schemas via per-module
/// `#[derive(OpenApi)]` structs that are merged into this root document at
/// startup.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "CaseDesk API",
        description = "Complaint tracking for a public works office: role-based access, \
                       session management, and SLA-driven due dates.",
        version = "0.1.0",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "/", description = "Current server"),
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Authentication and session management"),
        (name = "users", description = "User administration"),
        (name = "roles", description = "Role administration and permission grants"),
        (name = "permissions", description = "Permission catalog"),
        (name = "complaints", description = "Complaint tracking and assignment"),
        (name = "health", description = "Health and readiness checks"),
    ),
    components(schemas(ErrorResponse))
)]
pub struct ApiDoc;

/// Standard error response body returned by all endpoints on failure.
#[derive(serde::Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code (e.g. "NOT_FOUND", "VALIDATION_ERROR")
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Adds the bearer-token security scheme to the OpenAPI spec.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).build()),
            );
        }
    }
}

/// Build the merged OpenAPI document from all handler modules.
pub fn build_openapi() -> utoipa::openapi::OpenApi {
    let mut doc = ApiDoc::openapi();

    doc.merge(super::handlers::auth::AuthApiDoc::openapi());
    doc.merge(super::handlers::users::UsersApiDoc::openapi());
    doc.merge(super::handlers::roles::RolesApiDoc::openapi());
    doc.merge(super::handlers::permissions::PermissionsApiDoc::openapi());
    doc.merge(super::handlers::complaints::ComplaintsApiDoc::openapi());
    doc.merge(super::handlers::health::HealthApiDoc::openapi());

    doc
}
