//! Request gate middleware.
//!
//! Resolves the bearer credential to a principal, enforces account state
//! and the route's required grant, and injects the principal snapshot into
//! request extensions. Every request moves through one pass of:
//!
//! unchecked -> identified -> allowed | denied
//!
//! Denials are terminal: 401 when no principal can be resolved, 403 when
//! the account is deactivated/unapproved (which also revokes the
//! credential) or the grant is missing. Bodies use the standard error
//! envelope, so clients always receive a JSON `message`.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use uuid::Uuid;

use crate::authz::{Authorizer, Principal};
use crate::error::{AppError, Result};
use crate::services::auth_service::AuthService;
use crate::services::metrics_service::{record_gate_decision, record_session_revoked};

/// Grant a route declares for itself. Carried in the gate's state, one
/// instance per route layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredGrant {
    /// Authentication only; any usable account passes.
    SignedIn,
    /// One permission code.
    Code(&'static str),
    /// At least one of the codes.
    AnyOf(&'static [&'static str]),
    /// Every one of the codes.
    AllOf(&'static [&'static str]),
}

/// State for the request gate: the services it consults plus the route's
/// required grant.
#[derive(Clone)]
pub struct RequestGate {
    pub auth_service: Arc<AuthService>,
    pub authorizer: Arc<Authorizer>,
    required: RequiredGrant,
}

impl RequestGate {
    pub fn new(auth_service: Arc<AuthService>, authorizer: Arc<Authorizer>) -> Self {
        Self {
            auth_service,
            authorizer,
            required: RequiredGrant::SignedIn,
        }
    }

    /// Gate requiring authentication only.
    pub fn signed_in(&self) -> Self {
        Self {
            required: RequiredGrant::SignedIn,
            ..self.clone()
        }
    }

    /// Gate requiring one permission code.
    pub fn require(&self, code: &'static str) -> Self {
        Self {
            required: RequiredGrant::Code(code),
            ..self.clone()
        }
    }

    /// Gate requiring at least one of the codes.
    pub fn require_any(&self, codes: &'static [&'static str]) -> Self {
        Self {
            required: RequiredGrant::AnyOf(codes),
            ..self.clone()
        }
    }

    /// Gate requiring every one of the codes.
    pub fn require_all(&self, codes: &'static [&'static str]) -> Self {
        Self {
            required: RequiredGrant::AllOf(codes),
            ..self.clone()
        }
    }
}

/// Extension that holds the authenticated principal and its session.
#[derive(Debug, Clone)]
pub struct AuthExtension {
    pub principal: Principal,
    pub session_id: Uuid,
}

/// Outcome of evaluating a resolved (or unresolved) principal against a
/// route's required grant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed to the handler.
    Allow,
    /// No resolvable principal; respond 401.
    Unauthenticated(String),
    /// Deactivated or unapproved account; respond 403 and revoke the
    /// credential.
    Inactive(String),
    /// Active principal without the required grant; respond 403.
    Forbidden(String),
}

/// Token extraction result
#[derive(Debug, PartialEq, Eq)]
enum ExtractedToken<'a> {
    /// Bearer credential from the Authorization header
    Bearer(&'a str),
    /// No token found
    None,
    /// Invalid header format
    Invalid,
}

/// Extract the bearer token from the Authorization header.
fn extract_token(request: &Request) -> ExtractedToken<'_> {
    match request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        Some(auth_header) => match auth_header.strip_prefix("Bearer ") {
            Some(token) if !token.is_empty() => ExtractedToken::Bearer(token),
            _ => ExtractedToken::Invalid,
        },
        None => ExtractedToken::None,
    }
}

/// The pure decision core of the gate.
///
/// Account-state checks run before grant checks, so a deactivated account
/// is reported as inactive even when it also lacks the permission. The
/// caller owns the revocation side effect for [`GateDecision::Inactive`].
pub async fn evaluate_grant(
    authorizer: &Authorizer,
    principal: Option<&Principal>,
    required: &RequiredGrant,
) -> Result<GateDecision> {
    let Some(principal) = principal else {
        return Ok(GateDecision::Unauthenticated(
            "Authentication required".to_string(),
        ));
    };

    if !principal.is_active {
        return Ok(GateDecision::Inactive("Account is deactivated".to_string()));
    }
    if !principal.is_approved {
        return Ok(GateDecision::Inactive(
            "Account is pending approval".to_string(),
        ));
    }

    let granted = match required {
        RequiredGrant::SignedIn => true,
        RequiredGrant::Code(code) => authorizer.is_authorized(Some(principal), code).await?,
        RequiredGrant::AnyOf(codes) => {
            authorizer.is_authorized_any(Some(principal), codes).await?
        }
        RequiredGrant::AllOf(codes) => {
            authorizer.is_authorized_all(Some(principal), codes).await?
        }
    };

    if granted {
        Ok(GateDecision::Allow)
    } else {
        Ok(GateDecision::Forbidden(
            "You do not have permission to perform this action".to_string(),
        ))
    }
}

/// Request gate middleware function.
pub async fn request_gate(
    State(gate): State<RequestGate>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_token(&request) {
        ExtractedToken::Bearer(token) => token.to_string(),
        ExtractedToken::None => {
            record_gate_decision("unauthenticated");
            return AppError::Authentication("Missing authorization header".to_string())
                .into_response();
        }
        ExtractedToken::Invalid => {
            record_gate_decision("unauthenticated");
            return AppError::Authentication("Invalid authorization header format".to_string())
                .into_response();
        }
    };

    let (session, user) = match gate.auth_service.resolve_token(&token).await {
        Ok(resolved) => resolved,
        Err(err) => {
            record_gate_decision("unauthenticated");
            return err.into_response();
        }
    };

    let principal = Principal::from(&user);
    let decision = match evaluate_grant(&gate.authorizer, Some(&principal), &gate.required).await {
        Ok(decision) => decision,
        Err(err) => return err.into_response(),
    };

    match decision {
        GateDecision::Allow => {
            record_gate_decision("allowed");
            request.extensions_mut().insert(AuthExtension {
                principal,
                session_id: session.id,
            });
            next.run(request).await
        }
        GateDecision::Inactive(message) => {
            // Revoke the credential so every later request with it fails
            // fast at resolution. Irreversible; the user must log in again.
            if let Err(err) = gate.auth_service.revoke_session(session.id).await {
                tracing::error!(
                    error = %err,
                    session_id = %session.id,
                    "Failed to revoke session of inactive account"
                );
            }
            record_session_revoked("inactive_account");
            record_gate_decision("inactive");
            AppError::Authorization(message).into_response()
        }
        GateDecision::Unauthenticated(message) => {
            record_gate_decision("unauthenticated");
            AppError::Authentication(message).into_response()
        }
        GateDecision::Forbidden(message) => {
            record_gate_decision("forbidden");
            AppError::Authorization(message).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::InMemoryPermissionSource;
    use crate::models::role::SUPER_ADMIN_ROLE_CODE;
    use axum::body::Body;

    fn request_with_header(value: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/api/v1/complaints");
        if let Some(value) = value {
            builder = builder.header(AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn principal(role_id: Uuid) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role_id,
            role_code: "engineer".to_string(),
            username: "jdoe".to_string(),
            full_name: "Jane Doe".to_string(),
            is_active: true,
            is_approved: true,
        }
    }

    async fn authorizer_with(role_id: Uuid, codes: &[&str]) -> Authorizer {
        let source = InMemoryPermissionSource::new();
        source.set_role(role_id, codes).await;
        Authorizer::new(Arc::new(source))
    }

    // -----------------------------------------------------------------------
    // Token extraction
    // -----------------------------------------------------------------------

    #[test]
    fn test_extract_token_bearer() {
        let request = request_with_header(Some("Bearer abcd1234_secret"));
        assert_eq!(
            extract_token(&request),
            ExtractedToken::Bearer("abcd1234_secret")
        );
    }

    #[test]
    fn test_extract_token_missing_header() {
        let request = request_with_header(None);
        assert_eq!(extract_token(&request), ExtractedToken::None);
    }

    #[test]
    fn test_extract_token_wrong_scheme() {
        let request = request_with_header(Some("Basic dXNlcjpwYXNz"));
        assert_eq!(extract_token(&request), ExtractedToken::Invalid);
    }

    #[test]
    fn test_extract_token_empty_bearer() {
        let request = request_with_header(Some("Bearer "));
        assert_eq!(extract_token(&request), ExtractedToken::Invalid);
    }

    // -----------------------------------------------------------------------
    // Decision core
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_missing_principal_is_unauthenticated() {
        let authz = authorizer_with(Uuid::new_v4(), &[]).await;
        let decision = evaluate_grant(&authz, None, &RequiredGrant::SignedIn)
            .await
            .unwrap();
        assert!(matches!(decision, GateDecision::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_signed_in_grant_allows_any_usable_account() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &[]).await;
        let p = principal(role);
        let decision = evaluate_grant(&authz, Some(&p), &RequiredGrant::SignedIn)
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn test_granted_code_allows() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let p = principal(role);
        let decision = evaluate_grant(&authz, Some(&p), &RequiredGrant::Code("complaint.view"))
            .await
            .unwrap();
        assert_eq!(decision, GateDecision::Allow);
    }

    #[tokio::test]
    async fn test_missing_code_is_forbidden() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let p = principal(role);
        let decision = evaluate_grant(&authz, Some(&p), &RequiredGrant::Code("complaint.create"))
            .await
            .unwrap();
        assert!(matches!(decision, GateDecision::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_inactive_account_wins_over_forbidden() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &[]).await;
        let mut p = principal(role);
        p.is_active = false;

        // Inactive is reported even though the grant would also be missing.
        let decision = evaluate_grant(&authz, Some(&p), &RequiredGrant::Code("complaint.view"))
            .await
            .unwrap();
        assert!(matches!(decision, GateDecision::Inactive(_)));
    }

    #[tokio::test]
    async fn test_unapproved_account_is_inactive_class() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let mut p = principal(role);
        p.is_approved = false;

        let decision = evaluate_grant(&authz, Some(&p), &RequiredGrant::SignedIn)
            .await
            .unwrap();
        assert!(matches!(decision, GateDecision::Inactive(_)));
    }

    #[tokio::test]
    async fn test_any_of_grant() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["permissions.view"]).await;
        let p = principal(role);

        let decision = evaluate_grant(
            &authz,
            Some(&p),
            &RequiredGrant::AnyOf(&["roles.view", "permissions.view"]),
        )
        .await
        .unwrap();
        assert_eq!(decision, GateDecision::Allow);

        let decision = evaluate_grant(
            &authz,
            Some(&p),
            &RequiredGrant::AnyOf(&["roles.view", "users.view"]),
        )
        .await
        .unwrap();
        assert!(matches!(decision, GateDecision::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_all_of_grant() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view", "complaint.update"]).await;
        let p = principal(role);

        let decision = evaluate_grant(
            &authz,
            Some(&p),
            &RequiredGrant::AllOf(&["complaint.view", "complaint.update"]),
        )
        .await
        .unwrap();
        assert_eq!(decision, GateDecision::Allow);

        let decision = evaluate_grant(
            &authz,
            Some(&p),
            &RequiredGrant::AllOf(&["complaint.view", "complaint.delete"]),
        )
        .await
        .unwrap();
        assert!(matches!(decision, GateDecision::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_super_admin_passes_every_grant() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &[]).await;
        let mut p = principal(role);
        p.role_code = SUPER_ADMIN_ROLE_CODE.to_string();

        for required in [
            RequiredGrant::SignedIn,
            RequiredGrant::Code("anything.at.all"),
            RequiredGrant::AnyOf(&["a", "b"]),
            RequiredGrant::AllOf(&["a", "b"]),
        ] {
            let decision = evaluate_grant(&authz, Some(&p), &required).await.unwrap();
            assert_eq!(decision, GateDecision::Allow);
        }
    }

    // -----------------------------------------------------------------------
    // End-to-end grant scenario
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_engineer_with_view_only_cannot_create() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let engineer = principal(role);

        let create = evaluate_grant(
            &authz,
            Some(&engineer),
            &RequiredGrant::Code("complaint.create"),
        )
        .await
        .unwrap();
        assert!(matches!(create, GateDecision::Forbidden(_)));

        let view = evaluate_grant(
            &authz,
            Some(&engineer),
            &RequiredGrant::Code("complaint.view"),
        )
        .await
        .unwrap();
        assert_eq!(view, GateDecision::Allow);
    }
}
