//! The authorization decision core.

use std::sync::Arc;

use crate::authz::{PermissionSource, Principal};
use crate::error::Result;

/// Decides whether a principal may perform a named action.
///
/// The permission source is injected rather than attached to the user type,
/// so decisions are pure functions of the principal snapshot and the role's
/// permission set. Evaluation order is fixed:
///
/// 1. no principal → deny
/// 2. inactive or unapproved account → deny, regardless of grants
/// 3. `super_admin` role code → allow unconditionally (intentional
///    privilege-escalation path, kept as this single guarded branch)
/// 4. otherwise → membership in the role's permission set
///
/// Unknown roles and unknown permission codes are not errors; they simply
/// produce no grant.
pub struct Authorizer {
    source: Arc<dyn PermissionSource>,
}

impl Authorizer {
    pub fn new(source: Arc<dyn PermissionSource>) -> Self {
        Self { source }
    }

    /// Whether the principal may perform the action named by `code`.
    pub async fn is_authorized(&self, principal: Option<&Principal>, code: &str) -> Result<bool> {
        let Some(principal) = principal else {
            return Ok(false);
        };
        if !principal.is_account_usable() {
            return Ok(false);
        }
        if principal.is_super_admin() {
            return Ok(true);
        }
        let granted = self.source.codes_for_role(principal.role_id).await?;
        Ok(granted.contains(code))
    }

    /// Whether at least one of `codes` is granted. Empty input means no
    /// code can be satisfied, so the answer is false.
    pub async fn is_authorized_any(
        &self,
        principal: Option<&Principal>,
        codes: &[&str],
    ) -> Result<bool> {
        let Some(principal) = principal else {
            return Ok(false);
        };
        if !principal.is_account_usable() {
            return Ok(false);
        }
        if principal.is_super_admin() {
            return Ok(true);
        }
        if codes.is_empty() {
            return Ok(false);
        }
        let granted = self.source.codes_for_role(principal.role_id).await?;
        Ok(codes.iter().any(|code| granted.contains(*code)))
    }

    /// Whether every one of `codes` is granted. Empty input is vacuously
    /// true: an empty requirement list constrains nothing.
    pub async fn is_authorized_all(
        &self,
        principal: Option<&Principal>,
        codes: &[&str],
    ) -> Result<bool> {
        let Some(principal) = principal else {
            return Ok(false);
        };
        if !principal.is_account_usable() {
            return Ok(false);
        }
        if principal.is_super_admin() {
            return Ok(true);
        }
        if codes.is_empty() {
            return Ok(true);
        }
        let granted = self.source.codes_for_role(principal.role_id).await?;
        Ok(codes.iter().all(|code| granted.contains(*code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::InMemoryPermissionSource;
    use crate::models::role::SUPER_ADMIN_ROLE_CODE;
    use uuid::Uuid;

    fn principal(role_id: Uuid, role_code: &str) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role_id,
            role_code: role_code.to_string(),
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
    // Single-code checks
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_grant_matches_set_membership() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view", "complaint.create"]).await;
        let p = principal(role, "engineer");

        assert!(authz.is_authorized(Some(&p), "complaint.view").await.unwrap());
        assert!(authz.is_authorized(Some(&p), "complaint.create").await.unwrap());
        assert!(!authz.is_authorized(Some(&p), "complaint.delete").await.unwrap());
        assert!(!authz.is_authorized(Some(&p), "users.view").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_principal_is_denied() {
        let authz = authorizer_with(Uuid::new_v4(), &["complaint.view"]).await;
        assert!(!authz.is_authorized(None, "complaint.view").await.unwrap());
        assert!(!authz.is_authorized_any(None, &["complaint.view"]).await.unwrap());
        assert!(!authz.is_authorized_all(None, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_role_has_no_grants() {
        let authz = authorizer_with(Uuid::new_v4(), &["complaint.view"]).await;
        let p = principal(Uuid::new_v4(), "engineer"); // role never registered
        assert!(!authz.is_authorized(Some(&p), "complaint.view").await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_code_is_simply_not_granted() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let p = principal(role, "engineer");
        assert!(!authz
            .is_authorized(Some(&p), "no-such-code-anywhere")
            .await
            .unwrap());
    }

    // -----------------------------------------------------------------------
    // Super admin bypass
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_super_admin_bypasses_permission_sets() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &[]).await; // no grants at all
        let p = principal(role, SUPER_ADMIN_ROLE_CODE);

        assert!(authz.is_authorized(Some(&p), "complaint.delete").await.unwrap());
        assert!(authz.is_authorized_any(Some(&p), &[]).await.unwrap());
        assert!(authz.is_authorized_all(Some(&p), &["a", "b", "c"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_inactive_super_admin_is_still_denied() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &[]).await;
        let mut p = principal(role, SUPER_ADMIN_ROLE_CODE);
        p.is_active = false;

        assert!(!authz.is_authorized(Some(&p), "complaint.view").await.unwrap());
    }

    // -----------------------------------------------------------------------
    // Inactive / unapproved accounts
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_inactive_account_denied_despite_grants() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let mut p = principal(role, "engineer");
        p.is_active = false;

        assert!(!authz.is_authorized(Some(&p), "complaint.view").await.unwrap());
    }

    #[tokio::test]
    async fn test_unapproved_account_denied_despite_grants() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let mut p = principal(role, "engineer");
        p.is_approved = false;

        assert!(!authz.is_authorized(Some(&p), "complaint.view").await.unwrap());
    }

    // -----------------------------------------------------------------------
    // Any / all semantics
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_any_requires_at_least_one_grant() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let p = principal(role, "engineer");

        assert!(authz
            .is_authorized_any(Some(&p), &["complaint.delete", "complaint.view"])
            .await
            .unwrap());
        assert!(!authz
            .is_authorized_any(Some(&p), &["complaint.delete", "users.view"])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_any_of_empty_list_is_false() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view"]).await;
        let p = principal(role, "engineer");
        assert!(!authz.is_authorized_any(Some(&p), &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_all_requires_every_grant() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &["complaint.view", "complaint.update"]).await;
        let p = principal(role, "engineer");

        assert!(authz
            .is_authorized_all(Some(&p), &["complaint.view", "complaint.update"])
            .await
            .unwrap());
        assert!(!authz
            .is_authorized_all(Some(&p), &["complaint.view", "complaint.delete"])
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_all_of_empty_list_is_vacuously_true() {
        let role = Uuid::new_v4();
        let authz = authorizer_with(role, &[]).await;
        let p = principal(role, "engineer");
        assert!(authz.is_authorized_all(Some(&p), &[]).await.unwrap());
    }
}
