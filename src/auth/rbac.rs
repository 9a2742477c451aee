use crate::errors::AuthError;
use crate::models::user::{Identity, Role};

/// Role requirement attached to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredRole {
    /// Any identity holding a verified token.
    Authenticated,
    Admin,
}

impl Role {
    /// Check if this role satisfies the requirement.
    pub fn satisfies(&self, required: RequiredRole) -> bool {
        match required {
            RequiredRole::Authenticated => true,
            RequiredRole::Admin => matches!(self, Role::Admin),
        }
    }
}

/// Decide whether `identity` may proceed. Only call this with an identity
/// produced by token verification. `None` always denies.
pub fn authorize(identity: Option<&Identity>, required: RequiredRole) -> Result<(), AuthError> {
    match identity {
        Some(id) if id.role.satisfies(required) => Ok(()),
        Some(id) => {
            tracing::warn!(
                user_id = %id.id,
                role = %id.role,
                required = ?required,
                "RBAC access denied"
            );
            Err(AuthError::Forbidden)
        }
        None => {
            tracing::warn!(required = ?required, "RBAC access denied: no identity");
            Err(AuthError::Forbidden)
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn identity(role: Role) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            role,
        }
    }

    #[test]
    fn test_admin_satisfies_everything() {
        assert!(Role::Admin.satisfies(RequiredRole::Authenticated));
        assert!(Role::Admin.satisfies(RequiredRole::Admin));
    }

    #[test]
    fn test_member_is_authenticated_only() {
        assert!(Role::Member.satisfies(RequiredRole::Authenticated));
        assert!(!Role::Member.satisfies(RequiredRole::Admin));
    }

    #[test]
    fn test_authorize_member_on_admin_endpoint_is_forbidden() {
        let member = identity(Role::Member);
        assert_eq!(
            authorize(Some(&member), RequiredRole::Admin),
            Err(AuthError::Forbidden)
        );
    }

    #[test]
    fn test_authorize_allows_matching_roles() {
        let admin = identity(Role::Admin);
        let member = identity(Role::Member);
        assert!(authorize(Some(&admin), RequiredRole::Admin).is_ok());
        assert!(authorize(Some(&admin), RequiredRole::Authenticated).is_ok());
        assert!(authorize(Some(&member), RequiredRole::Authenticated).is_ok());
    }

    #[test]
    fn test_authorize_without_identity_fails_closed() {
        assert_eq!(
            authorize(None, RequiredRole::Authenticated),
            Err(AuthError::Forbidden)
        );
        assert_eq!(authorize(None, RequiredRole::Admin), Err(AuthError::Forbidden));
    }
}
