//! Authorization gate
//!
//! The single place access decisions are made. Every dashboard entry and
//! every privileged action calls [`AuthorizationGate::authorize`]; no other
//! module compares roles.
//!
//! Resolution is two-tier: the identity's primary role is checked against the
//! surface's required role, and only on mismatch is the admin allow-list
//! consulted. Anything unexpected (no identity, no profile, an unknown role
//! string, a failed lookup) denies.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CompetencyError;
use crate::records::Role;
use crate::store::CompetencyStore;

/// Role-scoped entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Surface {
    Learner,
    Supervisor,
    Governance,
}

impl Surface {
    /// Primary role the surface requires
    pub fn required_role(&self) -> Role {
        match self {
            Surface::Learner => Role::Learner,
            Surface::Supervisor => Role::Supervisor,
            Surface::Governance => Role::Governance,
        }
    }
}

impl fmt::Display for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.required_role())
    }
}

/// Where a denied caller is sent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Redirect {
    SignIn,
    Forbidden,
}

impl fmt::Display for Redirect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Redirect::SignIn => write!(f, "sign-in"),
            Redirect::Forbidden => write!(f, "forbidden"),
        }
    }
}

/// Outcome of resolving an identity against a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Access {
    pub allowed: bool,
    pub role: Option<Role>,
    pub is_override_admin: bool,
    pub redirect: Option<Redirect>,
}

impl Access {
    fn denied(role: Option<Role>, redirect: Redirect) -> Self {
        Self {
            allowed: false,
            role,
            is_override_admin: false,
            redirect: Some(redirect),
        }
    }
}

/// An identity that has passed the gate for a surface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
    pub is_override_admin: bool,
    pub surface: Surface,
}

pub struct AuthorizationGate {
    store: Arc<dyn CompetencyStore>,
}

impl AuthorizationGate {
    pub fn new(store: Arc<dyn CompetencyStore>) -> Self {
        Self { store }
    }

    /// Resolve an identity's access to a surface. Never errors; failures deny.
    pub async fn resolve(&self, identity: Option<&str>, surface: Surface) -> Access {
        let id = match identity.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!(surface = %surface, "No identity presented");
                return Access::denied(None, Redirect::SignIn);
            }
        };

        let identity = match self.store.profile(id).await {
            Ok(Some(identity)) => identity,
            Ok(None) => {
                debug!(identity = %id, surface = %surface, "No profile for identity");
                return Access::denied(None, Redirect::SignIn);
            }
            Err(CompetencyError::Malformed(reason)) => {
                warn!(identity = %id, reason = %reason, "Profile failed validation");
                return Access::denied(None, Redirect::Forbidden);
            }
            Err(e) => {
                warn!(identity = %id, error = %e, "Profile lookup failed");
                return Access::denied(None, Redirect::SignIn);
            }
        };

        if identity.role == surface.required_role() {
            return Access {
                allowed: true,
                role: Some(identity.role),
                is_override_admin: false,
                redirect: None,
            };
        }

        match self.store.is_app_admin(id).await {
            Ok(true) => {
                debug!(identity = %id, surface = %surface, "Admin override granted");
                Access {
                    allowed: true,
                    role: Some(identity.role),
                    is_override_admin: true,
                    redirect: None,
                }
            }
            Ok(false) => Access::denied(Some(identity.role), Redirect::Forbidden),
            Err(e) => {
                warn!(identity = %id, error = %e, "Admin allow-list lookup failed");
                Access::denied(Some(identity.role), Redirect::Forbidden)
            }
        }
    }

    /// Resolve and require access, yielding a [`Caller`] or `AuthzDenied`
    pub async fn authorize(
        &self,
        identity: Option<&str>,
        surface: Surface,
    ) -> Result<Caller, CompetencyError> {
        let access = self.resolve(identity, surface).await;

        match (access.allowed, access.role, identity) {
            (true, Some(role), Some(id)) => Ok(Caller {
                id: id.trim().to_string(),
                role,
                is_override_admin: access.is_override_admin,
                surface,
            }),
            _ => {
                let redirect = access.redirect.unwrap_or(Redirect::Forbidden);
                warn!(
                    identity = identity.unwrap_or("<none>"),
                    surface = %surface,
                    redirect = %redirect,
                    "Access denied"
                );
                Err(CompetencyError::AuthzDenied { redirect })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::{apply_seed, SeedFile};
    use crate::store::SqliteStore;

    fn gate() -> AuthorizationGate {
        let store = SqliteStore::open_in_memory().unwrap();
        let seed = SeedFile::from_json(
            r#"{
                "profiles": [
                    { "id": "ada", "role": "learner" },
                    { "id": "sam", "role": "supervisor" },
                    { "id": "gov", "role": "governance" },
                    { "id": "root", "role": "learner" }
                ],
                "admins": ["root"]
            }"#,
        )
        .unwrap();
        store.database().with_conn(|conn| apply_seed(conn, &seed)).unwrap();
        AuthorizationGate::new(Arc::new(store))
    }

    #[tokio::test]
    async fn test_primary_role_match() {
        let access = gate().resolve(Some("sam"), Surface::Supervisor).await;
        assert!(access.allowed);
        assert_eq!(access.role, Some(Role::Supervisor));
        assert!(!access.is_override_admin);
    }

    #[tokio::test]
    async fn test_admin_override_on_mismatch() {
        let gate = gate();
        let access = gate.resolve(Some("root"), Surface::Governance).await;
        assert!(access.allowed);
        assert!(access.is_override_admin);
        assert_eq!(access.role, Some(Role::Learner));

        let caller = gate.authorize(Some("root"), Surface::Supervisor).await.unwrap();
        assert!(caller.is_override_admin);
    }

    #[tokio::test]
    async fn test_mismatch_without_admin_is_forbidden() {
        let access = gate().resolve(Some("ada"), Surface::Supervisor).await;
        assert!(!access.allowed);
        assert_eq!(access.redirect, Some(Redirect::Forbidden));
    }

    #[tokio::test]
    async fn test_missing_identity_redirects_to_sign_in() {
        let gate = gate();
        for identity in [None, Some("  "), Some("ghost")] {
            let access = gate.resolve(identity, Surface::Learner).await;
            assert_eq!(access.redirect, Some(Redirect::SignIn));
        }

        let denied = gate.authorize(Some("ghost"), Surface::Learner).await;
        assert!(matches!(
            denied,
            Err(CompetencyError::AuthzDenied { redirect: Redirect::SignIn })
        ));
    }
}
