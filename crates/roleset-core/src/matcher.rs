//! Credential matcher
//!
//! Decides role membership by matching an agent's credentials against role
//! predicates. The pure functions work on credentials already in hand so a
//! batch can fetch once and match many times.

use roleset_authz::Credential;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::MembershipResult;
use crate::role::RoleName;
use crate::role_set::RoleSet;
use crate::store::CredentialStore;

/// Check if `credentials` satisfy the predicate of role `name`.
///
/// # Errors
///
/// [`MembershipError::NotFound`](crate::MembershipError::NotFound) if the
/// role is not defined.
pub fn holds_role(role_set: &RoleSet, name: RoleName, credentials: &[Credential]) -> MembershipResult<bool> {
    Ok(role_set.role(name)?.is_satisfied_by(credentials))
}

/// Roles whose predicates `credentials` satisfy, in definition order.
pub fn roles_held_by(role_set: &RoleSet, credentials: &[Credential]) -> MembershipResult<Vec<RoleName>> {
    Ok(role_set
        .roles()?
        .iter()
        .filter(|role| role.is_satisfied_by(credentials))
        .map(|role| role.name)
        .collect())
}

/// Check if `credentials` satisfy the entry role.
pub fn holds_entry_role(role_set: &RoleSet, credentials: &[Credential]) -> MembershipResult<bool> {
    holds_role(role_set, role_set.entry_role_name, credentials)
}

/// Matches agents against roles, loading credentials from the store.
#[derive(Clone)]
pub struct CredentialMatcher {
    credentials: Arc<dyn CredentialStore>,
}

impl CredentialMatcher {
    /// Create a matcher over a credential store.
    pub fn new(credentials: Arc<dyn CredentialStore>) -> Self {
        Self { credentials }
    }

    /// Check if `agent_id` holds role `name` in `role_set`.
    ///
    /// The role is looked up before any credential is fetched.
    pub async fn is_in_role(&self, agent_id: Uuid, role_set: &RoleSet, name: RoleName) -> MembershipResult<bool> {
        let role = role_set.role(name)?;
        let credentials = self.credentials.get_credentials(agent_id).await?;
        Ok(role.is_satisfied_by(&credentials))
    }

    /// Roles `agent_id` holds in `role_set`, in definition order.
    pub async fn roles_held(&self, agent_id: Uuid, role_set: &RoleSet) -> MembershipResult<Vec<RoleName>> {
        role_set.roles()?;
        let credentials = self.credentials.get_credentials(agent_id).await?;
        roles_held_by(role_set, &credentials)
    }
}

impl std::fmt::Debug for CredentialMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialMatcher").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MembershipError;
    use crate::memory::InMemoryCredentialStore;
    use crate::role::{ContributorKind, Role};
    use crate::role_set::{CreateRoleSetInput, RoleSetType};
    use roleset_authz::CredentialDefinition;

    fn role_set() -> RoleSet {
        RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Member,
            vec![
                Role::new(RoleName::Member, CredentialDefinition::new("space-member", "space-1")),
                Role::new(RoleName::Lead, CredentialDefinition::new("space-lead", "space-1")),
                Role::new(RoleName::Admin, CredentialDefinition::any("global-admin")),
            ],
        ))
        .unwrap()
    }

    #[test]
    fn test_roles_held_in_definition_order() {
        let rs = role_set();
        let credentials = vec![
            Credential::new("global-admin", "platform"),
            Credential::new("space-member", "space-1"),
        ];
        assert_eq!(
            roles_held_by(&rs, &credentials).unwrap(),
            vec![RoleName::Member, RoleName::Admin]
        );
    }

    #[test]
    fn test_holds_role_resource_mismatch() {
        let rs = role_set();
        let credentials = vec![Credential::new("space-member", "space-2")];
        assert!(!holds_role(&rs, RoleName::Member, &credentials).unwrap());
        assert!(!holds_entry_role(&rs, &credentials).unwrap());
    }

    #[test]
    fn test_holds_role_missing_role_is_not_found() {
        let rs = role_set();
        assert!(matches!(
            holds_role(&rs, RoleName::Owner, &[]),
            Err(MembershipError::NotFound { entity: "Role", .. })
        ));
    }

    #[tokio::test]
    async fn test_is_in_role_fetches_credentials() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let agent = Uuid::now_v7();
        store
            .grant_credential(agent, ContributorKind::User, &CredentialDefinition::new("space-lead", "space-1"))
            .await
            .unwrap();

        let matcher = CredentialMatcher::new(store.clone());
        let rs = role_set();
        assert!(matcher.is_in_role(agent, &rs, RoleName::Lead).await.unwrap());
        assert!(!matcher.is_in_role(agent, &rs, RoleName::Member).await.unwrap());
        assert_eq!(matcher.roles_held(agent, &rs).await.unwrap(), vec![RoleName::Lead]);
    }

    #[tokio::test]
    async fn test_missing_role_fails_before_fetch() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let matcher = CredentialMatcher::new(store.clone());
        let result = matcher.is_in_role(Uuid::now_v7(), &role_set(), RoleName::Owner).await;
        assert!(matches!(result, Err(MembershipError::NotFound { .. })));
        assert_eq!(store.fetch_calls(), 0);
    }
}
