//! Role definitions
//!
//! A role is a named tier within a RoleSet, defined by the credential that
//! proves it, the parent-RoleSet credentials that scope it, and how many
//! contributors of each kind may hold it.

use roleset_authz::CredentialDefinition;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of a role within a RoleSet.
///
/// # Examples
///
/// ```
/// use roleset_core::RoleName;
///
/// assert_eq!(RoleName::parse("admin"), Some(RoleName::Admin));
/// assert_eq!(RoleName::Member.as_str(), "MEMBER");
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleName {
    /// Entry role of most RoleSets
    Member,

    /// Lead contributor
    Lead,

    /// Administers the RoleSet
    Admin,

    /// Owns an organization
    Owner,

    /// Associated with an organization without full membership
    Associate,
}

impl RoleName {
    /// Parse role name from string representation.
    ///
    /// # Arguments
    ///
    /// * `s` - String to parse (case-insensitive)
    ///
    /// # Returns
    ///
    /// `Some(RoleName)` if valid, `None` otherwise
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "MEMBER" => Some(Self::Member),
            "LEAD" => Some(Self::Lead),
            "ADMIN" => Some(Self::Admin),
            "OWNER" => Some(Self::Owner),
            "ASSOCIATE" => Some(Self::Associate),
            _ => None,
        }
    }

    /// Get string representation of the role name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "MEMBER",
            Self::Lead => "LEAD",
            Self::Admin => "ADMIN",
            Self::Owner => "OWNER",
            Self::Associate => "ASSOCIATE",
        }
    }

    /// Get all role names.
    pub fn all() -> Vec<Self> {
        vec![
            Self::Member,
            Self::Lead,
            Self::Admin,
            Self::Owner,
            Self::Associate,
        ]
    }
}

impl std::fmt::Display for RoleName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of contributor (agent) that can hold a role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ContributorKind {
    /// A human user
    User,
    /// An organization
    Organization,
    /// A virtual (AI) contributor
    VirtualContributor,
}

impl ContributorKind {
    /// Get string representation of the contributor kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Organization => "organization",
            Self::VirtualContributor => "virtual_contributor",
        }
    }
}

/// Minimum and maximum number of contributors of one kind holding a role.
///
/// A negative `maximum` means unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributorPolicy {
    /// Holders that must remain after a removal
    pub minimum: u32,
    /// Holders allowed; negative is unlimited
    pub maximum: i32,
}

impl ContributorPolicy {
    /// A policy with explicit bounds.
    pub fn new(minimum: u32, maximum: i32) -> Self {
        Self { minimum, maximum }
    }

    /// No lower bound and no upper bound.
    pub fn unlimited() -> Self {
        Self::new(0, -1)
    }

    /// Nobody of this kind may hold the role.
    pub fn disallowed() -> Self {
        Self::new(0, 0)
    }

    /// Check if the upper bound is unlimited.
    pub fn is_unlimited(&self) -> bool {
        self.maximum < 0
    }

    /// Check if one more holder may be added when `current` already hold it.
    ///
    /// The first holder is always admitted.
    pub fn allows_assign(&self, current: usize) -> bool {
        current == 0 || self.is_unlimited() || current < self.maximum as usize
    }

    /// Check if a holder may be removed when `current` hold it.
    pub fn allows_remove(&self, current: usize) -> bool {
        current > self.minimum as usize
    }
}

impl Default for ContributorPolicy {
    fn default() -> Self {
        Self::unlimited()
    }
}

/// A role definition within a RoleSet.
///
/// # Examples
///
/// ```
/// use roleset_authz::{Credential, CredentialDefinition};
/// use roleset_core::{Role, RoleName};
///
/// let role = Role::new(RoleName::Member, CredentialDefinition::new("space-member", "space-1"));
/// assert!(role.is_satisfied_by(&[Credential::new("space-member", "space-1")]));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Unique role ID
    pub id: Uuid,

    /// Role name, unique within its RoleSet
    pub name: RoleName,

    /// Credential proving the role
    pub credential: CredentialDefinition,

    /// Credentials of the same role in ancestor RoleSets, nearest first
    #[serde(default)]
    pub parent_credentials: Vec<CredentialDefinition>,

    /// Limits for users
    pub user_policy: ContributorPolicy,

    /// Limits for organizations
    pub organization_policy: ContributorPolicy,

    /// Limits for virtual contributors
    pub virtual_contributor_policy: ContributorPolicy,

    /// Whether holders must also hold the parent credentials
    #[serde(default)]
    pub requires_same_role_in_parent: bool,
}

impl Role {
    /// Creates a role open to every contributor kind without limits.
    pub fn new(name: RoleName, credential: CredentialDefinition) -> Self {
        Self {
            id: Uuid::now_v7(),
            name,
            credential,
            parent_credentials: Vec::new(),
            user_policy: ContributorPolicy::unlimited(),
            organization_policy: ContributorPolicy::unlimited(),
            virtual_contributor_policy: ContributorPolicy::unlimited(),
            requires_same_role_in_parent: false,
        }
    }

    /// Set the user policy.
    pub fn with_user_policy(mut self, policy: ContributorPolicy) -> Self {
        self.user_policy = policy;
        self
    }

    /// Set the organization policy.
    pub fn with_organization_policy(mut self, policy: ContributorPolicy) -> Self {
        self.organization_policy = policy;
        self
    }

    /// Set the virtual contributor policy.
    pub fn with_virtual_contributor_policy(mut self, policy: ContributorPolicy) -> Self {
        self.virtual_contributor_policy = policy;
        self
    }

    /// Require holders to hold the same role in the parent RoleSet.
    pub fn requiring_parent_role(mut self) -> Self {
        self.requires_same_role_in_parent = true;
        self
    }

    /// Get the policy applying to a contributor kind.
    pub fn policy_for(&self, kind: ContributorKind) -> ContributorPolicy {
        match kind {
            ContributorKind::User => self.user_policy,
            ContributorKind::Organization => self.organization_policy,
            ContributorKind::VirtualContributor => self.virtual_contributor_policy,
        }
    }

    /// Check if any valid credential satisfies the role predicate.
    pub fn is_satisfied_by(&self, credentials: &[roleset_authz::Credential]) -> bool {
        self.credential.is_satisfied_by_any(credentials)
    }

    /// The role credential followed by its parent credentials.
    pub fn credentials_with_parents(&self) -> Vec<CredentialDefinition> {
        let mut result = Vec::with_capacity(self.parent_credentials.len() + 1);
        result.push(self.credential.clone());
        result.extend(self.parent_credentials.iter().cloned());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleset_authz::Credential;

    #[test]
    fn test_role_name_parse_and_serde() {
        assert_eq!(RoleName::parse("lead"), Some(RoleName::Lead));
        assert_eq!(RoleName::parse("Owner"), Some(RoleName::Owner));
        assert_eq!(RoleName::parse("guest"), None);
        assert_eq!(serde_json::to_string(&RoleName::Admin).unwrap(), "\"ADMIN\"");
        for name in RoleName::all() {
            assert_eq!(RoleName::parse(name.as_str()), Some(name));
        }
    }

    #[test]
    fn test_policy_assign_limits() {
        let policy = ContributorPolicy::new(0, 2);
        assert!(policy.allows_assign(0));
        assert!(policy.allows_assign(1));
        assert!(!policy.allows_assign(2));

        assert!(ContributorPolicy::unlimited().allows_assign(10_000));
    }

    #[test]
    fn test_first_holder_always_admitted() {
        assert!(ContributorPolicy::disallowed().allows_assign(0));
        assert!(!ContributorPolicy::disallowed().allows_assign(1));
    }

    #[test]
    fn test_policy_remove_limits() {
        let policy = ContributorPolicy::new(1, -1);
        assert!(!policy.allows_remove(1));
        assert!(policy.allows_remove(2));
        assert!(ContributorPolicy::unlimited().allows_remove(1));
        assert!(!ContributorPolicy::unlimited().allows_remove(0));
    }

    #[test]
    fn test_policy_for_kind() {
        let role = Role::new(RoleName::Lead, CredentialDefinition::new("space-lead", "s1"))
            .with_user_policy(ContributorPolicy::new(0, 2))
            .with_organization_policy(ContributorPolicy::new(0, 1))
            .with_virtual_contributor_policy(ContributorPolicy::disallowed());

        assert_eq!(role.policy_for(ContributorKind::User).maximum, 2);
        assert_eq!(role.policy_for(ContributorKind::Organization).maximum, 1);
        assert_eq!(role.policy_for(ContributorKind::VirtualContributor).maximum, 0);
    }

    #[test]
    fn test_satisfied_by() {
        let role = Role::new(RoleName::Member, CredentialDefinition::new("space-member", "space-1"));
        assert!(role.is_satisfied_by(&[Credential::new("space-member", "space-1")]));
        assert!(!role.is_satisfied_by(&[Credential::new("space-member", "space-2")]));
        assert!(!role.is_satisfied_by(&[]));
    }

    #[test]
    fn test_credentials_with_parents() {
        let mut role = Role::new(RoleName::Member, CredentialDefinition::new("space-member", "sub-1"));
        role.parent_credentials = vec![CredentialDefinition::new("space-member", "space-1")];

        let chain = role.credentials_with_parents();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0].resource_id, "sub-1");
        assert_eq!(chain[1].resource_id, "space-1");
    }
}
