//! # Authorization Policies
//!
//! An authorization policy is an ordered list of credential rules. A rule
//! grants its privileges to any actor whose credentials satisfy at least one
//! of the rule's criteria.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::credentials::{Credential, CredentialDefinition};
use crate::privileges::Privilege;

/// The aggregate a policy is attached to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    /// Policy of a RoleSet.
    RoleSet,
    /// Policy of an Application.
    Application,
    /// Policy of an Invitation.
    Invitation,
    /// Policy of an invitation to a not-yet-registered actor.
    PlatformInvitation,
}

impl PolicyType {
    /// Get the string representation of the policy type.
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyType::RoleSet => "role_set",
            PolicyType::Application => "application",
            PolicyType::Invitation => "invitation",
            PolicyType::PlatformInvitation => "platform_invitation",
        }
    }
}

/// A set of privileges.
///
/// Lookups take implication into account: a set holding `Update` also
/// answers `true` for `Read`.
///
/// # Example
///
/// ```
/// use roleset_authz::policy::PrivilegeSet;
/// use roleset_authz::privileges::Privilege;
///
/// let set: PrivilegeSet = [Privilege::Update].into_iter().collect();
/// assert!(set.has(Privilege::Read));
/// assert!(!set.has(Privilege::Grant));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegeSet {
    privileges: HashSet<Privilege>,
}

impl PrivilegeSet {
    /// Create a new empty privilege set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a privilege to the set.
    pub fn add(&mut self, privilege: Privilege) {
        self.privileges.insert(privilege);
    }

    /// Check if the set grants a privilege, directly or by implication.
    pub fn has(&self, privilege: Privilege) -> bool {
        self.privileges.iter().any(|p| p.satisfies(privilege))
    }

    /// Merge another set into this one.
    pub fn merge(&mut self, other: &PrivilegeSet) {
        self.privileges.extend(other.privileges.iter().copied());
    }

    /// Get the count of privileges.
    pub fn len(&self) -> usize {
        self.privileges.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.privileges.is_empty()
    }

    /// Iterate the privileges held directly.
    pub fn iter(&self) -> impl Iterator<Item = &Privilege> {
        self.privileges.iter()
    }
}

impl FromIterator<Privilege> for PrivilegeSet {
    fn from_iter<T: IntoIterator<Item = Privilege>>(iter: T) -> Self {
        Self {
            privileges: iter.into_iter().collect(),
        }
    }
}

/// A rule granting privileges to holders of matching credentials.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialRule {
    /// Rule name, for diagnostics
    pub name: String,

    /// Credential predicates; any one satisfied activates the rule
    pub criteria: Vec<CredentialDefinition>,

    /// Privileges granted when the rule is active
    pub privileges: Vec<Privilege>,

    /// Whether child policies inherit this rule
    pub cascade: bool,
}

impl CredentialRule {
    /// Create a new cascading rule.
    ///
    /// # Arguments
    ///
    /// * `name` - Rule name
    /// * `criteria` - Credential predicates activating the rule
    /// * `privileges` - Privileges granted by the rule
    pub fn new(
        name: impl Into<String>,
        criteria: Vec<CredentialDefinition>,
        privileges: Vec<Privilege>,
    ) -> Self {
        Self {
            name: name.into(),
            criteria,
            privileges,
            cascade: true,
        }
    }

    /// Set whether child policies inherit the rule.
    pub fn with_cascade(mut self, cascade: bool) -> Self {
        self.cascade = cascade;
        self
    }

    /// Check if any valid credential satisfies one of the criteria.
    pub fn is_active_for(&self, credentials: &[Credential]) -> bool {
        self.criteria
            .iter()
            .any(|criterion| criterion.is_satisfied_by_any(credentials))
    }

    /// Check if the rule grants a privilege, directly or by implication.
    pub fn grants(&self, privilege: Privilege) -> bool {
        self.privileges.iter().any(|p| p.satisfies(privilege))
    }
}

/// An authorization policy attached to a RoleSet or a workflow.
///
/// # Example
///
/// ```
/// use roleset_authz::credentials::{Credential, CredentialDefinition};
/// use roleset_authz::policy::{AuthorizationPolicy, CredentialRule, PolicyType};
/// use roleset_authz::privileges::Privilege;
///
/// let policy = AuthorizationPolicy::new(PolicyType::RoleSet).with_rule(CredentialRule::new(
///     "space-admins",
///     vec![CredentialDefinition::new("space-admin", "space-1")],
///     vec![Privilege::Grant, Privilege::Update],
/// ));
///
/// let granted = policy.granted_privileges(&[Credential::new("space-admin", "space-1")]);
/// assert!(granted.has(Privilege::Grant));
/// assert!(granted.has(Privilege::Read));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationPolicy {
    /// Unique policy ID
    pub id: Uuid,

    /// Aggregate the policy is attached to
    pub policy_type: PolicyType,

    /// Rules, evaluated in order
    pub credential_rules: Vec<CredentialRule>,
}

impl AuthorizationPolicy {
    /// Create an empty policy.
    pub fn new(policy_type: PolicyType) -> Self {
        Self {
            id: Uuid::now_v7(),
            policy_type,
            credential_rules: Vec::new(),
        }
    }

    /// Add a rule (builder style).
    pub fn with_rule(mut self, rule: CredentialRule) -> Self {
        self.credential_rules.push(rule);
        self
    }

    /// Add a rule.
    pub fn add_rule(&mut self, rule: CredentialRule) {
        self.credential_rules.push(rule);
    }

    /// Copy the cascading rules of `parent` in front of this policy's own
    /// rules.
    ///
    /// Rules are identified by name; a rule already present is not
    /// duplicated.
    pub fn inherit_from(mut self, parent: &AuthorizationPolicy) -> Self {
        let own: HashSet<String> = self
            .credential_rules
            .iter()
            .map(|r| r.name.clone())
            .collect();

        let mut rules: Vec<CredentialRule> = parent
            .credential_rules
            .iter()
            .filter(|r| r.cascade && !own.contains(&r.name))
            .cloned()
            .collect();
        rules.append(&mut self.credential_rules);
        self.credential_rules = rules;
        self
    }

    /// Collect every privilege granted to a holder of `credentials`.
    pub fn granted_privileges(&self, credentials: &[Credential]) -> PrivilegeSet {
        let mut set = PrivilegeSet::new();
        for rule in &self.credential_rules {
            if rule.is_active_for(credentials) {
                for privilege in &rule.privileges {
                    set.add(*privilege);
                }
            }
        }
        set
    }

    /// Check if a holder of `credentials` is granted `privilege`.
    pub fn grants(&self, credentials: &[Credential], privilege: Privilege) -> bool {
        self.credential_rules
            .iter()
            .any(|rule| rule.grants(privilege) && rule.is_active_for(credentials))
    }
}
