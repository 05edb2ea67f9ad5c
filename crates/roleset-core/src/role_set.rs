//! RoleSet aggregate
//!
//! A RoleSet governs role membership for one resource (a space, an
//! organization or the platform). RoleSets form a tree through their parent
//! link; child roles carry the credentials of the same role in every
//! ancestor.

use chrono::{DateTime, Utc};
use roleset_authz::{AuthorizationPolicy, CredentialDefinition, CredentialRule, PolicyType, Privilege};
use roleset_events::EventSource;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::error::{MembershipError, MembershipResult};
use crate::role::{Role, RoleName};

/// Kind of resource a RoleSet governs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RoleSetType {
    /// A space or subspace
    Space,
    /// An organization
    Organization,
    /// The platform itself
    Platform,
}

impl RoleSetType {
    /// Get string representation of the RoleSet type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Space => "space",
            Self::Organization => "organization",
            Self::Platform => "platform",
        }
    }

    /// Source tag for events fired by RoleSets of this type.
    pub fn event_source(&self) -> EventSource {
        match self {
            Self::Space => EventSource::Space,
            Self::Organization => EventSource::Organization,
            Self::Platform => EventSource::Platform,
        }
    }
}

// ============================================================================
// License
// ============================================================================

/// Feature entitlement types carried by a RoleSet license.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementType {
    /// Virtual contributors may be invited into the RoleSet
    VirtualContributorAccess,
}

/// How an entitlement's value is interpreted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementDataType {
    /// On/off flag
    Flag,
    /// Numeric limit
    Limit,
}

/// A single entitlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseEntitlement {
    /// Entitlement type
    pub entitlement_type: EntitlementType,
    /// Value interpretation
    pub data_type: EntitlementDataType,
    /// Numeric limit, for `Limit` entitlements
    pub limit: u32,
    /// Whether the entitlement is enabled
    pub enabled: bool,
}

/// Feature entitlements of a RoleSet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    /// Unique license ID
    pub id: Uuid,
    /// Entitlements
    pub entitlements: Vec<LicenseEntitlement>,
}

impl License {
    /// The license every new RoleSet starts with: virtual contributor access
    /// present but disabled.
    pub fn for_role_set() -> Self {
        Self {
            id: Uuid::now_v7(),
            entitlements: vec![LicenseEntitlement {
                entitlement_type: EntitlementType::VirtualContributorAccess,
                data_type: EntitlementDataType::Flag,
                limit: 0,
                enabled: false,
            }],
        }
    }

    /// Check if an entitlement is present and enabled.
    pub fn is_entitlement_enabled(&self, entitlement_type: EntitlementType) -> bool {
        self.entitlements
            .iter()
            .any(|e| e.entitlement_type == entitlement_type && e.enabled)
    }

    /// Enable or disable an entitlement, adding it as a flag if absent.
    pub fn set_entitlement(&mut self, entitlement_type: EntitlementType, enabled: bool) {
        match self
            .entitlements
            .iter_mut()
            .find(|e| e.entitlement_type == entitlement_type)
        {
            Some(entitlement) => entitlement.enabled = enabled,
            None => self.entitlements.push(LicenseEntitlement {
                entitlement_type,
                data_type: EntitlementDataType::Flag,
                limit: 0,
                enabled,
            }),
        }
    }
}

// ============================================================================
// RoleSet
// ============================================================================

/// Which associations to hydrate when loading a RoleSet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoleSetRelations {
    /// Role definitions
    pub roles: bool,
    /// Application ids
    pub applications: bool,
    /// Invitation ids
    pub invitations: bool,
    /// Platform invitation ids
    pub platform_invitations: bool,
}

impl RoleSetRelations {
    /// Load nothing but the scalar fields.
    pub fn none() -> Self {
        Self::default()
    }

    /// Load the role definitions only.
    pub fn roles() -> Self {
        Self {
            roles: true,
            ..Self::default()
        }
    }

    /// Load every association.
    pub fn all() -> Self {
        Self {
            roles: true,
            applications: true,
            invitations: true,
            platform_invitations: true,
        }
    }
}

/// Name prefix of the policy rules derived from role definitions.
pub const DERIVED_RULE_PREFIX: &str = "role-set-";

/// Policy granted by a RoleSet's own roles.
///
/// Admins and owners may grant, update, delete and invite; the rule
/// cascades into workflow policies. Entry-role holders may read the RoleSet
/// only.
fn derived_policy(roles: &[Role], entry_role_name: RoleName) -> AuthorizationPolicy {
    let mut policy = AuthorizationPolicy::new(PolicyType::RoleSet);

    let admin_criteria: Vec<CredentialDefinition> = roles
        .iter()
        .filter(|r| matches!(r.name, RoleName::Admin | RoleName::Owner))
        .map(|r| r.credential.clone())
        .collect();
    if !admin_criteria.is_empty() {
        policy.add_rule(CredentialRule::new(
            format!("{DERIVED_RULE_PREFIX}admins"),
            admin_criteria,
            vec![
                Privilege::Grant,
                Privilege::Update,
                Privilege::Delete,
                Privilege::Create,
                Privilege::RoleSetEntryRoleInvite,
            ],
        ));
    }

    if let Some(entry) = roles.iter().find(|r| r.name == entry_role_name) {
        policy.add_rule(
            CredentialRule::new(
                format!("{DERIVED_RULE_PREFIX}members"),
                vec![entry.credential.clone()],
                vec![Privilege::Read],
            )
            .with_cascade(false),
        );
    }

    policy
}

/// Input for creating a RoleSet.
#[derive(Debug, Clone)]
pub struct CreateRoleSetInput {
    /// Resource kind
    pub kind: RoleSetType,
    /// Role joined through applications and invitations
    pub entry_role_name: RoleName,
    /// Role definitions, in evaluation order
    pub roles: Vec<Role>,
    /// Parent RoleSet, if any
    pub parent_role_set_id: Option<Uuid>,
    /// Authorization policy; derived from the roles when `None`
    pub authorization: Option<AuthorizationPolicy>,
}

impl CreateRoleSetInput {
    /// Input with the given kind, entry role and roles, no parent.
    pub fn new(kind: RoleSetType, entry_role_name: RoleName, roles: Vec<Role>) -> Self {
        Self {
            kind,
            entry_role_name,
            roles,
            parent_role_set_id: None,
            authorization: None,
        }
    }

    /// Set the parent RoleSet.
    pub fn with_parent(mut self, parent_role_set_id: Uuid) -> Self {
        self.parent_role_set_id = Some(parent_role_set_id);
        self
    }

    /// Set the authorization policy.
    pub fn with_authorization(mut self, authorization: AuthorizationPolicy) -> Self {
        self.authorization = Some(authorization);
        self
    }
}

/// The RoleSet aggregate.
///
/// Associations are `None` until hydrated; accessing an unhydrated
/// association fails with [`MembershipError::RelationshipNotLoaded`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleSet {
    /// Unique RoleSet ID
    pub id: Uuid,

    /// Resource kind
    pub kind: RoleSetType,

    /// Role joined through applications and invitations
    pub entry_role_name: RoleName,

    /// Role definitions, in evaluation order
    pub roles: Option<Vec<Role>>,

    /// Parent RoleSet
    pub parent_role_set_id: Option<Uuid>,

    /// Open and closed application ids
    pub applications: Option<Vec<Uuid>>,

    /// Invitation ids
    pub invitations: Option<Vec<Uuid>>,

    /// Platform invitation ids
    pub platform_invitations: Option<Vec<Uuid>>,

    /// Feature entitlements
    pub license: License,

    /// Authorization policy
    pub authorization: AuthorizationPolicy,

    /// When the RoleSet was created
    pub created_at: DateTime<Utc>,

    /// When the RoleSet was last updated
    pub updated_at: DateTime<Utc>,
}

impl RoleSet {
    /// Build and validate a new RoleSet.
    ///
    /// # Errors
    ///
    /// [`MembershipError::Validation`] if role names repeat or the entry role
    /// is not defined.
    pub fn create(input: CreateRoleSetInput) -> MembershipResult<Self> {
        let now = Utc::now();
        let authorization = input
            .authorization
            .unwrap_or_else(|| derived_policy(&input.roles, input.entry_role_name));
        let role_set = Self {
            id: Uuid::now_v7(),
            kind: input.kind,
            entry_role_name: input.entry_role_name,
            roles: Some(input.roles),
            parent_role_set_id: input.parent_role_set_id,
            applications: Some(Vec::new()),
            invitations: Some(Vec::new()),
            platform_invitations: Some(Vec::new()),
            license: License::for_role_set(),
            authorization,
            created_at: now,
            updated_at: now,
        };
        role_set.validate()?;
        Ok(role_set)
    }

    /// Check role-name uniqueness and that the entry role exists.
    pub fn validate(&self) -> MembershipResult<()> {
        let roles = self.roles()?;
        let mut seen = HashSet::new();
        for role in roles {
            if !seen.insert(role.name) {
                return Err(MembershipError::Validation(format!(
                    "Duplicate role '{}' in RoleSet {}",
                    role.name, self.id
                )));
            }
        }
        if !seen.contains(&self.entry_role_name) {
            return Err(MembershipError::Validation(format!(
                "Entry role '{}' is not defined in RoleSet {}",
                self.entry_role_name, self.id
            )));
        }
        Ok(())
    }

    fn not_loaded(&self, relation: &'static str) -> MembershipError {
        MembershipError::RelationshipNotLoaded {
            entity: "RoleSet",
            relation,
            id: self.id,
        }
    }

    /// Role definitions.
    pub fn roles(&self) -> MembershipResult<&[Role]> {
        self.roles.as_deref().ok_or_else(|| self.not_loaded("roles"))
    }

    /// Mutable role definitions.
    pub fn roles_mut(&mut self) -> MembershipResult<&mut Vec<Role>> {
        let id = self.id;
        self.roles
            .as_mut()
            .ok_or(MembershipError::RelationshipNotLoaded {
                entity: "RoleSet",
                relation: "roles",
                id,
            })
    }

    /// Look up a role definition by name.
    pub fn role(&self, name: RoleName) -> MembershipResult<&Role> {
        self.roles()?
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| MembershipError::not_found("Role", format!("{} in RoleSet {}", name, self.id)))
    }

    /// Look up a role definition by name, mutably.
    pub fn role_mut(&mut self, name: RoleName) -> MembershipResult<&mut Role> {
        let id = self.id;
        self.roles_mut()?
            .iter_mut()
            .find(|r| r.name == name)
            .ok_or_else(|| MembershipError::not_found("Role", format!("{} in RoleSet {}", name, id)))
    }

    /// The entry role definition.
    pub fn entry_role(&self) -> MembershipResult<&Role> {
        self.role(self.entry_role_name)
    }

    /// Check if `name` is the entry role.
    pub fn is_entry_role(&self, name: RoleName) -> bool {
        self.entry_role_name == name
    }

    /// Check if a role with this name is defined.
    pub fn has_role(&self, name: RoleName) -> MembershipResult<bool> {
        Ok(self.roles()?.iter().any(|r| r.name == name))
    }

    /// Application ids.
    pub fn application_ids(&self) -> MembershipResult<&[Uuid]> {
        self.applications
            .as_deref()
            .ok_or_else(|| self.not_loaded("applications"))
    }

    /// Invitation ids.
    pub fn invitation_ids(&self) -> MembershipResult<&[Uuid]> {
        self.invitations
            .as_deref()
            .ok_or_else(|| self.not_loaded("invitations"))
    }

    /// Platform invitation ids.
    pub fn platform_invitation_ids(&self) -> MembershipResult<&[Uuid]> {
        self.platform_invitations
            .as_deref()
            .ok_or_else(|| self.not_loaded("platform_invitations"))
    }

    /// Credential predicate proving `name`.
    pub fn credential_for_role(&self, name: RoleName) -> MembershipResult<CredentialDefinition> {
        Ok(self.role(name)?.credential.clone())
    }

    /// Ancestor credentials of `name`, nearest first.
    pub fn parent_credentials_for_role(&self, name: RoleName) -> MembershipResult<Vec<CredentialDefinition>> {
        Ok(self.role(name)?.parent_credentials.clone())
    }

    /// Credential of `name` in the direct parent RoleSet, if any.
    pub fn direct_parent_credential_for_role(
        &self,
        name: RoleName,
    ) -> MembershipResult<Option<CredentialDefinition>> {
        Ok(self.role(name)?.parent_credentials.first().cloned())
    }

    /// Credential of `name` followed by its ancestor credentials.
    pub fn credentials_for_role_with_parents(
        &self,
        name: RoleName,
    ) -> MembershipResult<Vec<CredentialDefinition>> {
        Ok(self.role(name)?.credentials_with_parents())
    }

    /// Rewrite the resource id of every role credential and of the scoped
    /// criteria of the derived policy rules.
    pub fn update_role_resource_id(&mut self, resource_id: &str) -> MembershipResult<()> {
        for role in self.roles_mut()? {
            role.credential.resource_id = resource_id.to_string();
        }
        for rule in &mut self.authorization.credential_rules {
            if !rule.name.starts_with(DERIVED_RULE_PREFIX) {
                continue;
            }
            for criterion in rule.criteria.iter_mut().filter(|c| !c.is_wildcard()) {
                criterion.resource_id = resource_id.to_string();
            }
        }
        self.touch();
        Ok(())
    }

    /// Bump `updated_at`.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn space_roles(space: &str) -> Vec<Role> {
        vec![
            Role::new(RoleName::Member, CredentialDefinition::new("space-member", space)),
            Role::new(RoleName::Lead, CredentialDefinition::new("space-lead", space)),
            Role::new(RoleName::Admin, CredentialDefinition::new("space-admin", space)),
        ]
    }

    #[test]
    fn test_create_role_set() {
        let rs = RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Member,
            space_roles("space-1"),
        ))
        .unwrap();

        assert_eq!(rs.roles().unwrap().len(), 3);
        assert!(rs.is_entry_role(RoleName::Member));
        assert!(!rs.is_entry_role(RoleName::Admin));
        assert!(!rs.license.is_entitlement_enabled(EntitlementType::VirtualContributorAccess));
        assert_eq!(rs.license.entitlements.len(), 1);
        assert_eq!(rs.authorization.policy_type, PolicyType::RoleSet);
    }

    #[test]
    fn test_derived_policy() {
        let rs = RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Member,
            space_roles("space-1"),
        ))
        .unwrap();

        let admin = [roleset_authz::Credential::new("space-admin", "space-1")];
        let member = [roleset_authz::Credential::new("space-member", "space-1")];
        assert!(rs.authorization.grants(&admin, Privilege::Grant));
        assert!(rs.authorization.grants(&member, Privilege::Read));
        assert!(!rs.authorization.grants(&member, Privilege::Update));
    }

    #[test]
    fn test_update_role_resource_id_rewrites_derived_rules() {
        let mut rs = RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Member,
            space_roles("space-1"),
        ))
        .unwrap();
        rs.update_role_resource_id("space-2").unwrap();

        let admin = [roleset_authz::Credential::new("space-admin", "space-2")];
        assert!(rs.authorization.grants(&admin, Privilege::Grant));
    }

    #[test]
    fn test_duplicate_role_names_rejected() {
        let mut roles = space_roles("space-1");
        roles.push(Role::new(RoleName::Member, CredentialDefinition::new("other", "x")));
        let err = RoleSet::create(CreateRoleSetInput::new(RoleSetType::Space, RoleName::Member, roles))
            .unwrap_err();
        assert!(matches!(err, MembershipError::Validation(_)));
    }

    #[test]
    fn test_missing_entry_role_rejected() {
        let err = RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Owner,
            space_roles("space-1"),
        ))
        .unwrap_err();
        assert!(matches!(err, MembershipError::Validation(_)));
    }

    #[test]
    fn test_unhydrated_relations_fail() {
        let mut rs = RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Member,
            space_roles("space-1"),
        ))
        .unwrap();
        rs.roles = None;
        rs.invitations = None;

        assert!(matches!(
            rs.role(RoleName::Member),
            Err(MembershipError::RelationshipNotLoaded { relation: "roles", .. })
        ));
        assert!(matches!(
            rs.invitation_ids(),
            Err(MembershipError::RelationshipNotLoaded { relation: "invitations", .. })
        ));
        assert!(rs.application_ids().is_ok());
    }

    #[test]
    fn test_missing_role_is_not_found() {
        let rs = RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Member,
            space_roles("space-1"),
        ))
        .unwrap();
        assert!(matches!(
            rs.role(RoleName::Owner),
            Err(MembershipError::NotFound { entity: "Role", .. })
        ));
    }

    #[test]
    fn test_update_role_resource_id() {
        let mut rs = RoleSet::create(CreateRoleSetInput::new(
            RoleSetType::Space,
            RoleName::Member,
            space_roles("space-1"),
        ))
        .unwrap();
        rs.update_role_resource_id("space-2").unwrap();
        assert!(rs
            .roles()
            .unwrap()
            .iter()
            .all(|r| r.credential.resource_id == "space-2"));
    }

    #[test]
    fn test_license_set_entitlement() {
        let mut license = License::for_role_set();
        license.set_entitlement(EntitlementType::VirtualContributorAccess, true);
        assert!(license.is_entitlement_enabled(EntitlementType::VirtualContributorAccess));
        assert_eq!(license.entitlements.len(), 1);
    }

    #[test]
    fn test_event_source() {
        assert_eq!(RoleSetType::Organization.event_source(), EventSource::Organization);
    }
}
