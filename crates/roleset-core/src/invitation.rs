//! Invitation aggregates
//!
//! [`Invitation`] targets a registered actor and runs through
//! [`InvitationMachine`](crate::lifecycle::InvitationMachine).
//! [`PlatformInvitation`] targets an email address that has no actor yet and
//! carries no lifecycle.

use chrono::{DateTime, Utc};
use roleset_authz::{
    credential_types, AuthorizationPolicy, CredentialDefinition, CredentialRule, PolicyType,
    Privilege,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{InvitationEvent, InvitationMachine, InvitationState, Lifecycle, LifecycleProjection};
use crate::role::{ContributorKind, RoleName};

/// Privileges the invited actor holds on their own invitation.
pub const INVITEE_PRIVILEGES: [Privilege; 3] =
    [Privilege::Read, Privilege::Update, Privilege::InvitationAccept];

/// Privileges the inviter holds on the invitation they issued.
pub const INVITER_PRIVILEGES: [Privilege; 2] = [Privilege::Read, Privilege::Update];

/// An offer to join a RoleSet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invitation {
    /// Unique invitation ID
    pub id: Uuid,

    /// Actor invited
    pub invited_actor_id: Uuid,

    /// Actor that issued the invitation
    pub inviter_id: Uuid,

    /// RoleSet invited to
    pub role_set_id: Uuid,

    /// Workflow state
    pub lifecycle: Lifecycle<InvitationMachine>,

    /// Roles granted in addition to the entry role on acceptance
    #[serde(default)]
    pub extra_roles: Vec<RoleName>,

    /// Also join the parent RoleSet on acceptance
    #[serde(default)]
    pub invited_to_parent: bool,

    /// Kind of the invited actor
    pub contributor_kind: ContributorKind,

    /// Message shown to the invitee
    pub welcome_message: Option<String>,

    /// Policy guarding lifecycle events
    pub authorization: AuthorizationPolicy,

    /// When the invitation was created
    pub created_at: DateTime<Utc>,

    /// When the invitation was last updated
    pub updated_at: DateTime<Utc>,
}

impl Invitation {
    /// Create an invitation at the initial lifecycle state.
    pub fn new(
        invited_actor_id: Uuid,
        inviter_id: Uuid,
        role_set_id: Uuid,
        contributor_kind: ContributorKind,
        authorization: AuthorizationPolicy,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            invited_actor_id,
            inviter_id,
            role_set_id,
            lifecycle: Lifecycle::new(),
            extra_roles: Vec::new(),
            invited_to_parent: false,
            contributor_kind,
            welcome_message: None,
            authorization,
            created_at: now,
            updated_at: now,
        }
    }

    /// Policy of a new invitation: the RoleSet's cascading rules plus the
    /// invitee and inviter self-management rules.
    pub fn policy_for(
        invited_actor_id: Uuid,
        inviter_id: Uuid,
        role_set_policy: &AuthorizationPolicy,
    ) -> AuthorizationPolicy {
        AuthorizationPolicy::new(PolicyType::Invitation)
            .with_rule(CredentialRule::new(
                "invitation-invitee",
                vec![CredentialDefinition::new(
                    credential_types::USER_SELF,
                    invited_actor_id.to_string(),
                )],
                INVITEE_PRIVILEGES.to_vec(),
            ))
            .with_rule(CredentialRule::new(
                "invitation-inviter",
                vec![CredentialDefinition::new(
                    credential_types::USER_SELF,
                    inviter_id.to_string(),
                )],
                INVITER_PRIVILEGES.to_vec(),
            ))
            .inherit_from(role_set_policy)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> InvitationState {
        self.lifecycle.state()
    }

    /// Whether the lifecycle reached a final state.
    pub fn is_finalized(&self) -> bool {
        self.lifecycle.is_final()
    }

    /// Whether `ACCEPT` is defined from the current state.
    pub fn can_be_accepted(&self) -> bool {
        self.lifecycle.can(InvitationEvent::Accept)
    }

    /// `{state, nextEvents, isFinalized}` view of the lifecycle.
    pub fn projection(&self) -> LifecycleProjection {
        self.lifecycle.projection()
    }
}

/// Invitation of a not-yet-registered actor, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInvitation {
    /// Unique platform invitation ID
    pub id: Uuid,

    /// Invitee email, lowercased
    pub email: String,

    /// RoleSet invited to
    pub role_set_id: Uuid,

    /// Actor that issued the invitation
    pub created_by: Uuid,

    /// Roles granted in addition to the entry role once registered
    #[serde(default)]
    pub extra_roles: Vec<RoleName>,

    /// Also join the parent RoleSet once registered
    #[serde(default)]
    pub invited_to_parent: bool,

    /// Message shown to the invitee
    pub welcome_message: Option<String>,

    /// When the invitation was created
    pub created_at: DateTime<Utc>,
}

impl PlatformInvitation {
    /// Create a platform invitation. The email is trimmed and lowercased.
    pub fn new(email: &str, role_set_id: Uuid, created_by: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            email: email.trim().to_lowercase(),
            role_set_id,
            created_by,
            extra_roles: Vec::new(),
            invited_to_parent: false,
            welcome_message: None,
            created_at: Utc::now(),
        }
    }
}

/// Input for inviting registered actors.
#[derive(Debug, Clone, Default)]
pub struct InviteInput {
    /// Roles granted in addition to the entry role
    pub extra_roles: Vec<RoleName>,
    /// Also join the parent RoleSet on acceptance
    pub invited_to_parent: bool,
    /// Message shown to the invitee
    pub welcome_message: Option<String>,
}

impl InviteInput {
    /// Add extra roles (builder style).
    pub fn with_extra_roles(mut self, roles: Vec<RoleName>) -> Self {
        self.extra_roles = roles;
        self
    }

    /// Also join the parent RoleSet (builder style).
    pub fn to_parent(mut self) -> Self {
        self.invited_to_parent = true;
        self
    }

    /// Set the welcome message (builder style).
    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = Some(message.into());
        self
    }
}
