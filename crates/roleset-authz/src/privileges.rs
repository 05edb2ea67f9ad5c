//! # Privileges
//!
//! Privileges are what an authorization policy grants to an actor on a
//! RoleSet, Application or Invitation. Lifecycle guards ask for exactly one
//! privilege per transition.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AuthorizationError;

/// Privileges that can be granted by an authorization policy.
///
/// - **Read**: View the aggregate
/// - **Create**: Create child aggregates
/// - **Update**: Modify the aggregate, drive most lifecycle events
/// - **Delete**: Remove the aggregate
/// - **Grant**: Assign roles; approve applications
/// - **RoleSetEntryRoleApply**: Apply to join the entry role
/// - **RoleSetEntryRoleJoin**: Join the entry role directly
/// - **RoleSetEntryRoleInvite**: Invite others to the entry role
/// - **InvitationAccept**: Accept an invitation addressed to oneself
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    /// View the aggregate.
    Read,

    /// Create child aggregates.
    Create,

    /// Modify the aggregate.
    Update,

    /// Remove the aggregate.
    Delete,

    /// Assign roles and approve applications.
    Grant,

    /// Apply to the entry role of a RoleSet.
    RoleSetEntryRoleApply,

    /// Join the entry role of a RoleSet without approval.
    RoleSetEntryRoleJoin,

    /// Invite actors to the entry role of a RoleSet.
    RoleSetEntryRoleInvite,

    /// Accept an invitation.
    InvitationAccept,
}

impl Privilege {
    /// Get the string representation of the privilege.
    pub fn as_str(&self) -> &'static str {
        match self {
            Privilege::Read => "read",
            Privilege::Create => "create",
            Privilege::Update => "update",
            Privilege::Delete => "delete",
            Privilege::Grant => "grant",
            Privilege::RoleSetEntryRoleApply => "roleset_entry_role_apply",
            Privilege::RoleSetEntryRoleJoin => "roleset_entry_role_join",
            Privilege::RoleSetEntryRoleInvite => "roleset_entry_role_invite",
            Privilege::InvitationAccept => "invitation_accept",
        }
    }

    /// Parse privilege from string representation.
    ///
    /// # Example
    ///
    /// ```
    /// use roleset_authz::privileges::Privilege;
    ///
    /// assert_eq!(Privilege::parse("update"), Some(Privilege::Update));
    /// assert_eq!(Privilege::parse("ACCEPT"), Some(Privilege::InvitationAccept));
    /// assert_eq!(Privilege::parse("invalid"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "read" | "view" => Some(Privilege::Read),
            "create" => Some(Privilege::Create),
            "update" | "edit" | "write" => Some(Privilege::Update),
            "delete" | "remove" => Some(Privilege::Delete),
            "grant" => Some(Privilege::Grant),
            "roleset_entry_role_apply" | "apply" => Some(Privilege::RoleSetEntryRoleApply),
            "roleset_entry_role_join" | "join" => Some(Privilege::RoleSetEntryRoleJoin),
            "roleset_entry_role_invite" | "invite" => Some(Privilege::RoleSetEntryRoleInvite),
            "invitation_accept" | "accept" => Some(Privilege::InvitationAccept),
            _ => None,
        }
    }

    /// Get all privileges.
    pub fn all() -> Vec<Self> {
        vec![
            Privilege::Read,
            Privilege::Create,
            Privilege::Update,
            Privilege::Delete,
            Privilege::Grant,
            Privilege::RoleSetEntryRoleApply,
            Privilege::RoleSetEntryRoleJoin,
            Privilege::RoleSetEntryRoleInvite,
            Privilege::InvitationAccept,
        ]
    }

    /// Check if this privilege implies another privilege.
    ///
    /// `Grant`, `Update`, `Delete` and `Create` imply `Read`. Nothing else is
    /// implied; in particular `Update` does not imply `Grant`.
    ///
    /// # Example
    ///
    /// ```
    /// use roleset_authz::privileges::Privilege;
    ///
    /// assert!(Privilege::Grant.implies(Privilege::Read));
    /// assert!(!Privilege::Update.implies(Privilege::Grant));
    /// ```
    pub fn implies(&self, other: Privilege) -> bool {
        match self {
            Privilege::Grant | Privilege::Update | Privilege::Delete | Privilege::Create => {
                other == Privilege::Read
            }
            _ => false,
        }
    }

    /// Check if holding this privilege is enough for `required`.
    pub fn satisfies(&self, required: Privilege) -> bool {
        *self == required || self.implies(required)
    }

    /// Check if the privilege concerns entry-role membership.
    pub fn is_entry_role(&self) -> bool {
        matches!(
            self,
            Privilege::RoleSetEntryRoleApply
                | Privilege::RoleSetEntryRoleJoin
                | Privilege::RoleSetEntryRoleInvite
        )
    }
}

impl std::fmt::Display for Privilege {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Privilege {
    type Err = AuthorizationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Privilege::parse(s).ok_or_else(|| AuthorizationError::UnknownPrivilege(s.to_string()))
    }
}
