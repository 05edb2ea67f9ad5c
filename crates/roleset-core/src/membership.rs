//! Membership outcomes exposed to callers

use serde::{Deserialize, Serialize};

/// Resolved relationship between an actor and a RoleSet.
///
/// # Examples
///
/// ```
/// use roleset_core::MembershipStatus;
///
/// assert_eq!(MembershipStatus::ApplicationPending.as_str(), "APPLICATION_PENDING");
/// assert!(MembershipStatus::Member.is_member());
/// ```
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MembershipStatus {
    /// Holds the entry role
    Member,

    /// Has an open application
    ApplicationPending,

    /// Has an open, acceptable invitation
    InvitationPending,

    /// None of the above
    NotMember,
}

impl MembershipStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipStatus::Member => "MEMBER",
            MembershipStatus::ApplicationPending => "APPLICATION_PENDING",
            MembershipStatus::InvitationPending => "INVITATION_PENDING",
            MembershipStatus::NotMember => "NOT_MEMBER",
        }
    }

    /// Check if the status is [`MembershipStatus::Member`].
    pub fn is_member(&self) -> bool {
        matches!(self, MembershipStatus::Member)
    }

    /// Check if a workflow is open for the actor.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            MembershipStatus::ApplicationPending | MembershipStatus::InvitationPending
        )
    }
}

impl std::fmt::Display for MembershipStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Roles derived from explicit roles rather than assigned directly.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImplicitRole {
    /// Admin of at least one child space
    SubspaceAdmin,

    /// Admin or owner of an organization
    AccountAdmin,
}

impl ImplicitRole {
    /// Get string representation of the implicit role.
    pub fn as_str(&self) -> &'static str {
        match self {
            ImplicitRole::SubspaceAdmin => "SUBSPACE_ADMIN",
            ImplicitRole::AccountAdmin => "ACCOUNT_ADMIN",
        }
    }
}
