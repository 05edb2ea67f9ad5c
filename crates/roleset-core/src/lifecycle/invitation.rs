//! Invitation workflow machine.
//!
//! ```text
//! invited --ACCEPT--> accepting --ACCEPTED--> accepted (final)
//!    |
//!    +--REJECT--> rejected --REINVITE--> invited
//!                    |
//!                    +--ARCHIVE--> archived (final)
//! ```

use roleset_authz::Privilege;
use serde::{Deserialize, Serialize};

use super::{Guard, LifecycleMachine, Transition};

/// States of an invitation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum InvitationState {
    /// Issued, awaiting the invitee
    Invited,
    /// Accepted, membership being granted
    Accepting,
    /// Membership granted
    Accepted,
    /// Declined
    Rejected,
    /// Closed for good
    Archived,
}

impl InvitationState {
    /// Get string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Invited => "invited",
            Self::Accepting => "accepting",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for InvitationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events accepted by the invitation machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationEvent {
    /// Invitee accepts
    Accept,
    /// System event completing an acceptance
    Accepted,
    /// Decline the invitation
    Reject,
    /// Reissue a declined invitation
    Reinvite,
    /// Close a declined invitation
    Archive,
}

impl InvitationEvent {
    /// Get string representation of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "ACCEPT",
            Self::Accepted => "ACCEPTED",
            Self::Reject => "REJECT",
            Self::Reinvite => "REINVITE",
            Self::Archive => "ARCHIVE",
        }
    }
}

impl std::fmt::Display for InvitationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effects run on entering an invitation state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvitationAction {
    /// Join the invitee to the entry role (and parent, extra roles)
    JoinInvitee,
    /// Tell interested parties the invitation was declined
    NotifyDeclined,
}

/// The invitation workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InvitationMachine;

impl LifecycleMachine for InvitationMachine {
    type State = InvitationState;
    type Event = InvitationEvent;
    type Action = InvitationAction;

    const ID: &'static str = "invitation";

    fn initial_state() -> InvitationState {
        InvitationState::Invited
    }

    fn transition(state: InvitationState, event: InvitationEvent) -> Option<Transition<InvitationState>> {
        use InvitationEvent as E;
        use InvitationState as S;

        let (guard, target) = match (state, event) {
            (S::Invited, E::Accept) => (Guard::Privilege(Privilege::InvitationAccept), S::Accepting),
            (S::Invited, E::Reject) => (Guard::Privilege(Privilege::Update), S::Rejected),
            (S::Accepting, E::Accepted) => (Guard::Privilege(Privilege::InvitationAccept), S::Accepted),
            (S::Rejected, E::Reinvite) => (Guard::Privilege(Privilege::Update), S::Invited),
            (S::Rejected, E::Archive) => (Guard::Privilege(Privilege::Update), S::Archived),
            _ => return None,
        };
        Some(Transition { guard, target })
    }

    fn is_final(state: InvitationState) -> bool {
        matches!(state, InvitationState::Accepted | InvitationState::Archived)
    }

    fn entry_actions(state: InvitationState) -> &'static [InvitationAction] {
        match state {
            InvitationState::Accepting => &[InvitationAction::JoinInvitee],
            InvitationState::Rejected => &[InvitationAction::NotifyDeclined],
            _ => &[],
        }
    }

    fn events() -> &'static [InvitationEvent] {
        &[
            InvitationEvent::Accept,
            InvitationEvent::Accepted,
            InvitationEvent::Reject,
            InvitationEvent::Reinvite,
            InvitationEvent::Archive,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        let t = InvitationMachine::transition(InvitationState::Invited, InvitationEvent::Accept).unwrap();
        assert_eq!(t.target, InvitationState::Accepting);
        assert_eq!(t.guard, Guard::Privilege(Privilege::InvitationAccept));

        let t = InvitationMachine::transition(InvitationState::Rejected, InvitationEvent::Reinvite).unwrap();
        assert_eq!(t.target, InvitationState::Invited);

        assert!(InvitationMachine::transition(InvitationState::Accepting, InvitationEvent::Accept).is_none());
    }

    #[test]
    fn test_final_states() {
        assert!(InvitationMachine::is_final(InvitationState::Accepted));
        assert!(InvitationMachine::is_final(InvitationState::Archived));
        assert!(!InvitationMachine::is_final(InvitationState::Invited));
    }

    #[test]
    fn test_entry_actions() {
        assert_eq!(
            InvitationMachine::entry_actions(InvitationState::Accepting),
            &[InvitationAction::JoinInvitee]
        );
        assert!(InvitationMachine::entry_actions(InvitationState::Accepted).is_empty());
    }
}
