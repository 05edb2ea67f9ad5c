//! Application workflow machine.
//!
//! ```text
//! new --APPROVE--> approving --APPROVED--> approved (final)
//!  |
//!  +--REJECT--> rejected --REOPEN--> new
//!                   |
//!                   +--ARCHIVE--> archived (final)
//! ```

use roleset_authz::Privilege;
use serde::{Deserialize, Serialize};

use super::{Guard, LifecycleMachine, Transition};

/// States of an application.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationState {
    /// Submitted, awaiting a decision
    New,
    /// Approved, membership being granted
    Approving,
    /// Membership granted
    Approved,
    /// Declined
    Rejected,
    /// Closed for good
    Archived,
}

impl ApplicationState {
    /// Get string representation of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Approving => "approving",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Archived => "archived",
        }
    }
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events accepted by the application machine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApplicationEvent {
    /// Accept the application
    Approve,
    /// System event completing an approval
    Approved,
    /// Decline the application
    Reject,
    /// Reopen a declined application
    Reopen,
    /// Close a declined application
    Archive,
}

impl ApplicationEvent {
    /// Get string representation of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "APPROVE",
            Self::Approved => "APPROVED",
            Self::Reject => "REJECT",
            Self::Reopen => "REOPEN",
            Self::Archive => "ARCHIVE",
        }
    }
}

impl std::fmt::Display for ApplicationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Side effects run on entering an application state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationAction {
    /// Grant the applicant the entry role
    AssignEntryRole,
    /// Tell interested parties the application was declined
    NotifyDeclined,
}

/// The application workflow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplicationMachine;

impl LifecycleMachine for ApplicationMachine {
    type State = ApplicationState;
    type Event = ApplicationEvent;
    type Action = ApplicationAction;

    const ID: &'static str = "application";

    fn initial_state() -> ApplicationState {
        ApplicationState::New
    }

    fn transition(state: ApplicationState, event: ApplicationEvent) -> Option<Transition<ApplicationState>> {
        use ApplicationEvent as E;
        use ApplicationState as S;

        let (guard, target) = match (state, event) {
            (S::New, E::Approve) => (Guard::Privilege(Privilege::Grant), S::Approving),
            (S::New, E::Reject) => (Guard::Privilege(Privilege::Update), S::Rejected),
            (S::Approving, E::Approved) => (Guard::Privilege(Privilege::Grant), S::Approved),
            (S::Rejected, E::Reopen) => (Guard::Privilege(Privilege::Update), S::New),
            (S::Rejected, E::Archive) => (Guard::Privilege(Privilege::Update), S::Archived),
            _ => return None,
        };
        Some(Transition { guard, target })
    }

    fn is_final(state: ApplicationState) -> bool {
        matches!(state, ApplicationState::Approved | ApplicationState::Archived)
    }

    fn entry_actions(state: ApplicationState) -> &'static [ApplicationAction] {
        match state {
            ApplicationState::Approving => &[ApplicationAction::AssignEntryRole],
            ApplicationState::Rejected => &[ApplicationAction::NotifyDeclined],
            _ => &[],
        }
    }

    fn events() -> &'static [ApplicationEvent] {
        &[
            ApplicationEvent::Approve,
            ApplicationEvent::Approved,
            ApplicationEvent::Reject,
            ApplicationEvent::Reopen,
            ApplicationEvent::Archive,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_table() {
        let t = ApplicationMachine::transition(ApplicationState::New, ApplicationEvent::Approve).unwrap();
        assert_eq!(t.target, ApplicationState::Approving);
        assert_eq!(t.guard, Guard::Privilege(Privilege::Grant));

        let t = ApplicationMachine::transition(ApplicationState::Rejected, ApplicationEvent::Reopen).unwrap();
        assert_eq!(t.target, ApplicationState::New);

        assert!(ApplicationMachine::transition(ApplicationState::Approved, ApplicationEvent::Reject).is_none());
        assert!(ApplicationMachine::transition(ApplicationState::New, ApplicationEvent::Approved).is_none());
    }

    #[test]
    fn test_final_states() {
        assert!(ApplicationMachine::is_final(ApplicationState::Approved));
        assert!(ApplicationMachine::is_final(ApplicationState::Archived));
        assert!(!ApplicationMachine::is_final(ApplicationState::Approving));
        assert!(!ApplicationMachine::is_final(ApplicationState::Rejected));
    }

    #[test]
    fn test_final_states_have_no_transitions() {
        for state in [ApplicationState::Approved, ApplicationState::Archived] {
            for event in ApplicationMachine::events() {
                assert!(ApplicationMachine::transition(state, *event).is_none());
            }
        }
    }

    #[test]
    fn test_state_serde() {
        assert_eq!(serde_json::to_string(&ApplicationState::Approving).unwrap(), "\"approving\"");
    }
}
