//! # Lifecycle Engine
//!
//! Guarded state machines for the join workflows.
//!
//! A machine is a compile-time transition table `(state, event) -> (guard,
//! target)` plus per-state entry actions and final flags. A [`Lifecycle`] is
//! one running instance of a machine: its current state and the provenance
//! of every transition taken.
//!
//! Dispatch is two-phase. [`Lifecycle::prepare`] checks the transition exists
//! and that the guard admits the actor, without mutating anything.
//! [`Lifecycle::commit`] applies a staged transition. Callers with entry
//! actions run them between the two, so a failed action leaves the instance
//! in its prior state ([`Lifecycle::dispatch_with`]).
//!
//! ```text
//! prepare(event) --(no transition)--> InvalidTransition
//!                --(guard denied)---> Unauthorized
//!                --> StagedTransition --run entry actions--> commit --> target
//! ```

pub mod application;
pub mod invitation;

use chrono::{DateTime, Utc};
use roleset_authz::{ActorContext, AuthorizationEvaluator, AuthorizationPolicy, Privilege};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::future::Future;
use std::marker::PhantomData;
use uuid::Uuid;

use crate::error::{MembershipError, MembershipResult};

pub use application::{ApplicationAction, ApplicationEvent, ApplicationMachine, ApplicationState};
pub use invitation::{InvitationAction, InvitationEvent, InvitationMachine, InvitationState};

/// Guard on a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Always admitted
    Always,
    /// Admitted iff the actor is granted the privilege by the workflow policy
    Privilege(Privilege),
}

impl Guard {
    /// Evaluate the guard against explicit inputs.
    pub fn allows(
        &self,
        evaluator: &dyn AuthorizationEvaluator,
        actor: &ActorContext,
        policy: &AuthorizationPolicy,
    ) -> bool {
        match self {
            Guard::Always => true,
            Guard::Privilege(privilege) => evaluator.is_access_granted(actor, policy, *privilege),
        }
    }
}

/// One row of a transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition<S> {
    /// Guard the actor must pass
    pub guard: Guard,
    /// State entered when the transition commits
    pub target: S,
}

/// A workflow state machine definition.
pub trait LifecycleMachine: Debug + Clone + PartialEq + Eq + Send + Sync + 'static {
    /// State type
    type State: Copy + Eq + Debug + Display + Serialize + DeserializeOwned + Send + Sync;
    /// Event type
    type Event: Copy + Eq + Debug + Display + Send + Sync;
    /// Entry action type
    type Action: Copy + Eq + Debug + Send + Sync;

    /// Machine identifier.
    const ID: &'static str;

    /// State a new instance starts in.
    fn initial_state() -> Self::State;

    /// Transition for `event` from `state`, if defined.
    fn transition(state: Self::State, event: Self::Event) -> Option<Transition<Self::State>>;

    /// Whether `state` is final.
    fn is_final(state: Self::State) -> bool;

    /// Actions run on entering `state`.
    fn entry_actions(state: Self::State) -> &'static [Self::Action];

    /// Every event, in transition-table order.
    fn events() -> &'static [Self::Event];
}

/// A transition that passed validation but has not been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedTransition<M: LifecycleMachine> {
    /// State the transition was validated from
    pub from: M::State,
    /// Event being applied
    pub event: M::Event,
    /// State entered on commit
    pub target: M::State,
    /// Entry actions of the target state
    pub actions: &'static [M::Action],
    /// Actor that passed the guard
    pub actor_id: Option<Uuid>,
}

/// Provenance record of one committed transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    /// State left
    pub from: String,
    /// Event applied
    pub event: String,
    /// State entered
    pub to: String,
    /// Actor that drove the transition
    pub actor_id: Option<Uuid>,
    /// When the transition committed
    pub at: DateTime<Utc>,
}

/// Read-only view of a lifecycle exposed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleProjection {
    /// Current state
    pub state: String,
    /// Events defined from the current state, guards ignored
    pub next_events: Vec<String>,
    /// Whether the current state is final
    pub is_finalized: bool,
}

/// A running instance of a [`LifecycleMachine`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
pub struct Lifecycle<M: LifecycleMachine> {
    /// Unique lifecycle ID
    pub id: Uuid,
    state: M::State,
    #[serde(default)]
    history: Vec<TransitionRecord>,
    #[serde(skip)]
    machine: PhantomData<M>,
}

impl<M: LifecycleMachine> Default for Lifecycle<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M: LifecycleMachine> Lifecycle<M> {
    /// A new instance at the machine's initial state.
    pub fn new() -> Self {
        Self {
            id: Uuid::now_v7(),
            state: M::initial_state(),
            history: Vec::new(),
            machine: PhantomData,
        }
    }

    /// Current state.
    pub fn state(&self) -> M::State {
        self.state
    }

    /// Committed transitions, oldest first.
    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    /// Whether the current state is final.
    pub fn is_final(&self) -> bool {
        M::is_final(self.state)
    }

    /// Whether `event` is defined from the current state, guards ignored.
    pub fn can(&self, event: M::Event) -> bool {
        M::transition(self.state, event).is_some()
    }

    /// Events defined from the current state, in table order.
    ///
    /// Informational only; callers must still dispatch to learn whether the
    /// guard admits them.
    pub fn next_events(&self) -> Vec<M::Event> {
        if self.is_final() {
            return Vec::new();
        }
        M::events()
            .iter()
            .copied()
            .filter(|event| self.can(*event))
            .collect()
    }

    /// `{state, nextEvents, isFinalized}` view.
    pub fn projection(&self) -> LifecycleProjection {
        LifecycleProjection {
            state: self.state.to_string(),
            next_events: self.next_events().iter().map(|e| e.to_string()).collect(),
            is_finalized: self.is_final(),
        }
    }

    /// Validate `event` for `actor` without mutating the instance.
    ///
    /// # Errors
    ///
    /// - [`MembershipError::InvalidTransition`] if no transition is defined
    /// - [`MembershipError::Unauthorized`] if the guard denies the actor
    pub fn prepare(
        &self,
        event: M::Event,
        evaluator: &dyn AuthorizationEvaluator,
        actor: &ActorContext,
        policy: &AuthorizationPolicy,
    ) -> MembershipResult<StagedTransition<M>> {
        let transition = M::transition(self.state, event).ok_or_else(|| {
            MembershipError::InvalidTransition {
                state: self.state.to_string(),
                event: event.to_string(),
            }
        })?;

        if !transition.guard.allows(evaluator, actor, policy) {
            return Err(MembershipError::Unauthorized(format!(
                "actor {} may not apply '{}' to {} lifecycle {} in state '{}'",
                actor.display_id(),
                event,
                M::ID,
                self.id,
                self.state
            )));
        }

        Ok(StagedTransition {
            from: self.state,
            event,
            target: transition.target,
            actions: M::entry_actions(transition.target),
            actor_id: actor.actor_id,
        })
    }

    /// Apply a staged transition.
    ///
    /// # Errors
    ///
    /// [`MembershipError::InvalidTransition`] if the instance moved since the
    /// transition was staged.
    pub fn commit(&mut self, staged: StagedTransition<M>) -> MembershipResult<M::State> {
        if staged.from != self.state {
            return Err(MembershipError::InvalidTransition {
                state: self.state.to_string(),
                event: staged.event.to_string(),
            });
        }

        self.history.push(TransitionRecord {
            from: staged.from.to_string(),
            event: staged.event.to_string(),
            to: staged.target.to_string(),
            actor_id: staged.actor_id,
            at: Utc::now(),
        });
        self.state = staged.target;
        Ok(self.state)
    }

    /// Validate and apply `event` without running entry actions.
    pub fn dispatch(
        &mut self,
        event: M::Event,
        evaluator: &dyn AuthorizationEvaluator,
        actor: &ActorContext,
        policy: &AuthorizationPolicy,
    ) -> MembershipResult<M::State> {
        let staged = self.prepare(event, evaluator, actor, policy)?;
        self.commit(staged)
    }

    /// Validate `event`, run `action` against the staged transition and
    /// commit only if it succeeds.
    ///
    /// A failing action leaves the instance untouched and its error is
    /// returned.
    pub async fn dispatch_with<F, Fut>(
        &mut self,
        event: M::Event,
        evaluator: &dyn AuthorizationEvaluator,
        actor: &ActorContext,
        policy: &AuthorizationPolicy,
        action: F,
    ) -> MembershipResult<M::State>
    where
        F: FnOnce(StagedTransition<M>) -> Fut,
        Fut: Future<Output = MembershipResult<()>>,
    {
        let staged = self.prepare(event, evaluator, actor, policy)?;
        action(staged.clone()).await?;
        self.commit(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleset_authz::{Credential, CredentialDefinition, CredentialRule, PolicyEvaluator, PolicyType};

    fn policy() -> AuthorizationPolicy {
        AuthorizationPolicy::new(PolicyType::Application)
            .with_rule(CredentialRule::new(
                "admins",
                vec![CredentialDefinition::new("space-admin", "space-1")],
                vec![Privilege::Grant, Privilege::Update],
            ))
            .with_rule(CredentialRule::new(
                "readers",
                vec![CredentialDefinition::new("space-member", "space-1")],
                vec![Privilege::Read],
            ))
    }

    fn admin() -> ActorContext {
        ActorContext::for_actor(Uuid::now_v7(), vec![Credential::new("space-admin", "space-1")])
    }

    fn reader() -> ActorContext {
        ActorContext::for_actor(Uuid::now_v7(), vec![Credential::new("space-member", "space-1")])
    }

    #[test]
    fn test_reject_with_update_privilege() {
        let mut lifecycle: Lifecycle<ApplicationMachine> = Lifecycle::new();
        let state = lifecycle
            .dispatch(ApplicationEvent::Reject, &PolicyEvaluator, &admin(), &policy())
            .unwrap();

        assert_eq!(state, ApplicationState::Rejected);
        assert_eq!(lifecycle.history().len(), 1);
        assert_eq!(lifecycle.history()[0].event, "REJECT");
    }

    #[test]
    fn test_reject_without_privilege_leaves_state() {
        let mut lifecycle: Lifecycle<ApplicationMachine> = Lifecycle::new();
        let err = lifecycle
            .dispatch(ApplicationEvent::Reject, &PolicyEvaluator, &reader(), &policy())
            .unwrap_err();

        assert!(matches!(err, MembershipError::Unauthorized(_)));
        assert_eq!(lifecycle.state(), ApplicationState::New);
        assert!(lifecycle.history().is_empty());
    }

    #[test]
    fn test_undefined_event_is_invalid_transition() {
        let mut lifecycle: Lifecycle<ApplicationMachine> = Lifecycle::new();
        let err = lifecycle
            .dispatch(ApplicationEvent::Archive, &PolicyEvaluator, &admin(), &policy())
            .unwrap_err();
        assert_eq!(
            err,
            MembershipError::InvalidTransition {
                state: "new".to_string(),
                event: "ARCHIVE".to_string()
            }
        );
    }

    #[test]
    fn test_approved_is_final_with_no_next_events() {
        let mut lifecycle: Lifecycle<ApplicationMachine> = Lifecycle::new();
        lifecycle
            .dispatch(ApplicationEvent::Approve, &PolicyEvaluator, &admin(), &policy())
            .unwrap();
        assert_eq!(lifecycle.state(), ApplicationState::Approving);
        assert!(!lifecycle.is_final());

        lifecycle
            .dispatch(ApplicationEvent::Approved, &PolicyEvaluator, &admin(), &policy())
            .unwrap();
        assert!(lifecycle.is_final());
        assert!(lifecycle.next_events().is_empty());

        let projection = lifecycle.projection();
        assert_eq!(projection.state, "approved");
        assert!(projection.is_finalized);
        assert!(projection.next_events.is_empty());
    }

    #[test]
    fn test_next_events_ignore_guards() {
        let lifecycle: Lifecycle<ApplicationMachine> = Lifecycle::new();
        assert_eq!(
            lifecycle.next_events(),
            vec![ApplicationEvent::Approve, ApplicationEvent::Reject]
        );
    }

    #[test]
    fn test_stale_staged_transition_rejected() {
        let mut lifecycle: Lifecycle<ApplicationMachine> = Lifecycle::new();
        let staged = lifecycle
            .prepare(ApplicationEvent::Approve, &PolicyEvaluator, &admin(), &policy())
            .unwrap();
        lifecycle
            .dispatch(ApplicationEvent::Reject, &PolicyEvaluator, &admin(), &policy())
            .unwrap();

        assert!(matches!(
            lifecycle.commit(staged),
            Err(MembershipError::InvalidTransition { .. })
        ));
        assert_eq!(lifecycle.state(), ApplicationState::Rejected);
    }

    #[tokio::test]
    async fn test_failed_entry_action_does_not_commit() {
        let mut lifecycle: Lifecycle<ApplicationMachine> = Lifecycle::new();
        let err = lifecycle
            .dispatch_with(ApplicationEvent::Approve, &PolicyEvaluator, &admin(), &policy(), |staged| async move {
                assert_eq!(staged.actions, &[ApplicationAction::AssignEntryRole]);
                Err(MembershipError::PolicyLimit("full".to_string()))
            })
            .await
            .unwrap_err();

        assert!(matches!(err, MembershipError::PolicyLimit(_)));
        assert_eq!(lifecycle.state(), ApplicationState::New);
    }

    #[tokio::test]
    async fn test_successful_entry_action_commits() {
        let mut lifecycle: Lifecycle<InvitationMachine> = Lifecycle::new();
        let invitee = ActorContext::for_actor(Uuid::now_v7(), vec![Credential::new("user-self", "u1")]);
        let policy = AuthorizationPolicy::new(PolicyType::Invitation).with_rule(CredentialRule::new(
            "invitee",
            vec![CredentialDefinition::new("user-self", "u1")],
            vec![Privilege::InvitationAccept],
        ));

        let state = lifecycle
            .dispatch_with(InvitationEvent::Accept, &PolicyEvaluator, &invitee, &policy, |_| async {
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(state, InvitationState::Accepting);
    }

    #[test]
    fn test_lifecycle_serde_round_trip() {
        let mut lifecycle: Lifecycle<InvitationMachine> = Lifecycle::new();
        lifecycle
            .dispatch(InvitationEvent::Reject, &PolicyEvaluator, &admin(), &policy())
            .unwrap();

        let json = serde_json::to_string(&lifecycle).unwrap();
        let restored: Lifecycle<InvitationMachine> = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.state(), InvitationState::Rejected);
        assert_eq!(restored.history().len(), 1);
    }
}
