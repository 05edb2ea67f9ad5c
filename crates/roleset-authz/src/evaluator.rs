//! # Authorization Evaluator
//!
//! The boolean "is this privilege granted" contract consumed by lifecycle
//! guards and the orchestrator, plus a rule-based implementation over
//! [`AuthorizationPolicy`].

use tracing::debug;

use crate::actor::ActorContext;
use crate::error::{AuthorizationError, AuthorizationResult};
use crate::policy::AuthorizationPolicy;
use crate::privileges::Privilege;

/// Decides whether an actor is granted a privilege under a policy.
///
/// Implementations must be pure with respect to their inputs: every fact
/// the decision depends on is passed in explicitly.
pub trait AuthorizationEvaluator: Send + Sync {
    /// Check if `actor` is granted `privilege` by `policy`.
    fn is_access_granted(
        &self,
        actor: &ActorContext,
        policy: &AuthorizationPolicy,
        privilege: Privilege,
    ) -> bool;

    /// Like [`is_access_granted`](Self::is_access_granted) but fails with
    /// [`AuthorizationError::Forbidden`].
    fn grant_access_or_fail(
        &self,
        actor: &ActorContext,
        policy: &AuthorizationPolicy,
        privilege: Privilege,
    ) -> AuthorizationResult<()> {
        if self.is_access_granted(actor, policy, privilege) {
            Ok(())
        } else {
            Err(AuthorizationError::Forbidden {
                actor: actor.display_id(),
                privilege,
                policy_id: policy.id,
            })
        }
    }
}

/// Rule-based evaluator.
///
/// Access is granted iff the actor is identified and some active rule grants
/// the privilege or one implying it.
///
/// # Example
///
/// ```
/// use roleset_authz::{
///     ActorContext, AuthorizationEvaluator, AuthorizationPolicy, Credential,
///     CredentialDefinition, CredentialRule, PolicyEvaluator, PolicyType, Privilege,
/// };
/// use uuid::Uuid;
///
/// let policy = AuthorizationPolicy::new(PolicyType::Application).with_rule(CredentialRule::new(
///     "admins",
///     vec![CredentialDefinition::new("space-admin", "space-1")],
///     vec![Privilege::Grant],
/// ));
/// let admin = ActorContext::for_actor(Uuid::now_v7(), vec![Credential::new("space-admin", "space-1")]);
///
/// assert!(PolicyEvaluator::new().is_access_granted(&admin, &policy, Privilege::Grant));
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PolicyEvaluator;

impl PolicyEvaluator {
    /// Create a new evaluator.
    pub fn new() -> Self {
        Self
    }
}

impl AuthorizationEvaluator for PolicyEvaluator {
    fn is_access_granted(
        &self,
        actor: &ActorContext,
        policy: &AuthorizationPolicy,
        privilege: Privilege,
    ) -> bool {
        if actor.is_anonymous() {
            return false;
        }

        let granted = policy.grants(&actor.credentials, privilege);
        debug!(
            actor = %actor.display_id(),
            policy_id = %policy.id,
            privilege = %privilege,
            granted,
            "Evaluated privilege"
        );
        granted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credential, CredentialDefinition};
    use crate::policy::{CredentialRule, PolicyType};
    use uuid::Uuid;

    fn policy() -> AuthorizationPolicy {
        AuthorizationPolicy::new(PolicyType::Invitation).with_rule(CredentialRule::new(
            "invitee",
            vec![CredentialDefinition::new("user-self", "user-1")],
            vec![Privilege::Update, Privilege::InvitationAccept],
        ))
    }

    #[test]
    fn test_granted() {
        let actor = ActorContext::for_actor(Uuid::now_v7(), vec![Credential::new("user-self", "user-1")]);
        let evaluator = PolicyEvaluator::new();

        assert!(evaluator.is_access_granted(&actor, &policy(), Privilege::InvitationAccept));
        assert!(evaluator.is_access_granted(&actor, &policy(), Privilege::Read));
        assert!(!evaluator.is_access_granted(&actor, &policy(), Privilege::Grant));
    }

    #[test]
    fn test_anonymous_never_granted() {
        let actor = ActorContext::anonymous().with_credential(Credential::new("user-self", "user-1"));
        assert!(!PolicyEvaluator::new().is_access_granted(&actor, &policy(), Privilege::Read));
    }

    #[test]
    fn test_grant_access_or_fail() {
        let policy = policy();
        let actor = ActorContext::for_actor(Uuid::now_v7(), vec![]);
        let err = PolicyEvaluator::new()
            .grant_access_or_fail(&actor, &policy, Privilege::Update)
            .unwrap_err();

        match err {
            AuthorizationError::Forbidden { privilege, policy_id, .. } => {
                assert_eq!(privilege, Privilege::Update);
                assert_eq!(policy_id, policy.id);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
