//! # RoleSet Authorization
//!
//! Credentials, privileges and authorization policies for RoleSet
//! membership.
//!
//! ## Overview
//!
//! - **Credentials**: typed, resource-scoped grants held by an agent
//! - **Credential definitions**: `{type, resourceID}` predicates; an empty
//!   resource ID is a wildcard
//! - **Privileges**: what a policy grants (`Update`, `Grant`, `InvitationAccept`, ...)
//! - **Policies**: ordered credential rules, optionally inherited by children
//! - **Evaluator**: the `is_access_granted(actor, policy, privilege)` contract
//!
//! ## Architecture
//!
//! ```text
//! CredentialRule = [CredentialDefinition] -> [Privilege]
//! AuthorizationPolicy = [CredentialRule]
//!
//! granted(actor, policy, p) =
//!     actor identified
//!     && exists rule in policy:
//!            rule.criteria satisfied by actor.credentials
//!            && rule grants p (or a privilege implying p)
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use roleset_authz::{
//!     ActorContext, AuthorizationEvaluator, AuthorizationPolicy, Credential,
//!     CredentialDefinition, CredentialRule, PolicyEvaluator, PolicyType, Privilege,
//! };
//! use uuid::Uuid;
//!
//! let policy = AuthorizationPolicy::new(PolicyType::RoleSet).with_rule(CredentialRule::new(
//!     "members",
//!     vec![CredentialDefinition::new("space-member", "space-1")],
//!     vec![Privilege::Read],
//! ));
//!
//! let actor = ActorContext::for_actor(
//!     Uuid::now_v7(),
//!     vec![Credential::new("space-member", "space-1")],
//! );
//!
//! let evaluator = PolicyEvaluator::new();
//! assert!(evaluator.is_access_granted(&actor, &policy, Privilege::Read));
//! assert!(!evaluator.is_access_granted(&actor, &policy, Privilege::Update));
//! ```

pub mod actor;
pub mod credentials;
pub mod error;
pub mod evaluator;
pub mod policy;
pub mod privileges;

// Re-export main types for convenience
pub use actor::ActorContext;
pub use credentials::{credential_types, Credential, CredentialDefinition};
pub use error::{AuthorizationError, AuthorizationResult};
pub use evaluator::{AuthorizationEvaluator, PolicyEvaluator};
pub use policy::{AuthorizationPolicy, CredentialRule, PolicyType, PrivilegeSet};
pub use privileges::Privilege;
