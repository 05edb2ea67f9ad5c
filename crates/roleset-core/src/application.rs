//! Application aggregate
//!
//! An actor-initiated request to join the entry role of a RoleSet, driven
//! through [`ApplicationMachine`](crate::lifecycle::ApplicationMachine).

use chrono::{DateTime, Utc};
use roleset_authz::{
    credential_types, AuthorizationPolicy, CredentialDefinition, CredentialRule, PolicyType,
    Privilege,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::lifecycle::{ApplicationMachine, ApplicationState, Lifecycle, LifecycleProjection};

/// An answered application question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationQuestion {
    /// Question text
    pub name: String,
    /// Answer
    pub value: String,
    /// Display position
    pub sort_order: u32,
}

impl ApplicationQuestion {
    /// Create an answered question.
    pub fn new(name: impl Into<String>, value: impl Into<String>, sort_order: u32) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            sort_order,
        }
    }
}

/// Privileges the applicant holds on their own application.
pub const APPLICANT_PRIVILEGES: [Privilege; 2] = [Privilege::Read, Privilege::Delete];

/// A request to join a RoleSet.
///
/// # Examples
///
/// ```
/// use roleset_authz::{AuthorizationPolicy, PolicyType};
/// use roleset_core::Application;
/// use uuid::Uuid;
///
/// let application = Application::new(
///     Uuid::now_v7(),
///     Uuid::now_v7(),
///     AuthorizationPolicy::new(PolicyType::Application),
/// );
/// assert!(!application.is_finalized());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    /// Unique application ID
    pub id: Uuid,

    /// Actor applying
    pub applicant_id: Uuid,

    /// RoleSet applied to
    pub role_set_id: Uuid,

    /// Workflow state
    pub lifecycle: Lifecycle<ApplicationMachine>,

    /// Answered questions
    #[serde(default)]
    pub questions: Vec<ApplicationQuestion>,

    /// Policy guarding lifecycle events
    pub authorization: AuthorizationPolicy,

    /// When the application was created
    pub created_at: DateTime<Utc>,

    /// When the application was last updated
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Create an application at the initial lifecycle state.
    pub fn new(applicant_id: Uuid, role_set_id: Uuid, authorization: AuthorizationPolicy) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            applicant_id,
            role_set_id,
            lifecycle: Lifecycle::new(),
            questions: Vec::new(),
            authorization,
            created_at: now,
            updated_at: now,
        }
    }

    /// Policy of a new application: the RoleSet's cascading rules plus the
    /// applicant's self-management rule.
    pub fn policy_for(applicant_id: Uuid, role_set_policy: &AuthorizationPolicy) -> AuthorizationPolicy {
        AuthorizationPolicy::new(PolicyType::Application)
            .with_rule(CredentialRule::new(
                "application-applicant",
                vec![CredentialDefinition::new(
                    credential_types::USER_SELF,
                    applicant_id.to_string(),
                )],
                APPLICANT_PRIVILEGES.to_vec(),
            ))
            .inherit_from(role_set_policy)
    }

    /// Attach answered questions (builder style).
    pub fn with_questions(mut self, questions: Vec<ApplicationQuestion>) -> Self {
        self.questions = questions;
        self
    }

    /// Questions ordered by `sort_order`.
    pub fn questions_sorted(&self) -> Vec<&ApplicationQuestion> {
        let mut sorted: Vec<&ApplicationQuestion> = self.questions.iter().collect();
        sorted.sort_by_key(|q| q.sort_order);
        sorted
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ApplicationState {
        self.lifecycle.state()
    }

    /// Whether the lifecycle reached a final state.
    pub fn is_finalized(&self) -> bool {
        self.lifecycle.is_final()
    }

    /// `{state, nextEvents, isFinalized}` view of the lifecycle.
    pub fn projection(&self) -> LifecycleProjection {
        self.lifecycle.projection()
    }
}
