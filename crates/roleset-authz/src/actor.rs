//! # Actor Context
//!
//! The explicit identity and credentials a guard or policy check is
//! evaluated against. Nothing in this crate reads ambient request state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::credentials::{Credential, CredentialDefinition};

/// The actor performing an operation.
///
/// An actor without an id is anonymous and is never granted a privilege.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorContext {
    /// Resolved actor (agent) id, `None` when anonymous
    pub actor_id: Option<Uuid>,

    /// Credentials held by the actor at evaluation time
    #[serde(default)]
    pub credentials: Vec<Credential>,
}

impl ActorContext {
    /// An anonymous actor with no credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An identified actor holding `credentials`.
    pub fn for_actor(actor_id: Uuid, credentials: Vec<Credential>) -> Self {
        Self {
            actor_id: Some(actor_id),
            credentials,
        }
    }

    /// Add a credential (builder style).
    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credentials.push(credential);
        self
    }

    /// Check if the actor has no resolvable identity.
    pub fn is_anonymous(&self) -> bool {
        self.actor_id.is_none()
    }

    /// Check if the actor holds a valid credential matching `definition`.
    pub fn has_credential(&self, definition: &CredentialDefinition) -> bool {
        definition.is_satisfied_by_any(&self.credentials)
    }

    /// Actor id rendered for diagnostics.
    pub fn display_id(&self) -> String {
        self.actor_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "anonymous".to_string())
    }
}
