//! Error types for authorization checks.

use thiserror::Error;
use uuid::Uuid;

use crate::privileges::Privilege;

/// Authorization error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthorizationError {
    /// The actor is not granted the privilege by the policy
    #[error("Forbidden: actor {actor} lacks privilege '{privilege}' on policy {policy_id}")]
    Forbidden {
        /// Actor id, or "anonymous"
        actor: String,
        /// Privilege that was required
        privilege: Privilege,
        /// Policy that was evaluated
        policy_id: Uuid,
    },

    /// A privilege name could not be parsed
    #[error("Unknown privilege: {0}")]
    UnknownPrivilege(String),
}

/// Result type for authorization checks.
pub type AuthorizationResult<T> = Result<T, AuthorizationError>;

impl AuthorizationError {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AuthorizationError::Forbidden { .. } => 403,
            AuthorizationError::UnknownPrivilege(_) => 400,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthorizationError::Forbidden { .. } => "FORBIDDEN",
            AuthorizationError::UnknownPrivilege(_) => "UNKNOWN_PRIVILEGE",
        }
    }
}
