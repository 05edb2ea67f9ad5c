//! Error types for membership operations
//!
//! This module defines the typed failures surfaced by the resolver, the
//! lifecycle engine and the orchestrator.

use roleset_authz::AuthorizationError;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Membership error types.
///
/// Validation failures are non-retryable domain errors. Only
/// [`MembershipError::Store`] reports a collaborator failure that may succeed
/// on retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum MembershipError {
    /// A RoleSet, role, workflow or actor does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of missing entity
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// A required association was not hydrated before use
    #[error("Relationship '{relation}' not loaded on {entity} {id}")]
    RelationshipNotLoaded {
        /// Aggregate kind
        entity: &'static str,
        /// Association name
        relation: &'static str,
        /// Aggregate id
        id: Uuid,
    },

    /// Membership rule violated (open workflow exists, already a member, ...)
    #[error("Membership error: {0}")]
    Membership(String),

    /// Contributor-count policy limit reached
    #[error("Policy limit exceeded: {0}")]
    PolicyLimit(String),

    /// No transition for the event from the current state
    #[error("Invalid transition: event '{event}' is not valid from state '{state}'")]
    InvalidTransition {
        /// Current state
        state: String,
        /// Rejected event
        event: String,
    },

    /// The actor is not granted the privilege guarding the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Malformed input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Collaborator (credential or persistence store) failure
    #[error("Store error: {0}")]
    Store(String),
}

/// Result type for membership operations.
pub type MembershipResult<T> = Result<T, MembershipError>;

impl MembershipError {
    /// Shorthand for [`MembershipError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MembershipError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if this error should be logged at error level.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            MembershipError::RelationshipNotLoaded { .. } | MembershipError::Store(_)
        )
    }

    /// Check if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MembershipError::Store(_))
    }

    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            MembershipError::NotFound { .. } => 404,
            MembershipError::RelationshipNotLoaded { .. } => 500,
            MembershipError::Membership(_) => 409,
            MembershipError::PolicyLimit(_) => 422,
            MembershipError::InvalidTransition { .. } => 422,
            MembershipError::Unauthorized(_) => 403,
            MembershipError::Validation(_) => 400,
            MembershipError::Store(_) => 503,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            MembershipError::NotFound { .. } => "NOT_FOUND",
            MembershipError::RelationshipNotLoaded { .. } => "RELATIONSHIP_NOT_LOADED",
            MembershipError::Membership(_) => "MEMBERSHIP_ERROR",
            MembershipError::PolicyLimit(_) => "POLICY_LIMIT_EXCEEDED",
            MembershipError::InvalidTransition { .. } => "INVALID_TRANSITION",
            MembershipError::Unauthorized(_) => "UNAUTHORIZED",
            MembershipError::Validation(_) => "VALIDATION_ERROR",
            MembershipError::Store(_) => "STORE_ERROR",
        }
    }
}

impl From<StoreError> for MembershipError {
    fn from(err: StoreError) -> Self {
        MembershipError::Store(err.to_string())
    }
}

impl From<AuthorizationError> for MembershipError {
    fn from(err: AuthorizationError) -> Self {
        MembershipError::Unauthorized(err.to_string())
    }
}
