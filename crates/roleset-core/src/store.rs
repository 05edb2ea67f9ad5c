//! Collaborator contracts.
//!
//! The core never owns credentials, aggregates or cache entries. It talks to
//! three externally owned stores through these traits; every call is an
//! asynchronous boundary.

use async_trait::async_trait;
use roleset_authz::{Credential, CredentialDefinition};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::application::Application;
use crate::invitation::{Invitation, PlatformInvitation};
use crate::role::ContributorKind;
use crate::role_set::{RoleSet, RoleSetRelations};

// ============================================================================
// Errors
// ============================================================================

/// Failure reported by a credential or persistence store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Backend unreachable
    #[error("Connection error: {0}")]
    Connection(String),

    /// Backend rejected or failed the operation
    #[error("Backend error: {0}")]
    Backend(String),

    /// Stored data could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failure reported by a cache store.
///
/// Never surfaced by the membership cache; logged and treated as a miss.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    /// Cache unreachable
    #[error("Cache connection error: {0}")]
    Connection(String),

    /// Cache command failed
    #[error("Cache backend error: {0}")]
    Backend(String),

    /// The store has no multi-key read
    #[error("Multi-get is not supported by this cache store")]
    MultiGetUnsupported,
}

/// Result type for cache store operations.
pub type CacheResult<T> = Result<T, CacheError>;

// ============================================================================
// Credential store
// ============================================================================

/// Per-agent credential grants.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// All credentials held by an agent; empty for an unknown agent.
    async fn get_credentials(&self, agent_id: Uuid) -> StoreResult<Vec<Credential>>;

    /// Credentials of many agents in one round trip.
    ///
    /// Every requested agent is present in the result.
    async fn get_credentials_batch(
        &self,
        agent_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Vec<Credential>>>;

    /// Issue a credential to an agent of the given kind.
    async fn grant_credential(
        &self,
        agent_id: Uuid,
        kind: ContributorKind,
        definition: &CredentialDefinition,
    ) -> StoreResult<Credential>;

    /// Revoke every credential exactly matching `{type, resourceID}`.
    ///
    /// Returns whether anything was revoked.
    async fn revoke_credential(
        &self,
        agent_id: Uuid,
        definition: &CredentialDefinition,
    ) -> StoreResult<bool>;

    /// Check if the agent holds a valid credential satisfying `definition`.
    async fn has_valid_credential(
        &self,
        agent_id: Uuid,
        definition: &CredentialDefinition,
    ) -> StoreResult<bool>;

    /// Agents holding a valid credential satisfying `definition`,
    /// optionally restricted to one contributor kind.
    async fn agents_with_credential(
        &self,
        definition: &CredentialDefinition,
        kind: Option<ContributorKind>,
    ) -> StoreResult<Vec<Uuid>>;

    /// Contributor kind of an agent, if known.
    async fn agent_kind(&self, agent_id: Uuid) -> StoreResult<Option<ContributorKind>>;
}

// ============================================================================
// Persistence store
// ============================================================================

/// Aggregate persistence with explicit relation hydration.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Insert or replace a RoleSet. Relation id lists are derived, not
    /// stored.
    async fn save_role_set(&self, role_set: &RoleSet) -> StoreResult<()>;

    /// Load a RoleSet, hydrating only the requested relations.
    async fn get_role_set(
        &self,
        id: Uuid,
        relations: RoleSetRelations,
    ) -> StoreResult<Option<RoleSet>>;

    /// Delete a RoleSet.
    async fn delete_role_set(&self, id: Uuid) -> StoreResult<()>;

    /// RoleSets whose parent is `parent_id`, with roles hydrated.
    async fn child_role_sets(&self, parent_id: Uuid) -> StoreResult<Vec<RoleSet>>;

    /// Insert or replace an Application.
    async fn save_application(&self, application: &Application) -> StoreResult<()>;

    /// Load an Application.
    async fn get_application(&self, id: Uuid) -> StoreResult<Option<Application>>;

    /// Delete an Application.
    async fn delete_application(&self, id: Uuid) -> StoreResult<()>;

    /// Applications of an actor on a RoleSet, any state.
    async fn find_applications(
        &self,
        actor_id: Uuid,
        role_set_id: Uuid,
    ) -> StoreResult<Vec<Application>>;

    /// Insert or replace an Invitation.
    async fn save_invitation(&self, invitation: &Invitation) -> StoreResult<()>;

    /// Load an Invitation.
    async fn get_invitation(&self, id: Uuid) -> StoreResult<Option<Invitation>>;

    /// Delete an Invitation.
    async fn delete_invitation(&self, id: Uuid) -> StoreResult<()>;

    /// Invitations of an actor on a RoleSet, any state.
    async fn find_invitations(
        &self,
        actor_id: Uuid,
        role_set_id: Uuid,
    ) -> StoreResult<Vec<Invitation>>;

    /// Insert or replace a platform invitation.
    async fn save_platform_invitation(&self, invitation: &PlatformInvitation) -> StoreResult<()>;

    /// Load a platform invitation.
    async fn get_platform_invitation(&self, id: Uuid) -> StoreResult<Option<PlatformInvitation>>;

    /// Delete a platform invitation.
    async fn delete_platform_invitation(&self, id: Uuid) -> StoreResult<()>;

    /// Platform invitations addressed to an email, any RoleSet.
    async fn find_platform_invitations(&self, email: &str) -> StoreResult<Vec<PlatformInvitation>>;
}

// ============================================================================
// Cache store
// ============================================================================

/// A string key/value cache with per-entry TTL.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    /// Write a value with a time to live.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()>;

    /// Remove a value.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Whether [`multi_get`](Self::multi_get) is a single round trip.
    fn supports_multi_get(&self) -> bool {
        false
    }

    /// Read many values in one round trip, in key order.
    async fn multi_get(&self, _keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        Err(CacheError::MultiGetUnsupported)
    }
}
