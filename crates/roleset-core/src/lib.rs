//! # RoleSet Core
//!
//! Membership resolution, join workflows and role orchestration for RoleSets.
//!
//! ## Overview
//!
//! A RoleSet governs who holds which role on a resource (a space, an
//! organization, the platform). Roles are proven by credentials; actors
//! join through Applications and Invitations driven by guarded lifecycles.
//!
//! - **Roles**: named tiers with a credential predicate and per-kind
//!   contributor limits
//! - **Matcher**: credential-to-role matching
//! - **Lifecycles**: Application and Invitation state machines
//! - **Resolver**: `MEMBER` / `APPLICATION_PENDING` / `INVITATION_PENDING` /
//!   `NOT_MEMBER` with a read-through cache
//! - **Loader**: batched resolution with one credential fetch per actor
//! - **Orchestrator**: role assignment, workflows and RoleSet administration
//!
//! ## Architecture
//!
//! ```text
//! RoleSetOrchestrator
//!   ├─ CredentialMatcher ─→ CredentialStore
//!   ├─ MembershipLoader
//!   │     └─ MembershipResolver ─→ MembershipCache ─→ CacheStore
//!   │                            └─ PersistenceStore
//!   ├─ AuthorizationEvaluator (lifecycle guards)
//!   └─ EventBus (best-effort domain events)
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use roleset_authz::CredentialDefinition;
//! use roleset_core::memory::{InMemoryCacheStore, InMemoryCredentialStore, InMemoryPersistenceStore};
//! use roleset_core::{
//!     ContributorKind, CreateRoleSetInput, MembershipConfig, MembershipStatus, Role, RoleName,
//!     RoleSetOrchestrator, RoleSetType,
//! };
//! use std::sync::Arc;
//! use uuid::Uuid;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = RoleSetOrchestrator::new(
//!         Arc::new(InMemoryCredentialStore::new()),
//!         Arc::new(InMemoryPersistenceStore::new()),
//!         Arc::new(InMemoryCacheStore::new()),
//!         &MembershipConfig::from_env(),
//!     )?;
//!
//!     let space = orchestrator
//!         .create_role_set(CreateRoleSetInput::new(
//!             RoleSetType::Space,
//!             RoleName::Member,
//!             vec![Role::new(RoleName::Member, CredentialDefinition::new("space-member", "space-1"))],
//!         ))
//!         .await?;
//!
//!     let actor_id = Uuid::now_v7();
//!     orchestrator
//!         .assign_role(&space, RoleName::Member, actor_id, ContributorKind::User, true)
//!         .await?;
//!
//!     let actor = orchestrator.actor_context(actor_id).await?;
//!     let status = orchestrator.resolve_membership_status(&actor, &space).await?;
//!     assert_eq!(status, MembershipStatus::Member);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `serde`: Serialization support (enabled by default)
//! - `redis`: Redis-backed [`CacheStore`]

pub mod application;
pub mod cache;
pub mod config;
pub mod error;
pub mod invitation;
pub mod lifecycle;
pub mod loader;
pub mod matcher;
pub mod membership;
pub mod memory;
pub mod orchestrator;
#[cfg(feature = "redis")]
pub mod redis;
pub mod resolver;
pub mod role;
pub mod role_set;
pub mod store;

// Re-export main types for convenience
pub use application::{Application, ApplicationQuestion};
pub use cache::{CacheConcern, CacheKey, MembershipCache};
pub use config::{ConfigError, MembershipConfig};
pub use error::{MembershipError, MembershipResult};
pub use invitation::{InviteInput, Invitation, PlatformInvitation};
pub use lifecycle::{
    ApplicationEvent, ApplicationMachine, ApplicationState, InvitationEvent, InvitationMachine,
    InvitationState, Lifecycle, LifecycleMachine, LifecycleProjection,
};
pub use loader::{MembershipKey, MembershipLoader};
pub use matcher::CredentialMatcher;
pub use membership::{ImplicitRole, MembershipStatus};
pub use orchestrator::RoleSetOrchestrator;
pub use resolver::MembershipResolver;
pub use role::{ContributorKind, ContributorPolicy, Role, RoleName};
pub use role_set::{
    CreateRoleSetInput, EntitlementType, License, RoleSet, RoleSetRelations, RoleSetType,
};
pub use store::{CacheError, CacheStore, CredentialStore, PersistenceStore, StoreError};

#[cfg(feature = "redis")]
pub use config::RedisCacheConfig;
