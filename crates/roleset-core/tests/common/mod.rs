//! Shared fixture for the RoleSet integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use roleset_authz::{ActorContext, Credential, CredentialDefinition};
use roleset_core::memory::{InMemoryCacheStore, InMemoryCredentialStore, InMemoryPersistenceStore};
use roleset_core::store::StoreResult;
use roleset_core::{
    ContributorKind, CreateRoleSetInput, CredentialStore, MembershipConfig, Role, RoleName, RoleSet,
    RoleSetOrchestrator, RoleSetType, StoreError,
};
use roleset_events::{EventBus, MemoryEventBus, Subscription};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Credential store that fails writes of selected credential types and
/// delegates everything else to an in-memory store.
pub struct FaultyCredentialStore {
    inner: Arc<InMemoryCredentialStore>,
    failing_grants: RwLock<HashSet<String>>,
    failing_revokes: RwLock<HashSet<String>>,
}

impl FaultyCredentialStore {
    /// Wrap `inner` with no faults armed.
    pub fn new(inner: Arc<InMemoryCredentialStore>) -> Self {
        Self {
            inner,
            failing_grants: RwLock::new(HashSet::new()),
            failing_revokes: RwLock::new(HashSet::new()),
        }
    }

    /// Fail every grant of `credential_type`.
    pub async fn fail_grants_of(&self, credential_type: &str) {
        self.failing_grants.write().await.insert(credential_type.to_string());
    }

    /// Fail every revoke of `credential_type`.
    pub async fn fail_revokes_of(&self, credential_type: &str) {
        self.failing_revokes.write().await.insert(credential_type.to_string());
    }

    /// Disarm every fault.
    pub async fn heal(&self) {
        self.failing_grants.write().await.clear();
        self.failing_revokes.write().await.clear();
    }

    fn refused(operation: &str, definition: &CredentialDefinition) -> StoreError {
        StoreError::Backend(format!("{} of {} refused", operation, definition))
    }
}

#[async_trait]
impl CredentialStore for FaultyCredentialStore {
    async fn get_credentials(&self, agent_id: Uuid) -> StoreResult<Vec<Credential>> {
        self.inner.get_credentials(agent_id).await
    }

    async fn get_credentials_batch(&self, agent_ids: &[Uuid]) -> StoreResult<HashMap<Uuid, Vec<Credential>>> {
        self.inner.get_credentials_batch(agent_ids).await
    }

    async fn grant_credential(
        &self,
        agent_id: Uuid,
        kind: ContributorKind,
        definition: &CredentialDefinition,
    ) -> StoreResult<Credential> {
        if self.failing_grants.read().await.contains(&definition.credential_type) {
            return Err(Self::refused("grant", definition));
        }
        self.inner.grant_credential(agent_id, kind, definition).await
    }

    async fn revoke_credential(&self, agent_id: Uuid, definition: &CredentialDefinition) -> StoreResult<bool> {
        if self.failing_revokes.read().await.contains(&definition.credential_type) {
            return Err(Self::refused("revoke", definition));
        }
        self.inner.revoke_credential(agent_id, definition).await
    }

    async fn has_valid_credential(&self, agent_id: Uuid, definition: &CredentialDefinition) -> StoreResult<bool> {
        self.inner.has_valid_credential(agent_id, definition).await
    }

    async fn agents_with_credential(
        &self,
        definition: &CredentialDefinition,
        kind: Option<ContributorKind>,
    ) -> StoreResult<Vec<Uuid>> {
        self.inner.agents_with_credential(definition, kind).await
    }

    async fn agent_kind(&self, agent_id: Uuid) -> StoreResult<Option<ContributorKind>> {
        self.inner.agent_kind(agent_id).await
    }
}

/// Orchestrator over in-memory backends, with handles on every backend.
pub struct TestFixture {
    /// Credential store.
    pub credentials: Arc<InMemoryCredentialStore>,
    /// Fault switches on the orchestrator's view of `credentials`.
    pub faults: Arc<FaultyCredentialStore>,
    /// Persistence store.
    pub persistence: Arc<InMemoryPersistenceStore>,
    /// Cache store.
    pub cache_store: Arc<InMemoryCacheStore>,
    /// Event bus the orchestrator publishes to.
    pub events: Arc<MemoryEventBus>,
    /// Orchestrator under test.
    pub orchestrator: RoleSetOrchestrator,
}

impl TestFixture {
    /// Fixture with a multi-get capable cache.
    pub fn new() -> Self {
        Self::with_cache_store(InMemoryCacheStore::new(), MembershipConfig::default())
    }

    /// Fixture over a specific cache store and configuration.
    pub fn with_cache_store(cache_store: InMemoryCacheStore, config: MembershipConfig) -> Self {
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let faults = Arc::new(FaultyCredentialStore::new(credentials.clone()));
        let persistence = Arc::new(InMemoryPersistenceStore::new());
        let cache_store = Arc::new(cache_store);
        let events = Arc::new(MemoryEventBus::with_capacity(config.event_channel_capacity));

        let orchestrator = RoleSetOrchestrator::new(
            faults.clone(),
            persistence.clone(),
            cache_store.clone(),
            &config,
        )
        .unwrap()
        .with_event_bus(events.clone());

        Self {
            credentials,
            faults,
            persistence,
            cache_store,
            events,
            orchestrator,
        }
    }

    /// Top-level space RoleSet scoped to `space`.
    pub async fn space(&self, space: &str) -> RoleSet {
        self.orchestrator
            .create_role_set(CreateRoleSetInput::new(
                RoleSetType::Space,
                RoleName::Member,
                space_roles(space),
            ))
            .await
            .unwrap()
    }

    /// Child space RoleSet of `parent`, scoped to `space`.
    pub async fn subspace(&self, parent: &RoleSet, space: &str) -> RoleSet {
        self.orchestrator
            .create_role_set(
                CreateRoleSetInput::new(RoleSetType::Space, RoleName::Member, space_roles(space))
                    .with_parent(parent.id),
            )
            .await
            .unwrap()
    }

    /// Assign a role to a user.
    pub async fn grant(&self, role_set: &RoleSet, role: RoleName, actor_id: Uuid) {
        self.orchestrator
            .assign_role(role_set, role, actor_id, ContributorKind::User, false)
            .await
            .unwrap();
    }

    /// A fresh user holding `role` in `role_set`.
    pub async fn user_with_role(&self, role_set: &RoleSet, role: RoleName) -> Uuid {
        let actor_id = Uuid::now_v7();
        self.grant(role_set, role, actor_id).await;
        actor_id
    }

    /// Authorization context of an actor.
    pub async fn context(&self, actor_id: Uuid) -> ActorContext {
        self.orchestrator.actor_context(actor_id).await.unwrap()
    }

    /// Subscribe to every membership event.
    pub async fn subscribe_all(&self) -> Subscription {
        self.events.subscribe("roleset.#").await.unwrap()
    }
}

/// Member, lead and admin roles scoped to `space`.
pub fn space_roles(space: &str) -> Vec<Role> {
    vec![
        Role::new(RoleName::Member, CredentialDefinition::new("space-member", space)),
        Role::new(RoleName::Lead, CredentialDefinition::new("space-lead", space)),
        Role::new(RoleName::Admin, CredentialDefinition::new("space-admin", space)),
    ]
}

/// Event types received so far, in publish order.
pub async fn drain_event_types(subscription: &mut Subscription) -> Vec<String> {
    let mut received = Vec::new();
    while let Ok(Ok(event)) = tokio::time::timeout(Duration::from_millis(50), subscription.recv()).await {
        received.push(event.event_type);
    }
    received
}
