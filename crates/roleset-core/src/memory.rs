//! In-memory collaborator backends.
//!
//! Used by tests and single-process deployments. Each backend counts the
//! calls made against it and can be switched into a failure mode, so
//! batching and degradation behavior can be asserted directly.

use async_trait::async_trait;
use roleset_authz::{Credential, CredentialDefinition};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::application::Application;
use crate::invitation::{Invitation, PlatformInvitation};
use crate::role::ContributorKind;
use crate::role_set::{RoleSet, RoleSetRelations};
use crate::store::{
    CacheError, CacheResult, CacheStore, CredentialStore, PersistenceStore, StoreError, StoreResult,
};

// ============================================================================
// Credential store
// ============================================================================

#[derive(Debug, Clone)]
struct AgentRecord {
    kind: ContributorKind,
    credentials: Vec<Credential>,
}

/// In-memory [`CredentialStore`].
///
/// Agents unknown to the store are created as [`ContributorKind::User`] on
/// their first grant.
#[derive(Debug, Default)]
pub struct InMemoryCredentialStore {
    agents: RwLock<HashMap<Uuid, AgentRecord>>,
    fetches: RwLock<HashMap<Uuid, usize>>,
    fetch_calls: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the contributor kind of an agent.
    pub async fn register_agent(&self, agent_id: Uuid, kind: ContributorKind) {
        let mut agents = self.agents.write().await;
        agents
            .entry(agent_id)
            .and_modify(|record| record.kind = kind)
            .or_insert_with(|| AgentRecord {
                kind,
                credentials: Vec::new(),
            });
    }

    /// How many times an agent's credentials were fetched, single or batched.
    pub async fn fetch_count(&self, agent_id: Uuid) -> usize {
        self.fetches.read().await.get(&agent_id).copied().unwrap_or(0)
    }

    /// Number of fetch calls (`get_credentials` plus `get_credentials_batch`).
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Make every call fail with [`StoreError::Connection`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Connection("credential store unavailable".to_string()));
        }
        Ok(())
    }

    async fn record_fetch(&self, agent_ids: &[Uuid]) {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let mut fetches = self.fetches.write().await;
        for id in agent_ids {
            *fetches.entry(*id).or_insert(0) += 1;
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credentials(&self, agent_id: Uuid) -> StoreResult<Vec<Credential>> {
        self.check_available()?;
        self.record_fetch(&[agent_id]).await;
        let agents = self.agents.read().await;
        Ok(agents
            .get(&agent_id)
            .map(|record| record.credentials.clone())
            .unwrap_or_default())
    }

    async fn get_credentials_batch(
        &self,
        agent_ids: &[Uuid],
    ) -> StoreResult<HashMap<Uuid, Vec<Credential>>> {
        self.check_available()?;
        self.record_fetch(agent_ids).await;
        let agents = self.agents.read().await;
        Ok(agent_ids
            .iter()
            .map(|id| {
                let credentials = agents
                    .get(id)
                    .map(|record| record.credentials.clone())
                    .unwrap_or_default();
                (*id, credentials)
            })
            .collect())
    }

    async fn grant_credential(
        &self,
        agent_id: Uuid,
        kind: ContributorKind,
        definition: &CredentialDefinition,
    ) -> StoreResult<Credential> {
        self.check_available()?;
        let mut agents = self.agents.write().await;
        let record = agents.entry(agent_id).or_insert_with(|| AgentRecord {
            kind,
            credentials: Vec::new(),
        });

        if let Some(existing) = record
            .credentials
            .iter()
            .find(|c| c.is_valid() && c.definition() == *definition)
        {
            return Ok(existing.clone());
        }

        let credential = definition.issue();
        record.credentials.push(credential.clone());
        Ok(credential)
    }

    async fn revoke_credential(
        &self,
        agent_id: Uuid,
        definition: &CredentialDefinition,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let mut agents = self.agents.write().await;
        let Some(record) = agents.get_mut(&agent_id) else {
            return Ok(false);
        };
        let before = record.credentials.len();
        record.credentials.retain(|c| c.definition() != *definition);
        Ok(record.credentials.len() != before)
    }

    async fn has_valid_credential(
        &self,
        agent_id: Uuid,
        definition: &CredentialDefinition,
    ) -> StoreResult<bool> {
        self.check_available()?;
        let agents = self.agents.read().await;
        Ok(agents
            .get(&agent_id)
            .map(|record| definition.is_satisfied_by_any(&record.credentials))
            .unwrap_or(false))
    }

    async fn agents_with_credential(
        &self,
        definition: &CredentialDefinition,
        kind: Option<ContributorKind>,
    ) -> StoreResult<Vec<Uuid>> {
        self.check_available()?;
        let agents = self.agents.read().await;
        let mut ids: Vec<Uuid> = agents
            .iter()
            .filter(|(_, record)| kind.map_or(true, |k| record.kind == k))
            .filter(|(_, record)| definition.is_satisfied_by_any(&record.credentials))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn agent_kind(&self, agent_id: Uuid) -> StoreResult<Option<ContributorKind>> {
        self.check_available()?;
        Ok(self.agents.read().await.get(&agent_id).map(|record| record.kind))
    }
}

// ============================================================================
// Persistence store
// ============================================================================

/// In-memory [`PersistenceStore`].
///
/// Relation id lists of a RoleSet are derived from the workflow tables on
/// every load, the way a relational backend would join them.
#[derive(Debug, Default)]
pub struct InMemoryPersistenceStore {
    role_sets: RwLock<HashMap<Uuid, RoleSet>>,
    applications: RwLock<HashMap<Uuid, Application>>,
    invitations: RwLock<HashMap<Uuid, Invitation>>,
    platform_invitations: RwLock<HashMap<Uuid, PlatformInvitation>>,
}

impl InMemoryPersistenceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored applications.
    pub async fn application_count(&self) -> usize {
        self.applications.read().await.len()
    }

    /// Number of stored invitations.
    pub async fn invitation_count(&self) -> usize {
        self.invitations.read().await.len()
    }

    async fn hydrate(&self, stored: &RoleSet, relations: RoleSetRelations) -> RoleSet {
        let mut role_set = stored.clone();
        let id = role_set.id;

        role_set.roles = if relations.roles { stored.roles.clone() } else { None };

        role_set.applications = if relations.applications {
            let applications = self.applications.read().await;
            Some(sorted_ids(applications.values().filter(|a| a.role_set_id == id).map(|a| a.id)))
        } else {
            None
        };

        role_set.invitations = if relations.invitations {
            let invitations = self.invitations.read().await;
            Some(sorted_ids(invitations.values().filter(|i| i.role_set_id == id).map(|i| i.id)))
        } else {
            None
        };

        role_set.platform_invitations = if relations.platform_invitations {
            let invitations = self.platform_invitations.read().await;
            Some(sorted_ids(invitations.values().filter(|i| i.role_set_id == id).map(|i| i.id)))
        } else {
            None
        };

        role_set
    }
}

fn sorted_ids(ids: impl Iterator<Item = Uuid>) -> Vec<Uuid> {
    let mut ids: Vec<Uuid> = ids.collect();
    ids.sort();
    ids
}

#[async_trait]
impl PersistenceStore for InMemoryPersistenceStore {
    async fn save_role_set(&self, role_set: &RoleSet) -> StoreResult<()> {
        let mut role_sets = self.role_sets.write().await;
        let mut stored = role_set.clone();
        if stored.roles.is_none() {
            // Saving a partially hydrated RoleSet keeps the stored roles.
            stored.roles = role_sets.get(&role_set.id).and_then(|r| r.roles.clone());
        }
        stored.applications = None;
        stored.invitations = None;
        stored.platform_invitations = None;
        role_sets.insert(stored.id, stored);
        Ok(())
    }

    async fn get_role_set(
        &self,
        id: Uuid,
        relations: RoleSetRelations,
    ) -> StoreResult<Option<RoleSet>> {
        let stored = self.role_sets.read().await.get(&id).cloned();
        match stored {
            Some(stored) => Ok(Some(self.hydrate(&stored, relations).await)),
            None => Ok(None),
        }
    }

    async fn delete_role_set(&self, id: Uuid) -> StoreResult<()> {
        self.role_sets.write().await.remove(&id);
        Ok(())
    }

    async fn child_role_sets(&self, parent_id: Uuid) -> StoreResult<Vec<RoleSet>> {
        let children: Vec<RoleSet> = self
            .role_sets
            .read()
            .await
            .values()
            .filter(|r| r.parent_role_set_id == Some(parent_id))
            .cloned()
            .collect();

        let mut result = Vec::with_capacity(children.len());
        for child in &children {
            result.push(self.hydrate(child, RoleSetRelations::roles()).await);
        }
        result.sort_by_key(|r| r.id);
        Ok(result)
    }

    async fn save_application(&self, application: &Application) -> StoreResult<()> {
        self.applications
            .write()
            .await
            .insert(application.id, application.clone());
        Ok(())
    }

    async fn get_application(&self, id: Uuid) -> StoreResult<Option<Application>> {
        Ok(self.applications.read().await.get(&id).cloned())
    }

    async fn delete_application(&self, id: Uuid) -> StoreResult<()> {
        self.applications.write().await.remove(&id);
        Ok(())
    }

    async fn find_applications(
        &self,
        actor_id: Uuid,
        role_set_id: Uuid,
    ) -> StoreResult<Vec<Application>> {
        let mut found: Vec<Application> = self
            .applications
            .read()
            .await
            .values()
            .filter(|a| a.applicant_id == actor_id && a.role_set_id == role_set_id)
            .cloned()
            .collect();
        found.sort_by_key(|a| a.created_at);
        Ok(found)
    }

    async fn save_invitation(&self, invitation: &Invitation) -> StoreResult<()> {
        self.invitations
            .write()
            .await
            .insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn get_invitation(&self, id: Uuid) -> StoreResult<Option<Invitation>> {
        Ok(self.invitations.read().await.get(&id).cloned())
    }

    async fn delete_invitation(&self, id: Uuid) -> StoreResult<()> {
        self.invitations.write().await.remove(&id);
        Ok(())
    }

    async fn find_invitations(
        &self,
        actor_id: Uuid,
        role_set_id: Uuid,
    ) -> StoreResult<Vec<Invitation>> {
        let mut found: Vec<Invitation> = self
            .invitations
            .read()
            .await
            .values()
            .filter(|i| i.invited_actor_id == actor_id && i.role_set_id == role_set_id)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.created_at);
        Ok(found)
    }

    async fn save_platform_invitation(&self, invitation: &PlatformInvitation) -> StoreResult<()> {
        self.platform_invitations
            .write()
            .await
            .insert(invitation.id, invitation.clone());
        Ok(())
    }

    async fn get_platform_invitation(&self, id: Uuid) -> StoreResult<Option<PlatformInvitation>> {
        Ok(self.platform_invitations.read().await.get(&id).cloned())
    }

    async fn delete_platform_invitation(&self, id: Uuid) -> StoreResult<()> {
        self.platform_invitations.write().await.remove(&id);
        Ok(())
    }

    async fn find_platform_invitations(&self, email: &str) -> StoreResult<Vec<PlatformInvitation>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .platform_invitations
            .read()
            .await
            .values()
            .filter(|i| i.email == email)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Cache store
// ============================================================================

/// Statistics for an [`InMemoryCacheStore`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStoreStats {
    /// Single-key reads
    pub gets: usize,
    /// Multi-key reads
    pub multi_gets: usize,
    /// Writes
    pub sets: usize,
    /// Deletes
    pub deletes: usize,
}

/// In-memory [`CacheStore`] with TTL expiry.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
    multi_get: bool,
    failing: AtomicBool,
    gets: AtomicUsize,
    multi_gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCacheStore {
    /// Create a cache store supporting multi-key reads.
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            multi_get: true,
            failing: AtomicBool::new(false),
            gets: AtomicUsize::new(0),
            multi_gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    /// Create a cache store without multi-key reads.
    pub fn without_multi_get() -> Self {
        Self {
            multi_get: false,
            ..Self::new()
        }
    }

    /// Make every call fail with [`CacheError::Connection`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Call counters.
    pub fn stats(&self) -> CacheStoreStats {
        CacheStoreStats {
            gets: self.gets.load(Ordering::SeqCst),
            multi_gets: self.multi_gets.load(Ordering::SeqCst),
            sets: self.sets.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    /// Read a raw entry without touching the counters.
    pub async fn peek(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone())
    }

    fn check_available(&self) -> CacheResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CacheError::Connection("cache unavailable".to_string()));
        }
        Ok(())
    }

    fn lookup(entries: &HashMap<String, (String, Instant)>, key: &str) -> Option<String> {
        entries
            .get(key)
            .filter(|(_, expires)| *expires > Instant::now())
            .map(|(value, _)| value.clone())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        Ok(Self::lookup(&*self.entries.read().await, key))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> CacheResult<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.entries.write().await.remove(key);
        Ok(())
    }

    fn supports_multi_get(&self) -> bool {
        self.multi_get
    }

    async fn multi_get(&self, keys: &[String]) -> CacheResult<Vec<Option<String>>> {
        if !self.multi_get {
            return Err(CacheError::MultiGetUnsupported);
        }
        self.multi_gets.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let entries = self.entries.read().await;
        Ok(keys.iter().map(|key| Self::lookup(&entries, key)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_credential_grant_is_deduplicated() {
        let store = InMemoryCredentialStore::new();
        let agent = Uuid::now_v7();
        let def = CredentialDefinition::new("space-member", "space-1");

        store.grant_credential(agent, ContributorKind::User, &def).await.unwrap();
        store.grant_credential(agent, ContributorKind::User, &def).await.unwrap();

        assert_eq!(store.get_credentials(agent).await.unwrap().len(), 1);
        assert!(store.has_valid_credential(agent, &def).await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_exact_match_only() {
        let store = InMemoryCredentialStore::new();
        let agent = Uuid::now_v7();
        store
            .grant_credential(agent, ContributorKind::User, &CredentialDefinition::new("space-member", "space-1"))
            .await
            .unwrap();

        let revoked = store
            .revoke_credential(agent, &CredentialDefinition::any("space-member"))
            .await
            .unwrap();
        assert!(!revoked);

        let revoked = store
            .revoke_credential(agent, &CredentialDefinition::new("space-member", "space-1"))
            .await
            .unwrap();
        assert!(revoked);
        assert!(store.get_credentials(agent).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_batch_fetch_counts_each_agent_once() {
        let store = InMemoryCredentialStore::new();
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();

        let result = store.get_credentials_batch(&[a, b]).await.unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(store.fetch_calls(), 1);
        assert_eq!(store.fetch_count(a).await, 1);
        assert_eq!(store.fetch_count(b).await, 1);
    }

    #[tokio::test]
    async fn test_agents_with_credential_filters_kind() {
        let store = InMemoryCredentialStore::new();
        let user = Uuid::now_v7();
        let org = Uuid::now_v7();
        let def = CredentialDefinition::new("space-member", "space-1");
        store.grant_credential(user, ContributorKind::User, &def).await.unwrap();
        store.grant_credential(org, ContributorKind::Organization, &def).await.unwrap();

        assert_eq!(store.agents_with_credential(&def, None).await.unwrap().len(), 2);
        assert_eq!(
            store
                .agents_with_credential(&def, Some(ContributorKind::Organization))
                .await
                .unwrap(),
            vec![org]
        );
    }

    #[tokio::test]
    async fn test_failing_credential_store() {
        let store = InMemoryCredentialStore::new();
        store.set_failing(true);
        assert!(matches!(
            store.get_credentials(Uuid::now_v7()).await,
            Err(StoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_cache_ttl_expiry() {
        let cache = InMemoryCacheStore::new();
        cache.set("k", "v".to_string(), Duration::from_millis(0)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), None);

        cache.set("k", "v".to_string(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_cache_multi_get() {
        let cache = InMemoryCacheStore::new();
        cache.set("a", "1".to_string(), Duration::from_secs(60)).await.unwrap();

        let values = cache
            .multi_get(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![Some("1".to_string()), None]);
        assert_eq!(cache.stats().multi_gets, 1);

        let plain = InMemoryCacheStore::without_multi_get();
        assert!(!plain.supports_multi_get());
        assert_eq!(
            plain.multi_get(&["a".to_string()]).await,
            Err(CacheError::MultiGetUnsupported)
        );
    }
}
