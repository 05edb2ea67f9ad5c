//! Membership cache
//!
//! Typed cache keys over a [`CacheStore`]. Every read or write failure is
//! logged as a warning and treated as a miss (or a no-op), so an unreachable
//! cache degrades to "no cache" instead of failing a resolution.

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::MembershipConfig;
use crate::membership::MembershipStatus;
use crate::role::RoleName;
use crate::store::CacheStore;

/// What a cache entry holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheConcern {
    /// [`MembershipStatus`]
    MembershipStatus,
    /// Held role names
    Roles,
    /// Entry-role membership flag
    IsMember,
}

impl CacheConcern {
    /// Every concern, in invalidation order.
    pub const ALL: [CacheConcern; 3] = [
        CacheConcern::MembershipStatus,
        CacheConcern::Roles,
        CacheConcern::IsMember,
    ];

    /// Get string representation of the concern.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheConcern::MembershipStatus => "membership_status",
            CacheConcern::Roles => "roles",
            CacheConcern::IsMember => "is_member",
        }
    }
}

/// Cache key `(concern, actor, roleSet)`.
///
/// # Example
///
/// ```
/// use roleset_core::cache::{CacheConcern, CacheKey};
/// use uuid::Uuid;
///
/// let actor = Uuid::nil();
/// let role_set = Uuid::nil();
/// let key = CacheKey::new(CacheConcern::Roles, actor, role_set);
/// assert_eq!(
///     key.render("roleset"),
///     format!("roleset:roles:{actor}:{role_set}")
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Concern cached
    pub concern: CacheConcern,
    /// Actor the entry is about
    pub actor_id: Uuid,
    /// RoleSet the entry is about
    pub role_set_id: Uuid,
}

impl CacheKey {
    /// Create a key.
    pub fn new(concern: CacheConcern, actor_id: Uuid, role_set_id: Uuid) -> Self {
        Self {
            concern,
            actor_id,
            role_set_id,
        }
    }

    /// Render the key for the store under a namespace prefix.
    pub fn render(&self, prefix: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            prefix,
            self.concern.as_str(),
            self.actor_id,
            self.role_set_id
        )
    }
}

/// Cached membership resolutions.
#[derive(Clone)]
pub struct MembershipCache {
    store: Arc<dyn CacheStore>,
    ttl: Duration,
    prefix: String,
    enabled: bool,
}

impl MembershipCache {
    /// Create a cache over `store` configured by `config`.
    pub fn new(store: Arc<dyn CacheStore>, config: &MembershipConfig) -> Self {
        Self {
            store,
            ttl: config.cache_ttl(),
            prefix: config.cache_key_prefix.clone(),
            enabled: config.cache_enabled,
        }
    }

    /// Whether the cache is consulted at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Rendered store key.
    pub fn key(&self, key: &CacheKey) -> String {
        key.render(&self.prefix)
    }

    /// Read and decode an entry; `None` on miss or any failure.
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.enabled {
            return None;
        }
        let rendered = self.key(key);
        match self.store.get(&rendered).await {
            Ok(Some(raw)) => decode(&rendered, &raw),
            Ok(None) => None,
            Err(e) => {
                warn!(key = %rendered, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// Encode and write an entry; failures are logged and dropped.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T) {
        if !self.enabled {
            return;
        }
        let rendered = self.key(key);
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %rendered, error = %e, "Cache value could not be encoded");
                return;
            }
        };
        if let Err(e) = self.store.set(&rendered, raw, self.ttl).await {
            warn!(key = %rendered, error = %e, "Cache write failed");
        }
    }

    /// Delete an entry; failures are logged and dropped.
    pub async fn delete(&self, key: &CacheKey) {
        if !self.enabled {
            return;
        }
        let rendered = self.key(key);
        if let Err(e) = self.store.delete(&rendered).await {
            warn!(key = %rendered, error = %e, "Cache delete failed");
        }
    }

    /// Read many entries, in key order.
    ///
    /// One multi-key round trip when the store supports it; otherwise
    /// sequential single reads, each failing independently.
    pub async fn get_many<T: DeserializeOwned>(&self, keys: &[CacheKey]) -> Vec<Option<T>> {
        if !self.enabled || keys.is_empty() {
            return keys.iter().map(|_| None).collect();
        }

        let rendered: Vec<String> = keys.iter().map(|k| self.key(k)).collect();

        if self.store.supports_multi_get() {
            return match self.store.multi_get(&rendered).await {
                Ok(values) if values.len() == rendered.len() => rendered
                    .iter()
                    .zip(values)
                    .map(|(key, raw)| raw.and_then(|raw| decode(key, &raw)))
                    .collect(),
                Ok(values) => {
                    warn!(
                        expected = rendered.len(),
                        received = values.len(),
                        "Cache multi-get returned the wrong number of values"
                    );
                    keys.iter().map(|_| None).collect()
                }
                Err(e) => {
                    warn!(keys = rendered.len(), error = %e, "Cache multi-get failed, treating as miss");
                    keys.iter().map(|_| None).collect()
                }
            };
        }

        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await);
        }
        results
    }

    // ========================================================================
    // Typed concerns
    // ========================================================================

    /// Cached membership status.
    pub async fn get_membership_status(&self, actor_id: Uuid, role_set_id: Uuid) -> Option<MembershipStatus> {
        self.get(&CacheKey::new(CacheConcern::MembershipStatus, actor_id, role_set_id))
            .await
    }

    /// Cache a membership status.
    pub async fn set_membership_status(&self, actor_id: Uuid, role_set_id: Uuid, status: MembershipStatus) {
        self.set(
            &CacheKey::new(CacheConcern::MembershipStatus, actor_id, role_set_id),
            &status,
        )
        .await
    }

    /// Cached held roles.
    pub async fn get_roles(&self, actor_id: Uuid, role_set_id: Uuid) -> Option<Vec<RoleName>> {
        self.get(&CacheKey::new(CacheConcern::Roles, actor_id, role_set_id))
            .await
    }

    /// Cache held roles.
    pub async fn set_roles(&self, actor_id: Uuid, role_set_id: Uuid, roles: &[RoleName]) {
        self.set(&CacheKey::new(CacheConcern::Roles, actor_id, role_set_id), &roles)
            .await
    }

    /// Cached entry-role membership flag.
    pub async fn get_is_member(&self, actor_id: Uuid, role_set_id: Uuid) -> Option<bool> {
        self.get(&CacheKey::new(CacheConcern::IsMember, actor_id, role_set_id))
            .await
    }

    /// Cache the entry-role membership flag.
    pub async fn set_is_member(&self, actor_id: Uuid, role_set_id: Uuid, is_member: bool) {
        self.set(&CacheKey::new(CacheConcern::IsMember, actor_id, role_set_id), &is_member)
            .await
    }

    /// Add a role to a cached roles list. No-op when nothing is cached.
    pub async fn append_role(&self, actor_id: Uuid, role_set_id: Uuid, role: RoleName) {
        let Some(mut roles) = self.get_roles(actor_id, role_set_id).await else {
            return;
        };
        if !roles.contains(&role) {
            roles.push(role);
            self.set_roles(actor_id, role_set_id, &roles).await;
        }
    }

    /// Cached statuses for many pairs, in pair order.
    pub async fn batch_membership_status(&self, pairs: &[(Uuid, Uuid)]) -> Vec<Option<MembershipStatus>> {
        let keys: Vec<CacheKey> = pairs
            .iter()
            .map(|(actor, role_set)| CacheKey::new(CacheConcern::MembershipStatus, *actor, *role_set))
            .collect();
        self.get_many(&keys).await
    }

    /// Cached roles for many pairs, in pair order.
    pub async fn batch_roles(&self, pairs: &[(Uuid, Uuid)]) -> Vec<Option<Vec<RoleName>>> {
        let keys: Vec<CacheKey> = pairs
            .iter()
            .map(|(actor, role_set)| CacheKey::new(CacheConcern::Roles, *actor, *role_set))
            .collect();
        self.get_many(&keys).await
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Delete every concern for one `(actor, roleSet)` pair, concurrently.
    pub async fn invalidate(&self, actor_id: Uuid, role_set_id: Uuid) {
        if !self.enabled {
            return;
        }
        let keys: Vec<CacheKey> = CacheConcern::ALL
            .iter()
            .map(|concern| CacheKey::new(*concern, actor_id, role_set_id))
            .collect();
        join_all(keys.iter().map(|key| self.delete(key))).await;
        debug!(actor_id = %actor_id, role_set_id = %role_set_id, "Invalidated membership cache");
    }

    /// Delete every concern for many pairs, concurrently.
    pub async fn invalidate_many(&self, pairs: &[(Uuid, Uuid)]) {
        join_all(
            pairs
                .iter()
                .map(|(actor_id, role_set_id)| self.invalidate(*actor_id, *role_set_id)),
        )
        .await;
    }
}

fn decode<T: DeserializeOwned>(key: &str, raw: &str) -> Option<T> {
    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key = %key, error = %e, "Cached value could not be decoded, treating as miss");
            None
        }
    }
}

impl std::fmt::Debug for MembershipCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipCache")
            .field("ttl", &self.ttl)
            .field("prefix", &self.prefix)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
