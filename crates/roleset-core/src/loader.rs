//! Batch loader
//!
//! Resolves many `(actor, roleSet)` keys in one wave. Within a batch:
//!
//! - duplicate keys are computed once and share the result
//! - cache reads go out in a single multi-key round trip when supported
//! - credentials are fetched once per unique actor, in one call
//! - RoleSets are loaded once per unique id
//! - the remaining per-key work runs concurrently and is joined before
//!   returning
//!
//! Results come back in key order, one per key.

use futures::future::join_all;
use roleset_authz::Credential;
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::error::{MembershipError, MembershipResult};
use crate::membership::MembershipStatus;
use crate::resolver::MembershipResolver;
use crate::role::RoleName;
use crate::role_set::{RoleSet, RoleSetRelations};

/// A `(actor, roleSet)` resolution key.
pub type MembershipKey = (Uuid, Uuid);

/// Batched front of a [`MembershipResolver`].
#[derive(Debug, Clone)]
pub struct MembershipLoader {
    resolver: MembershipResolver,
}

/// Inputs loaded once for every cache miss of a batch.
struct BatchInputs {
    credentials: MembershipResult<HashMap<Uuid, Vec<Credential>>>,
    role_sets: HashMap<Uuid, MembershipResult<RoleSet>>,
}

impl BatchInputs {
    fn for_key(&self, key: &MembershipKey) -> MembershipResult<(&[Credential], &RoleSet)> {
        let (actor_id, role_set_id) = key;
        let credentials = match &self.credentials {
            Ok(map) => map.get(actor_id).map(Vec::as_slice).unwrap_or(&[]),
            Err(e) => return Err(e.clone()),
        };
        let role_set = match self.role_sets.get(role_set_id) {
            Some(Ok(role_set)) => role_set,
            Some(Err(e)) => return Err(e.clone()),
            None => return Err(MembershipError::not_found("RoleSet", role_set_id)),
        };
        Ok((credentials, role_set))
    }
}

/// Unique keys in first-seen order, and each key's slot among them.
fn dedupe(keys: &[MembershipKey]) -> (Vec<MembershipKey>, HashMap<MembershipKey, usize>) {
    let mut unique = Vec::with_capacity(keys.len());
    let mut slots = HashMap::with_capacity(keys.len());
    for key in keys {
        slots.entry(*key).or_insert_with(|| {
            unique.push(*key);
            unique.len() - 1
        });
    }
    (unique, slots)
}

impl MembershipLoader {
    /// Create a loader over a resolver.
    pub fn new(resolver: MembershipResolver) -> Self {
        Self { resolver }
    }

    /// Resolve membership status for every key, in key order.
    ///
    /// A failure affects only the keys that depend on it.
    pub async fn batch_resolve(&self, keys: &[MembershipKey]) -> Vec<MembershipResult<MembershipStatus>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let (unique, slots) = dedupe(keys);
        let cached = self.resolver.cache().batch_membership_status(&unique).await;

        let misses: Vec<MembershipKey> = unique
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(key, _)| *key)
            .collect();
        debug!(keys = keys.len(), unique = unique.len(), misses = misses.len(), "Batch resolving membership status");
        let inputs = self.load_inputs(&misses).await;

        let resolver = &self.resolver;
        let inputs = &inputs;
        let resolved = join_all(unique.iter().zip(cached).map(|(key, hit)| async move {
            if let Some(status) = hit {
                return Ok(status);
            }
            let (credentials, role_set) = inputs.for_key(key)?;
            resolver
                .status_from_credentials(key.0, role_set, credentials)
                .await
        }))
        .await;

        keys.iter().map(|key| resolved[slots[key]].clone()).collect()
    }

    /// Resolve held roles for every key, in key order.
    pub async fn batch_resolve_roles(&self, keys: &[MembershipKey]) -> Vec<MembershipResult<Vec<RoleName>>> {
        if keys.is_empty() {
            return Vec::new();
        }
        let (unique, slots) = dedupe(keys);
        let cached = self.resolver.cache().batch_roles(&unique).await;

        let misses: Vec<MembershipKey> = unique
            .iter()
            .zip(&cached)
            .filter(|(_, hit)| hit.is_none())
            .map(|(key, _)| *key)
            .collect();
        debug!(keys = keys.len(), unique = unique.len(), misses = misses.len(), "Batch resolving roles");
        let inputs = self.load_inputs(&misses).await;

        let resolver = &self.resolver;
        let inputs = &inputs;
        let resolved = join_all(unique.iter().zip(cached).map(|(key, hit)| async move {
            if let Some(roles) = hit {
                return Ok(roles);
            }
            let (credentials, role_set) = inputs.for_key(key)?;
            resolver
                .roles_from_credentials(key.0, role_set, credentials)
                .await
        }))
        .await;

        keys.iter().map(|key| resolved[slots[key]].clone()).collect()
    }

    /// Fetch credentials for the unique actors of `misses` in one call and
    /// load their unique RoleSets concurrently.
    async fn load_inputs(&self, misses: &[MembershipKey]) -> BatchInputs {
        if misses.is_empty() {
            return BatchInputs {
                credentials: Ok(HashMap::new()),
                role_sets: HashMap::new(),
            };
        }

        let mut actor_ids: Vec<Uuid> = misses.iter().map(|(actor, _)| *actor).collect();
        actor_ids.sort();
        actor_ids.dedup();

        let mut role_set_ids: Vec<Uuid> = misses.iter().map(|(_, role_set)| *role_set).collect();
        role_set_ids.sort();
        role_set_ids.dedup();

        let persistence = self.resolver.persistence_store();
        let credentials_fetch = self
            .resolver
            .credential_store()
            .get_credentials_batch(&actor_ids);
        let role_sets_fetch = join_all(role_set_ids.iter().map(|id| async move {
            let loaded = persistence
                .get_role_set(*id, RoleSetRelations::roles())
                .await
                .map_err(MembershipError::from)
                .and_then(|found| found.ok_or_else(|| MembershipError::not_found("RoleSet", id)));
            (*id, loaded)
        }));

        let (credentials, role_sets) = futures::join!(credentials_fetch, role_sets_fetch);

        BatchInputs {
            credentials: credentials.map_err(MembershipError::from),
            role_sets: role_sets.into_iter().collect(),
        }
    }
}
