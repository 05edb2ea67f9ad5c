//! Membership resolver
//!
//! Computes an actor's membership status and held roles for a RoleSet,
//! reading through the [`MembershipCache`].
//!
//! ```text
//! anonymous ------------------------------------> NOT_MEMBER (not cached)
//! cached status --------------------------------> cached status
//! holds entry role -----------------------------> MEMBER
//! open application -----------------------------> APPLICATION_PENDING
//! open invitation that can still be accepted ---> INVITATION_PENDING
//! otherwise ------------------------------------> NOT_MEMBER
//! ```

use roleset_authz::{ActorContext, Credential};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::application::Application;
use crate::cache::MembershipCache;
use crate::error::MembershipResult;
use crate::invitation::Invitation;
use crate::matcher::{holds_entry_role, roles_held_by};
use crate::membership::MembershipStatus;
use crate::role::RoleName;
use crate::role_set::RoleSet;
use crate::store::{CredentialStore, PersistenceStore};

/// Resolves membership of actors in RoleSets.
#[derive(Clone)]
pub struct MembershipResolver {
    credentials: Arc<dyn CredentialStore>,
    persistence: Arc<dyn PersistenceStore>,
    cache: MembershipCache,
}

impl MembershipResolver {
    /// Create a resolver.
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        persistence: Arc<dyn PersistenceStore>,
        cache: MembershipCache,
    ) -> Self {
        Self {
            credentials,
            persistence,
            cache,
        }
    }

    /// The cache resolutions read through.
    pub fn cache(&self) -> &MembershipCache {
        &self.cache
    }

    /// The credential store credentials are fetched from.
    pub fn credential_store(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    /// The persistence store workflows are looked up in.
    pub fn persistence_store(&self) -> &Arc<dyn PersistenceStore> {
        &self.persistence
    }

    // ========================================================================
    // Membership status
    // ========================================================================

    /// Resolve the membership status of `actor` in `role_set`.
    ///
    /// Anonymous actors are `NOT_MEMBER` and nothing is cached for them.
    ///
    /// # Errors
    ///
    /// - [`MembershipError::RelationshipNotLoaded`](crate::MembershipError::RelationshipNotLoaded)
    ///   if the roles of `role_set` are not hydrated
    /// - [`MembershipError::Store`](crate::MembershipError::Store) if a
    ///   collaborator fails
    pub async fn resolve_membership_status(
        &self,
        actor: &ActorContext,
        role_set: &RoleSet,
    ) -> MembershipResult<MembershipStatus> {
        match actor.actor_id {
            Some(actor_id) => self.membership_status(actor_id, role_set).await,
            None => Ok(MembershipStatus::NotMember),
        }
    }

    /// Resolve the membership status of an identified actor.
    pub async fn membership_status(
        &self,
        actor_id: Uuid,
        role_set: &RoleSet,
    ) -> MembershipResult<MembershipStatus> {
        if let Some(status) = self.cache.get_membership_status(actor_id, role_set.id).await {
            debug!(actor_id = %actor_id, role_set_id = %role_set.id, status = %status, "Membership status cache hit");
            return Ok(status);
        }

        let credentials = self.credentials.get_credentials(actor_id).await?;
        self.status_from_credentials(actor_id, role_set, &credentials)
            .await
    }

    /// Compute and cache a status from credentials already fetched.
    pub(crate) async fn status_from_credentials(
        &self,
        actor_id: Uuid,
        role_set: &RoleSet,
        credentials: &[Credential],
    ) -> MembershipResult<MembershipStatus> {
        let status = if holds_entry_role(role_set, credentials)? {
            MembershipStatus::Member
        } else if self.find_open_application(actor_id, role_set.id).await?.is_some() {
            MembershipStatus::ApplicationPending
        } else {
            match self.find_open_invitation(actor_id, role_set.id).await? {
                Some(invitation) if invitation.can_be_accepted() => MembershipStatus::InvitationPending,
                _ => MembershipStatus::NotMember,
            }
        };

        debug!(actor_id = %actor_id, role_set_id = %role_set.id, status = %status, "Resolved membership status");
        self.cache
            .set_membership_status(actor_id, role_set.id, status)
            .await;
        Ok(status)
    }

    /// The actor's non-finalized application on a RoleSet, if any.
    pub async fn find_open_application(
        &self,
        actor_id: Uuid,
        role_set_id: Uuid,
    ) -> MembershipResult<Option<Application>> {
        let applications = self
            .persistence
            .find_applications(actor_id, role_set_id)
            .await?;
        Ok(applications.into_iter().find(|a| !a.is_finalized()))
    }

    /// The actor's non-finalized invitation on a RoleSet, if any.
    pub async fn find_open_invitation(
        &self,
        actor_id: Uuid,
        role_set_id: Uuid,
    ) -> MembershipResult<Option<Invitation>> {
        let invitations = self
            .persistence
            .find_invitations(actor_id, role_set_id)
            .await?;
        Ok(invitations.into_iter().find(|i| !i.is_finalized()))
    }

    // ========================================================================
    // Roles
    // ========================================================================

    /// Roles `actor` holds in `role_set`, in definition order.
    ///
    /// Anonymous actors hold no roles.
    pub async fn resolve_roles(
        &self,
        actor: &ActorContext,
        role_set: &RoleSet,
    ) -> MembershipResult<Vec<RoleName>> {
        match actor.actor_id {
            Some(actor_id) => self.roles(actor_id, role_set).await,
            None => Ok(Vec::new()),
        }
    }

    /// Roles an identified actor holds in `role_set`.
    pub async fn roles(&self, actor_id: Uuid, role_set: &RoleSet) -> MembershipResult<Vec<RoleName>> {
        if let Some(roles) = self.cache.get_roles(actor_id, role_set.id).await {
            return Ok(roles);
        }
        let credentials = self.credentials.get_credentials(actor_id).await?;
        self.roles_from_credentials(actor_id, role_set, &credentials)
            .await
    }

    /// Compute and cache held roles from credentials already fetched.
    pub(crate) async fn roles_from_credentials(
        &self,
        actor_id: Uuid,
        role_set: &RoleSet,
        credentials: &[Credential],
    ) -> MembershipResult<Vec<RoleName>> {
        let roles = roles_held_by(role_set, credentials)?;
        self.cache.set_roles(actor_id, role_set.id, &roles).await;
        Ok(roles)
    }

    /// Check if the actor holds the entry role, through the `is_member`
    /// cache concern.
    pub async fn is_member(&self, actor_id: Uuid, role_set: &RoleSet) -> MembershipResult<bool> {
        if let Some(is_member) = self.cache.get_is_member(actor_id, role_set.id).await {
            return Ok(is_member);
        }
        let credentials = self.credentials.get_credentials(actor_id).await?;
        let is_member = holds_entry_role(role_set, &credentials)?;
        self.cache.set_is_member(actor_id, role_set.id, is_member).await;
        Ok(is_member)
    }
}

impl std::fmt::Debug for MembershipResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipResolver")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
