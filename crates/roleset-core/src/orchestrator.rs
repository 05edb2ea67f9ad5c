//! RoleSet orchestrator
//!
//! The mutating front of the membership engine. Every operation here:
//!
//! - validates against the RoleSet's roles and policies before touching a
//!   collaborator
//! - invalidates the cache concerns of every affected `(actor, roleSet)`
//!   pair before returning
//! - publishes domain events best-effort after the mutation, logging
//!   publish failures instead of surfacing them
//!
//! ## Implicit roles
//!
//! ```text
//! space ADMIN in a child RoleSet  -> space-subspace-admin @ parent admin resource
//! organization ADMIN or OWNER     -> account-admin @ organization admin resource
//! open space invitation           -> space-member-invitee @ space admin resource
//! ```

use roleset_authz::{
    credential_types, ActorContext, AuthorizationEvaluator, Credential, CredentialDefinition,
    PolicyEvaluator,
};
use roleset_events::{EventBus, MembershipEvent};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::{Application, ApplicationQuestion};
use crate::cache::MembershipCache;
use crate::config::{ConfigError, MembershipConfig};
use crate::error::{MembershipError, MembershipResult};
use crate::invitation::{InviteInput, Invitation, PlatformInvitation};
use crate::lifecycle::application::{ApplicationAction, ApplicationEvent, ApplicationState};
use crate::lifecycle::invitation::{InvitationAction, InvitationEvent, InvitationState};
use crate::lifecycle::LifecycleProjection;
use crate::loader::{MembershipKey, MembershipLoader};
use crate::matcher::{holds_entry_role, holds_role, roles_held_by, CredentialMatcher};
use crate::membership::{ImplicitRole, MembershipStatus};
use crate::resolver::MembershipResolver;
use crate::role::{ContributorKind, RoleName};
use crate::role_set::{CreateRoleSetInput, EntitlementType, RoleSet, RoleSetRelations, RoleSetType};
use crate::store::{CacheStore, CredentialStore, PersistenceStore};

/// Coordinates role assignment, workflows and RoleSet administration.
pub struct RoleSetOrchestrator {
    credentials: Arc<dyn CredentialStore>,
    persistence: Arc<dyn PersistenceStore>,
    cache: MembershipCache,
    resolver: MembershipResolver,
    loader: MembershipLoader,
    matcher: CredentialMatcher,
    evaluator: Arc<dyn AuthorizationEvaluator>,
    events: Option<Arc<dyn EventBus>>,
}

impl RoleSetOrchestrator {
    /// Create an orchestrator over its collaborators.
    ///
    /// Guards are evaluated by a [`PolicyEvaluator`] and no events are
    /// published until an event bus is attached.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] if `config` fails
    /// [`MembershipConfig::validate`].
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        persistence: Arc<dyn PersistenceStore>,
        cache_store: Arc<dyn CacheStore>,
        config: &MembershipConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let cache = MembershipCache::new(cache_store, config);
        let resolver = MembershipResolver::new(credentials.clone(), persistence.clone(), cache.clone());
        Ok(Self {
            loader: MembershipLoader::new(resolver.clone()),
            matcher: CredentialMatcher::new(credentials.clone()),
            credentials,
            persistence,
            cache,
            resolver,
            evaluator: Arc::new(PolicyEvaluator::new()),
            events: None,
        })
    }

    /// Replace the evaluator lifecycle guards consult.
    pub fn with_evaluator(mut self, evaluator: Arc<dyn AuthorizationEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Publish domain events to `bus`.
    pub fn with_event_bus(mut self, bus: Arc<dyn EventBus>) -> Self {
        self.events = Some(bus);
        self
    }

    /// The resolver behind membership queries.
    pub fn resolver(&self) -> &MembershipResolver {
        &self.resolver
    }

    /// The batch loader behind batch queries.
    pub fn loader(&self) -> &MembershipLoader {
        &self.loader
    }

    /// The membership cache.
    pub fn cache(&self) -> &MembershipCache {
        &self.cache
    }

    /// Build the authorization context of an identified actor: its stored
    /// credentials plus the self credential scoped to its own id.
    pub async fn actor_context(&self, actor_id: Uuid) -> MembershipResult<ActorContext> {
        let credentials = self.credentials.get_credentials(actor_id).await?;
        Ok(ActorContext::for_actor(actor_id, credentials)
            .with_credential(Credential::new(credential_types::USER_SELF, actor_id.to_string())))
    }

    // ========================================================================
    // RoleSet administration
    // ========================================================================

    /// Create and persist a RoleSet.
    ///
    /// When the input names a parent, the parent is loaded and every role's
    /// parent credentials are computed from it.
    pub async fn create_role_set(&self, input: CreateRoleSetInput) -> MembershipResult<RoleSet> {
        let parent_id = input.parent_role_set_id;
        let mut role_set = RoleSet::create(input)?;
        if let Some(parent_id) = parent_id {
            let parent = self.get_role_set_or_fail(parent_id, RoleSetRelations::roles()).await?;
            link_parent(&mut role_set, &parent)?;
        }
        self.persistence.save_role_set(&role_set).await?;

        info!(
            role_set_id = %role_set.id,
            kind = role_set.kind.as_str(),
            parent_role_set_id = ?role_set.parent_role_set_id,
            "RoleSet created"
        );
        Ok(role_set)
    }

    /// Load a RoleSet with the requested relations or fail with `NotFound`.
    pub async fn get_role_set_or_fail(
        &self,
        id: Uuid,
        relations: RoleSetRelations,
    ) -> MembershipResult<RoleSet> {
        self.persistence
            .get_role_set(id, relations)
            .await?
            .ok_or_else(|| MembershipError::not_found("RoleSet", id))
    }

    /// Link `child_id` under `parent_id` and recompute parent credentials.
    pub async fn set_parent_role_set(&self, child_id: Uuid, parent_id: Uuid) -> MembershipResult<RoleSet> {
        if child_id == parent_id {
            return Err(MembershipError::Validation(format!(
                "RoleSet {} cannot be its own parent",
                child_id
            )));
        }
        let mut child = self.get_role_set_or_fail(child_id, RoleSetRelations::roles()).await?;
        let parent = self.get_role_set_or_fail(parent_id, RoleSetRelations::roles()).await?;
        link_parent(&mut child, &parent)?;
        self.persistence.save_role_set(&child).await?;

        info!(role_set_id = %child_id, parent_role_set_id = %parent_id, "RoleSet parent set");
        Ok(child)
    }

    /// Unlink a RoleSet from its parent and clear every parent credential.
    pub async fn remove_parent_role_set(&self, id: Uuid) -> MembershipResult<RoleSet> {
        let mut role_set = self.get_role_set_or_fail(id, RoleSetRelations::roles()).await?;
        for role in role_set.roles_mut()? {
            role.parent_credentials.clear();
        }
        role_set.parent_role_set_id = None;
        role_set.touch();
        self.persistence.save_role_set(&role_set).await?;

        info!(role_set_id = %id, "RoleSet parent removed");
        Ok(role_set)
    }

    /// Rewrite the resource id of every role credential of a RoleSet.
    pub async fn update_role_resource_id(&self, id: Uuid, resource_id: &str) -> MembershipResult<RoleSet> {
        let mut role_set = self.get_role_set_or_fail(id, RoleSetRelations::roles()).await?;
        role_set.update_role_resource_id(resource_id)?;
        self.persistence.save_role_set(&role_set).await?;

        info!(role_set_id = %id, resource_id, "RoleSet role resource id updated");
        Ok(role_set)
    }

    /// Delete a RoleSet and everything it owns.
    ///
    /// Role credentials are revoked from every holder without policy-limit
    /// validation, implicit credentials scoped to the RoleSet are revoked,
    /// and every workflow is deleted.
    pub async fn remove_role_set(&self, id: Uuid) -> MembershipResult<()> {
        let role_set = self.get_role_set_or_fail(id, RoleSetRelations::all()).await?;
        let mut affected: HashSet<Uuid> = HashSet::new();

        let cleared = async {
            for role in role_set.roles()? {
                let holders = self
                    .credentials
                    .agents_with_credential(&role.credential, None)
                    .await?;
                for actor_id in holders {
                    affected.insert(actor_id);
                    self.remove_role(&role_set, role.name, actor_id, false).await?;
                }
            }

            for definition in scoped_implicit_credentials(&role_set)? {
                for actor_id in self.credentials.agents_with_credential(&definition, None).await? {
                    affected.insert(actor_id);
                    self.credentials.revoke_credential(actor_id, &definition).await?;
                }
            }

            for application_id in role_set.application_ids()? {
                if let Some(application) = self.persistence.get_application(*application_id).await? {
                    affected.insert(application.applicant_id);
                    self.persistence.delete_application(application.id).await?;
                }
            }
            for invitation_id in role_set.invitation_ids()? {
                if let Some(invitation) = self.persistence.get_invitation(*invitation_id).await? {
                    affected.insert(invitation.invited_actor_id);
                    self.persistence.delete_invitation(invitation.id).await?;
                }
            }
            for platform_invitation_id in role_set.platform_invitation_ids()? {
                self.persistence
                    .delete_platform_invitation(*platform_invitation_id)
                    .await?;
            }
            Ok::<(), MembershipError>(())
        }
        .await;

        let pairs: Vec<(Uuid, Uuid)> = affected.iter().map(|actor_id| (*actor_id, id)).collect();
        self.cache.invalidate_many(&pairs).await;
        cleared?;
        self.persistence.delete_role_set(id).await?;

        info!(role_set_id = %id, affected_actors = affected.len(), "RoleSet removed");
        self.publish(&role_set, MembershipEvent::RoleSetRemoved { role_set_id: id })
            .await;
        Ok(())
    }

    // ========================================================================
    // Role assignment
    // ========================================================================

    /// Grant `role_name` in `role_set` to an actor.
    ///
    /// Returns `false` when the actor already held the role.
    ///
    /// # Errors
    ///
    /// - [`MembershipError::Membership`] if the RoleSet has a parent and the
    ///   actor is not a member of it, or lacks a role the parent must also
    ///   grant
    /// - [`MembershipError::PolicyLimit`] if the role is full for the
    ///   actor's contributor kind
    pub async fn assign_role(
        &self,
        role_set: &RoleSet,
        role_name: RoleName,
        actor_id: Uuid,
        kind: ContributorKind,
        trigger_side_effects: bool,
    ) -> MembershipResult<bool> {
        let role = role_set.role(role_name)?;
        let credentials = self.credentials.get_credentials(actor_id).await?;

        let parent = match role_set.parent_role_set_id {
            Some(parent_id) => {
                let parent = self.get_role_set_or_fail(parent_id, RoleSetRelations::roles()).await?;
                if !holds_entry_role(&parent, &credentials)? {
                    return Err(MembershipError::Membership(format!(
                        "Unable to assign actor {} to role {} in RoleSet {}: not a member of parent RoleSet {}",
                        actor_id, role_name, role_set.id, parent.id
                    )));
                }
                if role.requires_same_role_in_parent && !holds_role(&parent, role_name, &credentials)? {
                    return Err(MembershipError::Membership(format!(
                        "Unable to assign actor {} to role {} in RoleSet {}: role not held in parent RoleSet {}",
                        actor_id, role_name, role_set.id, parent.id
                    )));
                }
                Some(parent)
            }
            None => None,
        };

        if role.is_satisfied_by(&credentials) {
            debug!(actor_id = %actor_id, role_set_id = %role_set.id, role = %role_name, "Role already held");
            return Ok(false);
        }

        let policy = role.policy_for(kind);
        let holders = self
            .credentials
            .agents_with_credential(&role.credential, Some(kind))
            .await?
            .len();
        if !policy.allows_assign(holders) {
            return Err(MembershipError::PolicyLimit(format!(
                "Max limit of {} {} contributors reached for role {} in RoleSet {}",
                policy.maximum,
                kind.as_str(),
                role_name,
                role_set.id
            )));
        }

        let granted = async {
            self.credentials
                .grant_credential(actor_id, kind, &role.credential)
                .await?;
            self.grant_implicit_roles(role_set, parent.as_ref(), role_name, actor_id, kind)
                .await?;
            Ok::<(), MembershipError>(())
        }
        .await;
        self.cache.invalidate(actor_id, role_set.id).await;
        granted?;

        info!(
            actor_id = %actor_id,
            role_set_id = %role_set.id,
            role = %role_name,
            kind = kind.as_str(),
            "Role assigned"
        );
        self.publish(
            role_set,
            MembershipEvent::RoleAssigned {
                role_set_id: role_set.id,
                actor_id,
                role_name: role_name.as_str().to_string(),
            },
        )
        .await;
        if trigger_side_effects && role_set.is_entry_role(role_name) {
            self.publish(
                role_set,
                MembershipEvent::MemberJoined {
                    role_set_id: role_set.id,
                    actor_id,
                    contributor_kind: kind.as_str().to_string(),
                },
            )
            .await;
        }
        Ok(true)
    }

    /// Revoke `role_name` in `role_set` from an actor.
    ///
    /// Returns `false` when the actor did not hold the role.
    ///
    /// # Errors
    ///
    /// [`MembershipError::PolicyLimit`] if `validate_policy_limits` is set
    /// and the role would fall below its minimum.
    pub async fn remove_role(
        &self,
        role_set: &RoleSet,
        role_name: RoleName,
        actor_id: Uuid,
        validate_policy_limits: bool,
    ) -> MembershipResult<bool> {
        let role = role_set.role(role_name)?;
        let credentials = self.credentials.get_credentials(actor_id).await?;
        if !role.is_satisfied_by(&credentials) {
            debug!(actor_id = %actor_id, role_set_id = %role_set.id, role = %role_name, "Role not held");
            self.cache.invalidate(actor_id, role_set.id).await;
            return Ok(false);
        }

        if validate_policy_limits {
            let kind = self
                .credentials
                .agent_kind(actor_id)
                .await?
                .unwrap_or(ContributorKind::User);
            let policy = role.policy_for(kind);
            let holders = self
                .credentials
                .agents_with_credential(&role.credential, Some(kind))
                .await?
                .len();
            if !policy.allows_remove(holders) {
                return Err(MembershipError::PolicyLimit(format!(
                    "Min limit of {} {} contributors reached for role {} in RoleSet {}",
                    policy.minimum,
                    kind.as_str(),
                    role_name,
                    role_set.id
                )));
            }
        }

        let revoked = async {
            // A wildcard role is held through concrete credentials; revoke each one.
            let held: HashSet<CredentialDefinition> = credentials
                .iter()
                .filter(|credential| role.credential.is_satisfied_by(credential))
                .map(Credential::definition)
                .collect();
            for definition in &held {
                self.credentials.revoke_credential(actor_id, definition).await?;
            }
            let remaining = self.credentials.get_credentials(actor_id).await?;
            if role.is_satisfied_by(&remaining) {
                return Err(MembershipError::Membership(format!(
                    "Unable to remove role {} in RoleSet {} from actor {}: credential still held",
                    role_name, role_set.id, actor_id
                )));
            }
            self.revoke_implicit_roles(role_set, role_name, actor_id).await?;
            Ok::<(), MembershipError>(())
        }
        .await;
        self.cache.invalidate(actor_id, role_set.id).await;
        revoked?;

        info!(actor_id = %actor_id, role_set_id = %role_set.id, role = %role_name, "Role removed");
        self.publish(
            role_set,
            MembershipEvent::RoleRemoved {
                role_set_id: role_set.id,
                actor_id,
                role_name: role_name.as_str().to_string(),
            },
        )
        .await;
        Ok(true)
    }

    /// Revoke every role an actor holds in `role_set`, honoring policy
    /// limits. Returns the removed roles in definition order.
    pub async fn remove_actor_from_all_roles(
        &self,
        role_set: &RoleSet,
        actor_id: Uuid,
    ) -> MembershipResult<Vec<RoleName>> {
        let credentials = self.credentials.get_credentials(actor_id).await?;
        let held = roles_held_by(role_set, &credentials)?;
        let mut removed = Vec::with_capacity(held.len());
        for role_name in held {
            if self.remove_role(role_set, role_name, actor_id, true).await? {
                removed.push(role_name);
            }
        }
        Ok(removed)
    }

    async fn grant_implicit_roles(
        &self,
        role_set: &RoleSet,
        parent: Option<&RoleSet>,
        role_name: RoleName,
        actor_id: Uuid,
        kind: ContributorKind,
    ) -> MembershipResult<()> {
        let definition = match (role_set.kind, role_name, parent) {
            (RoleSetType::Space, RoleName::Admin, Some(parent)) => {
                scoped_credential(parent, credential_types::SPACE_SUBSPACE_ADMIN)?
            }
            (RoleSetType::Organization, RoleName::Admin | RoleName::Owner, _) => {
                scoped_credential(role_set, credential_types::ACCOUNT_ADMIN)?
            }
            _ => None,
        };
        let Some(definition) = definition else {
            return Ok(());
        };
        if !self.credentials.has_valid_credential(actor_id, &definition).await? {
            self.credentials.grant_credential(actor_id, kind, &definition).await?;
            debug!(actor_id = %actor_id, credential = %definition, "Implicit credential granted");
        }
        Ok(())
    }

    async fn revoke_implicit_roles(
        &self,
        role_set: &RoleSet,
        role_name: RoleName,
        actor_id: Uuid,
    ) -> MembershipResult<()> {
        match (role_set.kind, role_name, role_set.parent_role_set_id) {
            (RoleSetType::Space, RoleName::Admin, Some(parent_id)) => {
                let Some(parent) = self
                    .persistence
                    .get_role_set(parent_id, RoleSetRelations::roles())
                    .await?
                else {
                    warn!(role_set_id = %role_set.id, parent_role_set_id = %parent_id, "Parent RoleSet missing while removing subspace admin");
                    return Ok(());
                };
                let Some(definition) = scoped_credential(&parent, credential_types::SPACE_SUBSPACE_ADMIN)? else {
                    return Ok(());
                };

                let credentials = self.credentials.get_credentials(actor_id).await?;
                let peers = self.persistence.child_role_sets(parent_id).await?;
                let mut still_admin = false;
                for peer in peers.iter().filter(|peer| peer.id != role_set.id) {
                    if holds_role_if_defined(peer, RoleName::Admin, &credentials)? {
                        still_admin = true;
                        break;
                    }
                }
                if !still_admin {
                    self.credentials.revoke_credential(actor_id, &definition).await?;
                    debug!(actor_id = %actor_id, credential = %definition, "Implicit credential revoked");
                }
            }
            (RoleSetType::Organization, RoleName::Admin | RoleName::Owner, _) => {
                let Some(definition) = scoped_credential(role_set, credential_types::ACCOUNT_ADMIN)? else {
                    return Ok(());
                };
                let credentials = self.credentials.get_credentials(actor_id).await?;
                let still_admin = holds_role_if_defined(role_set, RoleName::Admin, &credentials)?
                    || holds_role_if_defined(role_set, RoleName::Owner, &credentials)?;
                if !still_admin {
                    self.credentials.revoke_credential(actor_id, &definition).await?;
                    debug!(actor_id = %actor_id, credential = %definition, "Implicit credential revoked");
                }
            }
            _ => {}
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Check if an actor holds `role_name` in `role_set`.
    pub async fn is_in_role(&self, actor_id: Uuid, role_set: &RoleSet, role_name: RoleName) -> MembershipResult<bool> {
        self.matcher.is_in_role(actor_id, role_set, role_name).await
    }

    /// Check if an actor holds the entry role, through the cache.
    pub async fn is_member(&self, actor_id: Uuid, role_set: &RoleSet) -> MembershipResult<bool> {
        self.resolver.is_member(actor_id, role_set).await
    }

    /// Membership status of `actor` in `role_set`.
    pub async fn resolve_membership_status(
        &self,
        actor: &ActorContext,
        role_set: &RoleSet,
    ) -> MembershipResult<MembershipStatus> {
        self.resolver.resolve_membership_status(actor, role_set).await
    }

    /// Roles `actor` holds in `role_set`.
    pub async fn resolve_roles(&self, actor: &ActorContext, role_set: &RoleSet) -> MembershipResult<Vec<RoleName>> {
        self.resolver.resolve_roles(actor, role_set).await
    }

    /// Batched [`resolve_membership_status`](Self::resolve_membership_status).
    pub async fn batch_resolve(&self, keys: &[MembershipKey]) -> Vec<MembershipResult<MembershipStatus>> {
        self.loader.batch_resolve(keys).await
    }

    /// Batched [`resolve_roles`](Self::resolve_roles).
    pub async fn batch_resolve_roles(&self, keys: &[MembershipKey]) -> Vec<MembershipResult<Vec<RoleName>>> {
        self.loader.batch_resolve_roles(keys).await
    }

    /// Roles held in `role_set` by each of `actor_ids`, with a single
    /// credential fetch.
    pub async fn roles_for_actors(
        &self,
        role_set: &RoleSet,
        actor_ids: &[Uuid],
    ) -> MembershipResult<HashMap<Uuid, Vec<RoleName>>> {
        role_set.roles()?;
        let credentials = self.credentials.get_credentials_batch(actor_ids).await?;
        let mut result = HashMap::with_capacity(actor_ids.len());
        for actor_id in actor_ids {
            let held = match credentials.get(actor_id) {
                Some(credentials) => roles_held_by(role_set, credentials)?,
                None => Vec::new(),
            };
            result.insert(*actor_id, held);
        }
        Ok(result)
    }

    /// Actors holding `role_name`, optionally of one contributor kind.
    pub async fn actors_with_role(
        &self,
        role_set: &RoleSet,
        role_name: RoleName,
        kind: Option<ContributorKind>,
    ) -> MembershipResult<Vec<Uuid>> {
        let role = role_set.role(role_name)?;
        Ok(self.credentials.agents_with_credential(&role.credential, kind).await?)
    }

    /// Number of entry-role holders.
    pub async fn members_count(&self, role_set: &RoleSet) -> MembershipResult<usize> {
        let entry = role_set.entry_role()?;
        Ok(self
            .credentials
            .agents_with_credential(&entry.credential, None)
            .await?
            .len())
    }

    /// Implicit roles an actor holds because of `role_set`.
    pub async fn implicit_roles(&self, actor_id: Uuid, role_set: &RoleSet) -> MembershipResult<Vec<ImplicitRole>> {
        let (implicit, credential_type) = match role_set.kind {
            RoleSetType::Space => (ImplicitRole::SubspaceAdmin, credential_types::SPACE_SUBSPACE_ADMIN),
            RoleSetType::Organization => (ImplicitRole::AccountAdmin, credential_types::ACCOUNT_ADMIN),
            RoleSetType::Platform => return Ok(Vec::new()),
        };
        let Some(definition) = scoped_credential(role_set, credential_type)? else {
            return Ok(Vec::new());
        };
        if self.credentials.has_valid_credential(actor_id, &definition).await? {
            Ok(vec![implicit])
        } else {
            Ok(Vec::new())
        }
    }

    // ========================================================================
    // Applications
    // ========================================================================

    /// Submit an application to the entry role of `role_set`.
    ///
    /// # Errors
    ///
    /// [`MembershipError::Membership`] if the actor already has an open
    /// application or invitation on the RoleSet, or is already a member.
    pub async fn create_application(
        &self,
        role_set: &RoleSet,
        applicant_id: Uuid,
        questions: Vec<ApplicationQuestion>,
    ) -> MembershipResult<Application> {
        self.validate_no_open_workflow(role_set, applicant_id, "apply to")
            .await?;

        let authorization = Application::policy_for(applicant_id, &role_set.authorization);
        let application = Application::new(applicant_id, role_set.id, authorization).with_questions(questions);
        self.persistence.save_application(&application).await?;
        self.cache.invalidate(applicant_id, role_set.id).await;

        info!(
            application_id = %application.id,
            applicant_id = %applicant_id,
            role_set_id = %role_set.id,
            "Application created"
        );
        self.publish(
            role_set,
            MembershipEvent::ApplicationCreated {
                role_set_id: role_set.id,
                application_id: application.id,
                applicant_id,
            },
        )
        .await;
        Ok(application)
    }

    /// Apply a lifecycle event to an application.
    ///
    /// `APPROVE` grants the entry role before the transition commits and is
    /// completed by the `APPROVED` system event; if the grant fails the
    /// application stays in its prior state.
    pub async fn event_on_application(
        &self,
        application_id: Uuid,
        event: ApplicationEvent,
        actor: &ActorContext,
    ) -> MembershipResult<Application> {
        let mut application = self.get_application_or_fail(application_id).await?;
        let role_set = self
            .get_role_set_or_fail(application.role_set_id, RoleSetRelations::roles())
            .await?;
        let applicant_id = application.applicant_id;
        let policy = application.authorization.clone();
        let evaluator = self.evaluator.as_ref();

        let role_set_ref = &role_set;
        let mut state = application
            .lifecycle
            .dispatch_with(event, evaluator, actor, &policy, |staged| async move {
                if staged.actions.contains(&ApplicationAction::AssignEntryRole) {
                    let kind = self.contributor_kind(applicant_id).await?;
                    self.assign_role(role_set_ref, role_set_ref.entry_role_name, applicant_id, kind, true)
                        .await?;
                }
                Ok(())
            })
            .await?;
        if state == ApplicationState::Approving {
            state = application
                .lifecycle
                .dispatch(ApplicationEvent::Approved, evaluator, actor, &policy)?;
        }

        application.updated_at = chrono::Utc::now();
        self.persistence.save_application(&application).await?;
        self.cache.invalidate(applicant_id, role_set.id).await;

        info!(
            application_id = %application_id,
            event = %event,
            state = %state,
            actor = %actor.display_id(),
            "Application event applied"
        );
        if state == ApplicationState::Rejected {
            self.publish(
                &role_set,
                MembershipEvent::ApplicationDeclined {
                    role_set_id: role_set.id,
                    application_id,
                    applicant_id,
                },
            )
            .await;
        }
        Ok(application)
    }

    /// Delete an application.
    pub async fn delete_application(&self, application_id: Uuid) -> MembershipResult<()> {
        let application = self.get_application_or_fail(application_id).await?;
        self.persistence.delete_application(application_id).await?;
        self.cache
            .invalidate(application.applicant_id, application.role_set_id)
            .await;

        info!(application_id = %application_id, "Application deleted");
        Ok(())
    }

    /// Lifecycle projection of an application.
    pub async fn application_projection(&self, application_id: Uuid) -> MembershipResult<LifecycleProjection> {
        Ok(self.get_application_or_fail(application_id).await?.projection())
    }

    async fn get_application_or_fail(&self, id: Uuid) -> MembershipResult<Application> {
        self.persistence
            .get_application(id)
            .await?
            .ok_or_else(|| MembershipError::not_found("Application", id))
    }

    // ========================================================================
    // Invitations
    // ========================================================================

    /// Invite an actor to the entry role of `role_set`.
    ///
    /// Space invitations grant the invitee credential until they are
    /// accepted.
    ///
    /// # Errors
    ///
    /// - [`MembershipError::Membership`] if the actor already has an open
    ///   workflow or is a member, or if a virtual contributor is invited
    ///   without the license entitlement
    /// - [`MembershipError::Validation`] if the invitation targets a missing
    ///   parent
    /// - [`MembershipError::NotFound`] if an extra role is not defined
    pub async fn create_invitation(
        &self,
        role_set: &RoleSet,
        invited_actor_id: Uuid,
        kind: ContributorKind,
        inviter_id: Uuid,
        input: InviteInput,
    ) -> MembershipResult<Invitation> {
        if kind == ContributorKind::VirtualContributor
            && !role_set
                .license
                .is_entitlement_enabled(EntitlementType::VirtualContributorAccess)
        {
            return Err(MembershipError::Membership(format!(
                "Virtual contributors may not be invited to RoleSet {}: entitlement disabled",
                role_set.id
            )));
        }
        if input.invited_to_parent && role_set.parent_role_set_id.is_none() {
            return Err(MembershipError::Validation(format!(
                "Invitation to parent requested but RoleSet {} has no parent",
                role_set.id
            )));
        }
        for extra in &input.extra_roles {
            role_set.role(*extra)?;
        }
        self.validate_no_open_workflow(role_set, invited_actor_id, "invite")
            .await?;

        let authorization = Invitation::policy_for(invited_actor_id, inviter_id, &role_set.authorization);
        let mut invitation = Invitation::new(invited_actor_id, inviter_id, role_set.id, kind, authorization);
        invitation.extra_roles = input.extra_roles;
        invitation.invited_to_parent = input.invited_to_parent;
        invitation.welcome_message = input.welcome_message;
        let invitee = invitee_credential(role_set)?;
        self.persistence.save_invitation(&invitation).await?;

        let granted = async {
            if let Some(definition) = invitee {
                if !self
                    .credentials
                    .has_valid_credential(invited_actor_id, &definition)
                    .await?
                {
                    self.credentials
                        .grant_credential(invited_actor_id, kind, &definition)
                        .await?;
                }
            }
            Ok::<(), MembershipError>(())
        }
        .await;
        self.cache.invalidate(invited_actor_id, role_set.id).await;
        granted?;

        info!(
            invitation_id = %invitation.id,
            invited_actor_id = %invited_actor_id,
            inviter_id = %inviter_id,
            role_set_id = %role_set.id,
            "Invitation created"
        );
        self.publish(
            role_set,
            MembershipEvent::InvitationCreated {
                role_set_id: role_set.id,
                invitation_id: invitation.id,
                invited_actor_id,
                inviter_id,
            },
        )
        .await;
        Ok(invitation)
    }

    /// Apply a lifecycle event to an invitation.
    ///
    /// `ACCEPT` joins the invitee before the transition commits and is
    /// completed by the `ACCEPTED` system event.
    pub async fn event_on_invitation(
        &self,
        invitation_id: Uuid,
        event: InvitationEvent,
        actor: &ActorContext,
    ) -> MembershipResult<Invitation> {
        let mut invitation = self.get_invitation_or_fail(invitation_id).await?;
        let role_set = self
            .get_role_set_or_fail(invitation.role_set_id, RoleSetRelations::roles())
            .await?;
        let policy = invitation.authorization.clone();
        let evaluator = self.evaluator.as_ref();

        let pending = invitation.clone();
        let role_set_ref = &role_set;
        let mut state = invitation
            .lifecycle
            .dispatch_with(event, evaluator, actor, &policy, |staged| async move {
                if staged.actions.contains(&InvitationAction::JoinInvitee) {
                    self.join_invitee(&pending, role_set_ref).await?;
                }
                Ok(())
            })
            .await?;
        if state == InvitationState::Accepting {
            state = invitation
                .lifecycle
                .dispatch(InvitationEvent::Accepted, evaluator, actor, &policy)?;
        }

        invitation.updated_at = chrono::Utc::now();
        self.persistence.save_invitation(&invitation).await?;
        self.cache
            .invalidate(invitation.invited_actor_id, role_set.id)
            .await;

        info!(
            invitation_id = %invitation_id,
            event = %event,
            state = %state,
            actor = %actor.display_id(),
            "Invitation event applied"
        );
        let outcome = match state {
            InvitationState::Accepted => Some(MembershipEvent::InvitationAccepted {
                role_set_id: role_set.id,
                invitation_id,
                invited_actor_id: invitation.invited_actor_id,
            }),
            InvitationState::Rejected => Some(MembershipEvent::InvitationDeclined {
                role_set_id: role_set.id,
                invitation_id,
                invited_actor_id: invitation.invited_actor_id,
            }),
            _ => None,
        };
        if let Some(outcome) = outcome {
            self.publish(&role_set, outcome).await;
        }
        Ok(invitation)
    }

    /// Check if an invitation can currently be accepted.
    pub fn can_accept_invitation(&self, invitation: &Invitation) -> bool {
        invitation.can_be_accepted()
    }

    /// Delete an invitation, revoking the invitee credential while it is
    /// still open.
    pub async fn delete_invitation(&self, invitation_id: Uuid) -> MembershipResult<()> {
        let invitation = self.get_invitation_or_fail(invitation_id).await?;
        if !invitation.is_finalized() {
            if let Some(role_set) = self
                .persistence
                .get_role_set(invitation.role_set_id, RoleSetRelations::roles())
                .await?
            {
                self.revoke_invitee_credential(&role_set, invitation.invited_actor_id)
                    .await?;
            }
        }
        self.persistence.delete_invitation(invitation_id).await?;
        self.cache
            .invalidate(invitation.invited_actor_id, invitation.role_set_id)
            .await;

        info!(invitation_id = %invitation_id, "Invitation deleted");
        Ok(())
    }

    /// Lifecycle projection of an invitation.
    pub async fn invitation_projection(&self, invitation_id: Uuid) -> MembershipResult<LifecycleProjection> {
        Ok(self.get_invitation_or_fail(invitation_id).await?.projection())
    }

    async fn get_invitation_or_fail(&self, id: Uuid) -> MembershipResult<Invitation> {
        self.persistence
            .get_invitation(id)
            .await?
            .ok_or_else(|| MembershipError::not_found("Invitation", id))
    }

    /// Join an invitee: parent entry role first when requested, then the
    /// entry role, then extra roles best-effort.
    async fn join_invitee(&self, invitation: &Invitation, role_set: &RoleSet) -> MembershipResult<()> {
        let actor_id = invitation.invited_actor_id;
        let kind = invitation.contributor_kind;

        if invitation.invited_to_parent {
            let parent_id = role_set.parent_role_set_id.ok_or_else(|| {
                MembershipError::Membership(format!(
                    "Invitation {} joins the parent of RoleSet {} but it has none",
                    invitation.id, role_set.id
                ))
            })?;
            let parent = self.get_role_set_or_fail(parent_id, RoleSetRelations::roles()).await?;
            let credentials = self.credentials.get_credentials(actor_id).await?;
            if !holds_entry_role(&parent, &credentials)? {
                self.assign_role(&parent, parent.entry_role_name, actor_id, kind, true)
                    .await?;
            }
        }

        self.assign_role(role_set, role_set.entry_role_name, actor_id, kind, true)
            .await?;
        self.revoke_invitee_credential(role_set, actor_id).await?;

        for extra in &invitation.extra_roles {
            if let Err(e) = self.assign_role(role_set, *extra, actor_id, kind, false).await {
                warn!(
                    invitation_id = %invitation.id,
                    actor_id = %actor_id,
                    role = %extra,
                    error = %e,
                    "Unable to assign extra role from invitation"
                );
            }
        }
        Ok(())
    }

    async fn revoke_invitee_credential(&self, role_set: &RoleSet, actor_id: Uuid) -> MembershipResult<()> {
        if let Some(definition) = invitee_credential(role_set)? {
            self.credentials.revoke_credential(actor_id, &definition).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Platform invitations
    // ========================================================================

    /// Invite a not-yet-registered actor by email.
    ///
    /// # Errors
    ///
    /// - [`MembershipError::Validation`] if the email is malformed
    /// - [`MembershipError::Membership`] if the email already has a platform
    ///   invitation to this RoleSet
    pub async fn create_platform_invitation(
        &self,
        role_set: &RoleSet,
        email: &str,
        created_by: Uuid,
        input: InviteInput,
    ) -> MembershipResult<PlatformInvitation> {
        let mut invitation = PlatformInvitation::new(email, role_set.id, created_by);
        if invitation.email.is_empty() || !invitation.email.contains('@') {
            return Err(MembershipError::Validation(format!("Invalid email address: '{}'", email)));
        }
        for extra in &input.extra_roles {
            role_set.role(*extra)?;
        }

        let existing = self
            .persistence
            .find_platform_invitations(&invitation.email)
            .await?;
        if existing.iter().any(|other| other.role_set_id == role_set.id) {
            return Err(MembershipError::Membership(format!(
                "An invitation for {} already exists on RoleSet {}",
                invitation.email, role_set.id
            )));
        }

        invitation.extra_roles = input.extra_roles;
        invitation.invited_to_parent = input.invited_to_parent;
        invitation.welcome_message = input.welcome_message;
        self.persistence.save_platform_invitation(&invitation).await?;

        info!(
            platform_invitation_id = %invitation.id,
            role_set_id = %role_set.id,
            "Platform invitation created"
        );
        self.publish(
            role_set,
            MembershipEvent::PlatformInvitationCreated {
                role_set_id: role_set.id,
                platform_invitation_id: invitation.id,
                email: invitation.email.clone(),
            },
        )
        .await;
        Ok(invitation)
    }

    /// Delete a platform invitation.
    pub async fn delete_platform_invitation(&self, id: Uuid) -> MembershipResult<()> {
        if self.persistence.get_platform_invitation(id).await?.is_none() {
            return Err(MembershipError::not_found("PlatformInvitation", id));
        }
        self.persistence.delete_platform_invitation(id).await?;
        info!(platform_invitation_id = %id, "Platform invitation deleted");
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Reject a new workflow when one is open or the actor is a member.
    async fn validate_no_open_workflow(
        &self,
        role_set: &RoleSet,
        actor_id: Uuid,
        action: &str,
    ) -> MembershipResult<()> {
        if let Some(open) = self.resolver.find_open_application(actor_id, role_set.id).await? {
            return Err(MembershipError::Membership(format!(
                "Unable to {} RoleSet {} for actor {}: application {} is open in state '{}'",
                action,
                role_set.id,
                actor_id,
                open.id,
                open.state()
            )));
        }
        if let Some(open) = self.resolver.find_open_invitation(actor_id, role_set.id).await? {
            return Err(MembershipError::Membership(format!(
                "Unable to {} RoleSet {} for actor {}: invitation {} is open in state '{}'",
                action,
                role_set.id,
                actor_id,
                open.id,
                open.state()
            )));
        }
        let credentials = self.credentials.get_credentials(actor_id).await?;
        if holds_entry_role(role_set, &credentials)? {
            return Err(MembershipError::Membership(format!(
                "Unable to {} RoleSet {} for actor {}: already a member",
                action, role_set.id, actor_id
            )));
        }
        Ok(())
    }

    /// Contributor kind of a known actor; unknown actors are users.
    async fn contributor_kind(&self, actor_id: Uuid) -> MembershipResult<ContributorKind> {
        Ok(self
            .credentials
            .agent_kind(actor_id)
            .await?
            .unwrap_or(ContributorKind::User))
    }

    async fn publish(&self, role_set: &RoleSet, event: MembershipEvent) {
        let Some(bus) = &self.events else {
            return;
        };
        let event_type = event.event_type();
        match event.to_event(role_set.kind.event_source()) {
            Ok(envelope) => {
                if let Err(e) = bus.publish(envelope).await {
                    warn!(role_set_id = %role_set.id, event_type, error = %e, "Failed to publish membership event");
                }
            }
            Err(e) => {
                warn!(role_set_id = %role_set.id, event_type, error = %e, "Failed to build membership event");
            }
        }
    }
}

impl std::fmt::Debug for RoleSetOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoleSetOrchestrator")
            .field("cache", &self.cache)
            .field("events", &self.events.is_some())
            .finish_non_exhaustive()
    }
}

/// Point every role of `child` at the matching role of `parent`.
fn link_parent(child: &mut RoleSet, parent: &RoleSet) -> MembershipResult<()> {
    for role in child.roles_mut()? {
        role.parent_credentials = parent.credentials_for_role_with_parents(role.name)?;
    }
    child.parent_role_set_id = Some(parent.id);
    child.touch();
    Ok(())
}

/// `credential_type` scoped to the admin resource of `role_set`, if it has
/// an admin role.
fn scoped_credential(role_set: &RoleSet, credential_type: &str) -> MembershipResult<Option<CredentialDefinition>> {
    if !role_set.has_role(RoleName::Admin)? {
        return Ok(None);
    }
    let admin = role_set.credential_for_role(RoleName::Admin)?;
    Ok(Some(CredentialDefinition::new(credential_type, admin.resource_id)))
}

fn invitee_credential(role_set: &RoleSet) -> MembershipResult<Option<CredentialDefinition>> {
    match role_set.kind {
        RoleSetType::Space => scoped_credential(role_set, credential_types::SPACE_MEMBER_INVITEE),
        _ => Ok(None),
    }
}

/// Implicit credentials whose scope is `role_set` itself.
fn scoped_implicit_credentials(role_set: &RoleSet) -> MembershipResult<Vec<CredentialDefinition>> {
    let types: &[&str] = match role_set.kind {
        RoleSetType::Space => &[
            credential_types::SPACE_MEMBER_INVITEE,
            credential_types::SPACE_SUBSPACE_ADMIN,
        ],
        RoleSetType::Organization => &[credential_types::ACCOUNT_ADMIN],
        RoleSetType::Platform => &[],
    };
    let mut definitions = Vec::with_capacity(types.len());
    for credential_type in types {
        if let Some(definition) = scoped_credential(role_set, credential_type)? {
            definitions.push(definition);
        }
    }
    Ok(definitions)
}

fn holds_role_if_defined(role_set: &RoleSet, name: RoleName, credentials: &[Credential]) -> MembershipResult<bool> {
    if !role_set.has_role(name)? {
        return Ok(false);
    }
    holds_role(role_set, name, credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryCacheStore, InMemoryCredentialStore, InMemoryPersistenceStore};
    use crate::role::{ContributorPolicy, Role};

    struct Fixture {
        credentials: Arc<InMemoryCredentialStore>,
        orchestrator: RoleSetOrchestrator,
    }

    fn fixture() -> Fixture {
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let orchestrator = RoleSetOrchestrator::new(
            credentials.clone(),
            Arc::new(InMemoryPersistenceStore::new()),
            Arc::new(InMemoryCacheStore::new()),
            &MembershipConfig::default(),
        )
        .unwrap();
        Fixture {
            credentials,
            orchestrator,
        }
    }

    fn org_input(org: &str) -> CreateRoleSetInput {
        CreateRoleSetInput::new(
            RoleSetType::Organization,
            RoleName::Associate,
            vec![
                Role::new(RoleName::Associate, CredentialDefinition::new("organization-associate", org)),
                Role::new(RoleName::Admin, CredentialDefinition::new("organization-admin", org))
                    .with_user_policy(ContributorPolicy::new(1, 2)),
                Role::new(RoleName::Owner, CredentialDefinition::new("organization-owner", org)),
            ],
        )
    }

    #[test]
    fn test_new_rejects_invalid_config() {
        let config = MembershipConfig {
            cache_ttl_secs: 0,
            ..MembershipConfig::default()
        };
        let result = RoleSetOrchestrator::new(
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryPersistenceStore::new()),
            Arc::new(InMemoryCacheStore::new()),
            &config,
        );
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "MEMBERSHIP_CACHE_TTL_SECS"
        ));
    }

    #[test]
    fn test_scoped_credential_uses_admin_resource() {
        let role_set = RoleSet::create(org_input("org-1")).unwrap();
        let definition = scoped_credential(&role_set, credential_types::ACCOUNT_ADMIN)
            .unwrap()
            .unwrap();
        assert_eq!(definition, CredentialDefinition::new(credential_types::ACCOUNT_ADMIN, "org-1"));
    }

    #[test]
    fn test_scoped_implicit_credentials_by_kind() {
        let role_set = RoleSet::create(org_input("org-1")).unwrap();
        let definitions = scoped_implicit_credentials(&role_set).unwrap();
        assert_eq!(definitions.len(), 1);
        assert_eq!(definitions[0].credential_type, credential_types::ACCOUNT_ADMIN);
    }

    #[tokio::test]
    async fn test_account_admin_follows_admin_and_owner() {
        let f = fixture();
        let org = f.orchestrator.create_role_set(org_input("org-1")).await.unwrap();
        let actor = Uuid::now_v7();

        f.orchestrator
            .assign_role(&org, RoleName::Admin, actor, ContributorKind::User, false)
            .await
            .unwrap();
        f.orchestrator
            .assign_role(&org, RoleName::Owner, actor, ContributorKind::User, false)
            .await
            .unwrap();
        assert_eq!(
            f.orchestrator.implicit_roles(actor, &org).await.unwrap(),
            vec![ImplicitRole::AccountAdmin]
        );

        f.orchestrator
            .remove_role(&org, RoleName::Owner, actor, false)
            .await
            .unwrap();
        assert_eq!(
            f.orchestrator.implicit_roles(actor, &org).await.unwrap(),
            vec![ImplicitRole::AccountAdmin]
        );

        f.orchestrator
            .remove_role(&org, RoleName::Admin, actor, false)
            .await
            .unwrap();
        assert!(f.orchestrator.implicit_roles(actor, &org).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_admin_limits_for_users() {
        let f = fixture();
        let org = f.orchestrator.create_role_set(org_input("org-1")).await.unwrap();
        let (a, b, c) = (Uuid::now_v7(), Uuid::now_v7(), Uuid::now_v7());

        for actor in [a, b] {
            f.orchestrator
                .assign_role(&org, RoleName::Admin, actor, ContributorKind::User, false)
                .await
                .unwrap();
        }
        let full = f
            .orchestrator
            .assign_role(&org, RoleName::Admin, c, ContributorKind::User, false)
            .await;
        assert!(matches!(full, Err(MembershipError::PolicyLimit(_))));

        f.orchestrator
            .remove_role(&org, RoleName::Admin, a, true)
            .await
            .unwrap();
        let last = f.orchestrator.remove_role(&org, RoleName::Admin, b, true).await;
        assert!(matches!(last, Err(MembershipError::PolicyLimit(_))));
        assert!(f.orchestrator.is_in_role(b, &org, RoleName::Admin).await.unwrap());
    }

    #[tokio::test]
    async fn test_remove_unheld_role_is_noop() {
        let f = fixture();
        let org = f.orchestrator.create_role_set(org_input("org-1")).await.unwrap();
        let removed = f
            .orchestrator
            .remove_role(&org, RoleName::Associate, Uuid::now_v7(), true)
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn test_actor_context_carries_self_credential() {
        let f = fixture();
        let actor = Uuid::now_v7();
        f.credentials.register_agent(actor, ContributorKind::User).await;

        let context = f.orchestrator.actor_context(actor).await.unwrap();
        assert_eq!(context.actor_id, Some(actor));
        assert!(context.has_credential(&CredentialDefinition::new(
            credential_types::USER_SELF,
            actor.to_string()
        )));
    }

    #[tokio::test]
    async fn test_platform_invitation_duplicate_email() {
        let f = fixture();
        let org = f.orchestrator.create_role_set(org_input("org-1")).await.unwrap();
        let inviter = Uuid::now_v7();

        f.orchestrator
            .create_platform_invitation(&org, "New.Person@Example.com", inviter, InviteInput::default())
            .await
            .unwrap();
        let duplicate = f
            .orchestrator
            .create_platform_invitation(&org, "new.person@example.com ", inviter, InviteInput::default())
            .await;
        assert!(matches!(duplicate, Err(MembershipError::Membership(_))));

        let invalid = f
            .orchestrator
            .create_platform_invitation(&org, "nobody", inviter, InviteInput::default())
            .await;
        assert!(matches!(invalid, Err(MembershipError::Validation(_))));
    }
}
