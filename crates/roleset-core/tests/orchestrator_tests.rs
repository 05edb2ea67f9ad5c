//! Role assignment and RoleSet administration tests.

mod common;

use common::{drain_event_types, space_roles, TestFixture};
use roleset_authz::{credential_types, CredentialDefinition};
use roleset_core::{
    ContributorKind, CreateRoleSetInput, CredentialStore, ImplicitRole, InviteInput, MembershipError,
    PersistenceStore, RoleName, RoleSetRelations, RoleSetType,
};
use uuid::Uuid;

// ============================================================================
// Assignment
// ============================================================================

#[tokio::test]
async fn test_assign_is_idempotent() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let actor = Uuid::now_v7();

    assert!(f
        .orchestrator
        .assign_role(&space, RoleName::Member, actor, ContributorKind::User, false)
        .await
        .unwrap());
    assert!(!f
        .orchestrator
        .assign_role(&space, RoleName::Member, actor, ContributorKind::User, false)
        .await
        .unwrap());

    let holders = f
        .orchestrator
        .actors_with_role(&space, RoleName::Member, None)
        .await
        .unwrap();
    assert_eq!(holders, vec![actor]);
    assert_eq!(f.orchestrator.members_count(&space).await.unwrap(), 1);
}

#[tokio::test]
async fn test_subspace_requires_parent_membership() {
    let f = TestFixture::new();
    let parent = f.space("space-1").await;
    let child = f.subspace(&parent, "space-2").await;
    let actor = Uuid::now_v7();

    let denied = f
        .orchestrator
        .assign_role(&child, RoleName::Member, actor, ContributorKind::User, false)
        .await;
    assert!(matches!(denied, Err(MembershipError::Membership(_))));

    f.grant(&parent, RoleName::Member, actor).await;
    assert!(f
        .orchestrator
        .assign_role(&child, RoleName::Member, actor, ContributorKind::User, false)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_role_requiring_parent_role() {
    let f = TestFixture::new();
    let parent = f.space("space-1").await;
    let mut roles = space_roles("space-2");
    roles[1] = roles[1].clone().requiring_parent_role();
    let child = f
        .orchestrator
        .create_role_set(
            CreateRoleSetInput::new(RoleSetType::Space, RoleName::Member, roles).with_parent(parent.id),
        )
        .await
        .unwrap();
    let actor = f.user_with_role(&parent, RoleName::Member).await;

    let denied = f
        .orchestrator
        .assign_role(&child, RoleName::Lead, actor, ContributorKind::User, false)
        .await;
    assert!(matches!(denied, Err(MembershipError::Membership(_))));

    f.grant(&parent, RoleName::Lead, actor).await;
    f.grant(&child, RoleName::Lead, actor).await;
    assert!(f.orchestrator.is_in_role(actor, &child, RoleName::Lead).await.unwrap());
}

#[tokio::test]
async fn test_remove_role_validates_minimum() {
    let f = TestFixture::new();
    let mut roles = space_roles("space-1");
    roles[2] = roles[2]
        .clone()
        .with_user_policy(roleset_core::ContributorPolicy::new(1, -1));
    let space = f
        .orchestrator
        .create_role_set(CreateRoleSetInput::new(RoleSetType::Space, RoleName::Member, roles))
        .await
        .unwrap();
    let admin = f.user_with_role(&space, RoleName::Admin).await;

    let denied = f.orchestrator.remove_role(&space, RoleName::Admin, admin, true).await;
    assert!(matches!(denied, Err(MembershipError::PolicyLimit(_))));
    assert!(f
        .orchestrator
        .remove_role(&space, RoleName::Admin, admin, false)
        .await
        .unwrap());
}

#[tokio::test]
async fn test_subspace_admin_kept_while_peers_justify_it() {
    let f = TestFixture::new();
    let parent = f.space("space-1").await;
    let first = f.subspace(&parent, "space-2").await;
    let second = f.subspace(&parent, "space-3").await;
    let actor = f.user_with_role(&parent, RoleName::Member).await;
    let subspace_admin = CredentialDefinition::new(credential_types::SPACE_SUBSPACE_ADMIN, "space-1");

    f.grant(&first, RoleName::Admin, actor).await;
    f.grant(&second, RoleName::Admin, actor).await;
    assert!(f.credentials.has_valid_credential(actor, &subspace_admin).await.unwrap());
    assert_eq!(
        f.orchestrator.implicit_roles(actor, &parent).await.unwrap(),
        vec![ImplicitRole::SubspaceAdmin]
    );

    f.orchestrator
        .remove_role(&first, RoleName::Admin, actor, false)
        .await
        .unwrap();
    assert!(f.credentials.has_valid_credential(actor, &subspace_admin).await.unwrap());

    f.orchestrator
        .remove_role(&second, RoleName::Admin, actor, false)
        .await
        .unwrap();
    assert!(!f.credentials.has_valid_credential(actor, &subspace_admin).await.unwrap());
    assert!(f.orchestrator.implicit_roles(actor, &parent).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_remove_actor_from_all_roles() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let actor = f.user_with_role(&space, RoleName::Member).await;
    f.grant(&space, RoleName::Lead, actor).await;

    let removed = f
        .orchestrator
        .remove_actor_from_all_roles(&space, actor)
        .await
        .unwrap();
    assert_eq!(removed, vec![RoleName::Member, RoleName::Lead]);
    assert!(!f.orchestrator.is_member(actor, &space).await.unwrap());
}

// ============================================================================
// Queries
// ============================================================================

#[tokio::test]
async fn test_roles_for_actors_uses_one_fetch() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let member = f.user_with_role(&space, RoleName::Member).await;
    let lead = f.user_with_role(&space, RoleName::Member).await;
    f.grant(&space, RoleName::Lead, lead).await;
    let outsider = Uuid::now_v7();

    let calls_before = f.credentials.fetch_calls();
    let roles = f
        .orchestrator
        .roles_for_actors(&space, &[member, lead, outsider])
        .await
        .unwrap();

    assert_eq!(f.credentials.fetch_calls() - calls_before, 1);
    assert_eq!(roles[&member], vec![RoleName::Member]);
    assert_eq!(roles[&lead], vec![RoleName::Member, RoleName::Lead]);
    assert!(roles[&outsider].is_empty());
}

#[tokio::test]
async fn test_actors_with_role_filters_by_kind() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let user = f.user_with_role(&space, RoleName::Member).await;
    let org = Uuid::now_v7();
    f.orchestrator
        .assign_role(&space, RoleName::Member, org, ContributorKind::Organization, false)
        .await
        .unwrap();

    let users = f
        .orchestrator
        .actors_with_role(&space, RoleName::Member, Some(ContributorKind::User))
        .await
        .unwrap();
    let orgs = f
        .orchestrator
        .actors_with_role(&space, RoleName::Member, Some(ContributorKind::Organization))
        .await
        .unwrap();

    assert_eq!(users, vec![user]);
    assert_eq!(orgs, vec![org]);
    assert_eq!(f.orchestrator.members_count(&space).await.unwrap(), 2);
}

// ============================================================================
// Administration
// ============================================================================

#[tokio::test]
async fn test_parent_credential_chain() {
    let f = TestFixture::new();
    let root = f.space("space-1").await;
    let child = f.space("space-2").await;
    let grandchild = f.space("space-3").await;

    let child = f.orchestrator.set_parent_role_set(child.id, root.id).await.unwrap();
    let grandchild = f
        .orchestrator
        .set_parent_role_set(grandchild.id, child.id)
        .await
        .unwrap();

    assert_eq!(
        grandchild.parent_credentials_for_role(RoleName::Member).unwrap(),
        vec![
            CredentialDefinition::new("space-member", "space-2"),
            CredentialDefinition::new("space-member", "space-1"),
        ]
    );
    assert_eq!(
        grandchild.direct_parent_credential_for_role(RoleName::Admin).unwrap(),
        Some(CredentialDefinition::new("space-admin", "space-2"))
    );

    let detached = f.orchestrator.remove_parent_role_set(grandchild.id).await.unwrap();
    assert_eq!(detached.parent_role_set_id, None);
    assert!(detached
        .roles()
        .unwrap()
        .iter()
        .all(|role| role.parent_credentials.is_empty()));

    let reloaded = f
        .orchestrator
        .get_role_set_or_fail(grandchild.id, RoleSetRelations::roles())
        .await
        .unwrap();
    assert_eq!(reloaded.parent_role_set_id, None);
}

#[tokio::test]
async fn test_role_set_cannot_parent_itself() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let result = f.orchestrator.set_parent_role_set(space.id, space.id).await;
    assert!(matches!(result, Err(MembershipError::Validation(_))));
}

#[tokio::test]
async fn test_update_role_resource_id() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;

    let updated = f
        .orchestrator
        .update_role_resource_id(space.id, "space-9")
        .await
        .unwrap();
    assert!(updated
        .roles()
        .unwrap()
        .iter()
        .all(|role| role.credential.resource_id == "space-9"));

    let actor = f.user_with_role(&updated, RoleName::Member).await;
    assert!(f
        .credentials
        .has_valid_credential(actor, &CredentialDefinition::new("space-member", "space-9"))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_remove_role_set_cascades() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let admin = f.user_with_role(&space, RoleName::Admin).await;
    let member = f.user_with_role(&space, RoleName::Member).await;
    let applicant = Uuid::now_v7();
    let invitee = Uuid::now_v7();
    f.orchestrator
        .create_application(&space, applicant, Vec::new())
        .await
        .unwrap();
    f.orchestrator
        .create_invitation(&space, invitee, ContributorKind::User, admin, InviteInput::default())
        .await
        .unwrap();
    f.orchestrator
        .create_platform_invitation(&space, "someone@example.com", admin, InviteInput::default())
        .await
        .unwrap();

    let mut events = f.subscribe_all().await;
    f.orchestrator.remove_role_set(space.id).await.unwrap();

    assert!(f.credentials.get_credentials(member).await.unwrap().is_empty());
    assert!(f.credentials.get_credentials(admin).await.unwrap().is_empty());
    assert!(f.credentials.get_credentials(invitee).await.unwrap().is_empty());
    assert_eq!(f.persistence.application_count().await, 0);
    assert_eq!(f.persistence.invitation_count().await, 0);
    assert!(f
        .persistence
        .get_role_set(space.id, RoleSetRelations::none())
        .await
        .unwrap()
        .is_none());
    assert!(matches!(
        f.orchestrator.get_role_set_or_fail(space.id, RoleSetRelations::none()).await,
        Err(MembershipError::NotFound { entity: "RoleSet", .. })
    ));

    let types = drain_event_types(&mut events).await;
    assert_eq!(types.iter().filter(|t| *t == "role.removed").count(), 2);
    assert_eq!(types.last().map(String::as_str), Some("role_set.removed"));
}

#[tokio::test]
async fn test_platform_invitation_lifecycle() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let admin = f.user_with_role(&space, RoleName::Admin).await;

    let invitation = f
        .orchestrator
        .create_platform_invitation(
            &space,
            "new@example.com",
            admin,
            InviteInput::default().with_extra_roles(vec![RoleName::Lead]),
        )
        .await
        .unwrap();
    assert_eq!(invitation.extra_roles, vec![RoleName::Lead]);

    let reloaded = f
        .orchestrator
        .get_role_set_or_fail(space.id, RoleSetRelations::all())
        .await
        .unwrap();
    assert_eq!(reloaded.platform_invitation_ids().unwrap(), &[invitation.id]);

    f.orchestrator
        .delete_platform_invitation(invitation.id)
        .await
        .unwrap();
    assert!(matches!(
        f.orchestrator.delete_platform_invitation(invitation.id).await,
        Err(MembershipError::NotFound { .. })
    ));
}

// ============================================================================
// Events
// ============================================================================

#[tokio::test]
async fn test_entry_role_with_side_effects_announces_join() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let mut events = f.subscribe_all().await;

    f.orchestrator
        .assign_role(&space, RoleName::Member, Uuid::now_v7(), ContributorKind::User, true)
        .await
        .unwrap();
    assert_eq!(
        drain_event_types(&mut events).await,
        vec!["role.assigned", "member.joined"]
    );

    f.orchestrator
        .assign_role(&space, RoleName::Member, Uuid::now_v7(), ContributorKind::User, false)
        .await
        .unwrap();
    assert_eq!(drain_event_types(&mut events).await, vec!["role.assigned"]);
}

#[tokio::test]
async fn test_no_event_for_idempotent_assign() {
    let f = TestFixture::new();
    let space = f.space("space-1").await;
    let actor = f.user_with_role(&space, RoleName::Member).await;
    let mut events = f.subscribe_all().await;

    f.orchestrator
        .assign_role(&space, RoleName::Member, actor, ContributorKind::User, true)
        .await
        .unwrap();
    assert!(drain_event_types(&mut events).await.is_empty());
}
