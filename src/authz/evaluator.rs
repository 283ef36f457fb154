use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use super::principal::{Action, Principal, Resource};
use super::Decision;
use crate::errors::AppError;
use crate::models::membership::MemberRole;

/// Lookup of the narrow membership axis: is this user a member of that
/// association, and with which member role?
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn member_role(
        &self,
        user_id: Uuid,
        association_id: Uuid,
    ) -> Result<Option<MemberRole>, AppError>;
}

/// Membership directory backed by the `association_members` table.
pub struct SqliteMembershipDirectory {
    pool: SqlitePool,
}

impl SqliteMembershipDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipDirectory for SqliteMembershipDirectory {
    async fn member_role(
        &self,
        user_id: Uuid,
        association_id: Uuid,
    ) -> Result<Option<MemberRole>, AppError> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM association_members WHERE user_id = ? AND association_id = ?",
        )
        .bind(user_id.to_string())
        .bind(association_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        role.map(|value| value.parse()).transpose()
    }
}

/// Rule evaluation, in precedence order. First match wins; the membership
/// directory is only consulted when the earlier rules did not settle the
/// decision.
pub struct PolicyEngine {
    membership: Arc<dyn MembershipDirectory>,
}

impl PolicyEngine {
    pub fn new(membership: Arc<dyn MembershipDirectory>) -> Self {
        Self { membership }
    }

    pub async fn authorize(
        &self,
        principal: &Principal,
        action: Action,
        resource: &Resource,
    ) -> Result<Decision, AppError> {
        // Kind gate first: the admin override must never leak through it.
        if action.association_only() {
            return Ok(match principal {
                Principal::Association(_) => Decision::Allow,
                Principal::User(_) => Decision::Deny("action requires an association principal"),
            });
        }

        if principal.is_admin_user() {
            return Ok(Decision::Allow);
        }

        // Self rules: a principal acting on its own record.
        match (principal, resource) {
            (Principal::User(user), Resource::User { id })
                if user.id == *id
                    && matches!(action, Action::View | Action::Update | Action::Delete) =>
            {
                return Ok(Decision::Allow);
            }
            (Principal::Association(assoc), Resource::Association { id, .. })
                if assoc.id == *id && matches!(action, Action::View | Action::Update) =>
            {
                return Ok(Decision::Allow);
            }
            _ => {}
        }

        // Ownership and membership only apply to User principals targeting
        // an association.
        if let (Principal::User(user), Resource::Association { id, owner_user_id }) =
            (principal, resource)
        {
            let owner_actions = matches!(
                action,
                Action::View | Action::Update | Action::Delete | Action::ManageMembers
            );
            if owner_actions && *owner_user_id == Some(user.id) {
                return Ok(Decision::Allow);
            }

            // Membership-admin is narrower than ownership: no delete.
            let member_admin_actions =
                matches!(action, Action::View | Action::Update | Action::ManageMembers);
            if member_admin_actions {
                let role = self.membership.member_role(user.id, *id).await?;
                if role == Some(MemberRole::Admin) {
                    return Ok(Decision::Allow);
                }
            }
        }

        Ok(Decision::Deny("no rule granted access"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::UserRole;
    use std::collections::HashMap;

    struct StaticMembership {
        entries: HashMap<(Uuid, Uuid), MemberRole>,
    }

    impl StaticMembership {
        fn empty() -> Self {
            Self {
                entries: HashMap::new(),
            }
        }

        fn with(user_id: Uuid, association_id: Uuid, role: MemberRole) -> Self {
            let mut entries = HashMap::new();
            entries.insert((user_id, association_id), role);
            Self { entries }
        }
    }

    #[async_trait]
    impl MembershipDirectory for StaticMembership {
        async fn member_role(
            &self,
            user_id: Uuid,
            association_id: Uuid,
        ) -> Result<Option<MemberRole>, AppError> {
            Ok(self.entries.get(&(user_id, association_id)).copied())
        }
    }

    fn engine(membership: StaticMembership) -> PolicyEngine {
        PolicyEngine::new(Arc::new(membership))
    }

    fn association_resource(id: Uuid, owner: Option<Uuid>) -> Resource {
        Resource::Association {
            id,
            owner_user_id: owner,
        }
    }

    #[tokio::test]
    async fn admin_is_allowed_everything_but_kind_gates() {
        let engine = engine(StaticMembership::empty());
        let admin = Principal::user(Uuid::new_v4(), UserRole::Admin);
        let assoc = association_resource(Uuid::new_v4(), None);

        for action in [
            Action::View,
            Action::Update,
            Action::Delete,
            Action::Restore,
            Action::ForceDelete,
            Action::ManageMembers,
        ] {
            assert_eq!(
                engine.authorize(&admin, action, &assoc).await.unwrap(),
                Decision::Allow,
                "admin should be allowed {action:?}"
            );
        }

        for action in [
            Action::SendMessageToUser,
            Action::ReadAssociationInbox,
            Action::SetDonationStatus,
        ] {
            assert!(
                matches!(
                    engine.authorize(&admin, action, &assoc).await.unwrap(),
                    Decision::Deny(_)
                ),
                "kind gate must hold against admin for {action:?}"
            );
        }
    }

    #[tokio::test]
    async fn association_principal_passes_kind_gates() {
        let engine = engine(StaticMembership::empty());
        let assoc_id = Uuid::new_v4();
        let assoc = Principal::association(assoc_id);
        let target = Resource::User { id: Uuid::new_v4() };

        assert_eq!(
            engine
                .authorize(&assoc, Action::SendMessageToUser, &target)
                .await
                .unwrap(),
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn user_may_touch_own_record_only() {
        let engine = engine(StaticMembership::empty());
        let user_id = Uuid::new_v4();
        let donor = Principal::user(user_id, UserRole::Donor);

        let own = Resource::User { id: user_id };
        let other = Resource::User { id: Uuid::new_v4() };

        assert_eq!(
            engine.authorize(&donor, Action::Update, &own).await.unwrap(),
            Decision::Allow
        );
        assert_eq!(
            engine.authorize(&donor, Action::Delete, &own).await.unwrap(),
            Decision::Allow
        );
        assert!(matches!(
            engine.authorize(&donor, Action::Update, &other).await.unwrap(),
            Decision::Deny(_)
        ));
        // Restore is not a self-service action.
        assert!(matches!(
            engine.authorize(&donor, Action::Restore, &own).await.unwrap(),
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn owner_and_admin_update_association_others_do_not() {
        let owner_id = Uuid::new_v4();
        let engine = engine(StaticMembership::empty());
        let a1 = association_resource(Uuid::new_v4(), Some(owner_id));

        let u1 = Principal::user(owner_id, UserRole::Donor);
        let u2 = Principal::user(Uuid::new_v4(), UserRole::Donor);
        let admin1 = Principal::user(Uuid::new_v4(), UserRole::Admin);

        assert_eq!(
            engine.authorize(&u1, Action::Update, &a1).await.unwrap(),
            Decision::Allow
        );
        assert!(matches!(
            engine.authorize(&u2, Action::Update, &a1).await.unwrap(),
            Decision::Deny(_)
        ));
        assert_eq!(
            engine.authorize(&admin1, Action::Update, &a1).await.unwrap(),
            Decision::Allow
        );
    }

    #[tokio::test]
    async fn member_admin_may_update_but_not_delete() {
        let user_id = Uuid::new_v4();
        let assoc_id = Uuid::new_v4();
        let engine = engine(StaticMembership::with(user_id, assoc_id, MemberRole::Admin));
        let resource = association_resource(assoc_id, None);
        let member = Principal::user(user_id, UserRole::Recipient);

        assert_eq!(
            engine.authorize(&member, Action::Update, &resource).await.unwrap(),
            Decision::Allow
        );
        assert_eq!(
            engine
                .authorize(&member, Action::ManageMembers, &resource)
                .await
                .unwrap(),
            Decision::Allow
        );
        assert!(matches!(
            engine.authorize(&member, Action::Delete, &resource).await.unwrap(),
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn plain_member_role_grants_nothing() {
        let user_id = Uuid::new_v4();
        let assoc_id = Uuid::new_v4();
        let engine = engine(StaticMembership::with(user_id, assoc_id, MemberRole::Member));
        let resource = association_resource(assoc_id, None);
        let member = Principal::user(user_id, UserRole::Donor);

        assert!(matches!(
            engine.authorize(&member, Action::Update, &resource).await.unwrap(),
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn association_manages_itself_but_not_others() {
        let engine = engine(StaticMembership::empty());
        let assoc_id = Uuid::new_v4();
        let me = Principal::association(assoc_id);

        let own = association_resource(assoc_id, None);
        let other = association_resource(Uuid::new_v4(), None);

        assert_eq!(
            engine.authorize(&me, Action::Update, &own).await.unwrap(),
            Decision::Allow
        );
        assert!(matches!(
            engine.authorize(&me, Action::Update, &other).await.unwrap(),
            Decision::Deny(_)
        ));
    }

    #[tokio::test]
    async fn directories_are_admin_only() {
        let engine = engine(StaticMembership::empty());
        let donor = Principal::user(Uuid::new_v4(), UserRole::Donor);
        let admin = Principal::user(Uuid::new_v4(), UserRole::Admin);

        assert!(matches!(
            engine
                .authorize(&donor, Action::View, &Resource::UserDirectory)
                .await
                .unwrap(),
            Decision::Deny(_)
        ));
        assert_eq!(
            engine
                .authorize(&admin, Action::View, &Resource::UserDirectory)
                .await
                .unwrap(),
            Decision::Allow
        );
    }
}
