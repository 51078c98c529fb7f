//! Identity resolution and request authorization against the directory.
//!
//! `AccessControl` owns the permission cache: it is the only reader, and the
//! services that mutate grants hold the same cache handle for invalidation.

use std::sync::Arc;

use xadmin_auth::{
    AccessPolicy, AuthorizationExplanation, AuthzError, Grant, PermissionCache, PermissionSet, Principal, RoleCode,
    TokenClaims, TokenService, authorize, explain,
};
use xadmin_core::UserId;

use crate::directory::{DirectoryStore, StoreResult, UserRecord, granted_role_ids};

pub struct AccessControl {
    store: Arc<dyn DirectoryStore>,
    tokens: Arc<TokenService>,
    cache: Arc<dyn PermissionCache>,
    policy: Arc<AccessPolicy>,
}

impl AccessControl {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        tokens: Arc<TokenService>,
        cache: Arc<dyn PermissionCache>,
        policy: AccessPolicy,
    ) -> Self {
        Self {
            store,
            tokens,
            cache,
            policy: Arc::new(policy),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    /// Bearer token to principal.
    ///
    /// Token failures and unknown, inactive or deleted users all yield
    /// `Ok(None)`; only storage failures are errors.
    pub async fn resolve(&self, bearer: &str) -> StoreResult<Option<Principal>> {
        let Some(claims) = self.tokens.access_claims(bearer) else {
            return Ok(None);
        };
        match self.token_owner(&claims).await? {
            Some(user) => self.principal_for(&user).await.map(Some),
            None => Ok(None),
        }
    }

    /// Account a refresh token may renew, under the same rules as
    /// [`resolve`](Self::resolve).
    pub async fn refresh_owner(&self, refresh_token: &str) -> StoreResult<Option<UserRecord>> {
        let Some(claims) = self.tokens.refresh_claims(refresh_token) else {
            return Ok(None);
        };
        self.token_owner(&claims).await
    }

    /// The live, active account a token was issued to. A token names its
    /// account by username and id; both must still agree, so a username
    /// freed by deletion or rename never passes old tokens to the next
    /// holder.
    async fn token_owner(&self, claims: &TokenClaims) -> StoreResult<Option<UserRecord>> {
        let username = claims.sub.as_str();
        let Some(user) = self.store.user_by_username(username).await? else {
            tracing::debug!(%username, "token subject has no live user");
            return Ok(None);
        };
        if !claims.is_bound_to(user.id) {
            tracing::debug!(%username, user_id = %user.id, "token was issued to another account");
            return Ok(None);
        }
        if !user.is_active {
            tracing::debug!(%username, "token subject is inactive");
            return Ok(None);
        }
        Ok(Some(user))
    }

    pub async fn principal_for(&self, user: &UserRecord) -> StoreResult<Principal> {
        let role_ids = granted_role_ids(self.store.as_ref(), user).await?;
        let roles = self
            .store
            .roles_by_ids(&role_ids)
            .await?
            .into_iter()
            .filter(|r| r.is_active)
            .map(|r| RoleCode::from(r.code));

        let mut principal = Principal::new(user.id, user.username.clone()).with_roles(roles);
        principal.is_staff = user.is_staff;
        if user.is_superuser {
            principal.is_superuser = true;
            return Ok(principal);
        }
        Ok(principal.with_permissions(self.effective_permissions(user.id).await?))
    }

    /// Cached effective set; computed from the store on a miss.
    pub async fn effective_permissions(&self, user_id: UserId) -> StoreResult<Arc<PermissionSet>> {
        if let Some(hit) = self.cache.get(user_id) {
            return Ok(hit);
        }
        let generation = self.cache.generation();
        let entries = self.store.permission_entries_for(user_id).await?;
        let set = Arc::new(PermissionSet::from_entries(entries));
        self.cache.insert(user_id, Arc::clone(&set), generation);
        Ok(set)
    }

    pub fn check(&self, principal: Option<&Principal>, path: &str, method: &str) -> Result<Grant, AuthzError> {
        authorize(principal, path, method, &self.policy)
    }

    pub fn explain(&self, principal: Option<&Principal>, path: &str, method: &str) -> AuthorizationExplanation {
        explain(principal, path, method, &self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{InMemoryDirectoryStore, MenuType};
    use crate::services::{
        DeptInput, DeptService, MenuInput, MenuService, NewUser, RoleInput, RoleService, UserService, UserUpdate,
    };
    use xadmin_auth::{GrantBasis, InMemoryPermissionCache, PasswordHasher, PasswordPolicy, TokenSettings};

    struct Fixture {
        access: AccessControl,
        users: UserService,
        roles: RoleService,
        menus: MenuService,
        depts: DeptService,
    }

    impl Fixture {
        fn token_for(&self, user: &UserRecord) -> String {
            self.access.tokens().issue_access_for(&user.username, user.id, None).unwrap()
        }
    }

    fn fixture() -> Fixture {
        let store: Arc<dyn DirectoryStore> = Arc::new(InMemoryDirectoryStore::new());
        let cache: Arc<dyn PermissionCache> = Arc::new(InMemoryPermissionCache::default());
        let tokens = Arc::new(TokenService::new(TokenSettings::new("access-test")).unwrap());
        Fixture {
            access: AccessControl::new(store.clone(), tokens, cache.clone(), AccessPolicy::default()),
            users: UserService::new(
                store.clone(),
                cache.clone(),
                PasswordHasher::with_cost(4),
                PasswordPolicy::default(),
            ),
            roles: RoleService::new(store.clone(), cache.clone()),
            menus: MenuService::new(store.clone(), cache.clone()),
            depts: DeptService::new(store, cache),
        }
    }

    fn permission_menu(name: &str, path: &str, method: &str) -> MenuInput {
        MenuInput {
            name: name.to_string(),
            title: None,
            path: path.to_string(),
            method: Some(method.to_string()),
            permission: Some(format!("{name}:perm")),
            menu_type: MenuType::Permission,
            parent_id: None,
            sort: 0,
            is_active: true,
        }
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "Valid123".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn resolve_rejects_bad_tokens_and_inactive_users() {
        let f = fixture();
        let alice = f.users.create(new_user("alice")).await.unwrap();

        assert!(f.access.resolve("garbage").await.unwrap().is_none());

        let pair = f.access.tokens().issue_pair("alice", alice.id).unwrap();
        assert!(f.access.resolve(&pair.refresh_token).await.unwrap().is_none());

        let principal = f.access.resolve(&pair.access_token).await.unwrap().unwrap();
        assert_eq!(principal.user_id, alice.id);
        assert_eq!(
            f.access.refresh_owner(&pair.refresh_token).await.unwrap().map(|u| u.id),
            Some(alice.id)
        );
        assert!(f.access.refresh_owner(&pair.access_token).await.unwrap().is_none());

        f.users
            .update(
                alice.id,
                UserUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(f.access.resolve(&pair.access_token).await.unwrap().is_none());
        assert!(f.access.refresh_owner(&pair.refresh_token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tokens_without_an_account_binding_are_rejected() {
        let f = fixture();
        f.users.create(new_user("alice")).await.unwrap();
        let unbound = f.access.tokens().issue_access("alice", None).unwrap();
        assert!(f.access.resolve(&unbound).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reused_username_does_not_inherit_old_tokens() {
        let f = fixture();
        let admin = f.users.create(new_user("admin")).await.unwrap();
        let bob = f.users.create(new_user("bob")).await.unwrap();
        let pair = f.access.tokens().issue_pair("bob", bob.id).unwrap();
        assert!(f.access.resolve(&pair.access_token).await.unwrap().is_some());

        f.users.delete(admin.id, bob.id).await.unwrap();
        assert!(f.access.resolve(&pair.access_token).await.unwrap().is_none());

        let new_bob = f
            .users
            .create(NewUser {
                is_superuser: true,
                ..new_user("bob")
            })
            .await
            .unwrap();
        assert!(f.access.resolve(&pair.access_token).await.unwrap().is_none());
        assert!(f.access.refresh_owner(&pair.refresh_token).await.unwrap().is_none());

        let fresh = f.token_for(&new_bob);
        assert!(f.access.resolve(&fresh).await.unwrap().unwrap().is_superuser);
    }

    #[tokio::test]
    async fn renamed_account_name_is_not_handed_to_its_next_holder() {
        let f = fixture();
        let carol = f.users.create(new_user("carol")).await.unwrap();
        let token = f.token_for(&carol);

        f.users
            .update(
                carol.id,
                UserUpdate {
                    username: Some("caroline".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        f.users.create(new_user("carol")).await.unwrap();
        assert!(f.access.resolve(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn role_and_menu_edits_take_effect_immediately() {
        let f = fixture();
        let alice = f.users.create(new_user("alice")).await.unwrap();
        let token = f.token_for(&alice);

        let list = f.menus.create(permission_menu("user-list", "api/system/user", "GET")).await.unwrap();
        let role = f
            .roles
            .create(RoleInput {
                name: "Viewers".to_string(),
                code: "viewer".to_string(),
                is_active: true,
                ..Default::default()
            })
            .await
            .unwrap();
        f.users.assign_roles(alice.id, vec![role.id]).await.unwrap();

        let p = f.access.resolve(&token).await.unwrap().unwrap();
        assert!(matches!(
            f.access.check(Some(&p), "/api/system/user", "GET"),
            Err(AuthzError::Forbidden(_))
        ));

        f.roles.assign_menus(role.id, vec![list.id]).await.unwrap();
        let p = f.access.resolve(&token).await.unwrap().unwrap();
        let grant = f.access.check(Some(&p), "/api/system/user/search-columns", "GET").unwrap();
        assert_eq!(grant.basis, GrantBasis::Permission);
        assert_eq!(grant.menu_id, Some(list.id));
        assert!(p.has_role("viewer"));

        let mut disabled = permission_menu("user-list", "api/system/user", "GET");
        disabled.is_active = false;
        f.menus.update(list.id, disabled).await.unwrap();
        let p = f.access.resolve(&token).await.unwrap().unwrap();
        assert!(f.access.check(Some(&p), "/api/system/user", "GET").is_err());
    }

    #[tokio::test]
    async fn superusers_skip_permission_loading() {
        let f = fixture();
        let root = f
            .users
            .create(NewUser {
                is_superuser: true,
                ..new_user("root")
            })
            .await
            .unwrap();
        let token = f.token_for(&root);
        let p = f.access.resolve(&token).await.unwrap().unwrap();
        assert!(p.is_superuser);
        assert!(p.permissions.is_empty());
        assert_eq!(
            f.access.check(Some(&p), "/anything", "DELETE").unwrap().basis,
            GrantBasis::Superuser
        );
    }

    #[tokio::test]
    async fn department_roles_grant_while_the_department_is_active() {
        let f = fixture();
        let menu = f.menus.create(permission_menu("dept-list", "api/system/dept", "GET")).await.unwrap();
        let role = f
            .roles
            .create(RoleInput {
                name: "Members".to_string(),
                code: "member".to_string(),
                is_active: true,
                menu_ids: Some(vec![menu.id]),
                ..Default::default()
            })
            .await
            .unwrap();
        let ops = DeptInput {
            name: "Operations".to_string(),
            code: "ops".to_string(),
            parent_id: None,
            is_active: true,
            sort: 0,
            leader: None,
            phone: None,
            email: None,
            role_ids: Some(vec![role.id]),
        };
        let dept = f.depts.create(ops.clone()).await.unwrap();
        let dana = f
            .users
            .create(NewUser {
                dept_id: Some(dept.id),
                ..new_user("dana")
            })
            .await
            .unwrap();
        let token = f.token_for(&dana);

        let p = f.access.resolve(&token).await.unwrap().unwrap();
        assert!(p.has_role("member"));
        let grant = f.access.check(Some(&p), "/api/system/dept", "GET").unwrap();
        assert_eq!(grant.menu_id, Some(menu.id));
        assert_eq!(f.users.permission_codes(dana.id).await.unwrap(), vec!["dept-list:perm".to_string()]);

        f.depts
            .update(
                dept.id,
                DeptInput {
                    is_active: false,
                    ..ops
                },
            )
            .await
            .unwrap();
        let p = f.access.resolve(&token).await.unwrap().unwrap();
        assert!(!p.has_role("member"));
        assert!(matches!(
            f.access.check(Some(&p), "/api/system/dept", "GET"),
            Err(AuthzError::Forbidden(_))
        ));
    }
}
