//! User management: accounts, credentials and grants.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use xadmin_auth::{PasswordHasher, PasswordPolicy, PermissionCache};
use xadmin_core::{DataPermissionId, DeptId, Page, PageRequest, RoleId, UserId};

use super::{ServiceError, ServiceResult, optional, required};
use crate::directory::{DirectoryStore, MenuType, UserRecord, granted_role_ids};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_staff: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default)]
    pub dept_id: Option<DeptId>,
    #[serde(default)]
    pub role_ids: Vec<RoleId>,
}

/// Partial update. `None` leaves a field untouched; an empty string clears an
/// optional contact field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nickname: Option<String>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub is_superuser: Option<bool>,
    pub dept_id: Option<DeptId>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UserFilter {
    pub is_active: Option<bool>,
    pub dept_id: Option<DeptId>,
    pub role_id: Option<RoleId>,
}

pub struct UserService {
    store: Arc<dyn DirectoryStore>,
    cache: Arc<dyn PermissionCache>,
    hasher: PasswordHasher,
    policy: PasswordPolicy,
}

impl UserService {
    pub fn new(
        store: Arc<dyn DirectoryStore>,
        cache: Arc<dyn PermissionCache>,
        hasher: PasswordHasher,
        policy: PasswordPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            hasher,
            policy,
        }
    }

    pub fn password_policy(&self) -> &PasswordPolicy {
        &self.policy
    }

    pub async fn get(&self, id: UserId) -> ServiceResult<UserRecord> {
        self.store
            .user_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("user"))
    }

    pub async fn by_username(&self, username: &str) -> ServiceResult<Option<UserRecord>> {
        Ok(self.store.user_by_username(username).await?)
    }

    /// Newest first, filtered by the search term over username, nickname,
    /// email and phone.
    pub async fn list(&self, request: &PageRequest, filter: &UserFilter) -> ServiceResult<Page<UserRecord>> {
        let mut users: Vec<UserRecord> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| {
                request.matches(&[
                    Some(u.username.as_str()),
                    Some(u.nickname.as_str()),
                    u.email.as_deref(),
                    u.phone.as_deref(),
                ])
            })
            .filter(|u| filter.is_active.is_none_or(|a| u.is_active == a))
            .filter(|u| filter.dept_id.is_none_or(|d| u.dept_id == Some(d)))
            .filter(|u| filter.role_id.is_none_or(|r| u.role_ids.contains(&r)))
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_vec(users, request))
    }

    pub async fn create(&self, input: NewUser) -> ServiceResult<UserRecord> {
        let username = required("username", &input.username)?;
        let email = optional(input.email.as_deref());
        let phone = optional(input.phone.as_deref());

        self.policy.check(&input.password)?;
        self.ensure_unique(None, Some(&username), email.as_deref(), phone.as_deref())
            .await?;
        if let Some(dept_id) = input.dept_id {
            self.ensure_dept(dept_id).await?;
        }
        self.ensure_roles(&input.role_ids).await?;

        let mut user = UserRecord::new(username, self.hasher.hash(&input.password)?, Utc::now());
        user.email = email;
        user.phone = phone;
        if let Some(nickname) = optional(input.nickname.as_deref()) {
            user.nickname = nickname;
        }
        user.is_active = input.is_active.unwrap_or(true);
        user.is_staff = input.is_staff;
        user.is_superuser = input.is_superuser;
        user.dept_id = input.dept_id;
        user.role_ids = dedup(input.role_ids);

        self.store.save_user(&user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "user created");
        Ok(user)
    }

    pub async fn update(&self, id: UserId, input: UserUpdate) -> ServiceResult<UserRecord> {
        let mut user = self.get(id).await?;

        let username = input.username.as_deref().map(|u| required("username", u)).transpose()?;
        let email = input.email.as_deref().map(|e| optional(Some(e)));
        let phone = input.phone.as_deref().map(|p| optional(Some(p)));

        self.ensure_unique(
            Some(id),
            username.as_deref(),
            email.as_ref().and_then(|e| e.as_deref()),
            phone.as_ref().and_then(|p| p.as_deref()),
        )
        .await?;
        if let Some(dept_id) = input.dept_id {
            self.ensure_dept(dept_id).await?;
        }

        if let Some(username) = username {
            user.username = username;
        }
        if let Some(email) = email {
            user.email = email;
        }
        if let Some(phone) = phone {
            user.phone = phone;
        }
        if let Some(nickname) = input.nickname {
            user.nickname = nickname.trim().to_string();
        }
        if let Some(active) = input.is_active {
            user.is_active = active;
        }
        if let Some(staff) = input.is_staff {
            user.is_staff = staff;
        }
        if let Some(superuser) = input.is_superuser {
            user.is_superuser = superuser;
        }
        if input.dept_id.is_some() {
            user.dept_id = input.dept_id;
        }
        user.updated_at = Utc::now();

        self.store.save_user(&user).await?;
        self.cache.invalidate(id);
        Ok(user)
    }

    /// Whether any live user among `ids` is a superuser. Unknown ids count as
    /// ordinary users.
    pub async fn includes_superuser(&self, ids: &[UserId]) -> ServiceResult<bool> {
        for id in ids {
            if let Some(user) = self.store.user_by_id(*id).await? {
                if user.is_superuser {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Soft delete. Users cannot delete themselves.
    pub async fn delete(&self, actor: UserId, id: UserId) -> ServiceResult<()> {
        if actor == id {
            return Err(ServiceError::validation("cannot delete yourself"));
        }
        let mut user = self.get(id).await?;
        user.is_deleted = true;
        user.updated_at = Utc::now();
        self.store.save_user(&user).await?;
        self.cache.invalidate(id);
        tracing::info!(user_id = %id, actor = %actor, "user deleted");
        Ok(())
    }

    /// Soft delete several users; unknown ids are skipped. Returns how many
    /// were deleted. Refused outright if the actor is among the targets.
    pub async fn batch_delete(&self, actor: UserId, ids: &[UserId]) -> ServiceResult<usize> {
        if ids.contains(&actor) {
            return Err(ServiceError::validation("cannot delete yourself"));
        }
        let mut deleted = 0;
        for id in dedup(ids.to_vec()) {
            let Some(mut user) = self.store.user_by_id(id).await? else {
                continue;
            };
            user.is_deleted = true;
            user.updated_at = Utc::now();
            self.store.save_user(&user).await?;
            self.cache.invalidate(id);
            deleted += 1;
        }
        Ok(deleted)
    }

    pub async fn assign_roles(&self, id: UserId, role_ids: Vec<RoleId>) -> ServiceResult<UserRecord> {
        let mut user = self.get(id).await?;
        self.ensure_roles(&role_ids).await?;
        user.role_ids = dedup(role_ids);
        user.updated_at = Utc::now();
        self.store.save_user(&user).await?;
        self.cache.invalidate(id);
        Ok(user)
    }

    pub async fn assign_permissions(
        &self,
        id: UserId,
        permission_ids: Vec<DataPermissionId>,
    ) -> ServiceResult<UserRecord> {
        let mut user = self.get(id).await?;
        for pid in &permission_ids {
            if self.store.data_permission_by_id(*pid).await?.is_none() {
                return Err(ServiceError::validation(format!("data permission {pid} does not exist")));
            }
        }
        user.data_permission_ids = dedup(permission_ids);
        user.updated_at = Utc::now();
        self.store.save_user(&user).await?;
        self.cache.invalidate(id);
        Ok(user)
    }

    /// The old password must verify before the new one is accepted.
    pub async fn change_password(&self, id: UserId, old_password: &str, new_password: &str) -> ServiceResult<()> {
        let mut user = self.get(id).await?;
        if !self.hasher.verify(old_password, &user.password_hash) {
            return Err(ServiceError::validation("old password is incorrect"));
        }
        self.policy.check(new_password)?;
        user.password_hash = self.hasher.hash(new_password)?;
        user.updated_at = Utc::now();
        self.store.save_user(&user).await?;
        Ok(())
    }

    /// Administrative reset; no old password required.
    pub async fn reset_password(&self, id: UserId, new_password: &str) -> ServiceResult<()> {
        let mut user = self.get(id).await?;
        self.policy.check(new_password)?;
        user.password_hash = self.hasher.hash(new_password)?;
        user.updated_at = Utc::now();
        self.store.save_user(&user).await?;
        tracing::info!(user_id = %id, "password reset");
        Ok(())
    }

    /// Unknown users and wrong passwords are indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> ServiceResult<UserRecord> {
        let Some(user) = self.store.user_by_username(username.trim()).await? else {
            return Err(ServiceError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &user.password_hash) {
            return Err(ServiceError::InvalidCredentials);
        }
        if !user.is_active {
            return Err(ServiceError::validation("user is inactive"));
        }
        Ok(user)
    }

    pub async fn update_last_login(&self, id: UserId) -> ServiceResult<()> {
        let mut user = self.get(id).await?;
        user.last_login = Some(Utc::now());
        self.store.save_user(&user).await?;
        Ok(())
    }

    /// Permission codes for the front end: codes of permission menus reached
    /// through active roles (own or departmental), plus codes of active
    /// direct permissions.
    pub async fn permission_codes(&self, id: UserId) -> ServiceResult<Vec<String>> {
        let user = self.get(id).await?;
        let mut codes = BTreeSet::new();

        let role_ids = granted_role_ids(self.store.as_ref(), &user).await?;
        for role in self.store.roles_by_ids(&role_ids).await? {
            if !role.is_active {
                continue;
            }
            for menu_id in &role.menu_ids {
                if let Some(menu) = self.store.menu_by_id(*menu_id).await? {
                    if menu.is_active && menu.menu_type == MenuType::Permission {
                        if let Some(code) = menu.permission {
                            codes.insert(code);
                        }
                    }
                }
            }
        }
        for pid in &user.data_permission_ids {
            if let Some(p) = self.store.data_permission_by_id(*pid).await? {
                if p.is_active {
                    codes.insert(p.code);
                }
            }
        }
        Ok(codes.into_iter().collect())
    }

    async fn ensure_unique(
        &self,
        exclude: Option<UserId>,
        username: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> ServiceResult<()> {
        let others: Vec<UserRecord> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .filter(|u| Some(u.id) != exclude)
            .collect();

        if let Some(username) = username {
            if others.iter().any(|u| u.username == username) {
                return Err(ServiceError::conflict("username already exists"));
            }
        }
        if let Some(email) = email {
            if others.iter().any(|u| u.email.as_deref() == Some(email)) {
                return Err(ServiceError::conflict("email already exists"));
            }
        }
        if let Some(phone) = phone {
            if others.iter().any(|u| u.phone.as_deref() == Some(phone)) {
                return Err(ServiceError::conflict("phone already exists"));
            }
        }
        Ok(())
    }

    async fn ensure_dept(&self, dept_id: DeptId) -> ServiceResult<()> {
        if self.store.dept_by_id(dept_id).await?.is_none() {
            return Err(ServiceError::validation(format!("department {dept_id} does not exist")));
        }
        Ok(())
    }

    async fn ensure_roles(&self, role_ids: &[RoleId]) -> ServiceResult<()> {
        let found = self.store.roles_by_ids(role_ids).await?;
        if let Some(missing) = role_ids.iter().find(|id| !found.iter().any(|r| r.id == **id)) {
            return Err(ServiceError::validation(format!("role {missing} does not exist")));
        }
        Ok(())
    }
}

fn dedup<T: Ord + Copy>(mut ids: Vec<T>) -> Vec<T> {
    let mut seen = BTreeSet::new();
    ids.retain(|id| seen.insert(*id));
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectoryStore;
    use xadmin_auth::InMemoryPermissionCache;

    fn service() -> (UserService, Arc<InMemoryPermissionCache>) {
        let cache = Arc::new(InMemoryPermissionCache::default());
        let svc = UserService::new(
            Arc::new(InMemoryDirectoryStore::new()),
            cache.clone(),
            PasswordHasher::with_cost(4),
            PasswordPolicy::default(),
        );
        (svc, cache)
    }

    fn new_user(username: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            password: "Valid123".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_rejects_weak_passwords_with_every_violation() {
        let (svc, _) = service();
        let err = svc
            .create(NewUser {
                password: "short".to_string(),
                ..new_user("alice")
            })
            .await
            .unwrap_err();
        match err {
            ServiceError::WeakPassword(list) => assert_eq!(list.len(), 3, "{list:?}"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn includes_superuser_skips_unknown_ids() {
        let (svc, _) = service();
        let plain = svc.create(new_user("alice")).await.unwrap();
        let root = svc
            .create(NewUser {
                is_superuser: true,
                ..new_user("root")
            })
            .await
            .unwrap();

        assert!(!svc.includes_superuser(&[plain.id, UserId::new()]).await.unwrap());
        assert!(svc.includes_superuser(&[plain.id, root.id]).await.unwrap());

        svc.delete(plain.id, root.id).await.unwrap();
        assert!(!svc.includes_superuser(&[root.id]).await.unwrap());
    }

    #[tokio::test]
    async fn duplicates_are_rejected_excluding_self() {
        let (svc, _) = service();
        let alice = svc
            .create(NewUser {
                email: Some("a@example.com".to_string()),
                ..new_user("alice")
            })
            .await
            .unwrap();

        assert!(matches!(svc.create(new_user("alice")).await, Err(ServiceError::Domain(_))));
        assert!(
            svc.create(NewUser {
                email: Some("a@example.com".to_string()),
                ..new_user("bob")
            })
            .await
            .is_err()
        );

        // Updating alice with her own email is fine.
        let updated = svc
            .update(
                alice.id,
                UserUpdate {
                    email: Some("a@example.com".to_string()),
                    nickname: Some("Alice".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.nickname, "Alice");
    }

    #[tokio::test]
    async fn self_deletion_is_refused() {
        let (svc, _) = service();
        let alice = svc.create(new_user("alice")).await.unwrap();
        let bob = svc.create(new_user("bob")).await.unwrap();

        assert!(svc.delete(alice.id, alice.id).await.is_err());
        assert!(svc.batch_delete(alice.id, &[bob.id, alice.id]).await.is_err());

        assert_eq!(svc.batch_delete(alice.id, &[bob.id, bob.id]).await.unwrap(), 1);
        assert!(matches!(svc.get(bob.id).await, Err(ServiceError::Domain(_))));
    }

    #[tokio::test]
    async fn soft_deleted_username_can_be_reused() {
        let (svc, _) = service();
        let admin = svc.create(new_user("admin")).await.unwrap();
        let bob = svc.create(new_user("bob")).await.unwrap();
        svc.delete(admin.id, bob.id).await.unwrap();
        assert!(svc.create(new_user("bob")).await.is_ok());
    }

    #[tokio::test]
    async fn authenticate_and_change_password() {
        let (svc, _) = service();
        let alice = svc.create(new_user("alice")).await.unwrap();

        assert!(svc.authenticate("alice", "Valid123").await.is_ok());
        assert!(matches!(
            svc.authenticate("alice", "Wrong123").await,
            Err(ServiceError::InvalidCredentials)
        ));
        assert!(matches!(
            svc.authenticate("nobody", "Valid123").await,
            Err(ServiceError::InvalidCredentials)
        ));

        assert!(svc.change_password(alice.id, "Wrong123", "Newpass123").await.is_err());
        svc.change_password(alice.id, "Valid123", "Newpass123").await.unwrap();
        assert!(svc.authenticate("alice", "Newpass123").await.is_ok());

        svc.reset_password(alice.id, "Reset1234").await.unwrap();
        assert!(svc.authenticate("alice", "Reset1234").await.is_ok());
    }

    #[tokio::test]
    async fn inactive_users_cannot_authenticate() {
        let (svc, _) = service();
        svc.create(NewUser {
            is_active: Some(false),
            ..new_user("ghost")
        })
        .await
        .unwrap();
        assert!(svc.authenticate("ghost", "Valid123").await.is_err());
    }

    #[tokio::test]
    async fn list_paginates_and_searches() {
        let (svc, _) = service();
        for name in ["alpha", "bravo", "charlie", "alphonse"] {
            svc.create(new_user(name)).await.unwrap();
        }
        let page = svc
            .list(&PageRequest::new(1, 1).with_search("ALPH"), &UserFilter::default())
            .await
            .unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.pages, 2);
        assert_eq!(page.results.len(), 1);
    }

    #[tokio::test]
    async fn assigning_roles_invalidates_cached_permissions() {
        let (svc, cache) = service();
        let alice = svc.create(new_user("alice")).await.unwrap();
        cache.insert(alice.id, Arc::new(xadmin_auth::PermissionSet::empty()), cache.generation());

        svc.assign_roles(alice.id, vec![]).await.unwrap();
        assert!(cache.get(alice.id).is_none());

        assert!(svc.assign_roles(alice.id, vec![RoleId::new()]).await.is_err());
    }
}
