use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use xadmin_auth::PermissionCache;
use xadmin_core::{DataPermissionId, MenuId, Page, PageRequest, RoleId};

use super::{ServiceError, ServiceResult, optional, required};
use crate::directory::{DirectoryStore, RoleRecord};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoleInput {
    pub name: String,
    pub code: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub menu_ids: Option<Vec<MenuId>>,
    #[serde(default)]
    pub data_permission_ids: Option<Vec<DataPermissionId>>,
}

fn default_true() -> bool {
    true
}

/// Roles and their menu grants. Every mutation flushes the whole permission
/// cache, since any number of users may hold the role.
pub struct RoleService {
    store: Arc<dyn DirectoryStore>,
    cache: Arc<dyn PermissionCache>,
}

impl RoleService {
    pub fn new(store: Arc<dyn DirectoryStore>, cache: Arc<dyn PermissionCache>) -> Self {
        Self { store, cache }
    }

    pub async fn get(&self, id: RoleId) -> ServiceResult<RoleRecord> {
        self.store
            .role_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("role"))
    }

    pub async fn list(&self, request: &PageRequest) -> ServiceResult<Page<RoleRecord>> {
        let roles: Vec<RoleRecord> = self
            .store
            .list_roles()
            .await?
            .into_iter()
            .filter(|r| request.matches(&[Some(r.name.as_str()), Some(r.code.as_str()), r.description.as_deref()]))
            .collect();
        Ok(Page::from_vec(roles, request))
    }

    pub async fn create(&self, input: RoleInput) -> ServiceResult<RoleRecord> {
        let name = required("name", &input.name)?;
        let code = required("code", &input.code)?;
        self.ensure_unique(None, &name, &code).await?;

        let menu_ids = input.menu_ids.unwrap_or_default();
        self.ensure_menus(&menu_ids).await?;
        let data_permission_ids = input.data_permission_ids.unwrap_or_default();
        self.ensure_data_permissions(&data_permission_ids).await?;

        let now = Utc::now();
        let role = RoleRecord {
            id: RoleId::new(),
            name,
            code,
            is_active: input.is_active,
            sort: input.sort,
            description: optional(input.description.as_deref()),
            menu_ids,
            data_permission_ids,
            created_at: now,
            updated_at: now,
        };
        self.store.save_role(&role).await?;
        self.cache.invalidate_all();
        tracing::info!(role_id = %role.id, code = %role.code, "role created");
        Ok(role)
    }

    /// Full replacement of the editable fields. Menu and data-permission
    /// lists are only replaced when supplied.
    pub async fn update(&self, id: RoleId, input: RoleInput) -> ServiceResult<RoleRecord> {
        let mut role = self.get(id).await?;
        let name = required("name", &input.name)?;
        let code = required("code", &input.code)?;
        self.ensure_unique(Some(id), &name, &code).await?;

        if let Some(menu_ids) = input.menu_ids {
            self.ensure_menus(&menu_ids).await?;
            role.menu_ids = menu_ids;
        }
        if let Some(ids) = input.data_permission_ids {
            self.ensure_data_permissions(&ids).await?;
            role.data_permission_ids = ids;
        }
        role.name = name;
        role.code = code;
        role.is_active = input.is_active;
        role.sort = input.sort;
        role.description = optional(input.description.as_deref());
        role.updated_at = Utc::now();

        self.store.save_role(&role).await?;
        self.cache.invalidate_all();
        Ok(role)
    }

    pub async fn delete(&self, id: RoleId) -> ServiceResult<()> {
        if !self.store.delete_role(id).await? {
            return Err(ServiceError::not_found("role"));
        }
        self.cache.invalidate_all();
        tracing::info!(role_id = %id, "role deleted");
        Ok(())
    }

    pub async fn assign_menus(&self, id: RoleId, menu_ids: Vec<MenuId>) -> ServiceResult<RoleRecord> {
        let mut role = self.get(id).await?;
        self.ensure_menus(&menu_ids).await?;
        let mut seen = std::collections::HashSet::new();
        role.menu_ids = menu_ids.into_iter().filter(|m| seen.insert(*m)).collect();
        role.updated_at = Utc::now();
        self.store.save_role(&role).await?;
        self.cache.invalidate_all();
        Ok(role)
    }

    async fn ensure_unique(&self, exclude: Option<RoleId>, name: &str, code: &str) -> ServiceResult<()> {
        let roles = self.store.list_roles().await?;
        let others = roles.iter().filter(|r| Some(r.id) != exclude);
        for r in others {
            if r.name == name {
                return Err(ServiceError::conflict("role name already exists"));
            }
            if r.code == code {
                return Err(ServiceError::conflict("role code already exists"));
            }
        }
        Ok(())
    }

    async fn ensure_menus(&self, menu_ids: &[MenuId]) -> ServiceResult<()> {
        for id in menu_ids {
            if self.store.menu_by_id(*id).await?.is_none() {
                return Err(ServiceError::validation(format!("menu {id} does not exist")));
            }
        }
        Ok(())
    }

    async fn ensure_data_permissions(&self, ids: &[DataPermissionId]) -> ServiceResult<()> {
        for id in ids {
            if self.store.data_permission_by_id(*id).await?.is_none() {
                return Err(ServiceError::validation(format!("data permission {id} does not exist")));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectoryStore;
    use xadmin_auth::{InMemoryPermissionCache, PermissionSet};
    use xadmin_core::UserId;

    fn input(name: &str, code: &str) -> RoleInput {
        RoleInput {
            name: name.to_string(),
            code: code.to_string(),
            is_active: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn name_and_code_are_unique() {
        let svc = RoleService::new(
            Arc::new(InMemoryDirectoryStore::new()),
            Arc::new(InMemoryPermissionCache::default()),
        );
        let ops = svc.create(input("Operators", "ops")).await.unwrap();
        assert!(svc.create(input("Operators", "other")).await.is_err());
        assert!(svc.create(input("Other", "ops")).await.is_err());

        let renamed = svc.update(ops.id, input("Ops", "ops")).await.unwrap();
        assert_eq!(renamed.name, "Ops");
    }

    #[tokio::test]
    async fn mutations_flush_the_cache() {
        let cache = Arc::new(InMemoryPermissionCache::default());
        let svc = RoleService::new(Arc::new(InMemoryDirectoryStore::new()), cache.clone());
        let user = UserId::new();

        cache.insert(user, Arc::new(PermissionSet::empty()), cache.generation());
        let role = svc.create(input("Auditors", "audit")).await.unwrap();
        assert!(cache.get(user).is_none());

        cache.insert(user, Arc::new(PermissionSet::empty()), cache.generation());
        svc.assign_menus(role.id, vec![]).await.unwrap();
        assert!(cache.get(user).is_none());

        cache.insert(user, Arc::new(PermissionSet::empty()), cache.generation());
        svc.delete(role.id).await.unwrap();
        assert!(cache.get(user).is_none());
        assert!(svc.delete(role.id).await.is_err());
    }

    #[tokio::test]
    async fn unknown_menus_are_rejected() {
        let svc = RoleService::new(
            Arc::new(InMemoryDirectoryStore::new()),
            Arc::new(InMemoryPermissionCache::default()),
        );
        let role = svc.create(input("R", "r")).await.unwrap();
        assert!(svc.assign_menus(role.id, vec![MenuId::new()]).await.is_err());
    }
}
