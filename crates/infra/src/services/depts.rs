use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use xadmin_auth::PermissionCache;
use xadmin_core::{DeptId, PageRequest, RoleId};

use super::tree::{TreeNode, build_tree, check_parent};
use super::{ServiceError, ServiceResult, optional, required};
use crate::directory::{DeptRecord, DirectoryStore};

#[derive(Debug, Clone, Deserialize)]
pub struct DeptInput {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub parent_id: Option<DeptId>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort: i32,
    #[serde(default)]
    pub leader: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Roles granted to every member. Left untouched on update when absent.
    #[serde(default)]
    pub role_ids: Option<Vec<RoleId>>,
}

fn default_true() -> bool {
    true
}

/// Departments. Members inherit the department's roles while it is active,
/// so edits to roles or activity flush the permission cache.
pub struct DeptService {
    store: Arc<dyn DirectoryStore>,
    cache: Arc<dyn PermissionCache>,
}

impl DeptService {
    pub fn new(store: Arc<dyn DirectoryStore>, cache: Arc<dyn PermissionCache>) -> Self {
        Self { store, cache }
    }

    pub async fn get(&self, id: DeptId) -> ServiceResult<DeptRecord> {
        self.store
            .dept_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("department"))
    }

    pub async fn list(&self, request: &PageRequest) -> ServiceResult<Vec<DeptRecord>> {
        Ok(self
            .store
            .list_depts()
            .await?
            .into_iter()
            .filter(|d| request.matches(&[Some(d.name.as_str()), Some(d.code.as_str()), d.leader.as_deref()]))
            .collect())
    }

    pub async fn tree(&self) -> ServiceResult<Vec<TreeNode<DeptRecord>>> {
        let depts = self.store.list_depts().await?;
        Ok(build_tree(depts, |d| d.id, |d| d.parent_id))
    }

    pub async fn create(&self, input: DeptInput) -> ServiceResult<DeptRecord> {
        let depts = self.store.list_depts().await?;
        let name = required("name", &input.name)?;
        let code = required("code", &input.code)?;
        if depts.iter().any(|d| d.code == code) {
            return Err(ServiceError::conflict("department code already exists"));
        }
        if let Some(parent) = input.parent_id {
            if !depts.iter().any(|d| d.id == parent) {
                return Err(ServiceError::validation("parent department does not exist"));
            }
        }
        let role_ids = self.checked_roles(input.role_ids.unwrap_or_default()).await?;

        let now = Utc::now();
        let dept = DeptRecord {
            id: DeptId::new(),
            name,
            code,
            parent_id: input.parent_id,
            is_active: input.is_active,
            sort: input.sort,
            leader: optional(input.leader.as_deref()),
            phone: optional(input.phone.as_deref()),
            email: optional(input.email.as_deref()),
            role_ids,
            created_at: now,
            updated_at: now,
        };
        self.store.save_dept(&dept).await?;
        Ok(dept)
    }

    pub async fn update(&self, id: DeptId, input: DeptInput) -> ServiceResult<DeptRecord> {
        let depts = self.store.list_depts().await?;
        let Some(mut dept) = depts.iter().find(|d| d.id == id).cloned() else {
            return Err(ServiceError::not_found("department"));
        };
        let name = required("name", &input.name)?;
        let code = required("code", &input.code)?;
        if depts.iter().any(|d| d.id != id && d.code == code) {
            return Err(ServiceError::conflict("department code already exists"));
        }
        if let Some(parent) = input.parent_id {
            if parent != id && !depts.iter().any(|d| d.id == parent) {
                return Err(ServiceError::validation("parent department does not exist"));
            }
        }
        let parents: HashMap<DeptId, Option<DeptId>> = depts.iter().map(|d| (d.id, d.parent_id)).collect();
        check_parent("department", id, input.parent_id, depts.len(), |k| {
            parents.get(&k).copied().flatten()
        })?;
        let role_ids = match input.role_ids {
            Some(ids) => Some(self.checked_roles(ids).await?),
            None => None,
        };
        let grants_changed =
            dept.is_active != input.is_active || role_ids.as_ref().is_some_and(|r| *r != dept.role_ids);

        dept.name = name;
        dept.code = code;
        dept.parent_id = input.parent_id;
        dept.is_active = input.is_active;
        dept.sort = input.sort;
        dept.leader = optional(input.leader.as_deref());
        dept.phone = optional(input.phone.as_deref());
        dept.email = optional(input.email.as_deref());
        if let Some(role_ids) = role_ids {
            dept.role_ids = role_ids;
        }
        dept.updated_at = Utc::now();

        self.store.save_dept(&dept).await?;
        if grants_changed {
            self.cache.invalidate_all();
        }
        Ok(dept)
    }

    /// Refused while child departments or member users exist.
    pub async fn delete(&self, id: DeptId) -> ServiceResult<()> {
        let depts = self.store.list_depts().await?;
        if !depts.iter().any(|d| d.id == id) {
            return Err(ServiceError::not_found("department"));
        }
        if depts.iter().any(|d| d.parent_id == Some(id)) {
            return Err(ServiceError::validation("department has sub-departments and cannot be deleted"));
        }
        if self.store.count_users_in_dept(id).await? > 0 {
            return Err(ServiceError::validation("department has users and cannot be deleted"));
        }
        self.store.delete_dept(id).await?;
        Ok(())
    }

    async fn checked_roles(&self, role_ids: Vec<RoleId>) -> ServiceResult<Vec<RoleId>> {
        let found = self.store.roles_by_ids(&role_ids).await?;
        if let Some(missing) = role_ids.iter().find(|id| !found.iter().any(|r| r.id == **id)) {
            return Err(ServiceError::validation(format!("role {missing} does not exist")));
        }
        let mut seen = std::collections::HashSet::new();
        Ok(role_ids.into_iter().filter(|r| seen.insert(*r)).collect())
    }
}
