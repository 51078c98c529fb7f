use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use xadmin_auth::PermissionCache;
use xadmin_auth::permissions::compile_path;
use xadmin_core::{DataPermissionId, Page, PageRequest};

use super::{ServiceError, ServiceResult, required};
use crate::directory::{DataPermissionRecord, DirectoryStore};

#[derive(Debug, Clone, Deserialize)]
pub struct DataPermissionInput {
    pub name: String,
    pub code: String,
    pub path: String,
    pub method: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// Direct grants. Edits flush the whole permission cache.
pub struct DataPermissionService {
    store: Arc<dyn DirectoryStore>,
    cache: Arc<dyn PermissionCache>,
}

impl DataPermissionService {
    pub fn new(store: Arc<dyn DirectoryStore>, cache: Arc<dyn PermissionCache>) -> Self {
        Self { store, cache }
    }

    pub async fn get(&self, id: DataPermissionId) -> ServiceResult<DataPermissionRecord> {
        self.store
            .data_permission_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("data permission"))
    }

    pub async fn list(&self, request: &PageRequest) -> ServiceResult<Page<DataPermissionRecord>> {
        let all: Vec<DataPermissionRecord> = self
            .store
            .list_data_permissions()
            .await?
            .into_iter()
            .filter(|p| request.matches(&[Some(p.name.as_str()), Some(p.code.as_str()), Some(p.path.as_str())]))
            .collect();
        Ok(Page::from_vec(all, request))
    }

    pub async fn create(&self, input: DataPermissionInput) -> ServiceResult<DataPermissionRecord> {
        let (name, code, path, method) = validate(&input)?;
        self.ensure_unique(None, &code).await?;

        let now = Utc::now();
        let permission = DataPermissionRecord {
            id: DataPermissionId::new(),
            name,
            code,
            path,
            method,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        self.store.save_data_permission(&permission).await?;
        self.cache.invalidate_all();
        Ok(permission)
    }

    pub async fn update(&self, id: DataPermissionId, input: DataPermissionInput) -> ServiceResult<DataPermissionRecord> {
        let mut permission = self.get(id).await?;
        let (name, code, path, method) = validate(&input)?;
        self.ensure_unique(Some(id), &code).await?;

        permission.name = name;
        permission.code = code;
        permission.path = path;
        permission.method = method;
        permission.is_active = input.is_active;
        permission.updated_at = Utc::now();

        self.store.save_data_permission(&permission).await?;
        self.cache.invalidate_all();
        Ok(permission)
    }

    pub async fn delete(&self, id: DataPermissionId) -> ServiceResult<()> {
        if !self.store.delete_data_permission(id).await? {
            return Err(ServiceError::not_found("data permission"));
        }
        self.cache.invalidate_all();
        Ok(())
    }

    async fn ensure_unique(&self, exclude: Option<DataPermissionId>, code: &str) -> ServiceResult<()> {
        let taken = self
            .store
            .list_data_permissions()
            .await?
            .iter()
            .any(|p| Some(p.id) != exclude && p.code == code);
        if taken {
            return Err(ServiceError::conflict("data permission code already exists"));
        }
        Ok(())
    }
}

fn validate(input: &DataPermissionInput) -> ServiceResult<(String, String, String, String)> {
    let name = required("name", &input.name)?;
    let code = required("code", &input.code)?;
    let path = required("path", &input.path)?;
    let method = required("method", &input.method)?.to_ascii_uppercase();
    compile_path(&path).map_err(|e| ServiceError::validation(format!("invalid permission path: {e}")))?;
    Ok((name, code, path, method))
}
