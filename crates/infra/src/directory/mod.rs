//! Directory storage: users, roles, menus, departments, data permissions,
//! system configuration and the login audit trail.
//!
//! Stores are dumb persistence. Uniqueness checks, tree validation and cache
//! invalidation live in the service layer.

pub mod in_memory;
pub mod model;
pub mod postgres;

use xadmin_auth::PermissionEntry;
use xadmin_core::{DataPermissionId, DeptId, MenuId, RoleId, UserId};

pub use in_memory::InMemoryDirectoryStore;
pub use model::{
    ConfigRecord, DataPermissionRecord, DeptRecord, LoginLogRecord, MenuRecord, MenuType, RoleRecord, UserRecord,
};
pub use postgres::PostgresDirectoryStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// Async persistence contract for the directory.
///
/// Users flagged as deleted are invisible through every user method.
#[async_trait::async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>>;
    async fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>>;
    async fn list_users(&self) -> StoreResult<Vec<UserRecord>>;
    /// Insert or replace by id.
    async fn save_user(&self, user: &UserRecord) -> StoreResult<()>;
    async fn count_users_in_dept(&self, dept_id: DeptId) -> StoreResult<usize>;

    async fn role_by_id(&self, id: RoleId) -> StoreResult<Option<RoleRecord>>;
    async fn roles_by_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<RoleRecord>>;
    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>>;
    async fn save_role(&self, role: &RoleRecord) -> StoreResult<()>;
    async fn delete_role(&self, id: RoleId) -> StoreResult<bool>;

    async fn menu_by_id(&self, id: MenuId) -> StoreResult<Option<MenuRecord>>;
    async fn list_menus(&self) -> StoreResult<Vec<MenuRecord>>;
    async fn save_menu(&self, menu: &MenuRecord) -> StoreResult<()>;
    async fn delete_menu(&self, id: MenuId) -> StoreResult<bool>;

    async fn dept_by_id(&self, id: DeptId) -> StoreResult<Option<DeptRecord>>;
    async fn list_depts(&self) -> StoreResult<Vec<DeptRecord>>;
    async fn save_dept(&self, dept: &DeptRecord) -> StoreResult<()>;
    async fn delete_dept(&self, id: DeptId) -> StoreResult<bool>;

    async fn data_permission_by_id(&self, id: DataPermissionId) -> StoreResult<Option<DataPermissionRecord>>;
    async fn list_data_permissions(&self) -> StoreResult<Vec<DataPermissionRecord>>;
    async fn save_data_permission(&self, permission: &DataPermissionRecord) -> StoreResult<()>;
    async fn delete_data_permission(&self, id: DataPermissionId) -> StoreResult<bool>;

    async fn config_by_key(&self, key: &str) -> StoreResult<Option<ConfigRecord>>;
    async fn list_configs(&self) -> StoreResult<Vec<ConfigRecord>>;
    async fn save_config(&self, config: &ConfigRecord) -> StoreResult<()>;
    async fn delete_config(&self, key: &str) -> StoreResult<bool>;

    async fn save_login_log(&self, entry: &LoginLogRecord) -> StoreResult<()>;
    /// Newest first.
    async fn list_login_logs(&self) -> StoreResult<Vec<LoginLogRecord>>;

    /// Flat `(menu id?, path, method)` grants for a user: active permission
    /// menus of the active roles held directly or through an active
    /// department, plus the user's active direct permissions.
    async fn permission_entries_for(&self, user_id: UserId) -> StoreResult<Vec<PermissionEntry>>;
}

/// Role ids a user holds: their own, then those of their department while it
/// is active. Duplicates are dropped; role activity is not checked here.
pub async fn granted_role_ids(store: &dyn DirectoryStore, user: &UserRecord) -> StoreResult<Vec<RoleId>> {
    let mut ids = user.role_ids.clone();
    if let Some(dept_id) = user.dept_id {
        if let Some(dept) = store.dept_by_id(dept_id).await?.filter(|d| d.is_active) {
            ids.extend(dept.role_ids);
        }
    }
    let mut seen = std::collections::HashSet::new();
    ids.retain(|id| seen.insert(*id));
    Ok(ids)
}
