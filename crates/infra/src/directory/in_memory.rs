//! In-memory directory store for tests/dev.

use std::collections::HashMap;
use std::sync::RwLock;

use xadmin_auth::PermissionEntry;
use xadmin_core::{DataPermissionId, DeptId, MenuId, RoleId, UserId};

use super::{
    ConfigRecord, DataPermissionRecord, DeptRecord, DirectoryStore, LoginLogRecord, MenuRecord, MenuType, RoleRecord,
    StoreError, StoreResult, UserRecord,
};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, UserRecord>,
    roles: HashMap<RoleId, RoleRecord>,
    menus: HashMap<MenuId, MenuRecord>,
    depts: HashMap<DeptId, DeptRecord>,
    data_permissions: HashMap<DataPermissionId, DataPermissionRecord>,
    configs: HashMap<String, ConfigRecord>,
    login_logs: Vec<LoginLogRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryDirectoryStore {
    inner: RwLock<Tables>,
}

impl InMemoryDirectoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read<T>(&self, f: impl FnOnce(&Tables) -> T) -> StoreResult<T> {
        let tables = self
            .inner
            .read()
            .map_err(|_| StoreError::Storage("directory lock poisoned".to_string()))?;
        Ok(f(&tables))
    }

    fn write<T>(&self, f: impl FnOnce(&mut Tables) -> T) -> StoreResult<T> {
        let mut tables = self
            .inner
            .write()
            .map_err(|_| StoreError::Storage("directory lock poisoned".to_string()))?;
        Ok(f(&mut tables))
    }
}

fn sorted<T: Clone, K: Ord>(values: impl Iterator<Item = T>, key: impl Fn(&T) -> K) -> Vec<T> {
    let mut out: Vec<T> = values.collect();
    out.sort_by_key(|v| key(v));
    out
}

#[async_trait::async_trait]
impl DirectoryStore for InMemoryDirectoryStore {
    async fn user_by_id(&self, id: UserId) -> StoreResult<Option<UserRecord>> {
        self.read(|t| t.users.get(&id).filter(|u| !u.is_deleted).cloned())
    }

    async fn user_by_username(&self, username: &str) -> StoreResult<Option<UserRecord>> {
        self.read(|t| {
            t.users
                .values()
                .find(|u| !u.is_deleted && u.username == username)
                .cloned()
        })
    }

    async fn list_users(&self) -> StoreResult<Vec<UserRecord>> {
        self.read(|t| sorted(t.users.values().filter(|u| !u.is_deleted).cloned(), |u| (u.created_at, u.id)))
    }

    async fn save_user(&self, user: &UserRecord) -> StoreResult<()> {
        self.write(|t| {
            t.users.insert(user.id, user.clone());
        })
    }

    async fn count_users_in_dept(&self, dept_id: DeptId) -> StoreResult<usize> {
        self.read(|t| {
            t.users
                .values()
                .filter(|u| !u.is_deleted && u.dept_id == Some(dept_id))
                .count()
        })
    }

    async fn role_by_id(&self, id: RoleId) -> StoreResult<Option<RoleRecord>> {
        self.read(|t| t.roles.get(&id).cloned())
    }

    async fn roles_by_ids(&self, ids: &[RoleId]) -> StoreResult<Vec<RoleRecord>> {
        self.read(|t| ids.iter().filter_map(|id| t.roles.get(id).cloned()).collect())
    }

    async fn list_roles(&self) -> StoreResult<Vec<RoleRecord>> {
        self.read(|t| sorted(t.roles.values().cloned(), |r| (r.sort, r.id)))
    }

    async fn save_role(&self, role: &RoleRecord) -> StoreResult<()> {
        self.write(|t| {
            t.roles.insert(role.id, role.clone());
        })
    }

    async fn delete_role(&self, id: RoleId) -> StoreResult<bool> {
        self.write(|t| {
            let removed = t.roles.remove(&id).is_some();
            for user in t.users.values_mut() {
                user.role_ids.retain(|r| *r != id);
            }
            for dept in t.depts.values_mut() {
                dept.role_ids.retain(|r| *r != id);
            }
            removed
        })
    }

    async fn menu_by_id(&self, id: MenuId) -> StoreResult<Option<MenuRecord>> {
        self.read(|t| t.menus.get(&id).cloned())
    }

    async fn list_menus(&self) -> StoreResult<Vec<MenuRecord>> {
        self.read(|t| sorted(t.menus.values().cloned(), |m| (m.sort, m.id)))
    }

    async fn save_menu(&self, menu: &MenuRecord) -> StoreResult<()> {
        self.write(|t| {
            t.menus.insert(menu.id, menu.clone());
        })
    }

    async fn delete_menu(&self, id: MenuId) -> StoreResult<bool> {
        self.write(|t| {
            let removed = t.menus.remove(&id).is_some();
            for role in t.roles.values_mut() {
                role.menu_ids.retain(|m| *m != id);
            }
            removed
        })
    }

    async fn dept_by_id(&self, id: DeptId) -> StoreResult<Option<DeptRecord>> {
        self.read(|t| t.depts.get(&id).cloned())
    }

    async fn list_depts(&self) -> StoreResult<Vec<DeptRecord>> {
        self.read(|t| sorted(t.depts.values().cloned(), |d| (d.sort, d.id)))
    }

    async fn save_dept(&self, dept: &DeptRecord) -> StoreResult<()> {
        self.write(|t| {
            t.depts.insert(dept.id, dept.clone());
        })
    }

    async fn delete_dept(&self, id: DeptId) -> StoreResult<bool> {
        self.write(|t| t.depts.remove(&id).is_some())
    }

    async fn data_permission_by_id(&self, id: DataPermissionId) -> StoreResult<Option<DataPermissionRecord>> {
        self.read(|t| t.data_permissions.get(&id).cloned())
    }

    async fn list_data_permissions(&self) -> StoreResult<Vec<DataPermissionRecord>> {
        self.read(|t| sorted(t.data_permissions.values().cloned(), |p| (p.created_at, p.id)))
    }

    async fn save_data_permission(&self, permission: &DataPermissionRecord) -> StoreResult<()> {
        self.write(|t| {
            t.data_permissions.insert(permission.id, permission.clone());
        })
    }

    async fn delete_data_permission(&self, id: DataPermissionId) -> StoreResult<bool> {
        self.write(|t| {
            let removed = t.data_permissions.remove(&id).is_some();
            for user in t.users.values_mut() {
                user.data_permission_ids.retain(|p| *p != id);
            }
            for role in t.roles.values_mut() {
                role.data_permission_ids.retain(|p| *p != id);
            }
            removed
        })
    }

    async fn config_by_key(&self, key: &str) -> StoreResult<Option<ConfigRecord>> {
        self.read(|t| t.configs.get(key).cloned())
    }

    async fn list_configs(&self) -> StoreResult<Vec<ConfigRecord>> {
        self.read(|t| sorted(t.configs.values().cloned(), |c| c.key.clone()))
    }

    async fn save_config(&self, config: &ConfigRecord) -> StoreResult<()> {
        self.write(|t| {
            t.configs.insert(config.key.clone(), config.clone());
        })
    }

    async fn delete_config(&self, key: &str) -> StoreResult<bool> {
        self.write(|t| t.configs.remove(key).is_some())
    }

    async fn save_login_log(&self, entry: &LoginLogRecord) -> StoreResult<()> {
        self.write(|t| t.login_logs.push(entry.clone()))
    }

    async fn list_login_logs(&self) -> StoreResult<Vec<LoginLogRecord>> {
        self.read(|t| {
            let mut logs = t.login_logs.clone();
            logs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
            logs
        })
    }

    async fn permission_entries_for(&self, user_id: UserId) -> StoreResult<Vec<PermissionEntry>> {
        self.read(|t| {
            let Some(user) = t.users.get(&user_id).filter(|u| !u.is_deleted) else {
                return Vec::new();
            };

            let dept_roles = user
                .dept_id
                .and_then(|id| t.depts.get(&id))
                .filter(|d| d.is_active)
                .map(|d| d.role_ids.as_slice())
                .unwrap_or_default();

            let mut role_ids: Vec<RoleId> = Vec::new();
            for id in user.role_ids.iter().chain(dept_roles) {
                if !role_ids.contains(id) {
                    role_ids.push(*id);
                }
            }

            let mut from_roles: Vec<PermissionEntry> = Vec::new();
            let menus = role_ids
                .iter()
                .filter_map(|id| t.roles.get(id))
                .filter(|r| r.is_active)
                .flat_map(|r| r.menu_ids.iter())
                .filter_map(|id| t.menus.get(id))
                .filter(|m| m.is_active && m.menu_type == MenuType::Permission)
                .filter_map(|m| m.method.as_ref().map(|method| (m, method)));
            let mut seen_menus = Vec::new();
            for (menu, method) in menus {
                if !seen_menus.contains(&menu.id) {
                    seen_menus.push(menu.id);
                    from_roles.push(PermissionEntry::new(menu.path.clone(), method.clone()).with_menu(menu.id));
                }
            }

            let direct = user
                .data_permission_ids
                .iter()
                .filter_map(|id| t.data_permissions.get(id))
                .filter(|p| p.is_active)
                .map(|p| PermissionEntry::new(p.path.clone(), p.method.clone()));

            from_roles.into_iter().chain(direct).collect()
        })
    }
}
