use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;

use xadmin_auth::PermissionCache;
use xadmin_auth::permissions::compile_path;
use xadmin_core::MenuId;

use super::tree::{TreeNode, build_tree, check_parent};
use super::{ServiceError, ServiceResult, optional, required};
use crate::directory::{DirectoryStore, MenuRecord, MenuType};

#[derive(Debug, Clone, Deserialize)]
pub struct MenuInput {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub permission: Option<String>,
    pub menu_type: MenuType,
    #[serde(default)]
    pub parent_id: Option<MenuId>,
    #[serde(default)]
    pub sort: i32,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

pub struct MenuService {
    store: Arc<dyn DirectoryStore>,
    cache: Arc<dyn PermissionCache>,
}

impl MenuService {
    pub fn new(store: Arc<dyn DirectoryStore>, cache: Arc<dyn PermissionCache>) -> Self {
        Self { store, cache }
    }

    pub async fn get(&self, id: MenuId) -> ServiceResult<MenuRecord> {
        self.store
            .menu_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("menu"))
    }

    pub async fn list(&self) -> ServiceResult<Vec<MenuRecord>> {
        Ok(self.store.list_menus().await?)
    }

    pub async fn tree(&self) -> ServiceResult<Vec<TreeNode<MenuRecord>>> {
        let menus = self.store.list_menus().await?;
        Ok(build_tree(menus, |m| m.id, |m| m.parent_id))
    }

    pub async fn create(&self, input: MenuInput) -> ServiceResult<MenuRecord> {
        let menus = self.store.list_menus().await?;
        let fields = validate(&input)?;
        if menus.iter().any(|m| m.name == fields.name) {
            return Err(ServiceError::conflict("menu name already exists"));
        }
        if let Some(parent) = input.parent_id {
            if !menus.iter().any(|m| m.id == parent) {
                return Err(ServiceError::validation("parent menu does not exist"));
            }
        }

        let now = Utc::now();
        let menu = MenuRecord {
            id: MenuId::new(),
            title: fields.title,
            name: fields.name,
            path: fields.path,
            method: fields.method,
            permission: optional(input.permission.as_deref()),
            menu_type: input.menu_type,
            parent_id: input.parent_id,
            sort: input.sort,
            is_active: input.is_active,
            created_at: now,
            updated_at: now,
        };
        self.store.save_menu(&menu).await?;
        self.cache.invalidate_all();
        Ok(menu)
    }

    pub async fn update(&self, id: MenuId, input: MenuInput) -> ServiceResult<MenuRecord> {
        let menus = self.store.list_menus().await?;
        let Some(mut menu) = menus.iter().find(|m| m.id == id).cloned() else {
            return Err(ServiceError::not_found("menu"));
        };
        let fields = validate(&input)?;
        if menus.iter().any(|m| m.id != id && m.name == fields.name) {
            return Err(ServiceError::conflict("menu name already exists"));
        }
        if let Some(parent) = input.parent_id {
            if parent != id && !menus.iter().any(|m| m.id == parent) {
                return Err(ServiceError::validation("parent menu does not exist"));
            }
        }
        let parents: HashMap<MenuId, Option<MenuId>> = menus.iter().map(|m| (m.id, m.parent_id)).collect();
        check_parent("menu", id, input.parent_id, menus.len(), |k| parents.get(&k).copied().flatten())?;

        menu.name = fields.name;
        menu.title = fields.title;
        menu.path = fields.path;
        menu.method = fields.method;
        menu.permission = optional(input.permission.as_deref());
        menu.menu_type = input.menu_type;
        menu.parent_id = input.parent_id;
        menu.sort = input.sort;
        menu.is_active = input.is_active;
        menu.updated_at = Utc::now();

        self.store.save_menu(&menu).await?;
        self.cache.invalidate_all();
        Ok(menu)
    }

    /// Refused while the menu still has children.
    pub async fn delete(&self, id: MenuId) -> ServiceResult<()> {
        let menus = self.store.list_menus().await?;
        if !menus.iter().any(|m| m.id == id) {
            return Err(ServiceError::not_found("menu"));
        }
        if menus.iter().any(|m| m.parent_id == Some(id)) {
            return Err(ServiceError::validation("menu has child menus and cannot be deleted"));
        }
        self.store.delete_menu(id).await?;
        self.cache.invalidate_all();
        Ok(())
    }
}

struct MenuFields {
    name: String,
    title: String,
    path: String,
    method: Option<String>,
}

/// Permission menus must carry a method and a compilable path.
fn validate(input: &MenuInput) -> ServiceResult<MenuFields> {
    let name = required("name", &input.name)?;
    let path = input.path.trim().to_string();
    let method = optional(input.method.as_deref()).map(|m| m.to_ascii_uppercase());

    if input.menu_type == MenuType::Permission {
        if method.is_none() {
            return Err(ServiceError::validation("permission menus require a method"));
        }
        if let Err(e) = compile_path(&path) {
            return Err(ServiceError::validation(format!("invalid permission path: {e}")));
        }
    }

    Ok(MenuFields {
        title: optional(input.title.as_deref()).unwrap_or_else(|| name.clone()),
        name,
        path,
        method,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectoryStore;
    use xadmin_auth::InMemoryPermissionCache;

    fn menu(name: &str, parent: Option<MenuId>) -> MenuInput {
        MenuInput {
            name: name.to_string(),
            title: None,
            path: format!("api/{name}"),
            method: None,
            permission: None,
            menu_type: MenuType::Menu,
            parent_id: parent,
            sort: 0,
            is_active: true,
        }
    }

    fn service() -> MenuService {
        MenuService::new(
            Arc::new(InMemoryDirectoryStore::new()),
            Arc::new(InMemoryPermissionCache::default()),
        )
    }

    #[tokio::test]
    async fn rejects_self_parent_and_cycles() {
        let svc = service();
        let root = svc.create(menu("root", None)).await.unwrap();
        let child = svc.create(menu("child", Some(root.id))).await.unwrap();
        let grandchild = svc.create(menu("grandchild", Some(child.id))).await.unwrap();

        assert!(svc.update(root.id, menu("root", Some(root.id))).await.is_err());
        assert!(svc.update(root.id, menu("root", Some(grandchild.id))).await.is_err());
        assert!(svc.update(grandchild.id, menu("grandchild", Some(root.id))).await.is_ok());
    }

    #[tokio::test]
    async fn parent_must_exist() {
        let svc = service();
        assert!(svc.create(menu("orphan", Some(MenuId::new()))).await.is_err());
    }

    #[tokio::test]
    async fn delete_refused_while_children_exist() {
        let svc = service();
        let root = svc.create(menu("root", None)).await.unwrap();
        let child = svc.create(menu("child", Some(root.id))).await.unwrap();

        assert!(svc.delete(root.id).await.is_err());
        svc.delete(child.id).await.unwrap();
        svc.delete(root.id).await.unwrap();
        assert!(svc.tree().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn permission_menus_need_method_and_valid_path() {
        let svc = service();
        let mut input = menu("perm", None);
        input.menu_type = MenuType::Permission;
        assert!(svc.create(input.clone()).await.is_err());

        input.method = Some("get".to_string());
        input.path = "api/(broken".to_string();
        assert!(svc.create(input.clone()).await.is_err());

        input.path = "api/system/user".to_string();
        let created = svc.create(input).await.unwrap();
        assert_eq!(created.method.as_deref(), Some("GET"));
    }

    #[tokio::test]
    async fn tree_nests_children() {
        let svc = service();
        let root = svc.create(menu("root", None)).await.unwrap();
        svc.create(menu("child", Some(root.id))).await.unwrap();
        let tree = svc.tree().await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children.len(), 1);
    }
}
