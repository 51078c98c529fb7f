//! Directory records as persisted by the stores.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use xadmin_core::{ConfigId, DataPermissionId, DeptId, DomainError, LoginLogId, MenuId, RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub nickname: String,
    pub is_active: bool,
    pub is_staff: bool,
    pub is_superuser: bool,
    pub dept_id: Option<DeptId>,
    pub role_ids: Vec<RoleId>,
    pub data_permission_ids: Vec<DataPermissionId>,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub is_deleted: bool,
}

impl UserRecord {
    pub fn new(username: impl Into<String>, password_hash: impl Into<String>, now: DateTime<Utc>) -> Self {
        let username = username.into();
        Self {
            id: UserId::new(),
            nickname: username.clone(),
            username,
            password_hash: password_hash.into(),
            email: None,
            phone: None,
            is_active: true,
            is_staff: false,
            is_superuser: false,
            dept_id: None,
            role_ids: Vec::new(),
            data_permission_ids: Vec::new(),
            last_login: None,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRecord {
    pub id: RoleId,
    pub name: String,
    pub code: String,
    pub is_active: bool,
    pub sort: i32,
    pub description: Option<String>,
    pub menu_ids: Vec<MenuId>,
    /// Row-level data scopes. Route authorization does not consult these.
    pub data_permission_ids: Vec<DataPermissionId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MenuType {
    Directory,
    Menu,
    Permission,
}

impl MenuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Directory => "directory",
            Self::Menu => "menu",
            Self::Permission => "permission",
        }
    }
}

impl core::str::FromStr for MenuType {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "directory" => Ok(Self::Directory),
            "menu" => Ok(Self::Menu),
            "permission" => Ok(Self::Permission),
            other => Err(DomainError::validation(format!("unknown menu type '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuRecord {
    pub id: MenuId,
    pub name: String,
    pub title: String,
    pub path: String,
    pub method: Option<String>,
    pub permission: Option<String>,
    pub menu_type: MenuType,
    pub parent_id: Option<MenuId>,
    pub sort: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeptRecord {
    pub id: DeptId,
    pub name: String,
    pub code: String,
    pub parent_id: Option<DeptId>,
    pub is_active: bool,
    pub sort: i32,
    pub leader: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Roles every member of an active department holds.
    pub role_ids: Vec<RoleId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A direct `(path, method)` grant that can be attached to users (and, as a
/// data scope, to roles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataPermissionRecord {
    pub id: DataPermissionId,
    pub name: String,
    pub code: String,
    pub path: String,
    pub method: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigRecord {
    pub id: ConfigId,
    pub key: String,
    pub value: serde_json::Value,
    pub name: String,
    pub category: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One login attempt, successful or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginLogRecord {
    pub id: LoginLogId,
    /// Set only when the attempt named a known account.
    pub user_id: Option<UserId>,
    pub username: String,
    pub login_type: String,
    pub succeeded: bool,
    pub message: String,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}
