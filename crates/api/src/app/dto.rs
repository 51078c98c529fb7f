//! Request/response DTOs that don't map 1:1 onto a service input.

use serde::{Deserialize, Serialize};

use xadmin_auth::{Grant, PasswordPolicy, TokenPair};
use xadmin_core::{DataPermissionId, DeptId, MenuId, PageRequest, RoleId, UserId};
use xadmin_infra::directory::UserRecord;
use xadmin_infra::services::{UserFilter, UserUpdate};

// ─────────────────────────────────────────────────────────────────────────────
// Auth
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: UserRecord,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub nickname: Option<String>,
}

/// What the login/register pages need before submitting.
#[derive(Debug, Serialize)]
pub struct AuthOptions {
    pub registration_enabled: bool,
    pub password_rules: PasswordPolicy,
    pub access_token_lifetime: i64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Current user
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct UserInfo {
    #[serde(flatten)]
    pub user: UserRecord,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    pub grant: Grant,
}

/// Self-service profile edit; privileged fields are not accepted here.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdate {
    pub nickname: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl From<ProfileUpdate> for UserUpdate {
    fn from(value: ProfileUpdate) -> Self {
        UserUpdate {
            nickname: value.nickname,
            email: value.email,
            phone: value.phone,
            ..UserUpdate::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

/// Flat query string for the user list; urlencoded queries can't flatten
/// nested structs with numeric fields.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UserListQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub search: Option<String>,
    pub is_active: Option<bool>,
    pub dept_id: Option<DeptId>,
    pub role_id: Option<RoleId>,
}

impl UserListQuery {
    pub fn split(self) -> (PageRequest, UserFilter) {
        let defaults = PageRequest::default();
        let page = PageRequest {
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
            search: self.search,
        };
        let filter = UserFilter {
            is_active: self.is_active,
            dept_id: self.dept_id,
            role_id: self.role_id,
        };
        (page, filter)
    }
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct AssignRolesRequest {
    pub role_ids: Vec<RoleId>,
}

#[derive(Debug, Deserialize)]
pub struct AssignPermissionsRequest {
    pub permission_ids: Vec<DataPermissionId>,
}

#[derive(Debug, Deserialize)]
pub struct BatchDeleteRequest {
    pub ids: Vec<UserId>,
}

#[derive(Debug, Serialize)]
pub struct BatchDeleteResponse {
    pub deleted: usize,
}

/// One filterable column of the user list.
#[derive(Debug, Clone, Serialize)]
pub struct SearchColumn {
    pub key: &'static str,
    pub label: &'static str,
    pub input_type: &'static str,
}

pub const USER_SEARCH_COLUMNS: &[SearchColumn] = &[
    SearchColumn {
        key: "search",
        label: "username / nickname / email / phone",
        input_type: "input",
    },
    SearchColumn {
        key: "is_active",
        label: "active",
        input_type: "select",
    },
    SearchColumn {
        key: "dept_id",
        label: "department",
        input_type: "api-select",
    },
    SearchColumn {
        key: "role_id",
        label: "role",
        input_type: "api-select",
    },
];

// ─────────────────────────────────────────────────────────────────────────────
// Roles / permissions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AssignMenusRequest {
    pub menu_ids: Vec<MenuId>,
}

#[derive(Debug, Deserialize)]
pub struct ExplainQuery {
    pub path: String,
    #[serde(default = "default_method")]
    pub method: String,
    /// Explain for another user instead of the caller (staff only).
    #[serde(default)]
    pub user_id: Option<UserId>,
}

fn default_method() -> String {
    "GET".to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Login logs
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginLogQuery {
    pub page: Option<u32>,
    pub size: Option<u32>,
    pub search: Option<String>,
    pub succeeded: Option<bool>,
}

impl LoginLogQuery {
    pub fn split(self) -> (PageRequest, Option<bool>) {
        let defaults = PageRequest::default();
        let page = PageRequest {
            page: self.page.unwrap_or(defaults.page),
            size: self.size.unwrap_or(defaults.size),
            search: self.search,
        };
        (page, self.succeeded)
    }
}
