//! Thin service objects over the directory store.
//!
//! Services own the business rules (uniqueness, tree shape, self-deletion,
//! password strength) and trigger permission-cache invalidation whenever a
//! grant-relevant record changes.

pub mod configs;
pub mod data_permissions;
pub mod depts;
pub mod login_logs;
pub mod menus;
pub mod roles;
pub mod tree;
pub mod users;

use thiserror::Error;

use xadmin_auth::{PasswordError, TokenError};
use xadmin_core::DomainError;

use crate::directory::StoreError;

pub use configs::{ConfigInput, ConfigService};
pub use data_permissions::{DataPermissionInput, DataPermissionService};
pub use depts::{DeptInput, DeptService};
pub use login_logs::{LoginAttempt, LoginLogService};
pub use menus::{MenuInput, MenuService};
pub use roles::{RoleInput, RoleService};
pub use tree::TreeNode;
pub use users::{NewUser, UserFilter, UserService, UserUpdate};

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("password does not meet strength requirements")]
    WeakPassword(Vec<String>),

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(msg))
    }

    pub fn not_found(entity: &'static str) -> Self {
        Self::Domain(DomainError::not_found(entity))
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Domain(DomainError::conflict(msg))
    }
}

impl From<PasswordError> for ServiceError {
    fn from(value: PasswordError) -> Self {
        match value {
            PasswordError::Weak(errors) => Self::WeakPassword(errors),
            PasswordError::Hashing(msg) => Self::Internal(msg),
        }
    }
}

impl From<TokenError> for ServiceError {
    fn from(value: TokenError) -> Self {
        Self::Internal(value.to_string())
    }
}

/// Trim a required text field, rejecting blanks.
pub(crate) fn required(field: &str, value: &str) -> ServiceResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ServiceError::validation(format!("{field} must not be empty")));
    }
    Ok(value.to_string())
}

/// Trim an optional text field; blanks become `None`.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}
