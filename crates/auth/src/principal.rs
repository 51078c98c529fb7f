use std::sync::Arc;

use serde::Serialize;

use xadmin_core::UserId;

use crate::permissions::PermissionSet;
use crate::roles::RoleCode;

/// A resolved principal: everything authorization needs, frozen at
/// resolution time.
///
/// Superusers carry an empty permission set; it is never consulted for them.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub roles: Vec<RoleCode>,
    pub permissions: Arc<PermissionSet>,
}

impl Principal {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            is_superuser: false,
            is_staff: false,
            roles: Vec::new(),
            permissions: Arc::new(PermissionSet::empty()),
        }
    }

    pub fn superuser(mut self) -> Self {
        self.is_superuser = true;
        self
    }

    pub fn staff(mut self) -> Self {
        self.is_staff = true;
        self
    }

    pub fn with_roles(mut self, roles: impl IntoIterator<Item = RoleCode>) -> Self {
        self.roles = roles.into_iter().collect();
        self
    }

    pub fn with_permissions(mut self, permissions: Arc<PermissionSet>) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn has_role(&self, code: &str) -> bool {
        self.roles.iter().any(|r| r.as_str() == code)
    }

    pub fn summary(&self) -> PrincipalState {
        let mut effective_permissions: Vec<String> = self
            .permissions
            .entries()
            .map(|e| format!("{} {}", e.method.to_ascii_uppercase(), e.path))
            .collect();
        effective_permissions.sort();

        PrincipalState {
            user_id: self.user_id,
            username: self.username.clone(),
            is_superuser: self.is_superuser,
            is_staff: self.is_staff,
            roles: self.roles.iter().map(|r| r.as_str().to_string()).collect(),
            effective_permissions,
        }
    }
}

/// Serialisable view of a principal used by decision explanations.
#[derive(Debug, Clone, Serialize)]
pub struct PrincipalState {
    pub user_id: UserId,
    pub username: String,
    pub is_superuser: bool,
    pub is_staff: bool,
    pub roles: Vec<String>,
    pub effective_permissions: Vec<String>,
}
