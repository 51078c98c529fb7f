use std::sync::Arc;

use xadmin_auth::{Grant, Principal};
use xadmin_core::UserId;

/// Principal context for a request (resolved identity + the grant that let
/// the request through).
///
/// Inserted by the auth middleware; present for every protected route.
#[derive(Debug, Clone)]
pub struct PrincipalContext {
    principal: Arc<Principal>,
    grant: Grant,
}

impl PrincipalContext {
    pub fn new(principal: Principal, grant: Grant) -> Self {
        Self {
            principal: Arc::new(principal),
            grant,
        }
    }

    pub fn user_id(&self) -> UserId {
        self.principal.user_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn grant(&self) -> &Grant {
        &self.grant
    }
}
