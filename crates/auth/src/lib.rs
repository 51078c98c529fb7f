//! `xadmin-auth`: credential and authorization layer.
//!
//! This crate is intentionally decoupled from HTTP and storage: it hashes and
//! checks passwords, issues and verifies tokens, and decides requests against
//! a resolved principal snapshot.

pub mod authorize;
pub mod cache;
pub mod claims;
pub mod password;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;
pub mod token;

pub use authorize::{
    AuthorizationExplanation, AuthzError, DenialKind, Grant, GrantBasis, authorize, explain, require_any_role,
    require_staff, require_superuser,
};
pub use cache::{InMemoryPermissionCache, NoPermissionCache, PermissionCache};
pub use claims::{TokenClaims, TokenKind};
pub use password::{PasswordError, PasswordHasher, PasswordPolicy};
pub use permissions::{PermissionEntry, PermissionSet};
pub use policy::{AccessPolicy, MethodSet, PolicyError, Whitelist};
pub use principal::{Principal, PrincipalState};
pub use roles::RoleCode;
pub use token::{SigningAlgorithm, TokenError, TokenPair, TokenService, TokenSettings};
