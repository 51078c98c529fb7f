//! `xadmin-core`: shared building blocks for the admin backend.
//!
//! This crate contains **pure** primitives (no infrastructure concerns).

pub mod error;
pub mod id;
pub mod page;

pub use error::{DomainError, DomainResult};
pub use id::{ConfigId, DataPermissionId, DeptId, LoginLogId, MenuId, RoleId, UserId};
pub use page::{Page, PageRequest};
