//! `xadmin-infra`: directory persistence, identity resolution and the
//! service objects behind the admin API.

pub mod access;
pub mod directory;
pub mod services;

pub use access::AccessControl;
pub use directory::{DirectoryStore, InMemoryDirectoryStore, PostgresDirectoryStore, StoreError};
pub use services::{ServiceError, ServiceResult};
