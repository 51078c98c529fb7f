//! Process-wide logging setup for the admin server.

pub mod tracing;

pub use crate::tracing::{LogFormat, init, init_with};
