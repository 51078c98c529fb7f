//! HTTP API: configuration, server wiring, routing and request/response
//! mapping for the admin backend.

pub mod app;
pub mod config;
pub mod context;
pub mod middleware;
