//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: store selection, caches and service objects
//! - `routes/`: HTTP routes + handlers (one file per admin area)
//! - `dto.rs`: request/response DTOs
//! - `errors.rs`: response envelope and error mapping

use std::sync::Arc;

use axum::{Extension, Router};
use tower::ServiceBuilder;

use crate::config::AppConfig;
use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub async fn build_app(config: &AppConfig) -> anyhow::Result<Router> {
    let services = Arc::new(services::build_services(config).await?);
    Ok(router_with(services))
}

/// Router over already-built services.
pub fn router_with(services: Arc<services::AppServices>) -> Router {
    let auth_state = middleware::AuthState {
        access: Arc::clone(&services.access),
    };

    // Protected routes: require a resolved principal and a matching grant.
    let protected = routes::router().layer(axum::middleware::from_fn_with_state(
        auth_state,
        middleware::auth_middleware,
    ));

    Router::new()
        .merge(routes::public_router())
        .merge(protected)
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
