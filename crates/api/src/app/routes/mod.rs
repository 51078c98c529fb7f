use axum::{
    Router,
    routing::{get, post},
};

pub mod auth;
pub mod config;
pub mod dept;
pub mod log;
pub mod menu;
pub mod permission;
pub mod rbac;
pub mod role;
pub mod system;
pub mod user;

/// Routes reachable without a token.
pub fn public_router() -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/api/auth/login/basic", get(auth::options).post(auth::login))
        .route("/api/auth/refresh", post(auth::refresh))
        .route("/api/auth/register", get(auth::options).post(auth::register))
}

/// Router for all authenticated endpoints; every request here passes the
/// path/method authorization check first.
pub fn router() -> Router {
    Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route(
            "/api/system/userinfo",
            get(system::userinfo).put(system::update_userinfo),
        )
        .route("/api/system/userinfo/password", post(system::change_password))
        .nest("/api/system/user", user::router())
        .nest("/api/system/role", role::router())
        .nest("/api/system/menu", menu::router())
        .nest("/api/system/dept", dept::router())
        .nest("/api/system/logs", log::router())
        .nest("/api/system/permission", permission::router().merge(rbac::router()))
        .nest("/api/settings/config", config::router())
}
