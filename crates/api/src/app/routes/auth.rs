//! Login, token refresh, registration and logout.
//!
//! Everything here except logout is mounted outside the auth middleware.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Extension, Json};
use axum::http::{HeaderMap, header};

use xadmin_infra::services::{LoginAttempt, NewUser};

use crate::app::dto::{AuthOptions, LoginRequest, LoginResponse, RefreshRequest, RegisterRequest};
use crate::app::errors::{ApiError, ApiResult, Envelope};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/auth/login/basic and GET /api/auth/register
pub async fn options(Extension(services): Extension<Arc<AppServices>>) -> ApiResult<AuthOptions> {
    Ok(Envelope::ok(AuthOptions {
        registration_enabled: services.allow_registration,
        password_rules: services.users.password_policy().clone(),
        access_token_lifetime: services.tokens().access_lifetime().num_seconds(),
    }))
}

/// POST /api/auth/login/basic
///
/// Every attempt lands in the login log; a failed write is logged and does
/// not change the response.
pub async fn login(
    Extension(services): Extension<Arc<AppServices>>,
    connect: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> ApiResult<LoginResponse> {
    let attempt = LoginAttempt {
        username: body.username.clone(),
        ip_address: client_ip(&headers, connect.map(|ConnectInfo(addr)| addr)),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        ..LoginAttempt::default()
    };

    let user = match services.users.authenticate(&body.username, &body.password).await {
        Ok(user) => user,
        Err(err) => {
            tracing::info!(username = %body.username, error = %err, "login rejected");
            record_attempt(
                &services,
                LoginAttempt {
                    message: err.to_string(),
                    ..attempt
                },
            )
            .await;
            return Err(err.into());
        }
    };
    services.users.update_last_login(user.id).await?;
    let tokens = services
        .tokens()
        .issue_pair(&user.username, user.id)
        .map_err(xadmin_infra::ServiceError::from)?;

    record_attempt(
        &services,
        LoginAttempt {
            user_id: Some(user.id),
            succeeded: true,
            message: "login succeeded".to_string(),
            ..attempt
        },
    )
    .await;
    tracing::info!(user_id = %user.id, username = %user.username, "login succeeded");
    Ok(Envelope::with_detail("login succeeded", LoginResponse { tokens, user }))
}

/// POST /api/auth/refresh
///
/// Only refresh tokens are accepted, and only while the account they were
/// issued to is still live and active.
pub async fn refresh(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<LoginResponse> {
    let user = services
        .access
        .refresh_owner(&body.refresh_token)
        .await?
        .ok_or(ApiError::Unauthenticated)?;

    let tokens = services
        .tokens()
        .issue_pair(&user.username, user.id)
        .map_err(xadmin_infra::ServiceError::from)?;
    Ok(Envelope::ok(LoginResponse { tokens, user }))
}

/// POST /api/auth/register
pub async fn register(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<LoginResponse> {
    if !services.allow_registration {
        return Err(ApiError::Forbidden("registration is disabled".into()));
    }

    let user = services
        .users
        .create(NewUser {
            username: body.username,
            password: body.password,
            email: body.email,
            nickname: body.nickname,
            ..NewUser::default()
        })
        .await?;
    let tokens = services
        .tokens()
        .issue_pair(&user.username, user.id)
        .map_err(xadmin_infra::ServiceError::from)?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    Ok(Envelope::with_detail("registration succeeded", LoginResponse { tokens, user }))
}

/// POST /api/auth/logout
///
/// Tokens are stateless; the client drops them. Logged for the audit trail.
pub async fn logout(Extension(principal): Extension<PrincipalContext>) -> ApiResult<()> {
    tracing::info!(user_id = %principal.user_id(), "logout");
    Ok(Envelope::message("logged out"))
}

async fn record_attempt(services: &AppServices, attempt: LoginAttempt) {
    if let Err(err) = services.login_logs.record(attempt).await {
        tracing::warn!(error = %err, "failed to write login log");
    }
}

/// First `X-Forwarded-For` hop, then `X-Real-IP`, then the socket peer.
fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    let header_value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };
    header_value("x-forwarded-for")
        .or_else(|| header_value("x-real-ip"))
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
