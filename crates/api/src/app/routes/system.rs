use std::sync::Arc;

use axum::{
    extract::{Extension, Json},
    http::StatusCode,
};

use xadmin_infra::directory::UserRecord;

use crate::app::dto::{ChangePasswordRequest, ProfileUpdate, UserInfo};
use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

/// GET /api/system/userinfo
pub async fn userinfo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> ApiResult<UserInfo> {
    let user = services.users.get(principal.user_id()).await?;
    let permissions = services.users.permission_codes(user.id).await?;
    let roles = principal
        .principal()
        .roles
        .iter()
        .map(|r| r.as_str().to_string())
        .collect();

    Ok(Envelope::ok(UserInfo {
        user,
        roles,
        permissions,
        grant: principal.grant().clone(),
    }))
}

/// PUT /api/system/userinfo
pub async fn update_userinfo(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ProfileUpdate>,
) -> ApiResult<UserRecord> {
    let user = services.users.update(principal.user_id(), body.into()).await?;
    Ok(Envelope::ok(user))
}

/// POST /api/system/userinfo/password
pub async fn change_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<ChangePasswordRequest>,
) -> ApiResult<()> {
    services
        .users
        .change_password(principal.user_id(), &body.old_password, &body.new_password)
        .await?;
    tracing::info!(user_id = %principal.user_id(), "password changed");
    Ok(Envelope::message("password changed"))
}
