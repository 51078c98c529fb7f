//! User administration under `/api/system/user`.
//!
//! Granting or editing the superuser flag, and any write whose target is a
//! superuser, additionally requires the caller to be a superuser; a route
//! grant alone is not enough.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path, Query},
    routing::{get, post, put},
};

use xadmin_auth::require_superuser;
use xadmin_core::{Page, UserId};
use xadmin_infra::directory::UserRecord;
use xadmin_infra::services::{NewUser, UserUpdate};

use crate::app::dto::{
    AssignPermissionsRequest, AssignRolesRequest, BatchDeleteRequest, BatchDeleteResponse, ResetPasswordRequest,
    SearchColumn, USER_SEARCH_COLUMNS, UserListQuery,
};
use crate::app::errors::{ApiError, ApiResult, Envelope};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/search-columns", get(search_columns))
        .route("/batch-delete", post(batch_delete))
        .route("/:id", get(get_user).put(update_user).delete(delete_user))
        .route("/:id/roles", put(assign_roles))
        .route("/:id/permissions", put(assign_permissions))
        .route("/:id/reset-password", post(reset_password))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET /api/system/user
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Page<UserRecord>> {
    let (page, filter) = query.split();
    Ok(Envelope::ok(services.users.list(&page, &filter).await?))
}

/// GET /api/system/user/search-columns
///
/// Authorized through the list permission via the alias suffix.
pub async fn search_columns() -> ApiResult<&'static [SearchColumn]> {
    Ok(Envelope::ok(USER_SEARCH_COLUMNS))
}

/// POST /api/system/user
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<NewUser>,
) -> ApiResult<UserRecord> {
    if body.is_superuser {
        require_superuser(principal.principal())?;
    }
    Ok(Envelope::ok(services.users.create(body).await?))
}

/// GET /api/system/user/:id
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<UserId>,
) -> ApiResult<UserRecord> {
    Ok(Envelope::ok(services.users.get(id).await?))
}

/// PUT /api/system/user/:id
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<UserId>,
    Json(body): Json<UserUpdate>,
) -> ApiResult<UserRecord> {
    if body.is_superuser.is_some() {
        require_superuser(principal.principal())?;
    }
    guard_superuser_targets(&services, &principal, &[id]).await?;
    Ok(Envelope::ok(services.users.update(id, body).await?))
}

/// DELETE /api/system/user/:id
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<UserId>,
) -> ApiResult<()> {
    guard_superuser_targets(&services, &principal, &[id]).await?;
    services.users.delete(principal.user_id(), id).await?;
    Ok(Envelope::message("deleted"))
}

/// POST /api/system/user/batch-delete
pub async fn batch_delete(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<BatchDeleteRequest>,
) -> ApiResult<BatchDeleteResponse> {
    guard_superuser_targets(&services, &principal, &body.ids).await?;
    let deleted = services.users.batch_delete(principal.user_id(), &body.ids).await?;
    tracing::info!(actor = %principal.user_id(), deleted, "users batch deleted");
    Ok(Envelope::ok(BatchDeleteResponse { deleted }))
}

/// PUT /api/system/user/:id/roles
pub async fn assign_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<UserId>,
    Json(body): Json<AssignRolesRequest>,
) -> ApiResult<UserRecord> {
    guard_superuser_targets(&services, &principal, &[id]).await?;
    Ok(Envelope::ok(services.users.assign_roles(id, body.role_ids).await?))
}

/// PUT /api/system/user/:id/permissions
pub async fn assign_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<UserId>,
    Json(body): Json<AssignPermissionsRequest>,
) -> ApiResult<UserRecord> {
    guard_superuser_targets(&services, &principal, &[id]).await?;
    Ok(Envelope::ok(
        services.users.assign_permissions(id, body.permission_ids).await?,
    ))
}

/// POST /api/system/user/:id/reset-password
pub async fn reset_password(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<UserId>,
    Json(body): Json<ResetPasswordRequest>,
) -> ApiResult<()> {
    guard_superuser_targets(&services, &principal, &[id]).await?;
    services.users.reset_password(id, &body.password).await?;
    Ok(Envelope::message("password reset"))
}

/// Only superusers may act on superuser accounts.
async fn guard_superuser_targets(
    services: &AppServices,
    principal: &PrincipalContext,
    ids: &[UserId],
) -> Result<(), ApiError> {
    if services.users.includes_superuser(ids).await? {
        require_superuser(principal.principal())?;
    }
    Ok(())
}
