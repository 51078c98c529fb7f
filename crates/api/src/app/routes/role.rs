//! Role administration under `/api/system/role`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path, Query},
    routing::{get, put},
};

use xadmin_core::{Page, PageRequest, RoleId};
use xadmin_infra::directory::RoleRecord;
use xadmin_infra::services::RoleInput;

use crate::app::dto::AssignMenusRequest;
use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_roles).post(create_role))
        .route("/:id", get(get_role).put(update_role).delete(delete_role))
        .route("/:id/menus", put(assign_menus))
}

/// GET /api/system/role
pub async fn list_roles(
    Extension(services): Extension<Arc<AppServices>>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Page<RoleRecord>> {
    Ok(Envelope::ok(services.roles.list(&page).await?))
}

/// POST /api/system/role
pub async fn create_role(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<RoleInput>,
) -> ApiResult<RoleRecord> {
    Ok(Envelope::ok(services.roles.create(body).await?))
}

pub async fn get_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<RoleId>,
) -> ApiResult<RoleRecord> {
    Ok(Envelope::ok(services.roles.get(id).await?))
}

pub async fn update_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<RoleId>,
    Json(body): Json<RoleInput>,
) -> ApiResult<RoleRecord> {
    Ok(Envelope::ok(services.roles.update(id, body).await?))
}

pub async fn delete_role(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<RoleId>,
) -> ApiResult<()> {
    services.roles.delete(id).await?;
    Ok(Envelope::message("deleted"))
}

/// PUT /api/system/role/:id/menus
pub async fn assign_menus(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<RoleId>,
    Json(body): Json<AssignMenusRequest>,
) -> ApiResult<RoleRecord> {
    Ok(Envelope::ok(services.roles.assign_menus(id, body.menu_ids).await?))
}
