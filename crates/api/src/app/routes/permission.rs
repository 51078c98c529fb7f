//! Direct (per-user) permission grants under `/api/system/permission`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path, Query},
    routing::get,
};

use xadmin_core::{DataPermissionId, Page, PageRequest};
use xadmin_infra::directory::DataPermissionRecord;
use xadmin_infra::services::DataPermissionInput;

use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_permissions).post(create_permission))
        .route(
            "/:id",
            get(get_permission).put(update_permission).delete(delete_permission),
        )
}

pub async fn list_permissions(
    Extension(services): Extension<Arc<AppServices>>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Page<DataPermissionRecord>> {
    Ok(Envelope::ok(services.data_permissions.list(&page).await?))
}

pub async fn create_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<DataPermissionInput>,
) -> ApiResult<DataPermissionRecord> {
    Ok(Envelope::ok(services.data_permissions.create(body).await?))
}

pub async fn get_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<DataPermissionId>,
) -> ApiResult<DataPermissionRecord> {
    Ok(Envelope::ok(services.data_permissions.get(id).await?))
}

pub async fn update_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<DataPermissionId>,
    Json(body): Json<DataPermissionInput>,
) -> ApiResult<DataPermissionRecord> {
    Ok(Envelope::ok(services.data_permissions.update(id, body).await?))
}

pub async fn delete_permission(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<DataPermissionId>,
) -> ApiResult<()> {
    services.data_permissions.delete(id).await?;
    Ok(Envelope::message("deleted"))
}
