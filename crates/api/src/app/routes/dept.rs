//! Department administration under `/api/system/dept`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path, Query},
    routing::get,
};

use xadmin_core::{DeptId, PageRequest};
use xadmin_infra::directory::DeptRecord;
use xadmin_infra::services::{DeptInput, TreeNode};

use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_depts).post(create_dept))
        .route("/tree", get(dept_tree))
        .route("/:id", get(get_dept).put(update_dept).delete(delete_dept))
}

/// GET /api/system/dept
pub async fn list_depts(
    Extension(services): Extension<Arc<AppServices>>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Vec<DeptRecord>> {
    Ok(Envelope::ok(services.depts.list(&page).await?))
}

/// GET /api/system/dept/tree
pub async fn dept_tree(Extension(services): Extension<Arc<AppServices>>) -> ApiResult<Vec<TreeNode<DeptRecord>>> {
    Ok(Envelope::ok(services.depts.tree().await?))
}

pub async fn create_dept(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<DeptInput>,
) -> ApiResult<DeptRecord> {
    Ok(Envelope::ok(services.depts.create(body).await?))
}

pub async fn get_dept(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<DeptId>,
) -> ApiResult<DeptRecord> {
    Ok(Envelope::ok(services.depts.get(id).await?))
}

pub async fn update_dept(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<DeptId>,
    Json(body): Json<DeptInput>,
) -> ApiResult<DeptRecord> {
    Ok(Envelope::ok(services.depts.update(id, body).await?))
}

/// DELETE /api/system/dept/:id
///
/// Refused while the department has children or members.
pub async fn delete_dept(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<DeptId>,
) -> ApiResult<()> {
    services.depts.delete(id).await?;
    Ok(Envelope::message("deleted"))
}
