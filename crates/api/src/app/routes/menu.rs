//! Menu administration under `/api/system/menu`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path},
    routing::get,
};

use xadmin_core::MenuId;
use xadmin_infra::directory::MenuRecord;
use xadmin_infra::services::{MenuInput, TreeNode};

use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_menus).post(create_menu))
        .route("/tree", get(menu_tree))
        .route("/:id", get(get_menu).put(update_menu).delete(delete_menu))
}

/// GET /api/system/menu
pub async fn list_menus(Extension(services): Extension<Arc<AppServices>>) -> ApiResult<Vec<MenuRecord>> {
    Ok(Envelope::ok(services.menus.list().await?))
}

/// GET /api/system/menu/tree
pub async fn menu_tree(Extension(services): Extension<Arc<AppServices>>) -> ApiResult<Vec<TreeNode<MenuRecord>>> {
    Ok(Envelope::ok(services.menus.tree().await?))
}

pub async fn create_menu(
    Extension(services): Extension<Arc<AppServices>>,
    Json(body): Json<MenuInput>,
) -> ApiResult<MenuRecord> {
    Ok(Envelope::ok(services.menus.create(body).await?))
}

pub async fn get_menu(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<MenuId>,
) -> ApiResult<MenuRecord> {
    Ok(Envelope::ok(services.menus.get(id).await?))
}

pub async fn update_menu(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<MenuId>,
    Json(body): Json<MenuInput>,
) -> ApiResult<MenuRecord> {
    Ok(Envelope::ok(services.menus.update(id, body).await?))
}

pub async fn delete_menu(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<MenuId>,
) -> ApiResult<()> {
    services.menus.delete(id).await?;
    Ok(Envelope::message("deleted"))
}
