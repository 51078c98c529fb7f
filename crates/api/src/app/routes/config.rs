//! System configuration under `/api/settings/config`, keyed by config key.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Json, Path, Query},
    routing::get,
};

use xadmin_core::PageRequest;
use xadmin_infra::directory::ConfigRecord;
use xadmin_infra::services::ConfigInput;

use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_configs))
        .route("/:key", get(get_config).put(upsert_config).delete(delete_config))
}

pub async fn list_configs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(page): Query<PageRequest>,
) -> ApiResult<Vec<ConfigRecord>> {
    Ok(Envelope::ok(services.configs.list(&page).await?))
}

pub async fn get_config(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
) -> ApiResult<ConfigRecord> {
    Ok(Envelope::ok(services.configs.get(&key).await?))
}

/// PUT /api/settings/config/:key - create or replace
pub async fn upsert_config(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
    Json(body): Json<ConfigInput>,
) -> ApiResult<ConfigRecord> {
    Ok(Envelope::ok(services.configs.upsert(&key, body).await?))
}

pub async fn delete_config(
    Extension(services): Extension<Arc<AppServices>>,
    Path(key): Path<String>,
) -> ApiResult<()> {
    services.configs.delete(&key).await?;
    Ok(Envelope::message("deleted"))
}
