//! Audit logs under `/api/system/logs`.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Query},
    routing::get,
};

use xadmin_core::Page;
use xadmin_infra::directory::LoginLogRecord;

use crate::app::dto::LoginLogQuery;
use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new().route("/login", get(list_login_logs))
}

/// GET /api/system/logs/login - newest first, optionally filtered by outcome
pub async fn list_login_logs(
    Extension(services): Extension<Arc<AppServices>>,
    Query(query): Query<LoginLogQuery>,
) -> ApiResult<Page<LoginLogRecord>> {
    let (page, succeeded) = query.split();
    Ok(Envelope::ok(services.login_logs.list(&page, succeeded).await?))
}
