//! RBAC audit endpoint for transparent authorization debugging.
//!
//! Answers "why was this request allowed or denied?" for the caller, or for
//! another user when the caller is staff.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Extension, Query},
    routing::get,
};

use xadmin_auth::{AuthorizationExplanation, require_staff};

use crate::app::dto::ExplainQuery;
use crate::app::errors::{ApiResult, Envelope};
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/explain", get(explain_authorization_decision))
}

/// GET /api/system/permission/explain?path=X&method=Y[&user_id=Z]
pub async fn explain_authorization_decision(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ExplainQuery>,
) -> ApiResult<AuthorizationExplanation> {
    let explanation = match query.user_id {
        Some(user_id) if user_id != principal.user_id() => {
            require_staff(principal.principal())?;
            let user = services.users.get(user_id).await?;
            let subject = services.access.principal_for(&user).await?;
            services.access.explain(Some(&subject), &query.path, &query.method)
        }
        _ => services
            .access
            .explain(Some(principal.principal()), &query.path, &query.method),
    };
    Ok(Envelope::ok(explanation))
}
