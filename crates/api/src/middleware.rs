use std::sync::Arc;

use axum::{
    extract::{OriginalUri, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};

use xadmin_infra::AccessControl;

use crate::app::errors::ApiError;
use crate::context::PrincipalContext;

#[derive(Clone)]
pub struct AuthState {
    pub access: Arc<AccessControl>,
}

/// Resolve the bearer token and authorize `(path, method)` before the handler
/// runs.
///
/// A missing or unusable token is the same as no identity: 401. A resolved
/// principal without a matching grant gets 403.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Result<Response, Response> {
    let principal = match extract_bearer(req.headers()) {
        Some(token) => state
            .access
            .resolve(token)
            .await
            .map_err(|e| ApiError::from(e).into_response())?,
        None => None,
    };

    let path = match req.extensions().get::<OriginalUri>() {
        Some(OriginalUri(uri)) => uri.path().to_string(),
        None => req.uri().path().to_string(),
    };
    let method = req.method().as_str().to_string();

    let grant = state
        .access
        .check(principal.as_ref(), &path, &method)
        .map_err(|e| ApiError::from(e).into_response())?;
    let Some(principal) = principal else {
        return Err(ApiError::Unauthenticated.into_response());
    };

    tracing::debug!(user = %principal.username, %method, %path, basis = ?grant.basis, "request authorized");
    req.extensions_mut().insert(PrincipalContext::new(principal, grant));

    Ok(next.run(req).await)
}

pub(crate) fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header::AUTHORIZATION};

    use super::*;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer(&headers("bearer  abc ")), Some("abc"));
    }

    #[test]
    fn other_schemes_and_blanks_are_ignored() {
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
        assert_eq!(extract_bearer(&headers("Basic dXNlcjpwdw==")), None);
        assert_eq!(extract_bearer(&headers("Bearer ")), None);
    }
}
