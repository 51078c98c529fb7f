//! Response envelope and error mapping.
//!
//! Every JSON body has the shape `{ "code", "detail", "data" }`. Success uses
//! code `1000`; failures carry `1001` plus a machine-readable `error` slug.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use xadmin_auth::AuthzError;
use xadmin_core::DomainError;
use xadmin_infra::{ServiceError, StoreError};

pub const SUCCESS_CODE: u32 = 1000;
pub const FAILURE_CODE: u32 = 1001;

/// Successful response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: u32,
    pub detail: String,
    pub data: T,
}

impl<T: Serialize> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self::with_detail("success", data)
    }

    pub fn with_detail(detail: impl Into<String>, data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            detail: detail.into(),
            data,
        }
    }
}

impl Envelope<()> {
    pub fn message(detail: impl Into<String>) -> Self {
        Self::with_detail(detail, ())
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, axum::Json(self)).into_response()
    }
}

pub type ApiResult<T> = Result<Envelope<T>, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("authentication credentials were not provided or are invalid")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl From<AuthzError> for ApiError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => Self::Unauthenticated,
            AuthzError::Forbidden(msg) => Self::Forbidden(msg),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        Self::Service(ServiceError::Store(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthenticated => json_error(
                StatusCode::UNAUTHORIZED,
                "unauthenticated",
                "authentication credentials were not provided or are invalid",
            ),
            ApiError::Forbidden(msg) => json_error(StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::BadRequest(msg) => json_error(StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Service(err) => service_error_to_response(err),
        }
    }
}

pub fn service_error_to_response(err: ServiceError) -> Response {
    match err {
        ServiceError::Domain(DomainError::Validation(msg)) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        ServiceError::Domain(DomainError::InvariantViolation(msg)) => {
            json_error(StatusCode::UNPROCESSABLE_ENTITY, "invariant_violation", msg)
        }
        ServiceError::Domain(DomainError::InvalidId(msg)) => json_error(StatusCode::BAD_REQUEST, "invalid_id", msg),
        ServiceError::Domain(DomainError::NotFound(entity)) => {
            json_error(StatusCode::NOT_FOUND, "not_found", format!("{entity} not found"))
        }
        ServiceError::Domain(DomainError::Conflict(msg)) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::WeakPassword(violations) => json_error_with_data(
            StatusCode::BAD_REQUEST,
            "weak_password",
            "password does not meet strength requirements",
            json!(violations),
        ),
        ServiceError::InvalidCredentials => json_error(
            StatusCode::UNAUTHORIZED,
            "invalid_credentials",
            "invalid username or password",
        ),
        ServiceError::Store(StoreError::Conflict(msg)) => json_error(StatusCode::CONFLICT, "conflict", msg),
        ServiceError::Store(StoreError::Storage(msg)) => {
            tracing::error!(error = %msg, "storage failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", "storage failure")
        }
        ServiceError::Internal(msg) => {
            tracing::error!(error = %msg, "internal failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", "internal error")
        }
    }
}

pub fn json_error(status: StatusCode, code: &'static str, message: impl Into<String>) -> Response {
    json_error_with_data(status, code, message, serde_json::Value::Null)
}

pub fn json_error_with_data(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
    data: serde_json::Value,
) -> Response {
    (
        status,
        axum::Json(json!({
            "code": FAILURE_CODE,
            "error": code,
            "detail": message.into(),
            "data": data,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authz_errors_keep_their_status() {
        let unauth = ApiError::from(AuthzError::Unauthenticated).into_response();
        assert_eq!(unauth.status(), StatusCode::UNAUTHORIZED);

        let forbidden = ApiError::from(AuthzError::Forbidden("no".into())).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn service_errors_map_to_statuses() {
        let cases = [
            (ServiceError::validation("bad"), StatusCode::BAD_REQUEST),
            (ServiceError::not_found("user"), StatusCode::NOT_FOUND),
            (ServiceError::conflict("dup"), StatusCode::CONFLICT),
            (ServiceError::WeakPassword(vec!["short".into()]), StatusCode::BAD_REQUEST),
            (ServiceError::InvalidCredentials, StatusCode::UNAUTHORIZED),
            (
                ServiceError::Store(StoreError::Storage("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(service_error_to_response(err).status(), status);
        }
    }
}
