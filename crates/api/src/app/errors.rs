//! HTTP error envelope.
//!
//! Every error body is `{"message": "..."}`. Internal failures are logged
//! with detail and surfaced as an opaque 500.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use shopforge_infra::command_dispatcher::DispatchError;

pub fn json_error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "message": message.into() }))).into_response()
}

pub fn dispatch_error_to_response(err: DispatchError) -> Response {
    match err {
        DispatchError::Validation(msg) => json_error(StatusCode::BAD_REQUEST, msg),
        DispatchError::InvariantViolation(msg) => json_error(StatusCode::BAD_REQUEST, msg),
        DispatchError::Unauthorized => {
            json_error(StatusCode::UNAUTHORIZED, "not authorized for this resource")
        }
        DispatchError::NotFound => json_error(StatusCode::NOT_FOUND, "resource not found"),
        DispatchError::Concurrency(msg) => json_error(StatusCode::CONFLICT, msg),
        DispatchError::Deserialize(detail)
        | DispatchError::Publish(detail) => {
            tracing::error!(%detail, "internal dispatch failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
        DispatchError::Store(e) => {
            tracing::error!(error = %e, "event store failure");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

pub fn forbidden_to_response(err: shopforge_auth::AuthzError) -> Response {
    let shopforge_auth::AuthzError::Forbidden(perm) = err;
    json_error(
        StatusCode::UNAUTHORIZED,
        format!("missing permission '{perm}'"),
    )
}
