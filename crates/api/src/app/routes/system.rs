use axum::{Extension, Json, http::StatusCode, response::IntoResponse};
use serde_json::json;

use crate::context::PrincipalContext;

pub async fn health() -> axum::response::Response {
    (StatusCode::OK, Json(json!({"status": "ok"}))).into_response()
}

pub async fn whoami(
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    let roles = principal
        .roles()
        .iter()
        .map(|r| r.as_str().to_string())
        .collect::<Vec<_>>();
    (
        StatusCode::OK,
        Json(json!({
            "user_id": principal.user_id().to_string(),
            "roles": roles,
            "is_admin": principal.is_admin(),
        })),
    )
        .into_response()
}
