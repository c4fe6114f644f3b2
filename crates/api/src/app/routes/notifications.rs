use std::sync::Arc;

use axum::{
    Json, Router, extract::Extension, http::StatusCode, response::IntoResponse, routing::get,
};
use serde_json::json;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new().route("/", get(list_notifications))
}

pub async fn list_notifications(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "notifications.read") {
        return errors::forbidden_to_response(e);
    }

    let mut items = services.notifications.all();
    items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    (StatusCode::OK, Json(json!({"items": items}))).into_response()
}
