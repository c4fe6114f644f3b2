use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::json;

use shopforge_serviceability::PinCode;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

/// Public: serviceability checks carry no auth, they gate the storefront.
pub async fn check_pincode(
    Extension(services): Extension<Arc<AppServices>>,
    Path(code): Path<String>,
) -> axum::response::Response {
    let check = services.gate.check(&code);
    (StatusCode::OK, Json(check)).into_response()
}

pub async fn create_pincode(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreatePinCodeBody>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "pincodes.manage") {
        return errors::forbidden_to_response(e);
    }

    let code = body.code.trim().to_string();
    if code.is_empty() {
        return errors::json_error(StatusCode::BAD_REQUEST, "pin code must not be empty");
    }

    services.pincodes.upsert(PinCode {
        code: code.clone(),
        delivery_time: body.delivery_time,
        unit: body.unit,
        is_active: body.is_active,
    });

    (StatusCode::CREATED, Json(json!({"code": code}))).into_response()
}

pub async fn list_pincodes(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "pincodes.manage") {
        return errors::forbidden_to_response(e);
    }

    let mut codes = services.pincodes.list();
    codes.sort_by(|a, b| a.code.cmp(&b.code));
    (StatusCode::OK, Json(json!({"items": codes}))).into_response()
}
