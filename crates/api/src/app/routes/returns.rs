use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use serde_json::json;

use shopforge_core::AggregateId;
use shopforge_infra::returns_flow::OpenReturnRequest;
use shopforge_returns::ReturnId;

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(open_return).get(list_returns))
        .route("/my-returns", get(my_returns))
        .route("/:id", get(get_return).put(update_return))
}

pub async fn open_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::OpenReturnBody>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "returns.open") {
        return errors::forbidden_to_response(e);
    }

    let request = OpenReturnRequest {
        requester: principal.user_id(),
        order_id: body.order_id,
        line_no: body.line_no,
        kind: body.kind,
        qty: body.qty,
        reason: body.reason,
        comment: body.comment,
        images: body.images,
        replacement: body.replacement,
    };

    match services.returns_service.open_return(request) {
        Ok(opened) => (
            StatusCode::CREATED,
            Json(dto::OpenedReturnResponse {
                return_id: opened.return_id,
                mirrored: opened.sync.mirrored,
            }),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn list_returns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "returns.read_all") {
        return errors::forbidden_to_response(e);
    }

    let items = services.returns.list_all();
    (StatusCode::OK, Json(json!({"items": items}))).into_response()
}

pub async fn my_returns(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "returns.read_own") {
        return errors::forbidden_to_response(e);
    }

    let items = services.returns.list_for_customer(principal.user_id());
    (StatusCode::OK, Json(json!({"items": items}))).into_response()
}

pub async fn get_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid return id"),
    };

    let Some(request) = services.returns.get(&ReturnId::new(agg)) else {
        return errors::json_error(StatusCode::NOT_FOUND, "return request not found");
    };

    if request.customer_id != principal.user_id() && !principal.is_admin() {
        return errors::json_error(StatusCode::UNAUTHORIZED, "not authorized for this resource");
    }

    (StatusCode::OK, Json(request)).into_response()
}

pub async fn update_return(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::UpdateReturnBody>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "returns.update") {
        return errors::forbidden_to_response(e);
    }

    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid return id"),
    };

    let Some(status) = dto::parse_return_status(&body.status) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            format!("unknown return status '{}'", body.status),
        );
    };

    match services
        .returns_service
        .advance_status(ReturnId::new(agg), status, body.note)
    {
        Ok(advanced) => (
            StatusCode::OK,
            Json(dto::AdvancedReturnResponse {
                status: advanced.status,
                mirrored: advanced.sync.mirrored,
            }),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
