use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use shopforge_core::AggregateId;
use shopforge_infra::fulfillment::{NewOrderLine, PlaceOrderRequest};
use shopforge_infra::streams;
use shopforge_orders::{AssignSerials, ChangeStatus, Order, OrderCommand, OrderId, OrderStatus};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub fn router() -> Router {
    Router::new()
        .route("/", post(place_order).get(list_orders))
        .route("/myorders", get(my_orders))
        .route("/:id", get(get_order))
        .route("/:id/deliver", put(deliver_order))
        .route("/:id/status", put(change_order_status))
}

pub async fn place_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::PlaceOrderBody>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "orders.place") {
        return errors::forbidden_to_response(e);
    }

    let mut lines = Vec::with_capacity(body.items.len());
    for item in body.items {
        let variant = match item.variant {
            Some(selection) => match dto::variant_from_json(selection) {
                Ok(v) => v,
                Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, msg),
            },
            None => Default::default(),
        };
        lines.push(NewOrderLine {
            catalog_number: item.catalog_number,
            qty: item.qty,
            variant,
        });
    }

    let request = PlaceOrderRequest {
        customer_id: principal.user_id(),
        customer_name: body.customer_name,
        lines,
        shipping: body.shipping,
        payment: body.payment,
        shipping_fee: body.shipping_fee,
        policy: body.policy,
    };

    match services.fulfillment.place_order(request) {
        Ok(placed) => (
            StatusCode::CREATED,
            Json(dto::PlacedOrderResponse {
                order_id: placed.order_id,
                reports: placed.reports,
            }),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Query(query): Query<ListOrdersQuery>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "orders.read_all") {
        return errors::forbidden_to_response(e);
    }

    let status = match query.status.as_deref() {
        Some(s) => match dto::parse_order_status(s) {
            Some(status) => Some(status),
            None => {
                return errors::json_error(
                    StatusCode::BAD_REQUEST,
                    format!("unknown order status '{s}'"),
                );
            }
        },
        None => None,
    };

    let page = query.page.unwrap_or(1).max(1);
    let per_page = query.per_page.unwrap_or(20).clamp(1, 100);

    let all = services.orders.list_all(status);
    let total = all.len();
    let items: Vec<_> = all
        .into_iter()
        .skip((page as usize - 1) * per_page as usize)
        .take(per_page as usize)
        .collect();

    (
        StatusCode::OK,
        Json(json!({
            "items": items,
            "total": total,
            "page": page,
            "per_page": per_page,
        })),
    )
        .into_response()
}

pub async fn my_orders(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "orders.read_own") {
        return errors::forbidden_to_response(e);
    }

    let items = services.orders.list_for_customer(principal.user_id());
    (StatusCode::OK, Json(json!({"items": items}))).into_response()
}

pub async fn get_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid order id"),
    };

    let Some(order) = services.orders.get(&OrderId::new(agg)) else {
        return errors::json_error(StatusCode::NOT_FOUND, "order not found");
    };

    if order.customer_id != principal.user_id() && !principal.is_admin() {
        return errors::json_error(StatusCode::UNAUTHORIZED, "not authorized for this resource");
    }

    (StatusCode::OK, Json(order)).into_response()
}

pub async fn deliver_order(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "orders.set_status") {
        return errors::forbidden_to_response(e);
    }

    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid order id"),
    };
    let order_id = OrderId::new(agg);

    let result = services.dispatcher.dispatch::<Order>(
        agg,
        streams::ORDER,
        OrderCommand::ChangeStatus(ChangeStatus {
            order_id,
            status: OrderStatus::Delivered,
            occurred_at: Utc::now(),
        }),
        |aggregate_id| Order::empty(OrderId::new(aggregate_id)),
    );

    match result {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({"order_id": order_id, "status": OrderStatus::Delivered})),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn change_order_status(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Path(id): Path<String>,
    Json(body): Json<dto::ChangeOrderStatusBody>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "orders.set_status") {
        return errors::forbidden_to_response(e);
    }

    let agg: AggregateId = match id.parse() {
        Ok(v) => v,
        Err(_) => return errors::json_error(StatusCode::BAD_REQUEST, "invalid order id"),
    };
    let order_id = OrderId::new(agg);

    let Some(status) = dto::parse_order_status(&body.status) else {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            format!("unknown order status '{}'", body.status),
        );
    };

    // Serials are recorded before the status step so a dispatch of
    // serialized goods carries them atomically from the caller's view.
    if let Some(assignments) = body.serial_assignments.filter(|a| !a.is_empty()) {
        let result = services.dispatcher.dispatch::<Order>(
            agg,
            streams::ORDER,
            OrderCommand::AssignSerials(AssignSerials {
                order_id,
                assignments,
                occurred_at: Utc::now(),
            }),
            |aggregate_id| Order::empty(OrderId::new(aggregate_id)),
        );
        if let Err(e) = result {
            return errors::dispatch_error_to_response(e);
        }
    }

    let result = services.dispatcher.dispatch::<Order>(
        agg,
        streams::ORDER,
        OrderCommand::ChangeStatus(ChangeStatus {
            order_id,
            status,
            occurred_at: Utc::now(),
        }),
        |aggregate_id| Order::empty(OrderId::new(aggregate_id)),
    );

    match result {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({"order_id": order_id, "status": status})),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}
