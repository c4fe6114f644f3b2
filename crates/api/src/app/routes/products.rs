use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use serde_json::json;

use shopforge_core::AggregateId;
use shopforge_infra::streams;
use shopforge_inventory::{InventoryCommand, Product, ProductId, RegisterProduct};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::PrincipalContext;

pub async fn register_product(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(principal): Extension<PrincipalContext>,
    Json(body): Json<dto::CreateProductBody>,
) -> axum::response::Response {
    if let Err(e) = crate::authz::require(&principal, "products.register") {
        return errors::forbidden_to_response(e);
    }

    if services.catalog.by_catalog_number(body.catalog_number).is_some() {
        return errors::json_error(
            StatusCode::BAD_REQUEST,
            format!("catalog number {} is already registered", body.catalog_number),
        );
    }

    let mut skus = Vec::with_capacity(body.skus.len());
    for sku in body.skus {
        match sku.into_sku() {
            Ok(s) => skus.push(s),
            Err(msg) => return errors::json_error(StatusCode::BAD_REQUEST, msg),
        }
    }

    let product_id = ProductId::new(AggregateId::new());
    let result = services.dispatcher.dispatch::<Product>(
        product_id.0,
        streams::PRODUCT,
        InventoryCommand::RegisterProduct(RegisterProduct {
            product_id,
            catalog_number: body.catalog_number,
            name: body.name,
            image: body.image,
            unit_price: body.unit_price,
            stock: body.stock,
            skus,
            occurred_at: Utc::now(),
        }),
        |id| Product::empty(ProductId::new(id)),
    );

    match result {
        Ok(_) => (
            StatusCode::CREATED,
            Json(json!({
                "product_id": product_id,
                "catalog_number": body.catalog_number,
            })),
        )
            .into_response(),
        Err(e) => errors::dispatch_error_to_response(e),
    }
}

pub async fn get_product(
    Extension(services): Extension<Arc<AppServices>>,
    Path(catalog_number): Path<u64>,
) -> axum::response::Response {
    match services.catalog.by_catalog_number(catalog_number) {
        Some(rm) => (StatusCode::OK, Json(rm)).into_response(),
        None => errors::json_error(StatusCode::NOT_FOUND, "product not found"),
    }
}
