use axum::{
    Router,
    routing::{get, post},
};

pub mod notifications;
pub mod orders;
pub mod pincodes;
pub mod products;
pub mod returns;
pub mod system;

/// Unauthenticated storefront surface.
pub fn public_router() -> Router {
    Router::new()
        .route("/pincodes/check/:code", get(pincodes::check_pincode))
        .route("/products/:catalog_number", get(products::get_product))
}

/// Authenticated surface (customer + admin endpoints).
pub fn protected_router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .route(
            "/pincodes",
            post(pincodes::create_pincode).get(pincodes::list_pincodes),
        )
        .route("/products", post(products::register_product))
        .nest("/orders", orders::router())
        .nest("/returns", returns::router())
        .nest("/notifications", notifications::router())
}
