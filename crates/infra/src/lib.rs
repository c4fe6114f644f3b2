//! Infrastructure layer: event store, command dispatch, projections, and the
//! application services that orchestrate fulfillment and returns.

pub mod command_dispatcher;
pub mod event_store;
pub mod fulfillment;
pub mod projections;
pub mod read_model;
pub mod returns_flow;

#[cfg(test)]
mod integration_tests;

/// Stream type identifiers (stable; persisted on every stored event).
pub mod streams {
    pub const PRODUCT: &str = "inventory.product";
    pub const ORDER: &str = "orders.order";
    pub const RETURN: &str = "returns.request";
}
