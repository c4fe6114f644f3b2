//! HTTP API for the marketplace fulfillment backend.

pub mod app;
pub mod authz;
pub mod context;
pub mod middleware;
