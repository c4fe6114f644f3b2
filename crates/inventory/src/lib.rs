//! Inventory domain module (event-sourced).
//!
//! Owns per-product aggregate stock and per-SKU stock, applies decrements from
//! fulfilled order lines, and raises low-stock signals. Implemented purely as
//! deterministic domain logic (no IO, no HTTP, no storage).

pub mod product;
pub mod variant;

pub use product::{
    DeductStock, InventoryCommand, InventoryEvent, LOW_STOCK_THRESHOLD, LowStockRaised,
    LowStockScope, Product, ProductId, ProductRegistered, RegisterProduct, Restock, Restocked,
    Sku, StockDeducted,
};
pub use variant::{VariantSelection, matching_skus, values_equal};
