use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopforge_events::EventEnvelope;
use shopforge_inventory::{InventoryEvent, ProductId, Sku};

use crate::read_model::{InMemoryReadStore, ReadStore};

use super::{Cursors, ProjectionError};

/// Queryable catalog read model: one row per product, stock included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductReadModel {
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub name: String,
    pub image: String,
    pub unit_price: u64,
    pub stock: i64,
    pub skus: Vec<Sku>,
}

pub type InMemoryCatalogProjection =
    CatalogProjection<Arc<InMemoryReadStore<ProductId, ProductReadModel>>>;

/// Catalog projection.
///
/// Maintains the product read model plus a `catalog_number` index, since the
/// HTTP surface addresses products by their numeric catalog identifier while
/// streams are keyed by UUID.
#[derive(Debug)]
pub struct CatalogProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    store: S,
    by_catalog_number: RwLock<HashMap<u64, ProductId>>,
    cursors: Cursors,
}

impl<S> CatalogProjection<S>
where
    S: ReadStore<ProductId, ProductReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            by_catalog_number: RwLock::new(HashMap::new()),
            cursors: Cursors::new(),
        }
    }

    pub fn get(&self, product_id: &ProductId) -> Option<ProductReadModel> {
        self.store.get(product_id)
    }

    pub fn by_catalog_number(&self, catalog_number: u64) -> Option<ProductReadModel> {
        let product_id = *self.by_catalog_number.read().ok()?.get(&catalog_number)?;
        self.store.get(&product_id)
    }

    pub fn list(&self) -> Vec<ProductReadModel> {
        self.store.list()
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();

        self.cursors.apply_once(aggregate_id, envelope.sequence_number(), || {
            let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

            let product_id = match &event {
                InventoryEvent::ProductRegistered(e) => e.product_id,
                InventoryEvent::StockDeducted(e) => e.product_id,
                InventoryEvent::Restocked(e) => e.product_id,
                InventoryEvent::LowStockRaised(e) => e.product_id,
            };
            if product_id.0 != aggregate_id {
                return Err(ProjectionError::StreamMismatch(
                    "event product_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                InventoryEvent::ProductRegistered(e) => {
                    if let Ok(mut index) = self.by_catalog_number.write() {
                        index.insert(e.catalog_number, e.product_id);
                    }
                    self.store.upsert(
                        e.product_id,
                        ProductReadModel {
                            product_id: e.product_id,
                            catalog_number: e.catalog_number,
                            name: e.name,
                            image: e.image,
                            unit_price: e.unit_price,
                            stock: e.stock,
                            skus: e.skus,
                        },
                    );
                }
                InventoryEvent::StockDeducted(e) => {
                    if let Some(mut rm) = self.store.get(&e.product_id) {
                        rm.stock = e.stock_after;
                        if let (Some(idx), Some(after)) = (e.sku_index, e.sku_stock_after) {
                            if let Some(sku) = rm.skus.get_mut(idx) {
                                sku.stock = after;
                            }
                        }
                        self.store.upsert(e.product_id, rm);
                    }
                }
                InventoryEvent::Restocked(e) => {
                    if let Some(mut rm) = self.store.get(&e.product_id) {
                        rm.stock = e.stock_after;
                        if let (Some(idx), Some(after)) = (e.sku_index, e.sku_stock_after) {
                            if let Some(sku) = rm.skus.get_mut(idx) {
                                sku.stock = after;
                            }
                        }
                        self.store.upsert(e.product_id, rm);
                    }
                }
                InventoryEvent::LowStockRaised(_) => {
                    // Signal only; surfaced through the notification projection.
                }
            }

            Ok(())
        })
    }

    /// Rebuild from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.cursors.reset();
        self.store.clear();
        if let Ok(mut index) = self.by_catalog_number.write() {
            index.clear();
        }

        // Deterministic replay order: aggregate, then sequence.
        let mut envs: Vec<_> = envelopes.into_iter().collect();
        envs.sort_by_key(|e| (*e.aggregate_id().as_uuid().as_bytes(), e.sequence_number()));

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
