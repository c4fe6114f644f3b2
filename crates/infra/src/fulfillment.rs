//! Order placement orchestration.
//!
//! Validates and gates the request before any write, places the order, then
//! applies stock decrements per line with bounded optimistic retries.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopforge_core::{AggregateId, UserId};
use shopforge_events::{EventBus, EventEnvelope};
use shopforge_inventory::{
    DeductStock, InventoryCommand, InventoryEvent, Product, ProductId, Restock, VariantSelection,
    matching_skus,
};
use shopforge_orders::{
    ChangeStatus, Order, OrderCommand, OrderId, OrderLineInput, OrderStatus, PaymentInfo,
    PlaceOrder, ShippingAddress,
};
use shopforge_serviceability::{PinCodeDirectory, ServiceabilityGate};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::InMemoryCatalogProjection;
use crate::streams;

/// Bound on optimistic-concurrency retries per stock decrement.
pub const MAX_DEDUCT_RETRIES: u32 = 5;

/// How to treat lines that cannot be fully satisfied from stock.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinePolicy {
    /// Place the order and decrement what is available; shortfalls are
    /// reported per line.
    #[default]
    BestEffort,
    /// Cancel the order and restock anything already decremented if any line
    /// falls short.
    AllOrNothing,
}

/// One item of a placement request, addressed by catalog number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrderLine {
    pub catalog_number: u64,
    pub qty: u32,
    #[serde(default)]
    pub variant: VariantSelection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderRequest {
    pub customer_id: UserId,
    pub customer_name: String,
    pub lines: Vec<NewOrderLine>,
    pub shipping: ShippingAddress,
    pub payment: PaymentInfo,
    pub shipping_fee: u64,
    pub policy: LinePolicy,
}

/// Stock outcome for one requested line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LineOutcome {
    Applied { qty: i64 },
    ShortStock { requested: i64, applied: i64 },
    /// The catalog number resolved to nothing; under the best-effort policy
    /// the line is dropped from the order and reported here.
    ProductMissing,
}

/// `request_index` is the zero-based position of the line in the submitted
/// request. `line_no` is the line's number on the placed order; it is absent
/// when the line was dropped before placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineReport {
    pub request_index: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_no: Option<u32>,
    pub catalog_number: u64,
    #[serde(flatten)]
    pub outcome: LineOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: OrderId,
    pub reports: Vec<LineReport>,
}

/// Application service coordinating the serviceability gate, the order
/// aggregate, and the inventory ledger.
pub struct FulfillmentService<S, B, D> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    catalog: Arc<InMemoryCatalogProjection>,
    gate: ServiceabilityGate<D>,
}

impl<S, B, D> FulfillmentService<S, B, D>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    D: PinCodeDirectory,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        catalog: Arc<InMemoryCatalogProjection>,
        gate: ServiceabilityGate<D>,
    ) -> Self {
        Self {
            dispatcher,
            catalog,
            gate,
        }
    }

    /// Place an order.
    ///
    /// All request validation happens before the first write, so a rejected
    /// placement leaves no partial state behind. Stock decrements follow the
    /// order placement; under [`LinePolicy::AllOrNothing`] a shortfall undoes
    /// the decrements already applied and cancels the order. Under the default
    /// best-effort policy a line whose catalog number resolves to nothing is
    /// dropped from the order and reported as [`LineOutcome::ProductMissing`].
    pub fn place_order(&self, request: PlaceOrderRequest) -> Result<PlacedOrder, DispatchError> {
        if request.lines.is_empty() {
            return Err(DispatchError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }
        for line in &request.lines {
            if line.qty == 0 {
                return Err(DispatchError::Validation(format!(
                    "qty for catalog item {} must be positive",
                    line.catalog_number
                )));
            }
        }

        let check = self.gate.check(&request.shipping.postal_code);
        if !check.serviceable {
            return Err(DispatchError::Validation(format!(
                "postal code {} is not serviceable",
                request.shipping.postal_code.trim()
            )));
        }

        // Resolve every line against the catalog up front. Unknown catalog
        // numbers fail the whole request under all-or-nothing; under best
        // effort the line is dropped and reported as missing.
        let mut resolved: Vec<Option<(ProductId, u32)>> = Vec::with_capacity(request.lines.len());
        let mut inputs = Vec::new();
        for line in &request.lines {
            let Some(product) = self.catalog.by_catalog_number(line.catalog_number) else {
                if request.policy == LinePolicy::AllOrNothing {
                    return Err(DispatchError::Validation(format!(
                        "unknown catalog item {}",
                        line.catalog_number
                    )));
                }
                tracing::warn!(
                    catalog_number = line.catalog_number,
                    "order references an unknown catalog item; dropping the line"
                );
                resolved.push(None);
                continue;
            };

            let duplicates = matching_skus(&product.skus, &line.variant);
            if duplicates.len() > 1 {
                tracing::warn!(
                    catalog_number = line.catalog_number,
                    matches = duplicates.len(),
                    "variant selection matches multiple sku combinations; using the first"
                );
            }

            inputs.push(OrderLineInput {
                product_id: product.product_id,
                catalog_number: product.catalog_number,
                name: product.name.clone(),
                image: product.image.clone(),
                variant: line.variant.clone(),
                qty: line.qty,
                unit_price: product.unit_price,
            });
            // Lines are numbered from 1 on the placed order, in the order
            // they survived resolution.
            resolved.push(Some((product.product_id, inputs.len() as u32)));
        }
        if inputs.is_empty() {
            return Err(DispatchError::Validation(
                "order contains no known catalog items".to_string(),
            ));
        }

        let order_id = OrderId::new(AggregateId::new());
        self.dispatcher.dispatch::<Order>(
            order_id.0,
            streams::ORDER,
            OrderCommand::PlaceOrder(PlaceOrder {
                order_id,
                customer_id: request.customer_id,
                customer_name: request.customer_name.clone(),
                lines: inputs,
                shipping: request.shipping.clone(),
                payment: request.payment.clone(),
                shipping_fee: request.shipping_fee,
                occurred_at: Utc::now(),
            }),
            |id| Order::empty(OrderId::new(id)),
        )?;

        let mut reports = Vec::with_capacity(request.lines.len());
        let mut applied_so_far: Vec<(ProductId, i64, VariantSelection)> = Vec::new();
        for (request_index, line) in request.lines.iter().enumerate() {
            let Some((product_id, line_no)) = resolved[request_index] else {
                reports.push(LineReport {
                    request_index: request_index as u32,
                    line_no: None,
                    catalog_number: line.catalog_number,
                    outcome: LineOutcome::ProductMissing,
                });
                continue;
            };

            let report = self.deduct_with_retry(
                product_id,
                request_index as u32,
                line_no,
                line.catalog_number,
                i64::from(line.qty),
                &line.variant,
            )?;

            if let LineOutcome::Applied { qty } | LineOutcome::ShortStock { applied: qty, .. } =
                report.outcome
            {
                if qty > 0 {
                    applied_so_far.push((product_id, qty, line.variant.clone()));
                }
            }

            let short = matches!(report.outcome, LineOutcome::ShortStock { .. });
            reports.push(report);

            if short && request.policy == LinePolicy::AllOrNothing {
                self.compensate(order_id, &applied_so_far);
                return Err(DispatchError::Concurrency(format!(
                    "insufficient stock for catalog item {}",
                    line.catalog_number
                )));
            }
        }

        Ok(PlacedOrder { order_id, reports })
    }

    fn deduct_with_retry(
        &self,
        product_id: ProductId,
        request_index: u32,
        line_no: u32,
        catalog_number: u64,
        qty: i64,
        variant: &VariantSelection,
    ) -> Result<LineReport, DispatchError> {
        let mut attempts = 0;
        loop {
            let result = self.dispatcher.dispatch::<Product>(
                product_id.0,
                streams::PRODUCT,
                InventoryCommand::DeductStock(DeductStock {
                    product_id,
                    qty,
                    variant: variant.clone(),
                    occurred_at: Utc::now(),
                }),
                |id| Product::empty(ProductId::new(id)),
            );

            match result {
                Ok(committed) => {
                    let outcome = committed
                        .iter()
                        .find_map(|stored| {
                            let event: InventoryEvent =
                                serde_json::from_value(stored.payload.clone()).ok()?;
                            match event {
                                InventoryEvent::StockDeducted(e) => {
                                    Some(if e.qty_applied < e.qty_requested {
                                        LineOutcome::ShortStock {
                                            requested: e.qty_requested,
                                            applied: e.qty_applied,
                                        }
                                    } else {
                                        LineOutcome::Applied { qty: e.qty_applied }
                                    })
                                }
                                _ => None,
                            }
                        })
                        .ok_or_else(|| {
                            DispatchError::Deserialize(
                                "deduction committed no stock event".to_string(),
                            )
                        })?;

                    return Ok(LineReport {
                        request_index,
                        line_no: Some(line_no),
                        catalog_number,
                        outcome,
                    });
                }
                Err(DispatchError::Concurrency(msg)) => {
                    attempts += 1;
                    if attempts >= MAX_DEDUCT_RETRIES {
                        return Err(DispatchError::Concurrency(msg));
                    }
                    tracing::debug!(
                        %product_id,
                        attempt = attempts,
                        "stock decrement hit a concurrent writer; retrying"
                    );
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Undo already-applied decrements and cancel the order after an
    /// all-or-nothing shortfall.
    fn compensate(&self, order_id: OrderId, applied: &[(ProductId, i64, VariantSelection)]) {
        for (product_id, qty, variant) in applied {
            let mut attempts = 0;
            loop {
                let result = self.dispatcher.dispatch::<Product>(
                    product_id.0,
                    streams::PRODUCT,
                    InventoryCommand::Restock(Restock {
                        product_id: *product_id,
                        qty: *qty,
                        variant: variant.clone(),
                        occurred_at: Utc::now(),
                    }),
                    |id| Product::empty(ProductId::new(id)),
                );
                match result {
                    Ok(_) => break,
                    Err(DispatchError::Concurrency(_)) if attempts < MAX_DEDUCT_RETRIES => {
                        attempts += 1;
                    }
                    Err(e) => {
                        tracing::error!(%product_id, error = ?e, "restock compensation failed");
                        break;
                    }
                }
            }
        }

        if let Err(e) = self.dispatcher.dispatch::<Order>(
            order_id.0,
            streams::ORDER,
            OrderCommand::ChangeStatus(ChangeStatus {
                order_id,
                status: OrderStatus::Cancelled,
                occurred_at: Utc::now(),
            }),
            |id| Order::empty(OrderId::new(id)),
        ) {
            tracing::error!(%order_id, error = ?e, "failed to cancel order after shortfall");
        }
    }
}
