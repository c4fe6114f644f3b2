use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopforge_core::UserId;
use shopforge_events::EventEnvelope;
use shopforge_orders::{
    OrderEvent, OrderId, OrderLine, OrderStatus, PaymentInfo, ShippingAddress,
};

use crate::read_model::{InMemoryReadStore, ReadStore};

use super::{Cursors, ProjectionError};

/// Queryable order read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReadModel {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub customer_name: String,
    pub lines: Vec<OrderLine>,
    pub shipping: ShippingAddress,
    pub payment: PaymentInfo,
    pub items_total: u64,
    pub shipping_fee: u64,
    pub grand_total: u64,
    pub status: OrderStatus,
    pub placed_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl OrderReadModel {
    pub fn is_delivered(&self) -> bool {
        self.delivered_at.is_some()
    }
}

pub type InMemoryOrdersProjection =
    OrdersProjection<Arc<InMemoryReadStore<OrderId, OrderReadModel>>>;

/// Orders projection: customer order history and the operations order list.
#[derive(Debug)]
pub struct OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderReadModel>,
{
    store: S,
    cursors: Cursors,
}

impl<S> OrdersProjection<S>
where
    S: ReadStore<OrderId, OrderReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Cursors::new(),
        }
    }

    pub fn get(&self, order_id: &OrderId) -> Option<OrderReadModel> {
        self.store.get(order_id)
    }

    /// Orders belonging to one customer, newest first.
    pub fn list_for_customer(&self, customer_id: UserId) -> Vec<OrderReadModel> {
        let mut orders: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|o| o.customer_id == customer_id)
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        orders
    }

    /// All orders, optionally filtered by status, newest first.
    pub fn list_all(&self, status: Option<OrderStatus>) -> Vec<OrderReadModel> {
        let mut orders: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|o| status.is_none_or(|s| o.status == s))
            .collect();
        orders.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        orders
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();

        self.cursors.apply_once(aggregate_id, envelope.sequence_number(), || {
            let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

            let order_id = match &event {
                OrderEvent::Placed(e) => e.order_id,
                OrderEvent::StatusChanged(e) => e.order_id,
                OrderEvent::SerialsAssigned(e) => e.order_id,
                OrderEvent::LineStatusChanged(e) => e.order_id,
            };
            if order_id.0 != aggregate_id {
                return Err(ProjectionError::StreamMismatch(
                    "event order_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                OrderEvent::Placed(e) => {
                    self.store.upsert(
                        e.order_id,
                        OrderReadModel {
                            order_id: e.order_id,
                            customer_id: e.customer_id,
                            customer_name: e.customer_name,
                            lines: e.lines,
                            shipping: e.shipping,
                            payment: e.payment,
                            items_total: e.items_total,
                            shipping_fee: e.shipping_fee,
                            grand_total: e.grand_total,
                            status: OrderStatus::Pending,
                            placed_at: e.occurred_at,
                            delivered_at: None,
                        },
                    );
                }
                OrderEvent::StatusChanged(e) => {
                    if let Some(mut rm) = self.store.get(&e.order_id) {
                        rm.status = e.to;
                        if e.to == OrderStatus::Delivered {
                            rm.delivered_at = Some(e.occurred_at);
                            for line in &mut rm.lines {
                                if line.status == shopforge_orders::LineStatus::Ordered {
                                    line.status = shopforge_orders::LineStatus::Delivered;
                                }
                            }
                        }
                        self.store.upsert(e.order_id, rm);
                    }
                }
                OrderEvent::SerialsAssigned(e) => {
                    if let Some(mut rm) = self.store.get(&e.order_id) {
                        for assignment in &e.assignments {
                            if let Some(line) =
                                rm.lines.iter_mut().find(|l| l.line_no == assignment.line_no)
                            {
                                line.serial_number = Some(assignment.serial_number.clone());
                                line.serial_type = assignment.serial_type.clone();
                            }
                        }
                        self.store.upsert(e.order_id, rm);
                    }
                }
                OrderEvent::LineStatusChanged(e) => {
                    if let Some(mut rm) = self.store.get(&e.order_id) {
                        if let Some(line) = rm.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                            line.status = e.to;
                        }
                        self.store.upsert(e.order_id, rm);
                    }
                }
            }

            Ok(())
        })
    }
}
