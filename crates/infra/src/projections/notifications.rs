use serde_json::Value as JsonValue;

use shopforge_events::EventEnvelope;
use shopforge_inventory::{InventoryEvent, LowStockScope};
use shopforge_notifications::{Notification, NotificationKind, NotificationSink};
use shopforge_orders::OrderEvent;
use shopforge_returns::{ReturnEvent, ReturnKind};

use crate::streams;

use super::{Cursors, ProjectionError};

/// Notification projection.
///
/// Turns selected domain events into operations notifications. The per-stream
/// cursor guarantees exactly one notification per underlying event, even with
/// at-least-once delivery.
#[derive(Debug)]
pub struct NotificationProjection<N>
where
    N: NotificationSink,
{
    sink: N,
    cursors: Cursors,
}

impl<N> NotificationProjection<N>
where
    N: NotificationSink,
{
    pub fn new(sink: N) -> Self {
        Self {
            sink,
            cursors: Cursors::new(),
        }
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();
        let related = Some(aggregate_id);

        self.cursors.apply_once(aggregate_id, envelope.sequence_number(), || {
            match envelope.aggregate_type() {
                streams::PRODUCT => {
                    let event: InventoryEvent = serde_json::from_value(envelope.payload().clone())
                        .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
                    if let InventoryEvent::LowStockRaised(e) = event {
                        let message = match e.scope {
                            LowStockScope::Aggregate => format!(
                                "{} (catalog {}) is down to {} units",
                                e.name, e.catalog_number, e.remaining
                            ),
                            LowStockScope::Sku { index } => format!(
                                "{} (catalog {}) variant #{} is down to {} units",
                                e.name, e.catalog_number, index, e.remaining
                            ),
                        };
                        self.sink.push(Notification::new(
                            NotificationKind::Stock,
                            "Low stock",
                            message,
                            related,
                            e.occurred_at,
                        ));
                    }
                }
                streams::ORDER => {
                    let event: OrderEvent = serde_json::from_value(envelope.payload().clone())
                        .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
                    if let OrderEvent::Placed(e) = event {
                        self.sink.push(Notification::new(
                            NotificationKind::Order,
                            "New order",
                            format!(
                                "{} placed an order with {} item(s)",
                                e.customer_name,
                                e.lines.len()
                            ),
                            related,
                            e.occurred_at,
                        ));
                    }
                }
                streams::RETURN => {
                    let event: ReturnEvent = serde_json::from_value(envelope.payload().clone())
                        .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;
                    match event {
                        ReturnEvent::Opened(e) => {
                            let title = match e.kind {
                                ReturnKind::Return => "Return requested",
                                ReturnKind::Replacement => "Replacement requested",
                            };
                            self.sink.push(Notification::new(
                                NotificationKind::Return,
                                title,
                                format!("{} for {}", e.customer_name, e.product.name),
                                related,
                                e.occurred_at,
                            ));
                        }
                        ReturnEvent::StatusAdvanced(e) => {
                            self.sink.push(Notification::new(
                                NotificationKind::Return,
                                "Return updated",
                                format!("Status moved from {} to {}", e.from, e.to),
                                related,
                                e.occurred_at,
                            ));
                        }
                    }
                }
                // Unknown streams are not this projection's concern.
                _ => {}
            }

            Ok(())
        })
    }
}
