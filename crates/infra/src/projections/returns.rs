use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use shopforge_core::UserId;
use shopforge_events::EventEnvelope;
use shopforge_orders::OrderId;
use shopforge_returns::{
    ProductSnapshot, ReplacementOptions, ReturnEvent, ReturnId, ReturnKind, ReturnStatus,
    TimelineEntry,
};

use crate::read_model::{InMemoryReadStore, ReadStore};

use super::{Cursors, ProjectionError};

/// Queryable return-request read model, timeline included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnReadModel {
    pub return_id: ReturnId,
    pub kind: ReturnKind,
    pub order_id: OrderId,
    pub line_no: u32,
    pub customer_id: UserId,
    pub customer_name: String,
    pub product: ProductSnapshot,
    pub qty: u32,
    pub reason: String,
    pub comment: Option<String>,
    pub images: Vec<String>,
    pub replacement: Option<ReplacementOptions>,
    pub status: ReturnStatus,
    pub timeline: Vec<TimelineEntry>,
    pub opened_at: DateTime<Utc>,
}

pub type InMemoryReturnsProjection =
    ReturnsProjection<Arc<InMemoryReadStore<ReturnId, ReturnReadModel>>>;

/// Returns projection: customer return history and the operations queue.
#[derive(Debug)]
pub struct ReturnsProjection<S>
where
    S: ReadStore<ReturnId, ReturnReadModel>,
{
    store: S,
    cursors: Cursors,
}

impl<S> ReturnsProjection<S>
where
    S: ReadStore<ReturnId, ReturnReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: Cursors::new(),
        }
    }

    pub fn get(&self, return_id: &ReturnId) -> Option<ReturnReadModel> {
        self.store.get(return_id)
    }

    pub fn list_for_customer(&self, customer_id: UserId) -> Vec<ReturnReadModel> {
        let mut requests: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|r| r.customer_id == customer_id)
            .collect();
        requests.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        requests
    }

    pub fn list_all(&self) -> Vec<ReturnReadModel> {
        let mut requests = self.store.list();
        requests.sort_by(|a, b| b.opened_at.cmp(&a.opened_at));
        requests
    }

    pub fn apply_envelope(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        let aggregate_id = envelope.aggregate_id();

        self.cursors.apply_once(aggregate_id, envelope.sequence_number(), || {
            let event: ReturnEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

            let return_id = match &event {
                ReturnEvent::Opened(e) => e.return_id,
                ReturnEvent::StatusAdvanced(e) => e.return_id,
            };
            if return_id.0 != aggregate_id {
                return Err(ProjectionError::StreamMismatch(
                    "event return_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                ReturnEvent::Opened(e) => {
                    let opening_note = match e.kind {
                        ReturnKind::Return => "Return request initiated",
                        ReturnKind::Replacement => "Replacement request initiated",
                    };
                    self.store.upsert(
                        e.return_id,
                        ReturnReadModel {
                            return_id: e.return_id,
                            kind: e.kind,
                            order_id: e.order_id,
                            line_no: e.line_no,
                            customer_id: e.customer_id,
                            customer_name: e.customer_name,
                            product: e.product,
                            qty: e.qty,
                            reason: e.reason,
                            comment: e.comment,
                            images: e.images,
                            replacement: e.replacement,
                            status: ReturnStatus::Pending,
                            timeline: vec![TimelineEntry {
                                status: ReturnStatus::Pending,
                                note: opening_note.to_string(),
                                time: e.occurred_at,
                            }],
                            opened_at: e.occurred_at,
                        },
                    );
                }
                ReturnEvent::StatusAdvanced(e) => {
                    if let Some(mut rm) = self.store.get(&e.return_id) {
                        rm.status = e.to;
                        rm.timeline.push(TimelineEntry {
                            status: e.to,
                            note: e.note,
                            time: e.occurred_at,
                        });
                        self.store.upsert(e.return_id, rm);
                    }
                }
            }

            Ok(())
        })
    }
}
