//! Returns orchestration.
//!
//! Opens return/replacement requests against delivered order lines and
//! mirrors every status change back onto the originating line. Writes are
//! ordered: the return stream first, the order stream second, so the return
//! is never lost even if mirroring fails.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use shopforge_core::{AggregateId, UserId};
use shopforge_events::{EventBus, EventEnvelope};
use shopforge_orders::{LineStatus, Order, OrderCommand, OrderId, SetLineStatus};
use shopforge_returns::{
    AdvanceStatus, OpenReturn, ProductSnapshot, ReplacementOptions, Return, ReturnCommand,
    ReturnEvent, ReturnId, ReturnKind, ReturnStatus,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::EventStore;
use crate::projections::InMemoryOrdersProjection;
use crate::streams;

/// The order-line status that mirrors a return's state.
pub fn line_status_for(status: ReturnStatus, kind: ReturnKind) -> LineStatus {
    match status {
        ReturnStatus::Pending => match kind {
            ReturnKind::Return => LineStatus::ReturnRequested,
            ReturnKind::Replacement => LineStatus::ReplacementRequested,
        },
        ReturnStatus::Approved => LineStatus::Approved,
        ReturnStatus::PickupScheduled => LineStatus::PickupScheduled,
        ReturnStatus::ReceivedAtWarehouse => LineStatus::ReceivedAtWarehouse,
        ReturnStatus::RefundInitiated => LineStatus::RefundInitiated,
        ReturnStatus::ReplacementDispatched => LineStatus::ReplacementDispatched,
        // A rejected request releases the line back to its delivered state.
        ReturnStatus::Rejected => LineStatus::Delivered,
        ReturnStatus::Completed => match kind {
            ReturnKind::Return => LineStatus::Returned,
            ReturnKind::Replacement => LineStatus::Replaced,
        },
    }
}

/// Whether the order-line mirror write succeeded.
///
/// The return stream is always the source of truth; `mirrored: false` means
/// the order line is stale and a structured warning was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub mirrored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenReturnRequest {
    pub requester: UserId,
    pub order_id: OrderId,
    pub line_no: u32,
    pub kind: ReturnKind,
    pub qty: u32,
    pub reason: String,
    pub comment: Option<String>,
    pub images: Vec<String>,
    pub replacement: Option<ReplacementOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenedReturn {
    pub return_id: ReturnId,
    pub sync: SyncReport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvancedReturn {
    pub status: ReturnStatus,
    pub sync: SyncReport,
}

/// Application service for the return/replacement lifecycle.
pub struct ReturnsService<S, B> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    orders: Arc<InMemoryOrdersProjection>,
}

impl<S, B> ReturnsService<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    pub fn new(
        dispatcher: Arc<CommandDispatcher<S, B>>,
        orders: Arc<InMemoryOrdersProjection>,
    ) -> Self {
        Self { dispatcher, orders }
    }

    /// Open a return or replacement request against one order line.
    ///
    /// Ownership and line eligibility are verified before anything is
    /// written; a requester who does not own the order learns nothing beyond
    /// the authorization failure.
    pub fn open_return(&self, request: OpenReturnRequest) -> Result<OpenedReturn, DispatchError> {
        let order = self
            .orders
            .get(&request.order_id)
            .ok_or(DispatchError::NotFound)?;

        if order.customer_id != request.requester {
            return Err(DispatchError::Unauthorized);
        }

        let line = order
            .lines
            .iter()
            .find(|l| l.line_no == request.line_no)
            .ok_or(DispatchError::NotFound)?;

        if line.status != LineStatus::Delivered {
            return Err(DispatchError::InvariantViolation(format!(
                "line {} is not delivered; cannot open a return",
                request.line_no
            )));
        }
        if request.qty == 0 || request.qty > line.qty {
            return Err(DispatchError::Validation(format!(
                "qty must be between 1 and {}",
                line.qty
            )));
        }

        let return_id = ReturnId::new(AggregateId::new());
        self.dispatcher.dispatch::<Return>(
            return_id.0,
            streams::RETURN,
            ReturnCommand::OpenReturn(OpenReturn {
                return_id,
                kind: request.kind,
                order_id: request.order_id,
                line_no: request.line_no,
                customer_id: request.requester,
                customer_name: order.customer_name.clone(),
                product: ProductSnapshot {
                    catalog_number: line.catalog_number,
                    name: line.name.clone(),
                    image: line.image.clone(),
                    unit_price: line.unit_price,
                },
                qty: request.qty,
                reason: request.reason,
                comment: request.comment,
                images: request.images,
                replacement: request.replacement,
                occurred_at: Utc::now(),
            }),
            |id| Return::empty(ReturnId::new(id)),
        )?;

        let sync = self.mirror_line(
            request.order_id,
            request.line_no,
            line_status_for(ReturnStatus::Pending, request.kind),
        );

        Ok(OpenedReturn { return_id, sync })
    }

    /// Advance a return request and mirror the new state onto the order line.
    pub fn advance_status(
        &self,
        return_id: ReturnId,
        status: ReturnStatus,
        note: Option<String>,
    ) -> Result<AdvancedReturn, DispatchError> {
        let committed = self.dispatcher.dispatch::<Return>(
            return_id.0,
            streams::RETURN,
            ReturnCommand::AdvanceStatus(AdvanceStatus {
                return_id,
                status,
                note,
                occurred_at: Utc::now(),
            }),
            |id| Return::empty(ReturnId::new(id)),
        )?;

        let advanced = committed
            .iter()
            .find_map(|stored| {
                let event: ReturnEvent = serde_json::from_value(stored.payload.clone()).ok()?;
                match event {
                    ReturnEvent::StatusAdvanced(e) => Some(e),
                    _ => None,
                }
            })
            .ok_or_else(|| {
                DispatchError::Deserialize("advance committed no status event".to_string())
            })?;

        let sync = self.mirror_line(
            advanced.order_id,
            advanced.line_no,
            line_status_for(advanced.to, advanced.kind),
        );

        Ok(AdvancedReturn {
            status: advanced.to,
            sync,
        })
    }

    fn mirror_line(&self, order_id: OrderId, line_no: u32, status: LineStatus) -> SyncReport {
        let result = self.dispatcher.dispatch::<Order>(
            order_id.0,
            streams::ORDER,
            OrderCommand::SetLineStatus(SetLineStatus {
                order_id,
                line_no,
                status,
                occurred_at: Utc::now(),
            }),
            |id| Order::empty(OrderId::new(id)),
        );

        match result {
            Ok(_) => SyncReport { mirrored: true },
            Err(e) => {
                // The return stream already holds the truth; never fail the
                // caller because the order line could not be updated.
                tracing::warn!(
                    %order_id,
                    line_no,
                    ?status,
                    error = ?e,
                    "failed to mirror return status onto order line"
                );
                SyncReport { mirrored: false }
            }
        }
    }
}
