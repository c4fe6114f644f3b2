use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use shopforge_events::{EventBus, EventEnvelope, Subscription};
use shopforge_notifications::InMemoryNotificationSink;

use crate::streams;

use super::{
    InMemoryCatalogProjection, InMemoryOrdersProjection, InMemoryReturnsProjection,
    NotificationProjection, ProjectionError,
};

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("projection apply failed: {0}")]
    Projection(#[from] ProjectionError),

    #[error("forwarding to inner bus failed: {0}")]
    Forward(String),
}

/// Synchronous projection fan-out.
///
/// Wraps an inner bus and applies each published envelope to the projections
/// before forwarding it. Command dispatch publishes after append, so by the
/// time a handler returns, the read models already reflect the write
/// (read-your-writes for the HTTP layer). Projections remain idempotent, so
/// replaying the stream through this adapter stays safe.
pub struct ProjectionFanout<B> {
    catalog: Arc<InMemoryCatalogProjection>,
    orders: Arc<InMemoryOrdersProjection>,
    returns: Arc<InMemoryReturnsProjection>,
    notifications: Arc<NotificationProjection<Arc<InMemoryNotificationSink>>>,
    inner: B,
}

impl<B> ProjectionFanout<B> {
    pub fn new(
        catalog: Arc<InMemoryCatalogProjection>,
        orders: Arc<InMemoryOrdersProjection>,
        returns: Arc<InMemoryReturnsProjection>,
        notifications: Arc<NotificationProjection<Arc<InMemoryNotificationSink>>>,
        inner: B,
    ) -> Self {
        Self {
            catalog,
            orders,
            returns,
            notifications,
            inner,
        }
    }
}

impl<B> EventBus<EventEnvelope<JsonValue>> for ProjectionFanout<B>
where
    B: EventBus<EventEnvelope<JsonValue>>,
{
    type Error = FanoutError;

    fn publish(&self, message: EventEnvelope<JsonValue>) -> Result<(), Self::Error> {
        match message.aggregate_type() {
            streams::PRODUCT => self.catalog.apply_envelope(&message)?,
            streams::ORDER => self.orders.apply_envelope(&message)?,
            streams::RETURN => self.returns.apply_envelope(&message)?,
            other => {
                tracing::warn!(aggregate_type = other, "envelope for unknown stream type");
            }
        }
        self.notifications.apply_envelope(&message)?;

        self.inner
            .publish(message)
            .map_err(|e| FanoutError::Forward(format!("{e:?}")))
    }

    fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.inner.subscribe()
    }
}
