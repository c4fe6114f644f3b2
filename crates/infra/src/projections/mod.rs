//! Event-driven projections maintaining disposable read models.
//!
//! Each projection consumes published envelopes (JSON payloads) and keeps a
//! per-stream cursor so at-least-once delivery stays idempotent.

mod catalog;
mod fanout;
mod notifications;
mod orders;
mod returns;

pub use catalog::{CatalogProjection, InMemoryCatalogProjection, ProductReadModel};
pub use fanout::{FanoutError, ProjectionFanout};
pub use notifications::NotificationProjection;
pub use orders::{InMemoryOrdersProjection, OrderReadModel, OrdersProjection};
pub use returns::{InMemoryReturnsProjection, ReturnReadModel, ReturnsProjection};

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use shopforge_core::AggregateId;

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("event does not match envelope stream: {0}")]
    StreamMismatch(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Per-stream cursor tracking for idempotent projection application.
#[derive(Debug, Default)]
pub(crate) struct Cursors {
    inner: RwLock<HashMap<AggregateId, u64>>,
}

impl Cursors {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Run `apply` exactly once per (stream, sequence) pair.
    ///
    /// Duplicates and replays at or below the cursor are silently skipped.
    /// The first event of a stream may carry any positive sequence number;
    /// after that, strictly contiguous increments are required. The cursor
    /// only advances after `apply` succeeds.
    pub(crate) fn apply_once<F>(
        &self,
        aggregate_id: AggregateId,
        sequence_number: u64,
        apply: F,
    ) -> Result<(), ProjectionError>
    where
        F: FnOnce() -> Result<(), ProjectionError>,
    {
        // A panic inside `apply` poisons the lock before the cursor advances,
        // so the map itself is never left half-written; recover it.
        let mut cursors = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let last = *cursors.get(&aggregate_id).unwrap_or(&0);

        if sequence_number == 0 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }
        if sequence_number <= last {
            // Duplicate or replay; safe to ignore.
            return Ok(());
        }
        if last != 0 && sequence_number != last + 1 {
            return Err(ProjectionError::NonMonotonicSequence {
                last,
                found: sequence_number,
            });
        }

        apply()?;
        cursors.insert(aggregate_id, sequence_number);
        Ok(())
    }

    pub(crate) fn reset(&self) {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}
