use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shopforge_core::AggregateId;

/// Category of an operations notification.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Order,
    Return,
    Stock,
    General,
}

/// One append-only event-log entry for operations staff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    /// Aggregate the notification refers to (order, return, or product).
    pub related_id: Option<AggregateId>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        related_id: Option<AggregateId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            kind,
            title: title.into(),
            message: message.into(),
            related_id,
            is_read: false,
            created_at,
        }
    }
}

/// Append-only notification sink.
pub trait NotificationSink: Send + Sync {
    fn push(&self, notification: Notification);
}

impl<S> NotificationSink for Arc<S>
where
    S: NotificationSink + ?Sized,
{
    fn push(&self, notification: Notification) {
        (**self).push(notification)
    }
}

/// In-memory sink for tests/dev; `all()` exists for admin tooling and tests,
/// not for the fulfillment core.
#[derive(Debug, Default)]
pub struct InMemoryNotificationSink {
    inner: Mutex<Vec<Notification>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        match self.inner.lock() {
            Ok(list) => list.clone(),
            Err(_) => vec![],
        }
    }

    pub fn of_kind(&self, kind: NotificationKind) -> Vec<Notification> {
        self.all().into_iter().filter(|n| n.kind == kind).collect()
    }
}

impl NotificationSink for InMemoryNotificationSink {
    fn push(&self, notification: Notification) {
        if let Ok(mut list) = self.inner.lock() {
            list.push(notification);
        }
    }
}
