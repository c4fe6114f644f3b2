//! Notification sink consumed by operations staff.
//!
//! Write-only from the fulfillment core's perspective: the core appends
//! (new order, low stock, return lifecycle); reading/acknowledging is an
//! external admin concern.

pub mod notification;

pub use notification::{InMemoryNotificationSink, Notification, NotificationKind, NotificationSink};
