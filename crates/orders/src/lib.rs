//! Order lifecycle domain module (event-sourced).
//!
//! Owns the order aggregate: immutable line snapshots taken at placement,
//! the order-level status machine, per-line statuses that mirror return
//! progress, and serial-number assignment at dispatch.

pub mod order;

pub use order::{
    AssignSerials, ChangeStatus, LineStatus, Order, OrderCommand, OrderEvent, OrderId, OrderLine,
    OrderLineInput, OrderLineStatusChanged, OrderPlaced, OrderSerialsAssigned, OrderStatus,
    OrderStatusChanged, PaymentInfo, PlaceOrder, SerialAssignment, SetLineStatus, ShippingAddress,
};
