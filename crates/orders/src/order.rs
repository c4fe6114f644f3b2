use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use shopforge_events::Event;
use shopforge_inventory::{ProductId, VariantSelection};

/// Order identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub AggregateId);

impl OrderId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for OrderId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Order-level status machine.
///
/// Forward path is strictly Pending → Confirmed → Shipped → Delivered; no
/// skipping and no regression. Cancelled is reachable from any non-terminal
/// state. Delivered and Cancelled are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    pub fn can_transition(self, next: OrderStatus) -> bool {
        use OrderStatus::*;
        match (self, next) {
            (Pending, Confirmed) => true,
            (Confirmed, Shipped) => true,
            (Shipped, Delivered) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl core::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Per-line status.
///
/// `Ordered` and `Delivered` track the fulfillment side; the remaining
/// variants mirror the progress of a return or replacement opened against
/// the line.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineStatus {
    Ordered,
    Delivered,
    ReturnRequested,
    ReplacementRequested,
    Approved,
    PickupScheduled,
    ReceivedAtWarehouse,
    RefundInitiated,
    ReplacementDispatched,
    Returned,
    Replaced,
}

/// Immutable snapshot of one purchased item, taken at placement time so later
/// catalog edits cannot rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// Position within the order, numbered from 1 at placement; the stable
    /// back-reference used when a return propagates status onto this line.
    pub line_no: u32,
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub name: String,
    pub image: String,
    pub variant: VariantSelection,
    pub qty: u32,
    /// Unit price in minor currency units.
    pub unit_price: u64,
    pub status: LineStatus,
    pub serial_number: Option<String>,
    pub serial_type: Option<String>,
}

/// Line as submitted with PlaceOrder (before line numbering and snapshotting
/// of the default status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineInput {
    pub product_id: ProductId,
    pub catalog_number: u64,
    pub name: String,
    pub image: String,
    pub variant: VariantSelection,
    pub qty: u32,
    pub unit_price: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub method: String,
    pub is_paid: bool,
    pub paid_at: Option<DateTime<Utc>>,
    pub transaction_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialAssignment {
    pub line_no: u32,
    pub serial_number: String,
    pub serial_type: Option<String>,
}

/// Aggregate root: a customer order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    id: OrderId,
    customer_id: UserId,
    customer_name: String,
    lines: Vec<OrderLine>,
    shipping: Option<ShippingAddress>,
    payment: Option<PaymentInfo>,
    items_total: u64,
    shipping_fee: u64,
    grand_total: u64,
    status: OrderStatus,
    placed_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Order {
    pub fn empty(id: OrderId) -> Self {
        Self {
            id,
            customer_id: UserId::from_uuid(uuid_nil()),
            customer_name: String::new(),
            lines: Vec::new(),
            shipping: None,
            payment: None,
            items_total: 0,
            shipping_fee: 0,
            grand_total: 0,
            status: OrderStatus::Pending,
            placed_at: None,
            delivered_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> OrderId {
        self.id
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn line(&self, line_no: u32) -> Option<&OrderLine> {
        self.lines.iter().find(|l| l.line_no == line_no)
    }

    pub fn delivered_at(&self) -> Option<DateTime<Utc>> {
        self.delivered_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

fn uuid_nil() -> uuid::Uuid {
    uuid::Uuid::nil()
}

impl AggregateRoot for Order {
    type Id = OrderId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: PlaceOrder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub customer_name: String,
    pub lines: Vec<OrderLineInput>,
    pub shipping: ShippingAddress,
    pub payment: PaymentInfo,
    pub shipping_fee: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeStatus (order-level lifecycle step).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeStatus {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AssignSerials (recorded at dispatch for serialized goods).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignSerials {
    pub order_id: OrderId,
    pub assignments: Vec<SerialAssignment>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetLineStatus (back-propagation from a return's progress).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLineStatus {
    pub order_id: OrderId,
    pub line_no: u32,
    pub status: LineStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    PlaceOrder(PlaceOrder),
    ChangeStatus(ChangeStatus),
    AssignSerials(AssignSerials),
    SetLineStatus(SetLineStatus),
}

/// Event: OrderPlaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: OrderId,
    pub customer_id: UserId,
    pub customer_name: String,
    pub lines: Vec<OrderLine>,
    pub shipping: ShippingAddress,
    pub payment: PaymentInfo,
    pub items_total: u64,
    pub shipping_fee: u64,
    pub grand_total: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusChanged {
    pub order_id: OrderId,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderSerialsAssigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSerialsAssigned {
    pub order_id: OrderId,
    pub assignments: Vec<SerialAssignment>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: OrderLineStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLineStatusChanged {
    pub order_id: OrderId,
    pub line_no: u32,
    pub from: LineStatus,
    pub to: LineStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    Placed(OrderPlaced),
    StatusChanged(OrderStatusChanged),
    SerialsAssigned(OrderSerialsAssigned),
    LineStatusChanged(OrderLineStatusChanged),
}

impl Event for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Placed(_) => "orders.order.placed",
            OrderEvent::StatusChanged(_) => "orders.order.status_changed",
            OrderEvent::SerialsAssigned(_) => "orders.order.serials_assigned",
            OrderEvent::LineStatusChanged(_) => "orders.order.line_status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            OrderEvent::Placed(e) => e.occurred_at,
            OrderEvent::StatusChanged(e) => e.occurred_at,
            OrderEvent::SerialsAssigned(e) => e.occurred_at,
            OrderEvent::LineStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Order {
    type Command = OrderCommand;
    type Event = OrderEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            OrderEvent::Placed(e) => {
                self.id = e.order_id;
                self.customer_id = e.customer_id;
                self.customer_name = e.customer_name.clone();
                self.lines = e.lines.clone();
                self.shipping = Some(e.shipping.clone());
                self.payment = Some(e.payment.clone());
                self.items_total = e.items_total;
                self.shipping_fee = e.shipping_fee;
                self.grand_total = e.grand_total;
                self.status = OrderStatus::Pending;
                self.placed_at = Some(e.occurred_at);
                self.created = true;
            }
            OrderEvent::StatusChanged(e) => {
                self.status = e.to;
                if e.to == OrderStatus::Delivered {
                    self.delivered_at = Some(e.occurred_at);
                    // Lines untouched by a return follow the order into
                    // Delivered.
                    for line in &mut self.lines {
                        if line.status == LineStatus::Ordered {
                            line.status = LineStatus::Delivered;
                        }
                    }
                }
            }
            OrderEvent::SerialsAssigned(e) => {
                for assignment in &e.assignments {
                    if let Some(line) =
                        self.lines.iter_mut().find(|l| l.line_no == assignment.line_no)
                    {
                        line.serial_number = Some(assignment.serial_number.clone());
                        line.serial_type = assignment.serial_type.clone();
                    }
                }
            }
            OrderEvent::LineStatusChanged(e) => {
                if let Some(line) = self.lines.iter_mut().find(|l| l.line_no == e.line_no) {
                    line.status = e.to;
                }
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::PlaceOrder(cmd) => self.handle_place(cmd),
            OrderCommand::ChangeStatus(cmd) => self.handle_change_status(cmd),
            OrderCommand::AssignSerials(cmd) => self.handle_assign_serials(cmd),
            OrderCommand::SetLineStatus(cmd) => self.handle_set_line_status(cmd),
        }
    }
}

impl Order {
    fn ensure_order_id(&self, order_id: OrderId) -> Result<(), DomainError> {
        if self.id != order_id {
            return Err(DomainError::invariant("order_id mismatch"));
        }
        Ok(())
    }

    fn handle_place(&self, cmd: &PlaceOrder) -> Result<Vec<OrderEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("order already exists"));
        }
        if cmd.lines.is_empty() {
            return Err(DomainError::validation("order must contain at least one item"));
        }
        for (idx, line) in cmd.lines.iter().enumerate() {
            if line.qty == 0 {
                return Err(DomainError::validation(format!("line {idx} qty must be positive")));
            }
            if line.name.trim().is_empty() {
                return Err(DomainError::validation(format!("line {idx} name cannot be empty")));
            }
        }
        if cmd.shipping.postal_code.trim().is_empty() {
            return Err(DomainError::validation("shipping postal code cannot be empty"));
        }

        let lines: Vec<OrderLine> = cmd
            .lines
            .iter()
            .enumerate()
            .map(|(idx, input)| OrderLine {
                line_no: (idx + 1) as u32,
                product_id: input.product_id,
                catalog_number: input.catalog_number,
                name: input.name.clone(),
                image: input.image.clone(),
                variant: input.variant.clone(),
                qty: input.qty,
                unit_price: input.unit_price,
                status: LineStatus::Ordered,
                serial_number: None,
                serial_type: None,
            })
            .collect();

        let items_total: u64 = lines.iter().map(|l| l.unit_price * u64::from(l.qty)).sum();

        Ok(vec![OrderEvent::Placed(OrderPlaced {
            order_id: cmd.order_id,
            customer_id: cmd.customer_id,
            customer_name: cmd.customer_name.clone(),
            lines,
            shipping: cmd.shipping.clone(),
            payment: cmd.payment.clone(),
            items_total,
            shipping_fee: cmd.shipping_fee,
            grand_total: items_total + cmd.shipping_fee,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_status(&self, cmd: &ChangeStatus) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;

        if !self.status.can_transition(cmd.status) {
            return Err(DomainError::invariant(format!(
                "illegal order status transition: {} -> {}",
                self.status, cmd.status
            )));
        }

        Ok(vec![OrderEvent::StatusChanged(OrderStatusChanged {
            order_id: cmd.order_id,
            from: self.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_assign_serials(&self, cmd: &AssignSerials) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;

        if self.status == OrderStatus::Cancelled {
            return Err(DomainError::invariant("cannot assign serials on a cancelled order"));
        }
        if cmd.assignments.is_empty() {
            return Err(DomainError::validation("no serial assignments supplied"));
        }
        for assignment in &cmd.assignments {
            if self.line(assignment.line_no).is_none() {
                return Err(DomainError::validation(format!(
                    "line {} does not exist on this order",
                    assignment.line_no
                )));
            }
            if assignment.serial_number.trim().is_empty() {
                return Err(DomainError::validation("serial number cannot be empty"));
            }
        }

        Ok(vec![OrderEvent::SerialsAssigned(OrderSerialsAssigned {
            order_id: cmd.order_id,
            assignments: cmd.assignments.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_line_status(&self, cmd: &SetLineStatus) -> Result<Vec<OrderEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_order_id(cmd.order_id)?;

        let line = self
            .line(cmd.line_no)
            .ok_or_else(|| DomainError::validation(format!(
                "line {} does not exist on this order",
                cmd.line_no
            )))?;

        // A return can only be opened against a line the customer has
        // actually received.
        if matches!(
            cmd.status,
            LineStatus::ReturnRequested | LineStatus::ReplacementRequested
        ) && line.status != LineStatus::Delivered
        {
            return Err(DomainError::invariant(format!(
                "line {} is not delivered; cannot request a return",
                cmd.line_no
            )));
        }

        if line.status == cmd.status {
            // Idempotent: mirroring the same status twice emits nothing.
            return Ok(vec![]);
        }

        Ok(vec![OrderEvent::LineStatusChanged(OrderLineStatusChanged {
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            from: line.status,
            to: cmd.status,
            occurred_at: cmd.occurred_at,
        })])
    }
}
