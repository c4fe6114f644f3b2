use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shopforge_core::{Aggregate, AggregateId, AggregateRoot, DomainError, UserId};
use shopforge_events::Event;
use shopforge_orders::OrderId;

/// Return-request identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReturnId(pub AggregateId);

impl ReturnId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ReturnId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Whether the customer wants money back or a different unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReturnKind {
    Return,
    Replacement,
}

/// Return-request status machine.
///
/// Forward path: Pending → Approved → PickupScheduled → ReceivedAtWarehouse →
/// (RefundInitiated for returns | ReplacementDispatched for replacements) →
/// Completed. Rejected is reachable from any non-terminal state. Completed
/// and Rejected are terminal.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnStatus {
    Pending,
    Approved,
    PickupScheduled,
    ReceivedAtWarehouse,
    RefundInitiated,
    ReplacementDispatched,
    Completed,
    Rejected,
}

impl ReturnStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ReturnStatus::Completed | ReturnStatus::Rejected)
    }

    pub fn can_transition(self, next: ReturnStatus, kind: ReturnKind) -> bool {
        use ReturnStatus::*;
        match (self, next) {
            (Pending, Approved) => true,
            (Approved, PickupScheduled) => true,
            (PickupScheduled, ReceivedAtWarehouse) => true,
            (ReceivedAtWarehouse, RefundInitiated) => kind == ReturnKind::Return,
            (ReceivedAtWarehouse, ReplacementDispatched) => kind == ReturnKind::Replacement,
            (RefundInitiated, Completed) => true,
            (ReplacementDispatched, Completed) => true,
            (from, Rejected) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl core::fmt::Display for ReturnStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            ReturnStatus::Pending => "pending",
            ReturnStatus::Approved => "approved",
            ReturnStatus::PickupScheduled => "pickup scheduled",
            ReturnStatus::ReceivedAtWarehouse => "received at warehouse",
            ReturnStatus::RefundInitiated => "refund initiated",
            ReturnStatus::ReplacementDispatched => "replacement dispatched",
            ReturnStatus::Completed => "completed",
            ReturnStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// Snapshot of the returned item, copied from the order line so the request
/// stays readable even if the catalog changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub catalog_number: u64,
    pub name: String,
    pub image: String,
    pub unit_price: u64,
}

/// Desired attributes for the replacement unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementOptions {
    pub size: Option<String>,
    pub color: Option<String>,
}

/// One entry of the customer-visible progress timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEntry {
    pub status: ReturnStatus,
    pub note: String,
    pub time: DateTime<Utc>,
}

/// Aggregate root: a return or replacement request against one order line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Return {
    id: ReturnId,
    kind: ReturnKind,
    order_id: OrderId,
    line_no: u32,
    customer_id: UserId,
    customer_name: String,
    product: Option<ProductSnapshot>,
    qty: u32,
    reason: String,
    comment: Option<String>,
    images: Vec<String>,
    replacement: Option<ReplacementOptions>,
    status: ReturnStatus,
    timeline: Vec<TimelineEntry>,
    opened_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
}

impl Return {
    pub fn empty(id: ReturnId) -> Self {
        Self {
            id,
            kind: ReturnKind::Return,
            order_id: OrderId::new(AggregateId::from_uuid(uuid::Uuid::nil())),
            line_no: 0,
            customer_id: UserId::from_uuid(uuid::Uuid::nil()),
            customer_name: String::new(),
            product: None,
            qty: 0,
            reason: String::new(),
            comment: None,
            images: Vec::new(),
            replacement: None,
            status: ReturnStatus::Pending,
            timeline: Vec::new(),
            opened_at: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> ReturnId {
        self.id
    }

    pub fn kind(&self) -> ReturnKind {
        self.kind
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn customer_id(&self) -> UserId {
        self.customer_id
    }

    pub fn status(&self) -> ReturnStatus {
        self.status
    }

    pub fn timeline(&self) -> &[TimelineEntry] {
        &self.timeline
    }

    pub fn is_created(&self) -> bool {
        self.created
    }
}

impl AggregateRoot for Return {
    type Id = ReturnId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenReturn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenReturn {
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
    pub occurred_at: DateTime<Utc>,
}

/// Command: AdvanceStatus (operations moving the request along).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvanceStatus {
    pub return_id: ReturnId,
    pub status: ReturnStatus,
    pub note: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnCommand {
    OpenReturn(OpenReturn),
    AdvanceStatus(AdvanceStatus),
}

/// Event: ReturnOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnOpened {
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
    pub occurred_at: DateTime<Utc>,
}

/// Event: ReturnStatusAdvanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReturnStatusAdvanced {
    pub return_id: ReturnId,
    pub kind: ReturnKind,
    pub order_id: OrderId,
    pub line_no: u32,
    pub from: ReturnStatus,
    pub to: ReturnStatus,
    pub note: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnEvent {
    Opened(ReturnOpened),
    StatusAdvanced(ReturnStatusAdvanced),
}

impl Event for ReturnEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ReturnEvent::Opened(_) => "returns.request.opened",
            ReturnEvent::StatusAdvanced(_) => "returns.request.status_advanced",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ReturnEvent::Opened(e) => e.occurred_at,
            ReturnEvent::StatusAdvanced(e) => e.occurred_at,
        }
    }
}

fn opening_note(kind: ReturnKind) -> &'static str {
    match kind {
        ReturnKind::Return => "Return request initiated",
        ReturnKind::Replacement => "Replacement request initiated",
    }
}

impl Aggregate for Return {
    type Command = ReturnCommand;
    type Event = ReturnEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ReturnEvent::Opened(e) => {
                self.id = e.return_id;
                self.kind = e.kind;
                self.order_id = e.order_id;
                self.line_no = e.line_no;
                self.customer_id = e.customer_id;
                self.customer_name = e.customer_name.clone();
                self.product = Some(e.product.clone());
                self.qty = e.qty;
                self.reason = e.reason.clone();
                self.comment = e.comment.clone();
                self.images = e.images.clone();
                self.replacement = e.replacement.clone();
                self.status = ReturnStatus::Pending;
                self.timeline.push(TimelineEntry {
                    status: ReturnStatus::Pending,
                    note: opening_note(e.kind).to_string(),
                    time: e.occurred_at,
                });
                self.opened_at = Some(e.occurred_at);
                self.created = true;
            }
            ReturnEvent::StatusAdvanced(e) => {
                self.status = e.to;
                // Timeline is append-only; entries are never edited or
                // removed.
                self.timeline.push(TimelineEntry {
                    status: e.to,
                    note: e.note.clone(),
                    time: e.occurred_at,
                });
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ReturnCommand::OpenReturn(cmd) => self.handle_open(cmd),
            ReturnCommand::AdvanceStatus(cmd) => self.handle_advance(cmd),
        }
    }
}

impl Return {
    fn handle_open(&self, cmd: &OpenReturn) -> Result<Vec<ReturnEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("return request already exists"));
        }
        if cmd.reason.trim().is_empty() {
            return Err(DomainError::validation("reason cannot be empty"));
        }
        if cmd.qty == 0 {
            return Err(DomainError::validation("qty must be positive"));
        }
        match (cmd.kind, &cmd.replacement) {
            (ReturnKind::Return, Some(_)) => {
                return Err(DomainError::validation(
                    "replacement options are only valid on replacement requests",
                ));
            }
            (ReturnKind::Replacement, None) => {
                return Err(DomainError::validation(
                    "replacement requests must specify the desired options",
                ));
            }
            _ => {}
        }

        Ok(vec![ReturnEvent::Opened(ReturnOpened {
            return_id: cmd.return_id,
            kind: cmd.kind,
            order_id: cmd.order_id,
            line_no: cmd.line_no,
            customer_id: cmd.customer_id,
            customer_name: cmd.customer_name.clone(),
            product: cmd.product.clone(),
            qty: cmd.qty,
            reason: cmd.reason.clone(),
            comment: cmd.comment.clone(),
            images: cmd.images.clone(),
            replacement: cmd.replacement.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance(&self, cmd: &AdvanceStatus) -> Result<Vec<ReturnEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        if self.id != cmd.return_id {
            return Err(DomainError::invariant("return_id mismatch"));
        }

        if self.status.is_terminal() {
            return Err(DomainError::invariant(format!(
                "return request is {} and can no longer change",
                self.status
            )));
        }
        if !self.status.can_transition(cmd.status, self.kind) {
            return Err(DomainError::invariant(format!(
                "illegal return status transition: {} -> {}",
                self.status, cmd.status
            )));
        }

        let note = cmd
            .note
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| format!("Status changed to {}", cmd.status));

        Ok(vec![ReturnEvent::StatusAdvanced(ReturnStatusAdvanced {
            return_id: cmd.return_id,
            kind: self.kind,
            order_id: self.order_id,
            line_no: self.line_no,
            from: self.status,
            to: cmd.status,
            note,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopforge_events::execute;

    fn snapshot() -> ProductSnapshot {
        ProductSnapshot {
            catalog_number: 42,
            name: "Trail Shoe".to_string(),
            image: "/img/shoe.png".to_string(),
            unit_price: 4999,
        }
    }

    fn opened(kind: ReturnKind) -> Return {
        let mut request = Return::empty(ReturnId::new(AggregateId::new()));
        let replacement = match kind {
            ReturnKind::Return => None,
            ReturnKind::Replacement => Some(ReplacementOptions {
                size: Some("L".to_string()),
                color: None,
            }),
        };
        let cmd = ReturnCommand::OpenReturn(OpenReturn {
            return_id: request.id_typed(),
            kind,
            order_id: OrderId::new(AggregateId::new()),
            line_no: 1,
            customer_id: UserId::new(),
            customer_name: "Asha Rao".to_string(),
            product: snapshot(),
            qty: 1,
            reason: "wrong size".to_string(),
            comment: None,
            images: vec![],
            replacement,
            occurred_at: Utc::now(),
        });
        execute(&mut request, &cmd).unwrap();
        request
    }

    fn advance(request: &mut Return, status: ReturnStatus) -> Result<(), DomainError> {
        let cmd = ReturnCommand::AdvanceStatus(AdvanceStatus {
            return_id: request.id_typed(),
            status,
            note: None,
            occurred_at: Utc::now(),
        });
        execute(request, &cmd).map(|_| ())
    }

    #[test]
    fn open_seeds_the_timeline() {
        let request = opened(ReturnKind::Return);
        assert_eq!(request.status(), ReturnStatus::Pending);
        assert_eq!(request.timeline().len(), 1);
        assert_eq!(request.timeline()[0].note, "Return request initiated");

        let replacement = opened(ReturnKind::Replacement);
        assert_eq!(replacement.timeline()[0].note, "Replacement request initiated");
    }

    #[test]
    fn open_rejects_blank_reason() {
        let mut request = Return::empty(ReturnId::new(AggregateId::new()));
        let cmd = ReturnCommand::OpenReturn(OpenReturn {
            return_id: request.id_typed(),
            kind: ReturnKind::Return,
            order_id: OrderId::new(AggregateId::new()),
            line_no: 1,
            customer_id: UserId::new(),
            customer_name: "Asha Rao".to_string(),
            product: snapshot(),
            qty: 1,
            reason: "   ".to_string(),
            comment: None,
            images: vec![],
            replacement: None,
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            execute(&mut request, &cmd).unwrap_err(),
            DomainError::Validation(_)
        ));
    }

    #[test]
    fn replacement_requires_options_and_return_forbids_them() {
        let mut request = Return::empty(ReturnId::new(AggregateId::new()));
        let base = OpenReturn {
            return_id: request.id_typed(),
            kind: ReturnKind::Replacement,
            order_id: OrderId::new(AggregateId::new()),
            line_no: 1,
            customer_id: UserId::new(),
            customer_name: "Asha Rao".to_string(),
            product: snapshot(),
            qty: 1,
            reason: "wrong size".to_string(),
            comment: None,
            images: vec![],
            replacement: None,
            occurred_at: Utc::now(),
        };
        assert!(execute(&mut request, &ReturnCommand::OpenReturn(base.clone())).is_err());

        let mut with_options = base;
        with_options.kind = ReturnKind::Return;
        with_options.replacement = Some(ReplacementOptions {
            size: Some("L".to_string()),
            color: None,
        });
        assert!(execute(&mut request, &ReturnCommand::OpenReturn(with_options)).is_err());
    }

    #[test]
    fn refund_path_for_returns() {
        let mut request = opened(ReturnKind::Return);
        for status in [
            ReturnStatus::Approved,
            ReturnStatus::PickupScheduled,
            ReturnStatus::ReceivedAtWarehouse,
            ReturnStatus::RefundInitiated,
            ReturnStatus::Completed,
        ] {
            advance(&mut request, status).unwrap();
        }
        assert_eq!(request.status(), ReturnStatus::Completed);
        // Opening entry plus one per advance.
        assert_eq!(request.timeline().len(), 6);
    }

    #[test]
    fn dispatch_path_for_replacements() {
        let mut request = opened(ReturnKind::Replacement);
        for status in [
            ReturnStatus::Approved,
            ReturnStatus::PickupScheduled,
            ReturnStatus::ReceivedAtWarehouse,
            ReturnStatus::ReplacementDispatched,
            ReturnStatus::Completed,
        ] {
            advance(&mut request, status).unwrap();
        }
        assert_eq!(request.status(), ReturnStatus::Completed);
    }

    #[test]
    fn refund_branch_is_closed_to_replacements() {
        let mut request = opened(ReturnKind::Replacement);
        for status in [
            ReturnStatus::Approved,
            ReturnStatus::PickupScheduled,
            ReturnStatus::ReceivedAtWarehouse,
        ] {
            advance(&mut request, status).unwrap();
        }
        assert!(matches!(
            advance(&mut request, ReturnStatus::RefundInitiated).unwrap_err(),
            DomainError::InvariantViolation(_)
        ));
    }

    #[test]
    fn reject_allowed_from_any_non_terminal_state() {
        let mut request = opened(ReturnKind::Return);
        advance(&mut request, ReturnStatus::Approved).unwrap();
        advance(&mut request, ReturnStatus::Rejected).unwrap();
        assert_eq!(request.status(), ReturnStatus::Rejected);
    }

    #[test]
    fn terminal_requests_are_immutable() {
        let mut request = opened(ReturnKind::Return);
        advance(&mut request, ReturnStatus::Rejected).unwrap();
        assert!(advance(&mut request, ReturnStatus::Approved).is_err());

        let mut completed = opened(ReturnKind::Return);
        for status in [
            ReturnStatus::Approved,
            ReturnStatus::PickupScheduled,
            ReturnStatus::ReceivedAtWarehouse,
            ReturnStatus::RefundInitiated,
            ReturnStatus::Completed,
        ] {
            advance(&mut completed, status).unwrap();
        }
        assert!(advance(&mut completed, ReturnStatus::Rejected).is_err());
    }

    #[test]
    fn forward_path_cannot_skip_steps() {
        let mut request = opened(ReturnKind::Return);
        assert!(advance(&mut request, ReturnStatus::ReceivedAtWarehouse).is_err());
        assert!(advance(&mut request, ReturnStatus::Completed).is_err());
    }

    #[test]
    fn operator_note_lands_in_the_timeline() {
        let mut request = opened(ReturnKind::Return);
        let cmd = ReturnCommand::AdvanceStatus(AdvanceStatus {
            return_id: request.id_typed(),
            status: ReturnStatus::Approved,
            note: Some("Inspected photos, approving".to_string()),
            occurred_at: Utc::now(),
        });
        execute(&mut request, &cmd).unwrap();
        assert_eq!(request.timeline()[1].note, "Inspected photos, approving");
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn any_status() -> impl Strategy<Value = ReturnStatus> {
            prop_oneof![
                Just(ReturnStatus::Pending),
                Just(ReturnStatus::Approved),
                Just(ReturnStatus::PickupScheduled),
                Just(ReturnStatus::ReceivedAtWarehouse),
                Just(ReturnStatus::RefundInitiated),
                Just(ReturnStatus::ReplacementDispatched),
                Just(ReturnStatus::Completed),
                Just(ReturnStatus::Rejected),
            ]
        }

        proptest! {
            /// The timeline only ever grows: after any sequence of advance
            /// attempts (legal or not), every earlier snapshot is a prefix of
            /// the current timeline.
            #[test]
            fn timeline_is_append_only(
                attempts in proptest::collection::vec(any_status(), 0..16),
            ) {
                let mut request = opened(ReturnKind::Return);
                let mut snapshot = request.timeline().to_vec();
                for status in attempts {
                    let _ = advance(&mut request, status);
                    let current = request.timeline();
                    prop_assert!(current.len() >= snapshot.len());
                    prop_assert_eq!(&current[..snapshot.len()], &snapshot[..]);
                    snapshot = current.to_vec();
                }
            }
        }
    }
}
