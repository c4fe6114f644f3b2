//! End-to-end flows wired entirely in memory: store, dispatcher, fan-out,
//! projections, and the application services on top.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;

use shopforge_core::{AggregateId, UserId};
use shopforge_events::{EventBus, EventEnvelope, InMemoryEventBus};
use shopforge_inventory::{
    InventoryCommand, Product, ProductId, RegisterProduct, Sku, VariantSelection,
};
use shopforge_notifications::{InMemoryNotificationSink, NotificationKind};
use shopforge_orders::{
    ChangeStatus, LineStatus, Order, OrderCommand, OrderId, OrderStatus, PaymentInfo,
    ShippingAddress,
};
use shopforge_returns::{ReplacementOptions, ReturnKind, ReturnStatus};
use shopforge_serviceability::{
    DeliveryUnit, InMemoryPinCodeDirectory, PinCode, ServiceabilityGate,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, InMemoryEventStore};
use crate::fulfillment::{
    FulfillmentService, LineOutcome, LinePolicy, NewOrderLine, PlaceOrderRequest,
};
use crate::projections::{
    CatalogProjection, NotificationProjection, OrdersProjection, ProjectionFanout,
    ReturnsProjection,
};
use crate::read_model::InMemoryReadStore;
use crate::returns_flow::{OpenReturnRequest, ReturnsService};
use crate::streams;

type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Arc<ProjectionFanout<Arc<Bus>>>>;

struct Harness {
    store: Arc<InMemoryEventStore>,
    fanout: Arc<ProjectionFanout<Arc<Bus>>>,
    dispatcher: Arc<Dispatcher>,
    catalog: Arc<crate::projections::InMemoryCatalogProjection>,
    orders: Arc<crate::projections::InMemoryOrdersProjection>,
    returns: Arc<crate::projections::InMemoryReturnsProjection>,
    sink: Arc<InMemoryNotificationSink>,
    fulfillment: FulfillmentService<
        Arc<InMemoryEventStore>,
        Arc<ProjectionFanout<Arc<Bus>>>,
        Arc<InMemoryPinCodeDirectory>,
    >,
    returns_service: ReturnsService<Arc<InMemoryEventStore>, Arc<ProjectionFanout<Arc<Bus>>>>,
}

fn harness() -> Harness {
    let store = Arc::new(InMemoryEventStore::new());
    let sink = Arc::new(InMemoryNotificationSink::new());

    let catalog = Arc::new(CatalogProjection::new(Arc::new(InMemoryReadStore::new())));
    let orders = Arc::new(OrdersProjection::new(Arc::new(InMemoryReadStore::new())));
    let returns = Arc::new(ReturnsProjection::new(Arc::new(InMemoryReadStore::new())));
    let notifications = Arc::new(NotificationProjection::new(Arc::clone(&sink)));

    let fanout = Arc::new(ProjectionFanout::new(
        Arc::clone(&catalog),
        Arc::clone(&orders),
        Arc::clone(&returns),
        notifications,
        Arc::new(Bus::new()),
    ));

    let dispatcher = Arc::new(CommandDispatcher::new(Arc::clone(&store), Arc::clone(&fanout)));

    let pincodes = Arc::new(InMemoryPinCodeDirectory::new());
    pincodes.upsert(PinCode {
        code: "411001".to_string(),
        delivery_time: 2,
        unit: DeliveryUnit::Days,
        is_active: true,
    });

    let fulfillment = FulfillmentService::new(
        Arc::clone(&dispatcher),
        Arc::clone(&catalog),
        ServiceabilityGate::new(pincodes),
    );
    let returns_service = ReturnsService::new(Arc::clone(&dispatcher), Arc::clone(&orders));

    Harness {
        store,
        fanout,
        dispatcher,
        catalog,
        orders,
        returns,
        sink,
        fulfillment,
        returns_service,
    }
}

fn register_product(h: &Harness, catalog_number: u64, stock: i64, skus: Vec<Sku>) -> ProductId {
    let product_id = ProductId::new(AggregateId::new());
    h.dispatcher
        .dispatch::<Product>(
            product_id.0,
            streams::PRODUCT,
            InventoryCommand::RegisterProduct(RegisterProduct {
                product_id,
                catalog_number,
                name: format!("Item {catalog_number}"),
                image: String::new(),
                unit_price: 1000,
                stock,
                skus,
                occurred_at: Utc::now(),
            }),
            |id| Product::empty(ProductId::new(id)),
        )
        .unwrap();
    product_id
}

fn shipping(postal_code: &str) -> ShippingAddress {
    ShippingAddress {
        full_name: "Asha Rao".to_string(),
        line1: "12 Lakeview Rd".to_string(),
        line2: None,
        city: "Pune".to_string(),
        state: "MH".to_string(),
        postal_code: postal_code.to_string(),
        phone: "9999999999".to_string(),
    }
}

fn payment() -> PaymentInfo {
    PaymentInfo {
        method: "card".to_string(),
        is_paid: true,
        paid_at: Some(Utc::now()),
        transaction_ref: None,
    }
}

fn place_request(customer: UserId, lines: Vec<NewOrderLine>, policy: LinePolicy) -> PlaceOrderRequest {
    PlaceOrderRequest {
        customer_id: customer,
        customer_name: "Asha Rao".to_string(),
        lines,
        shipping: shipping("411001"),
        payment: payment(),
        shipping_fee: 50,
        policy,
    }
}

fn advance_order(h: &Harness, order_id: OrderId, status: OrderStatus) {
    h.dispatcher
        .dispatch::<Order>(
            order_id.0,
            streams::ORDER,
            OrderCommand::ChangeStatus(ChangeStatus {
                order_id,
                status,
                occurred_at: Utc::now(),
            }),
            |id| Order::empty(OrderId::new(id)),
        )
        .unwrap();
}

fn deliver_order(h: &Harness, order_id: OrderId) {
    advance_order(h, order_id, OrderStatus::Confirmed);
    advance_order(h, order_id, OrderStatus::Shipped);
    advance_order(h, order_id, OrderStatus::Delivered);
}

#[test]
fn placement_decrements_stock_and_notifies() {
    let h = harness();
    let customer = UserId::new();
    register_product(&h, 7, 6, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 2,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();

    assert!(matches!(placed.reports[0].outcome, LineOutcome::Applied { qty: 2 }));

    let product = h.catalog.by_catalog_number(7).unwrap();
    assert_eq!(product.stock, 4);

    let order = h.orders.get(&placed.order_id).unwrap();
    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.grand_total, 2 * 1000 + 50);

    // Stock fell to 4 (<= 5): one order notification plus one stock alert.
    assert_eq!(h.sink.of_kind(NotificationKind::Order).len(), 1);
    assert_eq!(h.sink.of_kind(NotificationKind::Stock).len(), 1);
}

#[test]
fn unserviceable_pincode_rejects_before_any_write() {
    let h = harness();
    register_product(&h, 7, 10, vec![]);

    let mut request = place_request(
        UserId::new(),
        vec![NewOrderLine {
            catalog_number: 7,
            qty: 1,
            variant: VariantSelection::new(),
        }],
        LinePolicy::BestEffort,
    );
    request.shipping = shipping("999999");

    let err = h.fulfillment.place_order(request).unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    assert_eq!(h.catalog.by_catalog_number(7).unwrap().stock, 10);
    assert!(h.orders.list_all(None).is_empty());
    assert!(h.sink.all().is_empty());
}

#[test]
fn unknown_catalog_number_is_dropped_under_best_effort() {
    let h = harness();
    register_product(&h, 7, 10, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            UserId::new(),
            vec![
                NewOrderLine {
                    catalog_number: 7,
                    qty: 1,
                    variant: VariantSelection::new(),
                },
                NewOrderLine {
                    catalog_number: 999,
                    qty: 1,
                    variant: VariantSelection::new(),
                },
            ],
            LinePolicy::BestEffort,
        ))
        .unwrap();

    assert_eq!(placed.reports.len(), 2);
    assert!(matches!(placed.reports[0].outcome, LineOutcome::Applied { qty: 1 }));
    assert!(matches!(placed.reports[1].outcome, LineOutcome::ProductMissing));

    // Fulfilled lines report the placed order's line number; dropped lines
    // only their position in the request.
    assert_eq!(placed.reports[0].request_index, 0);
    assert_eq!(placed.reports[0].line_no, Some(1));
    assert_eq!(placed.reports[1].request_index, 1);
    assert_eq!(placed.reports[1].line_no, None);

    // The order carries only the known line.
    let order = h.orders.get(&placed.order_id).unwrap();
    assert_eq!(order.lines.len(), 1);
    assert_eq!(order.lines[0].catalog_number, 7);
    assert_eq!(order.lines[0].line_no, 1);
}

#[test]
fn unknown_catalog_number_rejects_an_all_or_nothing_order() {
    let h = harness();
    register_product(&h, 7, 10, vec![]);

    let err = h
        .fulfillment
        .place_order(place_request(
            UserId::new(),
            vec![
                NewOrderLine {
                    catalog_number: 7,
                    qty: 1,
                    variant: VariantSelection::new(),
                },
                NewOrderLine {
                    catalog_number: 999,
                    qty: 1,
                    variant: VariantSelection::new(),
                },
            ],
            LinePolicy::AllOrNothing,
        ))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(h.orders.list_all(None).is_empty());
}

#[test]
fn order_of_only_unknown_items_is_rejected() {
    let h = harness();

    let err = h
        .fulfillment
        .place_order(place_request(
            UserId::new(),
            vec![NewOrderLine {
                catalog_number: 999,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));
    assert!(h.orders.list_all(None).is_empty());
}

#[test]
fn best_effort_reports_shortfall_and_clamps_at_zero() {
    let h = harness();
    let customer = UserId::new();
    register_product(&h, 7, 3, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 5,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();

    assert!(matches!(
        placed.reports[0].outcome,
        LineOutcome::ShortStock {
            requested: 5,
            applied: 3
        }
    ));
    assert_eq!(h.catalog.by_catalog_number(7).unwrap().stock, 0);
    assert_eq!(h.orders.get(&placed.order_id).unwrap().status, OrderStatus::Pending);
}

#[test]
fn all_or_nothing_restocks_and_cancels_on_shortfall() {
    let h = harness();
    register_product(&h, 7, 10, vec![]);
    register_product(&h, 8, 1, vec![]);

    let err = h
        .fulfillment
        .place_order(place_request(
            UserId::new(),
            vec![
                NewOrderLine {
                    catalog_number: 7,
                    qty: 2,
                    variant: VariantSelection::new(),
                },
                NewOrderLine {
                    catalog_number: 8,
                    qty: 3,
                    variant: VariantSelection::new(),
                },
            ],
            LinePolicy::AllOrNothing,
        ))
        .unwrap_err();
    assert!(matches!(err, DispatchError::Concurrency(_)));

    // Both decrements undone, order cancelled.
    assert_eq!(h.catalog.by_catalog_number(7).unwrap().stock, 10);
    assert_eq!(h.catalog.by_catalog_number(8).unwrap().stock, 1);
    let orders = h.orders.list_all(None);
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].status, OrderStatus::Cancelled);
}

#[test]
fn sku_level_stock_follows_the_selected_variant() {
    let h = harness();
    let customer = UserId::new();
    let red: VariantSelection = [("Color".to_string(), "Red".to_string())].into_iter().collect();
    register_product(
        &h,
        7,
        20,
        vec![
            Sku {
                combination: red.clone(),
                stock: 8,
            },
            Sku {
                combination: [("Color".to_string(), "Blue".to_string())].into_iter().collect(),
                stock: 12,
            },
        ],
    );

    h.fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 3,
                variant: red,
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();

    let product = h.catalog.by_catalog_number(7).unwrap();
    assert_eq!(product.stock, 17);
    assert_eq!(product.skus[0].stock, 5);
    assert_eq!(product.skus[1].stock, 12);
    // SKU hit the threshold; aggregate stayed above it.
    assert_eq!(h.sink.of_kind(NotificationKind::Stock).len(), 1);
}

#[test]
fn concurrent_placements_never_lose_a_decrement() {
    let h = Arc::new(harness());
    register_product(&h, 7, 40, vec![]);

    let mut handles = Vec::new();
    for _ in 0..4 {
        let h = Arc::clone(&h);
        handles.push(std::thread::spawn(move || {
            for _ in 0..5 {
                h.fulfillment
                    .place_order(place_request(
                        UserId::new(),
                        vec![NewOrderLine {
                            catalog_number: 7,
                            qty: 1,
                            variant: VariantSelection::new(),
                        }],
                        LinePolicy::BestEffort,
                    ))
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // 4 threads x 5 orders x qty 1 = 20 units gone, none lost to races.
    assert_eq!(h.catalog.by_catalog_number(7).unwrap().stock, 20);
    assert_eq!(h.orders.list_all(None).len(), 20);
    assert_eq!(h.sink.of_kind(NotificationKind::Order).len(), 20);
}

#[test]
fn racing_writers_keep_read_models_in_step_with_the_store() {
    let h = Arc::new(harness());
    let product_id = register_product(&h, 7, 50, vec![]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let h = Arc::clone(&h);
        handles.push(std::thread::spawn(move || {
            h.fulfillment
                .place_order(place_request(
                    UserId::new(),
                    vec![NewOrderLine {
                        catalog_number: 7,
                        qty: 1,
                        variant: VariantSelection::new(),
                    }],
                    LinePolicy::BestEffort,
                ))
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every committed deduction made it into the catalog: registration plus
    // eight deductions in the stream, stock down by exactly eight.
    let stream = h.store.load_stream(product_id.0).unwrap();
    assert_eq!(stream.len(), 9);
    assert_eq!(h.catalog.by_catalog_number(7).unwrap().stock, 42);

    // The stream is not wedged: a later placement still projects.
    h.fulfillment
        .place_order(place_request(
            UserId::new(),
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();
    assert_eq!(h.catalog.by_catalog_number(7).unwrap().stock, 41);
}

#[test]
fn full_return_flow_mirrors_the_order_line() {
    let h = harness();
    let customer = UserId::new();
    register_product(&h, 7, 10, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();
    deliver_order(&h, placed.order_id);

    let opened = h
        .returns_service
        .open_return(OpenReturnRequest {
            requester: customer,
            order_id: placed.order_id,
            line_no: 1,
            kind: ReturnKind::Return,
            qty: 1,
            reason: "damaged on arrival".to_string(),
            comment: None,
            images: vec![],
            replacement: None,
        })
        .unwrap();
    assert!(opened.sync.mirrored);

    let order = h.orders.get(&placed.order_id).unwrap();
    assert_eq!(order.lines[0].status, LineStatus::ReturnRequested);

    for status in [
        ReturnStatus::Approved,
        ReturnStatus::PickupScheduled,
        ReturnStatus::ReceivedAtWarehouse,
        ReturnStatus::RefundInitiated,
        ReturnStatus::Completed,
    ] {
        let advanced = h
            .returns_service
            .advance_status(opened.return_id, status, None)
            .unwrap();
        assert!(advanced.sync.mirrored);
    }

    let order = h.orders.get(&placed.order_id).unwrap();
    assert_eq!(order.lines[0].status, LineStatus::Returned);

    let request = h.returns.get(&opened.return_id).unwrap();
    assert_eq!(request.status, ReturnStatus::Completed);
    assert_eq!(request.timeline.len(), 6);
}

#[test]
fn replacement_completion_marks_the_line_replaced() {
    let h = harness();
    let customer = UserId::new();
    register_product(&h, 7, 10, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();
    deliver_order(&h, placed.order_id);

    let opened = h
        .returns_service
        .open_return(OpenReturnRequest {
            requester: customer,
            order_id: placed.order_id,
            line_no: 1,
            kind: ReturnKind::Replacement,
            qty: 1,
            reason: "wrong size".to_string(),
            comment: None,
            images: vec![],
            replacement: Some(ReplacementOptions {
                size: Some("L".to_string()),
                color: None,
            }),
        })
        .unwrap();

    assert_eq!(
        h.orders.get(&placed.order_id).unwrap().lines[0].status,
        LineStatus::ReplacementRequested
    );

    for status in [
        ReturnStatus::Approved,
        ReturnStatus::PickupScheduled,
        ReturnStatus::ReceivedAtWarehouse,
        ReturnStatus::ReplacementDispatched,
        ReturnStatus::Completed,
    ] {
        h.returns_service
            .advance_status(opened.return_id, status, None)
            .unwrap();
    }

    assert_eq!(
        h.orders.get(&placed.order_id).unwrap().lines[0].status,
        LineStatus::Replaced
    );
}

#[test]
fn rejection_releases_the_line_back_to_delivered() {
    let h = harness();
    let customer = UserId::new();
    register_product(&h, 7, 10, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();
    deliver_order(&h, placed.order_id);

    let opened = h
        .returns_service
        .open_return(OpenReturnRequest {
            requester: customer,
            order_id: placed.order_id,
            line_no: 1,
            kind: ReturnKind::Return,
            qty: 1,
            reason: "changed my mind".to_string(),
            comment: None,
            images: vec![],
            replacement: None,
        })
        .unwrap();

    h.returns_service
        .advance_status(opened.return_id, ReturnStatus::Rejected, Some("outside window".to_string()))
        .unwrap();

    assert_eq!(
        h.orders.get(&placed.order_id).unwrap().lines[0].status,
        LineStatus::Delivered
    );
}

#[test]
fn non_owner_cannot_open_a_return_and_nothing_is_written() {
    let h = harness();
    let customer = UserId::new();
    register_product(&h, 7, 10, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();
    deliver_order(&h, placed.order_id);

    let err = h
        .returns_service
        .open_return(OpenReturnRequest {
            requester: UserId::new(),
            order_id: placed.order_id,
            line_no: 1,
            kind: ReturnKind::Return,
            qty: 1,
            reason: "not mine".to_string(),
            comment: None,
            images: vec![],
            replacement: None,
        })
        .unwrap_err();
    assert!(matches!(err, DispatchError::Unauthorized));

    assert!(h.returns.list_all().is_empty());
    assert_eq!(
        h.orders.get(&placed.order_id).unwrap().lines[0].status,
        LineStatus::Delivered
    );
}

#[test]
fn returns_require_a_delivered_line() {
    let h = harness();
    let customer = UserId::new();
    register_product(&h, 7, 10, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            customer,
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();

    let err = h
        .returns_service
        .open_return(OpenReturnRequest {
            requester: customer,
            order_id: placed.order_id,
            line_no: 1,
            kind: ReturnKind::Return,
            qty: 1,
            reason: "too early".to_string(),
            comment: None,
            images: vec![],
            replacement: None,
        })
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));
}

#[test]
fn replayed_envelopes_do_not_duplicate_notifications() {
    let h = harness();
    register_product(&h, 7, 10, vec![]);

    let placed = h
        .fulfillment
        .place_order(place_request(
            UserId::new(),
            vec![NewOrderLine {
                catalog_number: 7,
                qty: 1,
                variant: VariantSelection::new(),
            }],
            LinePolicy::BestEffort,
        ))
        .unwrap();

    let before = h.sink.all().len();

    // Simulate at-least-once delivery by republishing the order stream.
    for stored in h.store.load_stream(placed.order_id.0).unwrap() {
        h.fanout.publish(stored.to_envelope()).unwrap();
    }

    assert_eq!(h.sink.all().len(), before);
}
