//! Application service wiring.
//!
//! One in-memory stack per process: event store, synchronous projection
//! fan-out, command dispatcher, and the fulfillment/returns services on top.

use std::sync::Arc;

use serde_json::Value as JsonValue;

use shopforge_events::{EventEnvelope, InMemoryEventBus};
use shopforge_infra::command_dispatcher::CommandDispatcher;
use shopforge_infra::event_store::InMemoryEventStore;
use shopforge_infra::fulfillment::FulfillmentService;
use shopforge_infra::projections::{
    CatalogProjection, InMemoryCatalogProjection, InMemoryOrdersProjection,
    InMemoryReturnsProjection, NotificationProjection, OrdersProjection, ProjectionFanout,
    ReturnsProjection,
};
use shopforge_infra::read_model::InMemoryReadStore;
use shopforge_infra::returns_flow::ReturnsService;
use shopforge_notifications::InMemoryNotificationSink;
use shopforge_serviceability::{InMemoryPinCodeDirectory, ServiceabilityGate};

pub type Bus = InMemoryEventBus<EventEnvelope<JsonValue>>;
pub type Store = Arc<InMemoryEventStore>;
pub type Fanout = Arc<ProjectionFanout<Arc<Bus>>>;
pub type Dispatcher = CommandDispatcher<Store, Fanout>;

pub struct AppServices {
    pub dispatcher: Arc<Dispatcher>,
    pub catalog: Arc<InMemoryCatalogProjection>,
    pub orders: Arc<InMemoryOrdersProjection>,
    pub returns: Arc<InMemoryReturnsProjection>,
    pub notifications: Arc<InMemoryNotificationSink>,
    pub pincodes: Arc<InMemoryPinCodeDirectory>,
    pub gate: ServiceabilityGate<Arc<InMemoryPinCodeDirectory>>,
    pub fulfillment: Arc<FulfillmentService<Store, Fanout, Arc<InMemoryPinCodeDirectory>>>,
    pub returns_service: Arc<ReturnsService<Store, Fanout>>,
}

pub fn build_services() -> AppServices {
    let store = Arc::new(InMemoryEventStore::new());
    let notifications = Arc::new(InMemoryNotificationSink::new());

    let catalog = Arc::new(CatalogProjection::new(Arc::new(InMemoryReadStore::new())));
    let orders = Arc::new(OrdersProjection::new(Arc::new(InMemoryReadStore::new())));
    let returns = Arc::new(ReturnsProjection::new(Arc::new(InMemoryReadStore::new())));
    let notification_projection = Arc::new(NotificationProjection::new(Arc::clone(&notifications)));

    let fanout = Arc::new(ProjectionFanout::new(
        Arc::clone(&catalog),
        Arc::clone(&orders),
        Arc::clone(&returns),
        notification_projection,
        Arc::new(Bus::new()),
    ));

    let dispatcher = Arc::new(CommandDispatcher::new(store, Arc::clone(&fanout)));

    let pincodes = Arc::new(InMemoryPinCodeDirectory::new());
    let gate = ServiceabilityGate::new(Arc::clone(&pincodes));

    let fulfillment = Arc::new(FulfillmentService::new(
        Arc::clone(&dispatcher),
        Arc::clone(&catalog),
        ServiceabilityGate::new(Arc::clone(&pincodes)),
    ));
    let returns_service = Arc::new(ReturnsService::new(
        Arc::clone(&dispatcher),
        Arc::clone(&orders),
    ));

    AppServices {
        dispatcher,
        catalog,
        orders,
        returns,
        notifications,
        pincodes,
        gate,
        fulfillment,
        returns_service,
    }
}
