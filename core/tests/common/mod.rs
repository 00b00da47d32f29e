// tests/common/mod.rs
#![allow(dead_code)] // Not every test binary uses every helper.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::sync::Arc;
use storekeep::fanout::{OrderCancelled, OrderStatusChanged};
use storekeep::{
  BroadcastHub, BuyerId, EngineConfig, MemoryNotificationStore, MemoryStore, Notification, NotificationFanOut,
  NotificationKind, OrderEventSink, OrderLifecycle, OrderLine, OrderPlaced, OrderPlacementEngine, PlaceOrderRequest,
  Product,
};
use tracing::Level;
use uuid::Uuid;

// --- Tracing Setup ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Request helpers ---
pub fn new_buyer() -> BuyerId {
  BuyerId::from_authenticated(Uuid::new_v4())
}

pub fn cart(buyer: BuyerId, lines: &[(Uuid, i32)]) -> PlaceOrderRequest {
  PlaceOrderRequest::new(
    buyer,
    lines.iter().map(|(id, qty)| OrderLine::new(*id, *qty)).collect(),
  )
}

// --- Fully wired engine over the in-memory backends ---
pub struct Harness {
  pub store: MemoryStore,
  pub inbox: Arc<MemoryNotificationStore>,
  pub hub: BroadcastHub,
  pub engine: OrderPlacementEngine,
  pub lifecycle: OrderLifecycle,
}

impl Harness {
  pub fn new() -> Self {
    Self::with_store(MemoryStore::new(), EngineConfig::default())
  }

  pub fn with_store(store: MemoryStore, config: EngineConfig) -> Self {
    setup_tracing();
    let inbox = Arc::new(MemoryNotificationStore::new());
    let hub = BroadcastHub::new(64);
    let fanout = Arc::new(NotificationFanOut::new(
      inbox.clone(),
      Arc::new(hub.clone()),
      Arc::new(store.clone()),
      config.low_stock_threshold,
    ));
    let engine = OrderPlacementEngine::new(Arc::new(store.clone()), fanout.clone(), &config);
    let lifecycle = OrderLifecycle::new(Arc::new(store.clone()), fanout, &config);
    Self {
      store,
      inbox,
      hub,
      engine,
      lifecycle,
    }
  }

  pub fn add_product(&self, seller_id: Uuid, name: &str, price_cents: i64, stock: i32) -> Uuid {
    self.store.insert_product(Product::new(seller_id, name, price_cents, stock))
  }

  pub fn inbox_of(&self, recipient_id: Uuid) -> Vec<Notification> {
    self
      .inbox
      .all()
      .into_iter()
      .filter(|n| n.recipient_id == recipient_id)
      .collect()
  }

  pub fn inbox_kinds(&self, recipient_id: Uuid) -> Vec<NotificationKind> {
    self.inbox_of(recipient_id).into_iter().map(|n| n.kind).collect()
  }
}

// --- Sinks ---

/// Captures every event it receives.
#[derive(Default)]
pub struct RecordingSink {
  pub placed: Mutex<Vec<OrderPlaced>>,
  pub cancelled: Mutex<Vec<OrderCancelled>>,
  pub status_changed: Mutex<Vec<OrderStatusChanged>>,
}

#[async_trait]
impl OrderEventSink for RecordingSink {
  async fn order_placed(&self, event: &OrderPlaced) {
    self.placed.lock().push(event.clone());
  }

  async fn order_cancelled(&self, event: &OrderCancelled) {
    self.cancelled.lock().push(event.clone());
  }

  async fn order_status_changed(&self, event: &OrderStatusChanged) {
    self.status_changed.lock().push(event.clone());
  }
}

/// A sink whose implementation blows up.
pub struct PanickingSink;

#[async_trait]
impl OrderEventSink for PanickingSink {
  async fn order_placed(&self, _event: &OrderPlaced) {
    panic!("sink exploded");
  }
}
