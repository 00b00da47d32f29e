// storekeep/examples/last_unit_race.rs

use std::sync::Arc;
use storekeep::{
  BroadcastHub, BuyerId, EngineConfig, EngineError, MemoryNotificationStore, MemoryStore, NotificationFanOut,
  OrderLine, OrderPlacementEngine, PlaceOrderRequest, Product,
};
use tracing::{info, warn};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), EngineError> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Last Unit Race Example ---");

  // 1. A store with one product that has two units left.
  let store = MemoryStore::new();
  let seller = Uuid::new_v4();
  let product = store.insert_product(Product::new(seller, "Limited print", 1000, 2));

  // 2. Wire fan-out to an in-memory inbox and a live hub.
  let inbox = Arc::new(MemoryNotificationStore::new());
  let hub = BroadcastHub::default();
  let config = EngineConfig::default();
  let fanout = Arc::new(NotificationFanOut::new(
    inbox.clone(),
    Arc::new(hub.clone()),
    Arc::new(store.clone()),
    config.low_stock_threshold,
  ));
  let engine = OrderPlacementEngine::new(Arc::new(store.clone()), fanout, &config);

  // 3. Buyer A wants both units, buyer B wants one. Both arrive at once.
  let buyer_a = BuyerId::from_authenticated(Uuid::new_v4());
  let buyer_b = BuyerId::from_authenticated(Uuid::new_v4());
  let (a, b) = tokio::join!(
    engine.place_order(PlaceOrderRequest::new(buyer_a, vec![OrderLine::new(product, 2)])),
    engine.place_order(PlaceOrderRequest::new(buyer_b, vec![OrderLine::new(product, 1)])),
  );

  for (who, outcome) in [("A", a), ("B", b)] {
    match outcome {
      Ok(placed) => info!(buyer = who, order = %placed.order.order_number, total_cents = placed.order.total_cents, "Won."),
      Err(e) => warn!(buyer = who, error = %e, "Lost."),
    }
  }

  info!(
    remaining = ?store.stock_of(product),
    notifications = inbox.all().len(),
    "Final state."
  );
  Ok(())
}
