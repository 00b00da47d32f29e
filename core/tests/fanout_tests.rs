// tests/fanout_tests.rs
mod common;

use async_trait::async_trait;
use common::*;
use std::sync::Arc;
use std::time::Duration;
use storekeep::{
  DiscardEvents, DispatchMode, EngineConfig, FanOutError, MemoryStore, NotificationFanOut, NotificationKind, NotificationPriority,
  OrderPlacementEngine, PushChannel, PushEvent, RecipientRole,
};
use uuid::Uuid;

struct BrokenPush;

#[async_trait]
impl PushChannel for BrokenPush {
  async fn push(&self, event: PushEvent) -> Result<(), FanOutError> {
    Err(FanOutError::Push {
      recipient_id: event.recipient_id,
      message: "socket closed".to_string(),
    })
  }
}

#[tokio::test]
async fn test_each_seller_and_the_buyer_are_notified() {
  let h = Harness::new();
  let seller_a = Uuid::new_v4();
  let seller_b = Uuid::new_v4();
  let mug = h.add_product(seller_a, "Mug", 1250, 50);
  let plate = h.add_product(seller_a, "Plate", 800, 50);
  let kettle = h.add_product(seller_b, "Kettle", 4000, 50);
  let buyer = new_buyer();

  let placed = h
    .engine
    .place_order(cart(buyer, &[(mug, 1), (kettle, 1), (plate, 2)]))
    .await
    .unwrap();

  let to_a = h.inbox_of(seller_a);
  let new_order = to_a
    .iter()
    .find(|n| n.kind == NotificationKind::NewOrder)
    .expect("seller A gets a new-order notification");
  assert_eq!(new_order.recipient_role, RecipientRole::Seller);
  assert_eq!(new_order.priority, NotificationPriority::High);
  assert_eq!(new_order.order_id, Some(placed.order.id));
  assert_eq!(new_order.metadata.0["subtotalCents"], 1250 + 2 * 800);
  assert_eq!(new_order.metadata.0["items"].as_array().map(Vec::len), Some(2));

  let mut kinds_b = h.inbox_kinds(seller_b);
  kinds_b.sort_by_key(|k| format!("{:?}", k));
  assert_eq!(kinds_b, vec![NotificationKind::NewCustomer, NotificationKind::NewOrder]);

  let to_buyer = h.inbox_of(buyer.as_uuid());
  assert_eq!(to_buyer.len(), 1);
  assert_eq!(to_buyer[0].kind, NotificationKind::OrderConfirmed);
  assert_eq!(to_buyer[0].recipient_role, RecipientRole::Buyer);
  assert!(to_buyer[0].message.contains("$68.50"));
}

#[tokio::test]
async fn test_new_customer_alert_only_on_first_purchase_from_seller() {
  let h = Harness::new();
  let seller = Uuid::new_v4();
  let pen = h.add_product(seller, "Pen", 300, 50);
  let buyer = new_buyer();

  h.engine.place_order(cart(buyer, &[(pen, 1)])).await.unwrap();
  h.engine.place_order(cart(buyer, &[(pen, 1)])).await.unwrap();

  let kinds = h.inbox_kinds(seller);
  let new_customer = kinds.iter().filter(|k| **k == NotificationKind::NewCustomer).count();
  let new_order = kinds.iter().filter(|k| **k == NotificationKind::NewOrder).count();
  assert_eq!(new_customer, 1);
  assert_eq!(new_order, 2);
}

#[tokio::test]
async fn test_low_stock_alerts_escalate_when_sold_out() {
  let h = Harness::new();
  let seller = Uuid::new_v4();
  let lamp = h.add_product(seller, "Lamp", 2500, 7);

  h.engine.place_order(cart(new_buyer(), &[(lamp, 1)])).await.unwrap();
  assert!(!h.inbox_kinds(seller).contains(&NotificationKind::LowStock));

  h.engine.place_order(cart(new_buyer(), &[(lamp, 2)])).await.unwrap();
  let low: Vec<_> = h
    .inbox_of(seller)
    .into_iter()
    .filter(|n| n.kind == NotificationKind::LowStock)
    .collect();
  assert_eq!(low.len(), 1);
  assert_eq!(low[0].priority, NotificationPriority::Normal);
  assert_eq!(low[0].product_id, Some(lamp));
  assert_eq!(low[0].metadata.0["remainingStock"], 4);

  h.engine.place_order(cart(new_buyer(), &[(lamp, 4)])).await.unwrap();
  let sold_out = h
    .inbox_of(seller)
    .into_iter()
    .find(|n| n.kind == NotificationKind::LowStock && n.metadata.0["remainingStock"] == 0)
    .expect("sold-out alert");
  assert_eq!(sold_out.priority, NotificationPriority::High);
}

#[tokio::test]
async fn test_live_subscribers_receive_push_events() {
  let h = Harness::new();
  let seller = Uuid::new_v4();
  let pen = h.add_product(seller, "Pen", 300, 50);
  let buyer = new_buyer();
  let mut rx = h.hub.subscribe();

  h.engine.place_order(cart(buyer, &[(pen, 1)])).await.unwrap();

  let mut received = Vec::new();
  while let Ok(event) = rx.try_recv() {
    received.push(event);
  }
  // new_order + new_customer for the seller, order_confirmed for the buyer.
  assert_eq!(received.len(), 3);
  assert!(received.iter().all(|e| e.notification_id.is_some()));
  assert!(received
    .iter()
    .any(|e| e.recipient_id == buyer.as_uuid() && e.kind == NotificationKind::OrderConfirmed));
}

#[tokio::test]
async fn test_notification_store_outage_does_not_affect_placement() {
  let h = Harness::new();
  let pen = h.add_product(Uuid::new_v4(), "Pen", 300, 5);
  let mut rx = h.hub.subscribe();
  h.inbox.fail_writes(true);

  let placed = h.engine.place_order(cart(new_buyer(), &[(pen, 2)])).await;

  assert!(placed.is_ok());
  assert_eq!(h.store.stock_of(pen), Some(3));
  assert!(h.inbox.all().is_empty());
  let pushed = rx.try_recv().expect("push still happens");
  assert_eq!(pushed.notification_id, None);
}

#[tokio::test]
async fn test_push_failures_are_reported_not_raised() {
  setup_tracing();
  let store = MemoryStore::new();
  let inbox = Arc::new(storekeep::MemoryNotificationStore::new());
  let fanout = NotificationFanOut::new(inbox.clone(), Arc::new(BrokenPush), Arc::new(store.clone()), 5);
  let seller = Uuid::new_v4();
  let pen = store.insert_product(storekeep::Product::new(seller, "Pen", 300, 50));
  let engine = OrderPlacementEngine::new(Arc::new(store.clone()), Arc::new(DiscardEvents), &EngineConfig::default());
  let placed = engine.place_order(cart(new_buyer(), &[(pen, 1)])).await.unwrap();

  let event = storekeep::OrderPlaced {
    order_id: placed.order.id,
    order_number: placed.order.order_number.clone(),
    buyer_id: placed.order.buyer_id,
    total_cents: placed.order.total_cents,
    placed_at: placed.order.created_at,
    lines: vec![storekeep::fanout::LineSnapshot {
      seller_id: seller,
      product_id: pen,
      product_name: "Pen".to_string(),
      quantity: 1,
      unit_price_cents: 300,
      stock_after: 49,
    }],
  };
  let report = fanout.fan_out_placed(&event).await;

  assert_eq!(report.persisted, 3);
  assert_eq!(report.pushed, 0);
  assert_eq!(report.failures, 3);
  assert_eq!(inbox.all().len(), 3);
}

#[tokio::test]
async fn test_panicking_sink_cannot_fail_a_committed_order() {
  setup_tracing();
  let store = MemoryStore::new();
  let pen = store.insert_product(storekeep::Product::new(Uuid::new_v4(), "Pen", 300, 5));
  let engine = OrderPlacementEngine::new(Arc::new(store.clone()), Arc::new(PanickingSink), &EngineConfig::default());

  let placed = engine.place_order(cart(new_buyer(), &[(pen, 1)])).await;

  assert!(placed.is_ok());
  assert_eq!(store.stock_of(pen), Some(4));
  assert_eq!(store.order_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_dispatch_delivers_after_returning() {
  setup_tracing();
  let store = MemoryStore::new();
  let seller = Uuid::new_v4();
  let pen = store.insert_product(storekeep::Product::new(seller, "Pen", 300, 5));
  let sink = Arc::new(RecordingSink::default());
  let config = EngineConfig::default().with_dispatch(DispatchMode::Background);
  let engine = OrderPlacementEngine::new(Arc::new(store.clone()), sink.clone(), &config);

  let placed = engine.place_order(cart(new_buyer(), &[(pen, 2)])).await.unwrap();

  let mut waited = Duration::ZERO;
  while sink.placed.lock().is_empty() && waited < Duration::from_secs(2) {
    tokio::time::sleep(Duration::from_millis(10)).await;
    waited += Duration::from_millis(10);
  }
  let events = sink.placed.lock().clone();
  assert_eq!(events.len(), 1);
  assert_eq!(events[0].order_id, placed.order.id);
  assert_eq!(events[0].lines.len(), 1);
  assert_eq!(events[0].lines[0].seller_id, seller);
  assert_eq!(events[0].lines[0].stock_after, 3);
}
