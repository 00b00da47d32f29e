// storekeep/src/fanout/mod.rs

//! Post-commit notification fan-out.
//!
//! The engine hands committed facts to an [`OrderEventSink`] through an [`EventDispatcher`].
//! Nothing in here can change the outcome of the transaction that produced the event:
//! sinks return `()`, every failure is logged and swallowed, and a panicking sink is
//! contained by the dispatcher.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{event, instrument, Instrument, Level, Span};
use uuid::Uuid;

use crate::config::DispatchMode;
use crate::error::FanOutError;
use crate::model::{
  format_cents, BuyerId, Notification, NotificationKind, NotificationPriority, OrderStatus, RecipientRole,
};
use crate::store::{NotificationStore, Store};

pub mod breakdown;
pub mod push;

pub use breakdown::{breakdown_by_seller, SellerBreakdown};
pub use push::{BroadcastHub, PushChannel, PushEvent};

/// One order line as it stood when the event was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineSnapshot {
  pub seller_id: Uuid,
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
  /// Stock left on the product after this event's change was applied.
  pub stock_after: i32,
}

impl LineSnapshot {
  pub fn line_total_cents(&self) -> i64 {
    self.unit_price_cents * i64::from(self.quantity)
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPlaced {
  pub order_id: Uuid,
  pub order_number: String,
  pub buyer_id: BuyerId,
  pub total_cents: i64,
  pub placed_at: DateTime<Utc>,
  pub lines: Vec<LineSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderCancelled {
  pub order_id: Uuid,
  pub order_number: String,
  pub buyer_id: BuyerId,
  pub refunded: bool,
  pub lines: Vec<LineSnapshot>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderStatusChanged {
  pub order_id: Uuid,
  pub order_number: String,
  pub buyer_id: BuyerId,
  pub from: OrderStatus,
  pub to: OrderStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderEvent {
  Placed(OrderPlaced),
  Cancelled(OrderCancelled),
  StatusChanged(OrderStatusChanged),
}

impl OrderEvent {
  pub fn name(&self) -> &'static str {
    match self {
      OrderEvent::Placed(_) => "order_placed",
      OrderEvent::Cancelled(_) => "order_cancelled",
      OrderEvent::StatusChanged(_) => "order_status_changed",
    }
  }

  pub fn order_id(&self) -> Uuid {
    match self {
      OrderEvent::Placed(e) => e.order_id,
      OrderEvent::Cancelled(e) => e.order_id,
      OrderEvent::StatusChanged(e) => e.order_id,
    }
  }
}

/// Receiver of committed order facts. Implementations must not fail the caller.
#[async_trait]
pub trait OrderEventSink: Send + Sync {
  async fn order_placed(&self, event: &OrderPlaced);

  async fn order_cancelled(&self, _event: &OrderCancelled) {}

  async fn order_status_changed(&self, _event: &OrderStatusChanged) {}
}

/// Sink that drops every event. Useful where fan-out is irrelevant, e.g. benchmarks.
pub struct DiscardEvents;

#[async_trait]
impl OrderEventSink for DiscardEvents {
  async fn order_placed(&self, _event: &OrderPlaced) {}
}

/// Drives a sink after commit, inline or on a spawned task.
#[derive(Clone)]
pub struct EventDispatcher {
  sink: Arc<dyn OrderEventSink>,
  mode: DispatchMode,
}

impl EventDispatcher {
  pub fn new(sink: Arc<dyn OrderEventSink>, mode: DispatchMode) -> Self {
    Self { sink, mode }
  }

  pub fn mode(&self) -> DispatchMode {
    self.mode
  }

  pub async fn dispatch(&self, order_event: OrderEvent) {
    let sink = self.sink.clone();
    let task = async move {
      let name = order_event.name();
      let order_id = order_event.order_id();
      let delivery = AssertUnwindSafe(deliver(sink.as_ref(), &order_event)).catch_unwind().await;
      if delivery.is_err() {
        event!(Level::ERROR, event_name = name, %order_id, "Event sink panicked; event dropped.");
      }
    }
    .instrument(Span::current());

    match self.mode {
      DispatchMode::Inline => task.await,
      DispatchMode::Background => {
        tokio::spawn(task);
      }
    }
  }
}

async fn deliver(sink: &dyn OrderEventSink, order_event: &OrderEvent) {
  match order_event {
    OrderEvent::Placed(e) => sink.order_placed(e).await,
    OrderEvent::Cancelled(e) => sink.order_cancelled(e).await,
    OrderEvent::StatusChanged(e) => sink.order_status_changed(e).await,
  }
}

/// Tally of one fan-out run, for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FanOutReport {
  pub persisted: usize,
  pub pushed: usize,
  pub failures: usize,
}

/// Persists inbox notifications and pushes live events for committed order facts.
pub struct NotificationFanOut {
  notifications: Arc<dyn NotificationStore>,
  push: Arc<dyn PushChannel>,
  history: Arc<dyn Store>,
  low_stock_threshold: i32,
}

impl NotificationFanOut {
  pub fn new(
    notifications: Arc<dyn NotificationStore>,
    push: Arc<dyn PushChannel>,
    history: Arc<dyn Store>,
    low_stock_threshold: i32,
  ) -> Self {
    Self {
      notifications,
      push,
      history,
      low_stock_threshold,
    }
  }

  #[instrument(
    name = "NotificationFanOut::order_placed",
    skip_all,
    fields(order_id = %placed.order_id, lines = placed.lines.len())
  )]
  pub async fn fan_out_placed(&self, placed: &OrderPlaced) -> FanOutReport {
    let mut report = FanOutReport::default();

    for part in breakdown_by_seller(&placed.lines) {
      let items: Vec<_> = part
        .lines
        .iter()
        .map(|l| {
          json!({
            "productId": l.product_id,
            "productName": l.product_name,
            "quantity": l.quantity,
            "unitPriceCents": l.unit_price_cents,
          })
        })
        .collect();
      let new_order = Notification::new(
        part.seller_id,
        RecipientRole::Seller,
        NotificationKind::NewOrder,
        NotificationPriority::High,
        "New order received",
        format!(
          "Order {}: {} item(s) totalling {}",
          placed.order_number,
          part.item_count,
          format_cents(part.subtotal_cents)
        ),
      )
      .with_metadata(json!({
        "orderNumber": placed.order_number,
        "subtotalCents": part.subtotal_cents,
        "items": items,
      }))
      .for_order(placed.order_id);
      self.deliver(new_order, &mut report).await;

      match self
        .history
        .has_prior_purchase_from_seller(placed.buyer_id, part.seller_id, placed.order_id)
        .await
      {
        Ok(true) => {}
        Ok(false) => {
          let new_customer = Notification::new(
            part.seller_id,
            RecipientRole::Seller,
            NotificationKind::NewCustomer,
            NotificationPriority::Normal,
            "New customer",
            format!("A new customer placed their first order with you ({})", placed.order_number),
          )
          .with_metadata(json!({ "orderNumber": placed.order_number, "buyerId": placed.buyer_id }))
          .for_order(placed.order_id);
          self.deliver(new_customer, &mut report).await;
        }
        Err(source) => {
          let err = FanOutError::History {
            buyer_id: placed.buyer_id.as_uuid(),
            source,
          };
          event!(Level::WARN, seller_id = %part.seller_id, error = %err, "Skipping new-customer check.");
          report.failures += 1;
        }
      }
    }

    for line in placed.lines.iter().filter(|l| l.stock_after <= self.low_stock_threshold) {
      let priority = if line.stock_after == 0 {
        NotificationPriority::High
      } else {
        NotificationPriority::Normal
      };
      let low_stock = Notification::new(
        line.seller_id,
        RecipientRole::Seller,
        NotificationKind::LowStock,
        priority,
        "Low stock",
        format!("{} has {} unit(s) left", line.product_name, line.stock_after),
      )
      .with_metadata(json!({
        "productId": line.product_id,
        "productName": line.product_name,
        "remainingStock": line.stock_after,
        "threshold": self.low_stock_threshold,
      }))
      .for_product(line.product_id);
      self.deliver(low_stock, &mut report).await;
    }

    let confirmed = Notification::new(
      placed.buyer_id.as_uuid(),
      RecipientRole::Buyer,
      NotificationKind::OrderConfirmed,
      NotificationPriority::Normal,
      "Order confirmed",
      format!(
        "Your order {} totalling {} has been placed",
        placed.order_number,
        format_cents(placed.total_cents)
      ),
    )
    .with_metadata(json!({ "orderNumber": placed.order_number, "totalCents": placed.total_cents }))
    .for_order(placed.order_id);
    self.deliver(confirmed, &mut report).await;

    event!(Level::DEBUG, ?report, "Order placement fan-out finished.");
    report
  }

  #[instrument(name = "NotificationFanOut::order_cancelled", skip_all, fields(order_id = %cancelled.order_id))]
  pub async fn fan_out_cancelled(&self, cancelled: &OrderCancelled) -> FanOutReport {
    let mut report = FanOutReport::default();

    for part in breakdown_by_seller(&cancelled.lines) {
      let notification = Notification::new(
        part.seller_id,
        RecipientRole::Seller,
        NotificationKind::OrderCancelled,
        NotificationPriority::Normal,
        "Order cancelled",
        format!(
          "Order {} was cancelled; {} item(s) returned to stock",
          cancelled.order_number, part.item_count
        ),
      )
      .with_metadata(json!({ "orderNumber": cancelled.order_number, "restoredItems": part.item_count }))
      .for_order(cancelled.order_id);
      self.deliver(notification, &mut report).await;
    }

    let message = if cancelled.refunded {
      format!("Your order {} was cancelled and your payment refunded", cancelled.order_number)
    } else {
      format!("Your order {} was cancelled", cancelled.order_number)
    };
    let to_buyer = Notification::new(
      cancelled.buyer_id.as_uuid(),
      RecipientRole::Buyer,
      NotificationKind::OrderCancelled,
      NotificationPriority::Normal,
      "Order cancelled",
      message,
    )
    .with_metadata(json!({ "orderNumber": cancelled.order_number, "refunded": cancelled.refunded }))
    .for_order(cancelled.order_id);
    self.deliver(to_buyer, &mut report).await;

    event!(Level::DEBUG, ?report, "Order cancellation fan-out finished.");
    report
  }

  pub async fn fan_out_status_changed(&self, changed: &OrderStatusChanged) -> FanOutReport {
    let mut report = FanOutReport::default();
    let notification = Notification::new(
      changed.buyer_id.as_uuid(),
      RecipientRole::Buyer,
      NotificationKind::OrderStatusChanged,
      NotificationPriority::Normal,
      format!("Order {}", changed.to),
      format!("Your order {} is now {}", changed.order_number, changed.to),
    )
    .with_metadata(json!({
      "orderNumber": changed.order_number,
      "from": changed.from,
      "to": changed.to,
    }))
    .for_order(changed.order_id);
    self.deliver(notification, &mut report).await;
    report
  }

  /// Persists then pushes. A failed write still gets a live push, without an inbox id.
  async fn deliver(&self, notification: Notification, report: &mut FanOutReport) {
    let recipient_id = notification.recipient_id;
    let persisted = match self.notifications.insert(&notification).await {
      Ok(()) => {
        report.persisted += 1;
        true
      }
      Err(source) => {
        let err = FanOutError::Persist { recipient_id, source };
        event!(Level::WARN, kind = ?notification.kind, error = %err, "Notification not persisted.");
        report.failures += 1;
        false
      }
    };

    match self.push.push(PushEvent::from_notification(&notification, persisted)).await {
      Ok(()) => report.pushed += 1,
      Err(err) => {
        event!(Level::WARN, kind = ?notification.kind, error = %err, "Notification push failed.");
        report.failures += 1;
      }
    }
  }
}

#[async_trait]
impl OrderEventSink for NotificationFanOut {
  async fn order_placed(&self, placed: &OrderPlaced) {
    self.fan_out_placed(placed).await;
  }

  async fn order_cancelled(&self, cancelled: &OrderCancelled) {
    self.fan_out_cancelled(cancelled).await;
  }

  async fn order_status_changed(&self, changed: &OrderStatusChanged) {
    self.fan_out_status_changed(changed).await;
  }
}
