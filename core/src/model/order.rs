// storekeep/src/model/order.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use uuid::Uuid;

/// Identity of a buyer that has already been authenticated upstream.
///
/// The engine never re-derives identity; whoever constructs a `BuyerId` vouches for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, SqlxType)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct BuyerId(Uuid);

impl BuyerId {
  pub fn from_authenticated(id: Uuid) -> Self {
    BuyerId(id)
  }

  pub fn as_uuid(&self) -> Uuid {
    self.0
  }
}

impl fmt::Display for BuyerId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
  Pending,
  Processing,
  Delivered,
  Cancelled,
}

impl OrderStatus {
  /// Forward transitions reachable through `advance_status`. Cancellation has its own path
  /// because it must also restore stock.
  pub fn can_advance_to(self, next: OrderStatus) -> bool {
    matches!(
      (self, next),
      (OrderStatus::Pending, OrderStatus::Processing) | (OrderStatus::Processing, OrderStatus::Delivered)
    )
  }

  pub fn is_cancellable(self) -> bool {
    matches!(self, OrderStatus::Pending | OrderStatus::Processing)
  }

  pub fn as_str(self) -> &'static str {
    match self {
      OrderStatus::Pending => "pending",
      OrderStatus::Processing => "processing",
      OrderStatus::Delivered => "delivered",
      OrderStatus::Cancelled => "cancelled",
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "payment_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
  Pending,
  Paid,
  Failed,
  Refunded,
}

impl PaymentStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      PaymentStatus::Pending => "pending",
      PaymentStatus::Paid => "paid",
      PaymentStatus::Failed => "failed",
      PaymentStatus::Refunded => "refunded",
    }
  }

  /// Payment state an order ends up in once cancelled.
  pub fn after_cancellation(self) -> PaymentStatus {
    match self {
      PaymentStatus::Paid => PaymentStatus::Refunded,
      other => other,
    }
  }
}

impl fmt::Display for PaymentStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
  pub id: Uuid,
  pub order_number: String,
  pub buyer_id: BuyerId,
  pub status: OrderStatus,
  pub payment_status: PaymentStatus,
  pub total_cents: i64,
  pub idempotency_key: Option<String>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Order {
  pub fn new_pending(buyer_id: BuyerId, total_cents: i64, idempotency_key: Option<String>) -> Self {
    let id = Uuid::new_v4();
    let now = Utc::now();
    Self {
      id,
      order_number: order_number_for(id, now),
      buyer_id,
      status: OrderStatus::Pending,
      payment_status: PaymentStatus::Pending,
      total_cents,
      idempotency_key,
      created_at: now,
      updated_at: now,
    }
  }

  pub fn receipt(&self) -> OrderReceipt {
    OrderReceipt {
      order_id: self.id,
      order_number: self.order_number.clone(),
      total_cents: self.total_cents,
      status: self.status,
    }
  }
}

/// Human-shareable reference: `ORD-YYYYMMDD-XXXXXXXX`.
pub fn order_number_for(order_id: Uuid, placed_at: DateTime<Utc>) -> String {
  let simple = order_id.simple().to_string().to_uppercase();
  format!("ORD-{}-{}", placed_at.format("%Y%m%d"), &simple[..8])
}

/// One line of a committed order. Written once; the unit price is the price read under
/// lock at placement time and is never re-synchronised with the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub seller_id: Uuid,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

impl OrderItem {
  pub fn line_total_cents(&self) -> i64 {
    self.unit_price_cents * i64::from(self.quantity)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderWithItems {
  pub order: Order,
  pub items: Vec<OrderItem>,
}

impl OrderWithItems {
  pub fn items_total_cents(&self) -> i64 {
    self.items.iter().map(OrderItem::line_total_cents).sum()
  }
}

/// What the API layer returns on a successful placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
  pub order_id: Uuid,
  pub order_number: String,
  pub total_cents: i64,
  pub status: OrderStatus,
}
