// storekeep/src/model/notification.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{FromRow, Type as SqlxType};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "recipient_role_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecipientRole {
  Seller,
  Buyer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "notification_kind_enum", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
  NewOrder,
  OrderConfirmed,
  NewCustomer,
  LowStock,
  OrderCancelled,
  OrderStatusChanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, SqlxType)]
#[sqlx(type_name = "notification_priority_enum", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationPriority {
  Low,
  Normal,
  High,
}

/// A persisted inbox entry. Orders and products are referenced informationally only;
/// reading or deleting a notification never touches them.
#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
  pub id: Uuid,
  pub recipient_id: Uuid,
  pub recipient_role: RecipientRole,
  pub kind: NotificationKind,
  pub priority: NotificationPriority,
  pub title: String,
  pub message: String,
  pub metadata: Json<Value>,
  pub order_id: Option<Uuid>,
  pub product_id: Option<Uuid>,
  pub is_read: bool,
  pub created_at: DateTime<Utc>,
}

impl Notification {
  pub fn new(
    recipient_id: Uuid,
    recipient_role: RecipientRole,
    kind: NotificationKind,
    priority: NotificationPriority,
    title: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    Self {
      id: Uuid::new_v4(),
      recipient_id,
      recipient_role,
      kind,
      priority,
      title: title.into(),
      message: message.into(),
      metadata: Json(Value::Null),
      order_id: None,
      product_id: None,
      is_read: false,
      created_at: Utc::now(),
    }
  }

  pub fn with_metadata(mut self, metadata: Value) -> Self {
    self.metadata = Json(metadata);
    self
  }

  pub fn for_order(mut self, order_id: Uuid) -> Self {
    self.order_id = Some(order_id);
    self
  }

  pub fn for_product(mut self, product_id: Uuid) -> Self {
    self.product_id = Some(product_id);
    self
  }
}
