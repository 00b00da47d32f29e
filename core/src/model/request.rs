// storekeep/src/model/request.rs

use serde::Deserialize;
use uuid::Uuid;

use super::order::BuyerId;

/// One cart line as submitted. The same product may appear on several lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
  pub product_id: Uuid,
  pub quantity: i32,
}

impl OrderLine {
  pub fn new(product_id: Uuid, quantity: i32) -> Self {
    Self { product_id, quantity }
  }
}

#[derive(Debug, Clone)]
pub struct PlaceOrderRequest {
  pub buyer_id: BuyerId,
  pub lines: Vec<OrderLine>,
  /// Client-supplied deduplication token; a replay returns the order it created.
  pub idempotency_key: Option<String>,
}

impl PlaceOrderRequest {
  pub fn new(buyer_id: BuyerId, lines: Vec<OrderLine>) -> Self {
    Self {
      buyer_id,
      lines,
      idempotency_key: None,
    }
  }

  pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
    self.idempotency_key = Some(key.into());
    self
  }
}
