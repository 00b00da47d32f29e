// storekeep/src/model/product.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Product {
  pub id: Uuid,
  pub seller_id: Uuid,
  pub name: String,
  pub price_cents: i64,
  pub stock_quantity: i32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Product {
  pub fn new(seller_id: Uuid, name: impl Into<String>, price_cents: i64, stock_quantity: i32) -> Self {
    let now = Utc::now();
    Self {
      id: Uuid::new_v4(),
      seller_id,
      name: name.into(),
      price_cents,
      stock_quantity,
      created_at: now,
      updated_at: now,
    }
  }
}
