// storekeep/src/store/postgres/mod.rs

//! Postgres backend. Row locks are real `SELECT ... FOR UPDATE` locks, bounded by a
//! transaction-local `lock_timeout`.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use super::{Store, StoreTransaction};
use crate::config::DEFAULT_LOCK_TIMEOUT;
use crate::error::{StoreError, StoreResult};
use crate::model::{BuyerId, Order, OrderItem, OrderStatus, OrderWithItems, PaymentStatus, Product};

mod inventory;
mod notifications;
mod orders;

pub use notifications::PgNotificationStore;

/// DDL for every table and enum the backends read and write. Idempotent.
pub const SCHEMA: &str = include_str!("../../../schema.sql");

#[instrument(name = "PgStore::apply_schema", skip(pool), err(Display))]
pub async fn apply_schema(pool: &PgPool) -> StoreResult<()> {
  sqlx::raw_sql(SCHEMA)
    .execute(pool)
    .await
    .map_err(|e| map_sqlx_error("apply_schema", e))?;
  event!(Level::INFO, "Database schema applied.");
  Ok(())
}

/// Maps SQLSTATE codes onto the store's failure classes.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
  if let sqlx::Error::Database(db_err) = &err {
    let message = db_err.message().to_string();
    let code = db_err.code().map(|c| c.into_owned());
    match code.as_deref() {
      // lock_not_available
      Some("55P03") => {
        return StoreError::LockTimeout {
          operation: operation.to_string(),
        }
      }
      Some("40P01") => {
        return StoreError::Deadlock {
          operation: operation.to_string(),
        }
      }
      // serialization_failure, unique_violation
      Some("40001") | Some("23505") => {
        return StoreError::Conflict {
          operation: operation.to_string(),
          message,
        }
      }
      // check_violation, foreign_key_violation
      Some("23514") | Some("23503") => {
        return StoreError::ConstraintViolation {
          operation: operation.to_string(),
          message,
        }
      }
      _ => {}
    }
  }
  match err {
    sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => StoreError::Unavailable {
      operation: operation.to_string(),
      message: err.to_string(),
    },
    other => StoreError::backend(operation, anyhow::Error::new(other)),
  }
}

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
  lock_timeout: Duration,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self {
      pool,
      lock_timeout: DEFAULT_LOCK_TIMEOUT,
    }
  }

  pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
    self.lock_timeout = lock_timeout;
    self
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

#[async_trait]
impl Store for PgStore {
  async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
    let mut tx = self.pool.begin().await.map_err(|e| map_sqlx_error("begin", e))?;
    // `true` scopes the setting to this transaction only.
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
      .bind(format!("{}ms", self.lock_timeout.as_millis()))
      .execute(&mut *tx)
      .await
      .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;
    Ok(Box::new(PgTransaction { tx }))
  }

  async fn ping(&self) -> StoreResult<()> {
    sqlx::query("SELECT 1")
      .execute(&self.pool)
      .await
      .map_err(|e| map_sqlx_error("ping", e))?;
    Ok(())
  }

  async fn product(&self, product_id: Uuid) -> StoreResult<Option<Product>> {
    inventory::fetch_product(&self.pool, product_id).await
  }

  async fn list_products(&self) -> StoreResult<Vec<Product>> {
    inventory::list_products(&self.pool).await
  }

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<OrderWithItems>> {
    let Some(order) = orders::fetch_order(&self.pool, order_id).await? else {
      return Ok(None);
    };
    let items = orders::items_for(&self.pool, order.id).await?;
    Ok(Some(OrderWithItems { order, items }))
  }

  async fn orders_for_buyer(&self, buyer_id: BuyerId) -> StoreResult<Vec<OrderWithItems>> {
    let found = orders::orders_for_buyer(&self.pool, buyer_id).await?;
    let mut result = Vec::with_capacity(found.len());
    for order in found {
      let items = orders::items_for(&self.pool, order.id).await?;
      result.push(OrderWithItems { order, items });
    }
    Ok(result)
  }

  async fn has_prior_purchase_from_seller(
    &self,
    buyer_id: BuyerId,
    seller_id: Uuid,
    excluding_order: Uuid,
  ) -> StoreResult<bool> {
    orders::has_prior_purchase_from_seller(&self.pool, buyer_id, seller_id, excluding_order).await
  }
}

pub struct PgTransaction {
  tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgTransaction {
  async fn lock_products_for_update(&mut self, product_ids: &[Uuid]) -> StoreResult<Vec<Product>> {
    inventory::lock_products(&mut self.tx, product_ids).await
  }

  async fn adjust_stock(&mut self, product_id: Uuid, delta: i32) -> StoreResult<i32> {
    inventory::adjust_stock(&mut self.tx, product_id, delta).await
  }

  async fn find_order_by_idempotency_key(
    &mut self,
    buyer_id: BuyerId,
    idempotency_key: &str,
  ) -> StoreResult<Option<OrderWithItems>> {
    let Some(order) = orders::find_by_idempotency_key(&mut *self.tx, buyer_id, idempotency_key).await? else {
      return Ok(None);
    };
    let items = orders::items_for(&mut *self.tx, order.id).await?;
    Ok(Some(OrderWithItems { order, items }))
  }

  async fn lock_order_for_update(&mut self, order_id: Uuid) -> StoreResult<Option<OrderWithItems>> {
    let Some(order) = orders::lock_order(&mut self.tx, order_id).await? else {
      return Ok(None);
    };
    let items = orders::items_for(&mut *self.tx, order.id).await?;
    Ok(Some(OrderWithItems { order, items }))
  }

  async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
    orders::insert_order(&mut self.tx, order).await
  }

  async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()> {
    orders::insert_order_item(&mut self.tx, item).await
  }

  async fn update_order_status(
    &mut self,
    order_id: Uuid,
    status: OrderStatus,
    payment_status: PaymentStatus,
  ) -> StoreResult<()> {
    orders::update_status(&mut self.tx, order_id, status, payment_status).await
  }

  async fn commit(self: Box<Self>) -> StoreResult<()> {
    self.tx.commit().await.map_err(|e| map_sqlx_error("commit", e))
  }

  async fn rollback(self: Box<Self>) -> StoreResult<()> {
    self.tx.rollback().await.map_err(|e| map_sqlx_error("rollback", e))
  }
}
