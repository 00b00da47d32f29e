// storekeep/src/store/postgres/orders.rs

use sqlx::postgres::PgExecutor;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::map_sqlx_error;
use crate::error::StoreResult;
use crate::model::{BuyerId, Order, OrderItem, OrderStatus, PaymentStatus};

const ORDER_COLUMNS: &str =
  "id, order_number, buyer_id, status, payment_status, total_cents, idempotency_key, created_at, updated_at";

const ITEM_COLUMNS: &str = "id, order_id, product_id, seller_id, quantity, unit_price_cents";

pub(super) async fn fetch_order<'e, E: PgExecutor<'e>>(executor: E, order_id: Uuid) -> StoreResult<Option<Order>> {
  let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
  sqlx::query_as::<_, Order>(&sql)
    .bind(order_id)
    .fetch_optional(executor)
    .await
    .map_err(|e| map_sqlx_error("fetch_order", e))
}

pub(super) async fn items_for<'e, E: PgExecutor<'e>>(executor: E, order_id: Uuid) -> StoreResult<Vec<OrderItem>> {
  let sql = format!(
    "SELECT {} FROM order_items WHERE order_id = $1 ORDER BY product_id",
    ITEM_COLUMNS
  );
  sqlx::query_as::<_, OrderItem>(&sql)
    .bind(order_id)
    .fetch_all(executor)
    .await
    .map_err(|e| map_sqlx_error("fetch_order_items", e))
}

pub(super) async fn lock_order(conn: &mut PgConnection, order_id: Uuid) -> StoreResult<Option<Order>> {
  let sql = format!("SELECT {} FROM orders WHERE id = $1 FOR UPDATE", ORDER_COLUMNS);
  sqlx::query_as::<_, Order>(&sql)
    .bind(order_id)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("lock_order_for_update", e))
}

pub(super) async fn find_by_idempotency_key(
  conn: &mut PgConnection,
  buyer_id: BuyerId,
  idempotency_key: &str,
) -> StoreResult<Option<Order>> {
  let sql = format!(
    "SELECT {} FROM orders WHERE buyer_id = $1 AND idempotency_key = $2",
    ORDER_COLUMNS
  );
  sqlx::query_as::<_, Order>(&sql)
    .bind(buyer_id)
    .bind(idempotency_key)
    .fetch_optional(conn)
    .await
    .map_err(|e| map_sqlx_error("find_order_by_idempotency_key", e))
}

pub(super) async fn insert_order(conn: &mut PgConnection, order: &Order) -> StoreResult<()> {
  sqlx::query(
    "INSERT INTO orders (id, order_number, buyer_id, status, payment_status, total_cents, idempotency_key, created_at, updated_at) \
     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
  )
  .bind(order.id)
  .bind(&order.order_number)
  .bind(order.buyer_id)
  .bind(order.status)
  .bind(order.payment_status)
  .bind(order.total_cents)
  .bind(order.idempotency_key.as_deref())
  .bind(order.created_at)
  .bind(order.updated_at)
  .execute(conn)
  .await
  .map_err(|e| map_sqlx_error("insert_order", e))?;
  Ok(())
}

pub(super) async fn insert_order_item(conn: &mut PgConnection, item: &OrderItem) -> StoreResult<()> {
  sqlx::query(
    "INSERT INTO order_items (id, order_id, product_id, seller_id, quantity, unit_price_cents) \
     VALUES ($1, $2, $3, $4, $5, $6)",
  )
  .bind(item.id)
  .bind(item.order_id)
  .bind(item.product_id)
  .bind(item.seller_id)
  .bind(item.quantity)
  .bind(item.unit_price_cents)
  .execute(conn)
  .await
  .map_err(|e| map_sqlx_error("insert_order_item", e))?;
  Ok(())
}

pub(super) async fn update_status(
  conn: &mut PgConnection,
  order_id: Uuid,
  status: OrderStatus,
  payment_status: PaymentStatus,
) -> StoreResult<()> {
  sqlx::query("UPDATE orders SET status = $2, payment_status = $3, updated_at = NOW() WHERE id = $1")
    .bind(order_id)
    .bind(status)
    .bind(payment_status)
    .execute(conn)
    .await
    .map_err(|e| map_sqlx_error("update_order_status", e))?;
  Ok(())
}

pub(super) async fn orders_for_buyer(pool: &PgPool, buyer_id: BuyerId) -> StoreResult<Vec<Order>> {
  let sql = format!(
    "SELECT {} FROM orders WHERE buyer_id = $1 ORDER BY created_at DESC",
    ORDER_COLUMNS
  );
  sqlx::query_as::<_, Order>(&sql)
    .bind(buyer_id)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("orders_for_buyer", e))
}

pub(super) async fn has_prior_purchase_from_seller(
  pool: &PgPool,
  buyer_id: BuyerId,
  seller_id: Uuid,
  excluding_order: Uuid,
) -> StoreResult<bool> {
  let (exists,): (bool,) = sqlx::query_as(
    "SELECT EXISTS ( \
       SELECT 1 FROM order_items oi JOIN orders o ON o.id = oi.order_id \
       WHERE o.buyer_id = $1 AND oi.seller_id = $2 AND o.id <> $3 \
     )",
  )
  .bind(buyer_id)
  .bind(seller_id)
  .bind(excluding_order)
  .fetch_one(pool)
  .await
  .map_err(|e| map_sqlx_error("has_prior_purchase_from_seller", e))?;
  Ok(exists)
}
