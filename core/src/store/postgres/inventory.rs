// storekeep/src/store/postgres/inventory.rs

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::map_sqlx_error;
use crate::error::{StoreError, StoreResult};
use crate::model::Product;

const PRODUCT_COLUMNS: &str = "id, seller_id, name, price_cents, stock_quantity, created_at, updated_at";

/// `ORDER BY id` makes Postgres take the row locks in ascending id order.
pub(super) async fn lock_products(conn: &mut PgConnection, product_ids: &[Uuid]) -> StoreResult<Vec<Product>> {
  let sql = format!(
    "SELECT {} FROM products WHERE id = ANY($1) ORDER BY id FOR UPDATE",
    PRODUCT_COLUMNS
  );
  sqlx::query_as::<_, Product>(&sql)
    .bind(product_ids)
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("lock_products_for_update", e))
}

/// Relies on the `stock_quantity >= 0` check constraint as the last line against overselling.
pub(super) async fn adjust_stock(conn: &mut PgConnection, product_id: Uuid, delta: i32) -> StoreResult<i32> {
  let updated: Option<(i32,)> = sqlx::query_as(
    "UPDATE products SET stock_quantity = stock_quantity + $2, updated_at = NOW() \
     WHERE id = $1 RETURNING stock_quantity",
  )
  .bind(product_id)
  .bind(delta)
  .fetch_optional(conn)
  .await
  .map_err(|e| map_sqlx_error("adjust_stock", e))?;

  updated.map(|(qty,)| qty).ok_or_else(|| {
    StoreError::backend(
      "adjust_stock",
      anyhow::anyhow!("product {} disappeared while locked", product_id),
    )
  })
}

pub(super) async fn fetch_product(pool: &PgPool, product_id: Uuid) -> StoreResult<Option<Product>> {
  let sql = format!("SELECT {} FROM products WHERE id = $1", PRODUCT_COLUMNS);
  sqlx::query_as::<_, Product>(&sql)
    .bind(product_id)
    .fetch_optional(pool)
    .await
    .map_err(|e| map_sqlx_error("fetch_product", e))
}

pub(super) async fn list_products(pool: &PgPool) -> StoreResult<Vec<Product>> {
  let sql = format!("SELECT {} FROM products ORDER BY name, id", PRODUCT_COLUMNS);
  sqlx::query_as::<_, Product>(&sql)
    .fetch_all(pool)
    .await
    .map_err(|e| map_sqlx_error("list_products", e))
}
