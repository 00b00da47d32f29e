// storefront/src/seed.rs

use sqlx::PgPool;
use storekeep::Product;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::Result;

/// (name, price in cents, stock) per demo seller.
const CATALOG: [&[(&str, i64, i32)]; 2] = [
  &[("Stoneware Mug", 1250, 40), ("Pour-over Kettle", 4800, 8), ("Linen Napkins (4)", 2200, 3)],
  &[("Desk Lamp", 3900, 12), ("Notebook A5", 650, 120), ("Fountain Pen", 5400, 1)],
];

/// Inserts a small demo catalog when the products table is empty. Returns the number of rows written.
#[instrument(name = "seed::seed_catalog", skip(pool))]
pub async fn seed_catalog(pool: &PgPool) -> Result<usize> {
  let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products").fetch_one(pool).await?;
  if existing > 0 {
    info!(existing, "Catalog already populated; skipping seed.");
    return Ok(0);
  }

  let mut tx = pool.begin().await?;
  let mut written = 0;
  for seller_products in CATALOG {
    let seller_id = Uuid::new_v4();
    for (name, price_cents, stock) in seller_products {
      let product = Product::new(seller_id, *name, *price_cents, *stock);
      sqlx::query(
        "INSERT INTO products (id, seller_id, name, price_cents, stock_quantity, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
      )
      .bind(product.id)
      .bind(product.seller_id)
      .bind(&product.name)
      .bind(product.price_cents)
      .bind(product.stock_quantity)
      .bind(product.created_at)
      .bind(product.updated_at)
      .execute(&mut *tx)
      .await?;
      written += 1;
    }
    info!(%seller_id, products = seller_products.len(), "Seeded demo seller.");
  }
  tx.commit().await?;

  Ok(written)
}
