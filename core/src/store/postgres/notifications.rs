// storekeep/src/store/postgres/notifications.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::map_sqlx_error;
use crate::error::StoreResult;
use crate::model::Notification;
use crate::store::NotificationStore;

const NOTIFICATION_COLUMNS: &str =
  "id, recipient_id, recipient_role, kind, priority, title, message, metadata, order_id, product_id, is_read, created_at";

/// Writes go straight to the pool, never through a placement transaction.
#[derive(Clone)]
pub struct PgNotificationStore {
  pool: PgPool,
}

impl PgNotificationStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
  async fn insert(&self, notification: &Notification) -> StoreResult<()> {
    sqlx::query(
      "INSERT INTO notifications \
       (id, recipient_id, recipient_role, kind, priority, title, message, metadata, order_id, product_id, is_read, created_at) \
       VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
    )
    .bind(notification.id)
    .bind(notification.recipient_id)
    .bind(notification.recipient_role)
    .bind(notification.kind)
    .bind(notification.priority)
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.metadata)
    .bind(notification.order_id)
    .bind(notification.product_id)
    .bind(notification.is_read)
    .bind(notification.created_at)
    .execute(&self.pool)
    .await
    .map_err(|e| map_sqlx_error("insert_notification", e))?;
    Ok(())
  }

  async fn list_for(&self, recipient_id: Uuid, unread_only: bool) -> StoreResult<Vec<Notification>> {
    let sql = format!(
      "SELECT {} FROM notifications WHERE recipient_id = $1 AND ($2 = FALSE OR is_read = FALSE) \
       ORDER BY created_at DESC",
      NOTIFICATION_COLUMNS
    );
    sqlx::query_as::<_, Notification>(&sql)
      .bind(recipient_id)
      .bind(unread_only)
      .fetch_all(&self.pool)
      .await
      .map_err(|e| map_sqlx_error("list_notifications", e))
  }

  async fn unread_count(&self, recipient_id: Uuid) -> StoreResult<i64> {
    let (count,): (i64,) =
      sqlx::query_as("SELECT COUNT(*) FROM notifications WHERE recipient_id = $1 AND is_read = FALSE")
        .bind(recipient_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("unread_notification_count", e))?;
    Ok(count)
  }

  async fn mark_read(&self, notification_id: Uuid, recipient_id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE id = $1 AND recipient_id = $2")
      .bind(notification_id)
      .bind(recipient_id)
      .execute(&self.pool)
      .await
      .map_err(|e| map_sqlx_error("mark_notification_read", e))?;
    Ok(result.rows_affected() > 0)
  }

  async fn delete(&self, notification_id: Uuid, recipient_id: Uuid) -> StoreResult<bool> {
    let result = sqlx::query("DELETE FROM notifications WHERE id = $1 AND recipient_id = $2")
      .bind(notification_id)
      .bind(recipient_id)
      .execute(&self.pool)
      .await
      .map_err(|e| map_sqlx_error("delete_notification", e))?;
    Ok(result.rows_affected() > 0)
  }
}
