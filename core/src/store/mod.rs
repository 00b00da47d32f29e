// storekeep/src/store/mod.rs

//! Storage seams for the Inventory Store, Order Store and Notification Store.
//!
//! The inventory and order tables share one transactional substrate: a
//! [`StoreTransaction`] spans both, and it is the only way to mutate stock. Notifications
//! live behind a separate [`NotificationStore`] so that their failures stay outside the
//! placement transaction.
//!
//! Two backends are provided: [`postgres::PgStore`] for production and
//! [`memory::MemoryStore`], which emulates row locks with per-row async mutexes.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::model::{BuyerId, Notification, Order, OrderItem, OrderStatus, OrderWithItems, PaymentStatus, Product};

pub mod memory;
pub mod postgres;

/// Entry point for transactional work plus the non-locking reads used outside transactions.
#[async_trait]
pub trait Store: Send + Sync {
  /// Opens a transaction. Dropping the returned value without committing rolls it back.
  async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>>;

  /// Cheap round trip to the backend, for health checks.
  async fn ping(&self) -> StoreResult<()>;

  async fn product(&self, product_id: Uuid) -> StoreResult<Option<Product>>;

  async fn list_products(&self) -> StoreResult<Vec<Product>>;

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<OrderWithItems>>;

  async fn orders_for_buyer(&self, buyer_id: BuyerId) -> StoreResult<Vec<OrderWithItems>>;

  /// Whether `buyer_id` has any committed order other than `excluding_order` that contains a
  /// product sold by `seller_id`.
  async fn has_prior_purchase_from_seller(
    &self,
    buyer_id: BuyerId,
    seller_id: Uuid,
    excluding_order: Uuid,
  ) -> StoreResult<bool>;
}

/// A unit of work over the inventory and order tables.
///
/// Row locks taken through this trait are held until `commit` or `rollback` (or drop).
#[async_trait]
pub trait StoreTransaction: Send {
  // --- Inventory ---

  /// Exclusively locks the given product rows and returns the rows that exist. Callers pass
  /// ids in ascending order and backends acquire the locks in that order. Blocks behind other
  /// transactions holding any of the rows, bounded by the store's lock timeout.
  async fn lock_products_for_update(&mut self, product_ids: &[Uuid]) -> StoreResult<Vec<Product>>;

  /// Adds `delta` to the stock of a product already locked by this transaction and returns
  /// the new quantity.
  async fn adjust_stock(&mut self, product_id: Uuid, delta: i32) -> StoreResult<i32>;

  // --- Orders ---

  async fn find_order_by_idempotency_key(
    &mut self,
    buyer_id: BuyerId,
    idempotency_key: &str,
  ) -> StoreResult<Option<OrderWithItems>>;

  /// Exclusively locks an order row and returns it with its items.
  async fn lock_order_for_update(&mut self, order_id: Uuid) -> StoreResult<Option<OrderWithItems>>;

  async fn insert_order(&mut self, order: &Order) -> StoreResult<()>;

  async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()>;

  async fn update_order_status(
    &mut self,
    order_id: Uuid,
    status: OrderStatus,
    payment_status: PaymentStatus,
  ) -> StoreResult<()>;

  // --- Completion ---

  async fn commit(self: Box<Self>) -> StoreResult<()>;

  async fn rollback(self: Box<Self>) -> StoreResult<()>;
}

/// Append-only inbox storage, independent of the placement transaction.
#[async_trait]
pub trait NotificationStore: Send + Sync {
  async fn insert(&self, notification: &Notification) -> StoreResult<()>;

  async fn list_for(&self, recipient_id: Uuid, unread_only: bool) -> StoreResult<Vec<Notification>>;

  async fn unread_count(&self, recipient_id: Uuid) -> StoreResult<i64>;

  /// Returns `false` when no notification with that id belongs to the recipient.
  async fn mark_read(&self, notification_id: Uuid, recipient_id: Uuid) -> StoreResult<bool>;

  /// Returns `false` when no notification with that id belongs to the recipient.
  async fn delete(&self, notification_id: Uuid, recipient_id: Uuid) -> StoreResult<bool>;
}
