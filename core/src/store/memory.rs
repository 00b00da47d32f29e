// storekeep/src/store/memory.rs

//! In-process store with the same locking and atomicity contract as the Postgres backend.
//!
//! Committed rows live in plain tables behind a `parking_lot::Mutex` that is only ever held
//! for short, non-async sections. Row locks are emulated with one `tokio::sync::Mutex` per
//! row, acquired with the store's lock timeout and held by the transaction until it ends.
//! Writes are staged inside the transaction and applied in one step on commit, so a dropped
//! or rolled back transaction leaves nothing behind.
//!
//! Fault points can be armed to force failures at specific stages of a unit of work.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use tracing::{event, Level};
use uuid::Uuid;

use super::{NotificationStore, Store, StoreTransaction};
use crate::config::DEFAULT_LOCK_TIMEOUT;
use crate::error::{StoreError, StoreResult};
use crate::model::{BuyerId, Notification, Order, OrderItem, OrderStatus, OrderWithItems, PaymentStatus, Product};

/// Stages at which [`MemoryStore::inject_fault`] can force a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
  LockProducts,
  InsertOrder,
  InsertOrderItem,
  AdjustStock,
  Commit,
}

#[derive(Default)]
struct Tables {
  products: HashMap<Uuid, Product>,
  orders: HashMap<Uuid, Order>,
  order_items: Vec<OrderItem>,
}

impl Tables {
  fn order_with_items(&self, order_id: Uuid) -> Option<OrderWithItems> {
    let order = self.orders.get(&order_id)?.clone();
    let items = self
      .order_items
      .iter()
      .filter(|item| item.order_id == order_id)
      .cloned()
      .collect();
    Some(OrderWithItems { order, items })
  }
}

#[derive(Default)]
struct RowLocks {
  rows: Mutex<HashMap<Uuid, Arc<RowMutex<()>>>>,
}

impl RowLocks {
  fn handle(&self, id: Uuid) -> Arc<RowMutex<()>> {
    self.rows.lock().entry(id).or_default().clone()
  }

  /// Forgets the row's mutex once nobody holds or waits on it.
  fn release(&self, id: Uuid) {
    let mut rows = self.rows.lock();
    if rows.get(&id).is_some_and(|handle| Arc::strong_count(handle) == 1) {
      rows.remove(&id);
    }
  }

  fn len(&self) -> usize {
    self.rows.lock().len()
  }
}

#[derive(Clone)]
pub struct MemoryStore {
  tables: Arc<Mutex<Tables>>,
  product_locks: Arc<RowLocks>,
  order_locks: Arc<RowLocks>,
  faults: Arc<Mutex<HashSet<FaultPoint>>>,
  lock_timeout: Duration,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self::new()
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self {
      tables: Arc::new(Mutex::new(Tables::default())),
      product_locks: Arc::new(RowLocks::default()),
      order_locks: Arc::new(RowLocks::default()),
      faults: Arc::new(Mutex::new(HashSet::new())),
      lock_timeout: DEFAULT_LOCK_TIMEOUT,
    }
  }

  pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
    self.lock_timeout = lock_timeout;
    self
  }

  /// Catalog write used for seeding; stands in for the external catalog collaborator.
  pub fn insert_product(&self, product: Product) -> Uuid {
    let id = product.id;
    self.tables.lock().products.insert(id, product);
    id
  }

  /// Changes a product's catalog price outside of any order transaction.
  pub fn set_price(&self, product_id: Uuid, price_cents: i64) {
    if let Some(product) = self.tables.lock().products.get_mut(&product_id) {
      product.price_cents = price_cents;
      product.updated_at = Utc::now();
    }
  }

  pub fn stock_of(&self, product_id: Uuid) -> Option<i32> {
    self.tables.lock().products.get(&product_id).map(|p| p.stock_quantity)
  }

  pub fn order_count(&self) -> usize {
    self.tables.lock().orders.len()
  }

  pub fn order_item_count(&self) -> usize {
    self.tables.lock().order_items.len()
  }

  pub fn inject_fault(&self, point: FaultPoint) {
    self.faults.lock().insert(point);
  }

  pub fn clear_faults(&self) {
    self.faults.lock().clear();
  }

  /// Rows that currently have a lock handle, held or awaited.
  pub fn tracked_row_locks(&self) -> usize {
    self.product_locks.len() + self.order_locks.len()
  }

  fn fault_armed(&self, point: FaultPoint) -> bool {
    self.faults.lock().contains(&point)
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn begin(&self) -> StoreResult<Box<dyn StoreTransaction>> {
    Ok(Box::new(MemoryTransaction::new(self.clone())))
  }

  async fn ping(&self) -> StoreResult<()> {
    Ok(())
  }

  async fn product(&self, product_id: Uuid) -> StoreResult<Option<Product>> {
    Ok(self.tables.lock().products.get(&product_id).cloned())
  }

  async fn list_products(&self) -> StoreResult<Vec<Product>> {
    let mut products: Vec<Product> = self.tables.lock().products.values().cloned().collect();
    products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
    Ok(products)
  }

  async fn order(&self, order_id: Uuid) -> StoreResult<Option<OrderWithItems>> {
    Ok(self.tables.lock().order_with_items(order_id))
  }

  async fn orders_for_buyer(&self, buyer_id: BuyerId) -> StoreResult<Vec<OrderWithItems>> {
    let tables = self.tables.lock();
    let mut orders: Vec<OrderWithItems> = tables
      .orders
      .values()
      .filter(|order| order.buyer_id == buyer_id)
      .filter_map(|order| tables.order_with_items(order.id))
      .collect();
    orders.sort_by(|a, b| b.order.created_at.cmp(&a.order.created_at));
    Ok(orders)
  }

  async fn has_prior_purchase_from_seller(
    &self,
    buyer_id: BuyerId,
    seller_id: Uuid,
    excluding_order: Uuid,
  ) -> StoreResult<bool> {
    let tables = self.tables.lock();
    Ok(tables.order_items.iter().any(|item| {
      item.seller_id == seller_id
        && item.order_id != excluding_order
        && tables
          .orders
          .get(&item.order_id)
          .is_some_and(|order| order.buyer_id == buyer_id)
    }))
  }
}

pub struct MemoryTransaction {
  store: MemoryStore,
  guards: Vec<(Arc<RowLocks>, Uuid, OwnedMutexGuard<()>)>,
  locked_products: HashSet<Uuid>,
  locked_orders: HashSet<Uuid>,
  new_orders: Vec<Order>,
  new_items: Vec<OrderItem>,
  stock_deltas: HashMap<Uuid, i32>,
  status_updates: HashMap<Uuid, (OrderStatus, PaymentStatus)>,
}

impl MemoryTransaction {
  fn new(store: MemoryStore) -> Self {
    Self {
      store,
      guards: Vec::new(),
      locked_products: HashSet::new(),
      locked_orders: HashSet::new(),
      new_orders: Vec::new(),
      new_items: Vec::new(),
      stock_deltas: HashMap::new(),
      status_updates: HashMap::new(),
    }
  }

  fn check_fault(&self, point: FaultPoint, operation: &str) -> StoreResult<()> {
    if self.store.fault_armed(point) {
      event!(Level::WARN, ?point, operation, "Injected store fault triggered.");
      return Err(StoreError::backend(
        operation,
        anyhow::anyhow!("injected fault at {:?}", point),
      ));
    }
    Ok(())
  }

  async fn acquire(&mut self, registry: &Arc<RowLocks>, row_id: Uuid, operation: &str) -> StoreResult<()> {
    let handle = registry.handle(row_id);
    match tokio::time::timeout(self.store.lock_timeout, handle.lock_owned()).await {
      Ok(guard) => {
        self.guards.push((registry.clone(), row_id, guard));
        Ok(())
      }
      Err(_) => {
        registry.release(row_id);
        event!(Level::WARN, %row_id, operation, "Row lock wait timed out.");
        Err(StoreError::LockTimeout {
          operation: operation.to_string(),
        })
      }
    }
  }

  /// Committed row with this transaction's staged stock changes applied.
  fn visible_product(&self, product_id: Uuid) -> Option<Product> {
    let mut product = self.store.tables.lock().products.get(&product_id).cloned()?;
    if let Some(delta) = self.stock_deltas.get(&product_id) {
      product.stock_quantity += delta;
    }
    Some(product)
  }

  fn visible_order(&self, order_id: Uuid) -> Option<OrderWithItems> {
    let mut found = match self.new_orders.iter().find(|o| o.id == order_id) {
      Some(order) => OrderWithItems {
        order: order.clone(),
        items: self.new_items.iter().filter(|i| i.order_id == order_id).cloned().collect(),
      },
      None => self.store.tables.lock().order_with_items(order_id)?,
    };
    if let Some((status, payment_status)) = self.status_updates.get(&order_id) {
      found.order.status = *status;
      found.order.payment_status = *payment_status;
    }
    Some(found)
  }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
  async fn lock_products_for_update(&mut self, product_ids: &[Uuid]) -> StoreResult<Vec<Product>> {
    self.check_fault(FaultPoint::LockProducts, "lock_products_for_update")?;
    let registry = self.store.product_locks.clone();
    let mut rows = Vec::with_capacity(product_ids.len());
    for product_id in product_ids {
      if self.locked_products.insert(*product_id) {
        if let Err(e) = self.acquire(&registry, *product_id, "lock_products_for_update").await {
          self.locked_products.remove(product_id);
          return Err(e);
        }
      }
      if let Some(product) = self.visible_product(*product_id) {
        rows.push(product);
      }
    }
    Ok(rows)
  }

  async fn adjust_stock(&mut self, product_id: Uuid, delta: i32) -> StoreResult<i32> {
    self.check_fault(FaultPoint::AdjustStock, "adjust_stock")?;
    if !self.locked_products.contains(&product_id) {
      return Err(StoreError::backend(
        "adjust_stock",
        anyhow::anyhow!("product {} is not locked by this transaction", product_id),
      ));
    }
    let current = self
      .visible_product(product_id)
      .ok_or_else(|| StoreError::backend("adjust_stock", anyhow::anyhow!("product {} vanished", product_id)))?;
    let updated = current
      .stock_quantity
      .checked_add(delta)
      .filter(|qty| *qty >= 0)
      .ok_or_else(|| StoreError::ConstraintViolation {
        operation: "adjust_stock".to_string(),
        message: format!(
          "stock for product {} would become {} + {}",
          product_id, current.stock_quantity, delta
        ),
      })?;
    *self.stock_deltas.entry(product_id).or_insert(0) += delta;
    Ok(updated)
  }

  async fn find_order_by_idempotency_key(
    &mut self,
    buyer_id: BuyerId,
    idempotency_key: &str,
  ) -> StoreResult<Option<OrderWithItems>> {
    let matches = |order: &Order| order.buyer_id == buyer_id && order.idempotency_key.as_deref() == Some(idempotency_key);
    if let Some(order) = self.new_orders.iter().find(|o| matches(o)) {
      return Ok(self.visible_order(order.id));
    }
    let tables = self.store.tables.lock();
    Ok(
      tables
        .orders
        .values()
        .find(|o| matches(o))
        .and_then(|order| tables.order_with_items(order.id)),
    )
  }

  async fn lock_order_for_update(&mut self, order_id: Uuid) -> StoreResult<Option<OrderWithItems>> {
    if self.locked_orders.insert(order_id) {
      let registry = self.store.order_locks.clone();
      if let Err(e) = self.acquire(&registry, order_id, "lock_order_for_update").await {
        self.locked_orders.remove(&order_id);
        return Err(e);
      }
    }
    Ok(self.visible_order(order_id))
  }

  async fn insert_order(&mut self, order: &Order) -> StoreResult<()> {
    self.check_fault(FaultPoint::InsertOrder, "insert_order")?;
    self.new_orders.push(order.clone());
    // New rows are invisible to others until commit, but this transaction owns them.
    self.locked_orders.insert(order.id);
    Ok(())
  }

  async fn insert_order_item(&mut self, item: &OrderItem) -> StoreResult<()> {
    self.check_fault(FaultPoint::InsertOrderItem, "insert_order_item")?;
    if !self.new_orders.iter().any(|o| o.id == item.order_id) {
      return Err(StoreError::ConstraintViolation {
        operation: "insert_order_item".to_string(),
        message: format!("order {} does not exist in this transaction", item.order_id),
      });
    }
    self.new_items.push(item.clone());
    Ok(())
  }

  async fn update_order_status(
    &mut self,
    order_id: Uuid,
    status: OrderStatus,
    payment_status: PaymentStatus,
  ) -> StoreResult<()> {
    if !self.locked_orders.contains(&order_id) {
      return Err(StoreError::backend(
        "update_order_status",
        anyhow::anyhow!("order {} is not locked by this transaction", order_id),
      ));
    }
    self.status_updates.insert(order_id, (status, payment_status));
    Ok(())
  }

  async fn commit(self: Box<Self>) -> StoreResult<()> {
    self.check_fault(FaultPoint::Commit, "commit")?;
    let now = Utc::now();
    {
      let mut tables = self.store.tables.lock();

      for order in &self.new_orders {
        let Some(key) = order.idempotency_key.as_deref() else {
          continue;
        };
        let duplicate = tables
          .orders
          .values()
          .any(|o| o.buyer_id == order.buyer_id && o.idempotency_key.as_deref() == Some(key));
        if duplicate {
          return Err(StoreError::Conflict {
            operation: "commit".to_string(),
            message: format!("idempotency key '{}' already used by buyer {}", key, order.buyer_id),
          });
        }
      }

      for (product_id, delta) in &self.stock_deltas {
        let stock = tables.products.get(product_id).map(|p| p.stock_quantity).unwrap_or(0);
        if stock + delta < 0 {
          return Err(StoreError::ConstraintViolation {
            operation: "commit".to_string(),
            message: format!("stock for product {} would become negative", product_id),
          });
        }
      }

      for (product_id, delta) in &self.stock_deltas {
        if let Some(product) = tables.products.get_mut(product_id) {
          product.stock_quantity += delta;
          product.updated_at = now;
        }
      }
      for order in &self.new_orders {
        tables.orders.insert(order.id, order.clone());
      }
      tables.order_items.extend(self.new_items.iter().cloned());
      for (order_id, (status, payment_status)) in &self.status_updates {
        if let Some(order) = tables.orders.get_mut(order_id) {
          order.status = *status;
          order.payment_status = *payment_status;
          order.updated_at = now;
        }
      }
    }
    event!(
      Level::TRACE,
      orders = self.new_orders.len(),
      items = self.new_items.len(),
      stock_changes = self.stock_deltas.len(),
      "In-memory transaction committed."
    );
    // Row locks are released when `self` (and its guards) drops here.
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> StoreResult<()> {
    event!(Level::TRACE, locks = self.guards.len(), "In-memory transaction rolled back.");
    Ok(())
  }
}

impl Drop for MemoryTransaction {
  fn drop(&mut self) {
    for (registry, row_id, guard) in self.guards.drain(..) {
      drop(guard);
      registry.release(row_id);
    }
  }
}

/// In-memory notification inbox with a switch to simulate write failures.
#[derive(Default)]
pub struct MemoryNotificationStore {
  rows: Mutex<Vec<Notification>>,
  fail_writes: AtomicBool,
}

impl MemoryNotificationStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }

  pub fn all(&self) -> Vec<Notification> {
    self.rows.lock().clone()
  }
}

#[async_trait]
impl NotificationStore for MemoryNotificationStore {
  async fn insert(&self, notification: &Notification) -> StoreResult<()> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(StoreError::Unavailable {
        operation: "insert_notification".to_string(),
        message: "notification writes disabled".to_string(),
      });
    }
    self.rows.lock().push(notification.clone());
    Ok(())
  }

  async fn list_for(&self, recipient_id: Uuid, unread_only: bool) -> StoreResult<Vec<Notification>> {
    let mut found: Vec<Notification> = self
      .rows
      .lock()
      .iter()
      .filter(|n| n.recipient_id == recipient_id && (!unread_only || !n.is_read))
      .cloned()
      .collect();
    found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(found)
  }

  async fn unread_count(&self, recipient_id: Uuid) -> StoreResult<i64> {
    let count = self
      .rows
      .lock()
      .iter()
      .filter(|n| n.recipient_id == recipient_id && !n.is_read)
      .count();
    Ok(count as i64)
  }

  async fn mark_read(&self, notification_id: Uuid, recipient_id: Uuid) -> StoreResult<bool> {
    let mut rows = self.rows.lock();
    match rows
      .iter_mut()
      .find(|n| n.id == notification_id && n.recipient_id == recipient_id)
    {
      Some(n) => {
        n.is_read = true;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  async fn delete(&self, notification_id: Uuid, recipient_id: Uuid) -> StoreResult<bool> {
    let mut rows = self.rows.lock();
    let before = rows.len();
    rows.retain(|n| !(n.id == notification_id && n.recipient_id == recipient_id));
    Ok(rows.len() != before)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn product(stock: i32) -> Product {
    Product::new(Uuid::new_v4(), "Widget", 1000, stock)
  }

  #[tokio::test]
  async fn dropped_transaction_leaves_no_trace() {
    let store = MemoryStore::new();
    let id = store.insert_product(product(3));
    {
      let mut tx = store.begin().await.unwrap();
      tx.lock_products_for_update(&[id]).await.unwrap();
      assert_eq!(tx.adjust_stock(id, -2).await.unwrap(), 1);
    }
    assert_eq!(store.stock_of(id), Some(3));
  }

  #[tokio::test]
  async fn stock_cannot_go_negative() {
    let store = MemoryStore::new();
    let id = store.insert_product(product(1));
    let mut tx = store.begin().await.unwrap();
    tx.lock_products_for_update(&[id]).await.unwrap();
    let err = tx.adjust_stock(id, -2).await.unwrap_err();
    assert!(matches!(err, StoreError::ConstraintViolation { .. }));
  }

  #[tokio::test]
  async fn adjusting_unlocked_row_is_refused() {
    let store = MemoryStore::new();
    let id = store.insert_product(product(5));
    let mut tx = store.begin().await.unwrap();
    assert!(tx.adjust_stock(id, -1).await.is_err());
  }

  #[tokio::test]
  async fn second_locker_times_out_while_row_is_held() {
    let store = MemoryStore::new().with_lock_timeout(Duration::from_millis(50));
    let id = store.insert_product(product(5));
    let mut holder = store.begin().await.unwrap();
    holder.lock_products_for_update(&[id]).await.unwrap();

    let mut waiter = store.begin().await.unwrap();
    let err = waiter.lock_products_for_update(&[id]).await.unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout { .. }));

    holder.rollback().await.unwrap();
    assert_eq!(waiter.lock_products_for_update(&[id]).await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn row_lock_handles_are_forgotten_when_transactions_end() {
    let store = MemoryStore::new().with_lock_timeout(Duration::from_millis(50));
    let id = store.insert_product(product(5));
    let unknown = [Uuid::new_v4(), Uuid::new_v4()];

    let mut holder = store.begin().await.unwrap();
    holder.lock_products_for_update(&[id, unknown[0], unknown[1]]).await.unwrap();
    holder.lock_order_for_update(Uuid::new_v4()).await.unwrap();
    assert_eq!(store.tracked_row_locks(), 4);

    // A waiter that gives up must not leave the handle pinned either.
    let mut waiter = store.begin().await.unwrap();
    assert!(waiter.lock_products_for_update(&[id]).await.is_err());
    drop(waiter);

    holder.rollback().await.unwrap();
    assert_eq!(store.tracked_row_locks(), 0);

    let mut tx = store.begin().await.unwrap();
    tx.lock_products_for_update(&[id]).await.unwrap();
    tx.adjust_stock(id, -1).await.unwrap();
    tx.commit().await.unwrap();
    assert_eq!(store.tracked_row_locks(), 0);
    assert_eq!(store.stock_of(id), Some(4));
  }

  #[tokio::test]
  async fn notification_store_scopes_reads_to_recipient() {
    use crate::model::{NotificationKind, NotificationPriority, RecipientRole};

    let inbox = MemoryNotificationStore::new();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();
    let note = Notification::new(
      alice,
      RecipientRole::Buyer,
      NotificationKind::OrderConfirmed,
      NotificationPriority::Normal,
      "Order confirmed",
      "Thanks",
    );
    inbox.insert(&note).await.unwrap();

    assert_eq!(inbox.unread_count(alice).await.unwrap(), 1);
    assert!(!inbox.mark_read(note.id, bob).await.unwrap());
    assert!(inbox.mark_read(note.id, alice).await.unwrap());
    assert_eq!(inbox.list_for(alice, true).await.unwrap().len(), 0);
    assert!(!inbox.delete(note.id, bob).await.unwrap());
    assert!(inbox.delete(note.id, alice).await.unwrap());
    assert!(inbox.list_for(alice, false).await.unwrap().is_empty());
  }
}
