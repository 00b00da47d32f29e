// src/lib.rs

//! Storekeep: order placement and inventory consistency for a multi-seller marketplace.
//!
//! Storekeep turns a buyer's cart into a durable order while other buyers compete for the
//! same stock:
//!  - Product rows are locked `FOR UPDATE` in ascending id order before stock is checked.
//!  - The order, its items and every stock decrement commit together or not at all.
//!  - Unit prices are snapshotted under lock and never change afterwards.
//!  - Seller and buyer notifications are produced after commit and can never undo it.
//!
//! Storage sits behind the [`Store`] and [`NotificationStore`] traits, with a Postgres
//! backend for production and an in-memory backend that honours the same locking contract.

pub mod config;
pub mod coordinator;
pub mod error;
pub mod fanout;
pub mod lifecycle;
pub mod model;
pub mod placement;
pub mod store;

// --- Re-exports for the Public API ---

pub use crate::config::{DispatchMode, EngineConfig};
pub use crate::coordinator::{lock_rows_for_update, TransactionCoordinator};
pub use crate::error::{EngineError, EngineResult, ErrorBody, ErrorKind, FanOutError, StoreError, StoreResult};
pub use crate::fanout::{
  BroadcastHub, DiscardEvents, FanOutReport, NotificationFanOut, OrderEventSink, OrderPlaced, PushChannel, PushEvent,
};
pub use crate::lifecycle::OrderLifecycle;
pub use crate::model::{
  BuyerId, Notification, NotificationKind, NotificationPriority, Order, OrderItem, OrderLine, OrderReceipt,
  OrderStatus, OrderWithItems, PaymentStatus, PlaceOrderRequest, Product, RecipientRole,
};
pub use crate::placement::{OrderPlacementEngine, PlacedOrder};
pub use crate::store::memory::{MemoryNotificationStore, MemoryStore};
pub use crate::store::postgres::{PgNotificationStore, PgStore};
pub use crate::store::{NotificationStore, Store, StoreTransaction};
