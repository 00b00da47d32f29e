// storekeep/src/model/mod.rs

//! Data structures persisted by the stores and exchanged with callers.

pub mod notification;
pub mod order;
pub mod product;
pub mod request;

pub use notification::{Notification, NotificationKind, NotificationPriority, RecipientRole};
pub use order::{BuyerId, Order, OrderItem, OrderReceipt, OrderStatus, OrderWithItems, PaymentStatus};
pub use product::Product;
pub use request::{OrderLine, PlaceOrderRequest};

/// Renders an amount of cents as a display string, e.g. `1999` -> `$19.99`.
pub fn format_cents(cents: i64) -> String {
  let sign = if cents < 0 { "-" } else { "" };
  let abs = cents.unsigned_abs();
  format!("{}${}.{:02}", sign, abs / 100, abs % 100)
}
