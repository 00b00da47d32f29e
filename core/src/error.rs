// storekeep/src/error.rs
use anyhow::Error as AnyhowError;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Failures raised by the storage substrate (Postgres or the in-memory store).
///
/// These are infrastructure errors: the transaction they occur in is always rolled back,
/// and most of them are safe for the caller to retry.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Timed out waiting for a row lock during '{operation}'")]
  LockTimeout { operation: String },

  #[error("Deadlock detected during '{operation}'")]
  Deadlock { operation: String },

  #[error("Conflicting concurrent write during '{operation}': {message}")]
  Conflict { operation: String, message: String },

  #[error("Constraint violated during '{operation}': {message}")]
  ConstraintViolation { operation: String, message: String },

  #[error("Store unavailable during '{operation}': {message}")]
  Unavailable { operation: String, message: String },

  #[error("Store backend failure during '{operation}'. Source: {source}")]
  Backend {
    operation: String,
    #[source]
    source: AnyhowError,
  },
}

impl StoreError {
  pub fn backend(operation: &str, source: impl Into<AnyhowError>) -> Self {
    StoreError::Backend {
      operation: operation.to_string(),
      source: source.into(),
    }
  }

  /// Whether re-running the whole unit of work may succeed.
  pub fn is_retriable(&self) -> bool {
    matches!(
      self,
      StoreError::LockTimeout { .. }
        | StoreError::Deadlock { .. }
        | StoreError::Conflict { .. }
        | StoreError::Unavailable { .. }
    )
  }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Coarse classification used by callers to choose a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
  /// Rejected before any lock was taken.
  Validation,
  /// Detected under lock; the transaction was rolled back.
  BusinessRule,
  NotFound,
  /// Lock timeout, connection loss, commit failure. Retriable at the caller's discretion.
  Infrastructure,
}

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("Order must contain at least one item")]
  EmptyOrder,

  #[error("Invalid quantity {quantity} for product {product_id}: {reason}")]
  InvalidQuantity {
    product_id: Uuid,
    quantity: i64,
    reason: &'static str,
  },

  #[error("Product not found: {product_id}")]
  ProductNotFound { product_id: Uuid },

  #[error("Insufficient stock for product {product_id}: {available} available, {requested} requested")]
  InsufficientStock {
    product_id: Uuid,
    available: i32,
    requested: i32,
  },

  #[error("Product {product_id} is in an invalid state: {reason}")]
  InvalidProductState { product_id: Uuid, reason: String },

  #[error("Computed order total is invalid ({})", describe_total(.total_cents))]
  InvalidTotal { total_cents: Option<i64> },

  #[error("Order not found: {order_id}")]
  OrderNotFound { order_id: Uuid },

  #[error("Order {order_id} cannot move from {from} to {to}")]
  InvalidStatusTransition { order_id: Uuid, from: String, to: String },

  #[error(transparent)]
  Store(#[from] StoreError),
}

impl EngineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      EngineError::EmptyOrder | EngineError::InvalidQuantity { .. } => ErrorKind::Validation,
      EngineError::ProductNotFound { .. }
      | EngineError::InsufficientStock { .. }
      | EngineError::InvalidProductState { .. }
      | EngineError::InvalidTotal { .. }
      | EngineError::InvalidStatusTransition { .. } => ErrorKind::BusinessRule,
      EngineError::OrderNotFound { .. } => ErrorKind::NotFound,
      EngineError::Store(_) => ErrorKind::Infrastructure,
    }
  }

  /// Stable machine-readable identifier, e.g. `insufficient_stock`.
  pub fn code(&self) -> &'static str {
    match self {
      EngineError::EmptyOrder => "empty_order",
      EngineError::InvalidQuantity { .. } => "invalid_quantity",
      EngineError::ProductNotFound { .. } => "product_not_found",
      EngineError::InsufficientStock { .. } => "insufficient_stock",
      EngineError::InvalidProductState { .. } => "invalid_product_state",
      EngineError::InvalidTotal { .. } => "invalid_total",
      EngineError::OrderNotFound { .. } => "order_not_found",
      EngineError::InvalidStatusTransition { .. } => "invalid_status_transition",
      EngineError::Store(StoreError::LockTimeout { .. }) => "lock_timeout",
      EngineError::Store(StoreError::Deadlock { .. }) => "deadlock",
      EngineError::Store(StoreError::Conflict { .. }) => "conflict",
      EngineError::Store(StoreError::ConstraintViolation { .. }) => "constraint_violation",
      EngineError::Store(StoreError::Unavailable { .. }) => "store_unavailable",
      EngineError::Store(StoreError::Backend { .. }) => "store_failure",
    }
  }

  pub fn is_retriable(&self) -> bool {
    match self {
      EngineError::Store(e) => e.is_retriable(),
      _ => false,
    }
  }

  pub fn details(&self) -> Value {
    match self {
      EngineError::EmptyOrder => json!({}),
      EngineError::InvalidQuantity { product_id, quantity, .. } => {
        json!({ "productId": product_id, "quantity": quantity })
      }
      EngineError::ProductNotFound { product_id } => json!({ "productId": product_id }),
      EngineError::InsufficientStock {
        product_id,
        available,
        requested,
      } => json!({ "productId": product_id, "available": available, "requested": requested }),
      EngineError::InvalidProductState { product_id, reason } => {
        json!({ "productId": product_id, "reason": reason })
      }
      EngineError::InvalidTotal { total_cents } => json!({ "totalCents": total_cents }),
      EngineError::OrderNotFound { order_id } => json!({ "orderId": order_id }),
      EngineError::InvalidStatusTransition { order_id, from, to } => {
        json!({ "orderId": order_id, "from": from, "to": to })
      }
      EngineError::Store(_) => json!({ "retriable": self.is_retriable() }),
    }
  }

  pub fn to_body(&self) -> ErrorBody {
    ErrorBody {
      kind: self.code(),
      category: self.kind(),
      message: self.to_string(),
      details: self.details(),
      retriable: self.is_retriable(),
    }
  }
}

/// Structured error returned to the API layer: `{kind, message, details}`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
  pub kind: &'static str,
  pub category: ErrorKind,
  pub message: String,
  pub details: Value,
  pub retriable: bool,
}

pub type EngineResult<T, E = EngineError> = std::result::Result<T, E>;

fn describe_total(total_cents: &Option<i64>) -> String {
  match total_cents {
    Some(total) => format!("{} cents", total),
    None => "overflow".to_string(),
  }
}

#[derive(Debug, Error)]
pub enum FanOutError {
  #[error("Failed to persist notification for recipient {recipient_id}. Source: {source}")]
  Persist {
    recipient_id: Uuid,
    #[source]
    source: StoreError,
  },

  #[error("Failed to push event to recipient {recipient_id}: {message}")]
  Push { recipient_id: Uuid, message: String },

  #[error("Failed to look up purchase history for buyer {buyer_id}. Source: {source}")]
  History {
    buyer_id: Uuid,
    #[source]
    source: StoreError,
  },
}
