// storekeep/src/placement.rs

//! Converts a buyer's cart into a committed order.
//!
//! All checks that depend on stock or price happen under the row locks taken by
//! [`lock_rows_for_update`], so two buyers racing for the last unit are serialized by the
//! store and exactly one of them wins. The event for notification fan-out is built from
//! the values read under lock and is handed off only after the commit succeeded.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::coordinator::{lock_rows_for_update, TransactionCoordinator};
use crate::error::{EngineError, EngineResult};
use crate::fanout::{EventDispatcher, LineSnapshot, OrderEvent, OrderEventSink, OrderPlaced};
use crate::model::{BuyerId, Order, OrderItem, OrderLine, OrderReceipt, PlaceOrderRequest};
use crate::store::{Store, StoreTransaction};

/// Result of a successful placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacedOrder {
  pub order: Order,
  pub items: Vec<OrderItem>,
  /// `true` when an idempotency key matched an earlier order and nothing new was written.
  pub replayed: bool,
}

impl PlacedOrder {
  pub fn receipt(&self) -> OrderReceipt {
    self.order.receipt()
  }
}

/// Merges repeated product lines and validates quantities. No locks are taken here.
///
/// The result keeps the order in which each product first appeared.
pub fn aggregate_lines(lines: &[OrderLine]) -> EngineResult<Vec<OrderLine>> {
  if lines.is_empty() {
    return Err(EngineError::EmptyOrder);
  }

  let mut order: Vec<Uuid> = Vec::new();
  let mut sums: HashMap<Uuid, i64> = HashMap::new();
  for line in lines {
    if line.quantity < 1 {
      return Err(EngineError::InvalidQuantity {
        product_id: line.product_id,
        quantity: i64::from(line.quantity),
        reason: "quantity must be at least 1",
      });
    }
    let sum = sums.entry(line.product_id).or_insert_with(|| {
      order.push(line.product_id);
      0
    });
    *sum += i64::from(line.quantity);
  }

  order
    .into_iter()
    .map(|product_id| {
      let total = sums.get(&product_id).copied().unwrap_or_default();
      let quantity = i32::try_from(total).map_err(|_| EngineError::InvalidQuantity {
        product_id,
        quantity: total,
        reason: "combined quantity exceeds the supported maximum",
      })?;
      Ok(OrderLine::new(product_id, quantity))
    })
    .collect()
}

enum Reservation {
  Placed { placed: PlacedOrder, lines: Vec<LineSnapshot> },
  Replayed(PlacedOrder),
}

#[derive(Clone)]
pub struct OrderPlacementEngine {
  coordinator: TransactionCoordinator,
  dispatcher: EventDispatcher,
}

impl OrderPlacementEngine {
  pub fn new(store: Arc<dyn Store>, sink: Arc<dyn OrderEventSink>, config: &EngineConfig) -> Self {
    Self {
      coordinator: TransactionCoordinator::new(store),
      dispatcher: EventDispatcher::new(sink, config.dispatch),
    }
  }

  /// Places an order for an authenticated buyer.
  ///
  /// On `Ok` the order, its items and the stock decrements are committed. On `Err` nothing
  /// was written. Notification fan-out runs after commit and never changes the result.
  #[instrument(
    name = "OrderPlacementEngine::place_order",
    skip_all,
    fields(buyer_id = %request.buyer_id, lines = request.lines.len()),
    err(Display)
  )]
  pub async fn place_order(&self, request: PlaceOrderRequest) -> EngineResult<PlacedOrder> {
    let lines = aggregate_lines(&request.lines)?;
    let buyer_id = request.buyer_id;
    let idempotency_key = request.idempotency_key;

    let reservation = self
      .coordinator
      .with_transaction("place_order", move |tx| {
        Box::pin(reserve_and_record(tx, buyer_id, lines, idempotency_key))
      })
      .await?;

    match reservation {
      Reservation::Replayed(existing) => {
        event!(
          Level::INFO,
          order_id = %existing.order.id,
          "Idempotency key matched an existing order; returning it unchanged."
        );
        Ok(existing)
      }
      Reservation::Placed { placed, lines } => {
        event!(
          Level::INFO,
          order_id = %placed.order.id,
          order_number = %placed.order.order_number,
          total_cents = placed.order.total_cents,
          "Order placed."
        );
        self
          .dispatcher
          .dispatch(OrderEvent::Placed(OrderPlaced {
            order_id: placed.order.id,
            order_number: placed.order.order_number.clone(),
            buyer_id: placed.order.buyer_id,
            total_cents: placed.order.total_cents,
            placed_at: placed.order.created_at,
            lines,
          }))
          .await;
        Ok(placed)
      }
    }
  }
}

async fn reserve_and_record(
  tx: &mut dyn StoreTransaction,
  buyer_id: BuyerId,
  lines: Vec<OrderLine>,
  idempotency_key: Option<String>,
) -> EngineResult<Reservation> {
  if let Some(key) = idempotency_key.as_deref() {
    if let Some(existing) = tx.find_order_by_idempotency_key(buyer_id, key).await? {
      return Ok(Reservation::Replayed(PlacedOrder {
        order: existing.order,
        items: existing.items,
        replayed: true,
      }));
    }
  }

  let ids: BTreeSet<Uuid> = lines.iter().map(|l| l.product_id).collect();
  let locked = lock_rows_for_update(tx, &ids).await?;

  let mut total: i64 = 0;
  for line in &lines {
    let product = locked.get(&line.product_id).ok_or(EngineError::ProductNotFound {
      product_id: line.product_id,
    })?;
    if product.price_cents <= 0 {
      return Err(EngineError::InvalidProductState {
        product_id: product.id,
        reason: format!("price must be positive, found {} cents", product.price_cents),
      });
    }
    if product.stock_quantity < 0 {
      return Err(EngineError::InvalidProductState {
        product_id: product.id,
        reason: format!("stock is negative ({})", product.stock_quantity),
      });
    }
    if product.stock_quantity < line.quantity {
      return Err(EngineError::InsufficientStock {
        product_id: product.id,
        available: product.stock_quantity,
        requested: line.quantity,
      });
    }
    total = product
      .price_cents
      .checked_mul(i64::from(line.quantity))
      .and_then(|line_total| total.checked_add(line_total))
      .ok_or(EngineError::InvalidTotal { total_cents: None })?;
  }
  if total <= 0 {
    return Err(EngineError::InvalidTotal {
      total_cents: Some(total),
    });
  }

  let order = Order::new_pending(buyer_id, total, idempotency_key);
  tx.insert_order(&order).await?;

  let mut items = Vec::with_capacity(lines.len());
  let mut snapshots = Vec::with_capacity(lines.len());
  for line in &lines {
    let product = locked.get(&line.product_id).ok_or(EngineError::ProductNotFound {
      product_id: line.product_id,
    })?;
    let item = OrderItem {
      id: Uuid::new_v4(),
      order_id: order.id,
      product_id: product.id,
      seller_id: product.seller_id,
      quantity: line.quantity,
      unit_price_cents: product.price_cents,
    };
    tx.insert_order_item(&item).await?;
    let stock_after = tx.adjust_stock(product.id, -line.quantity).await?;

    snapshots.push(LineSnapshot {
      seller_id: product.seller_id,
      product_id: product.id,
      product_name: product.name.clone(),
      quantity: line.quantity,
      unit_price_cents: product.price_cents,
      stock_after,
    });
    items.push(item);
  }

  event!(
    Level::DEBUG,
    order_id = %order.id,
    items = items.len(),
    "Order rows written; stock decremented."
  );
  Ok(Reservation::Placed {
    placed: PlacedOrder {
      order,
      items,
      replayed: false,
    },
    lines: snapshots,
  })
}
