// storekeep/src/lifecycle.rs

//! Transitions of an order after placement: cancellation with stock restore, fulfilment
//! progress, and payment outcome.
//!
//! Each transition locks the order row first and, when stock moves, the product rows in
//! ascending id order afterwards. Placement never locks existing orders, so the two paths
//! cannot wait on each other in a cycle.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::coordinator::{lock_rows_for_update, TransactionCoordinator};
use crate::error::{EngineError, EngineResult};
use crate::fanout::{EventDispatcher, LineSnapshot, OrderCancelled, OrderEvent, OrderEventSink, OrderStatusChanged};
use crate::model::{BuyerId, Order, OrderStatus, OrderWithItems, PaymentStatus};
use crate::store::{Store, StoreTransaction};

#[derive(Clone)]
pub struct OrderLifecycle {
  coordinator: TransactionCoordinator,
  dispatcher: EventDispatcher,
}

impl OrderLifecycle {
  pub fn new(store: Arc<dyn Store>, sink: Arc<dyn OrderEventSink>, config: &EngineConfig) -> Self {
    Self {
      coordinator: TransactionCoordinator::new(store),
      dispatcher: EventDispatcher::new(sink, config.dispatch),
    }
  }

  /// Cancels a pending or processing order and puts its stock back.
  ///
  /// With `requested_by` set, only that buyer's own orders can be cancelled; anyone else gets
  /// `OrderNotFound`. A paid order becomes refunded.
  #[instrument(name = "OrderLifecycle::cancel_order", skip(self), err(Display))]
  pub async fn cancel_order(&self, order_id: Uuid, requested_by: Option<BuyerId>) -> EngineResult<Order> {
    let (order, lines) = self
      .coordinator
      .with_transaction("cancel_order", move |tx| {
        Box::pin(cancel_in_tx(tx, order_id, requested_by))
      })
      .await?;

    event!(Level::INFO, order_number = %order.order_number, payment_status = %order.payment_status, "Order cancelled.");
    self
      .dispatcher
      .dispatch(OrderEvent::Cancelled(OrderCancelled {
        order_id: order.id,
        order_number: order.order_number.clone(),
        buyer_id: order.buyer_id,
        refunded: order.payment_status == PaymentStatus::Refunded,
        lines,
      }))
      .await;
    Ok(order)
  }

  /// Moves an order forward: `pending -> processing -> delivered`.
  #[instrument(name = "OrderLifecycle::advance_status", skip(self), err(Display))]
  pub async fn advance_status(&self, order_id: Uuid, next: OrderStatus) -> EngineResult<Order> {
    let (order, from) = self
      .coordinator
      .with_transaction("advance_status", move |tx| {
        Box::pin(async move {
          let mut order = locked_order(tx, order_id).await?.order;
          let from = order.status;
          if !from.can_advance_to(next) {
            return Err(EngineError::InvalidStatusTransition {
              order_id,
              from: from.to_string(),
              to: next.to_string(),
            });
          }
          tx.update_order_status(order_id, next, order.payment_status).await?;
          order.status = next;
          Ok((order, from))
        })
      })
      .await?;

    event!(Level::INFO, %from, to = %order.status, "Order status advanced.");
    self
      .dispatcher
      .dispatch(OrderEvent::StatusChanged(OrderStatusChanged {
        order_id: order.id,
        order_number: order.order_number.clone(),
        buyer_id: order.buyer_id,
        from,
        to: order.status,
      }))
      .await;
    Ok(order)
  }

  /// Records the payment provider's verdict. Only a pending payment on a live order moves,
  /// and only to `paid` or `failed`.
  #[instrument(name = "OrderLifecycle::record_payment", skip(self), err(Display))]
  pub async fn record_payment(&self, order_id: Uuid, outcome: PaymentStatus) -> EngineResult<Order> {
    self
      .coordinator
      .with_transaction("record_payment", move |tx| {
        Box::pin(async move {
          let mut order = locked_order(tx, order_id).await?.order;
          let allowed = matches!(outcome, PaymentStatus::Paid | PaymentStatus::Failed)
            && order.payment_status == PaymentStatus::Pending
            && order.status != OrderStatus::Cancelled;
          if !allowed {
            return Err(EngineError::InvalidStatusTransition {
              order_id,
              from: format!("{}/{}", order.status, order.payment_status),
              to: format!("payment {}", outcome),
            });
          }
          tx.update_order_status(order_id, order.status, outcome).await?;
          order.payment_status = outcome;
          Ok(order)
        })
      })
      .await
  }
}

async fn locked_order(tx: &mut dyn StoreTransaction, order_id: Uuid) -> EngineResult<OrderWithItems> {
  tx.lock_order_for_update(order_id)
    .await?
    .ok_or(EngineError::OrderNotFound { order_id })
}

async fn cancel_in_tx(
  tx: &mut dyn StoreTransaction,
  order_id: Uuid,
  requested_by: Option<BuyerId>,
) -> EngineResult<(Order, Vec<LineSnapshot>)> {
  let OrderWithItems { mut order, mut items } = locked_order(tx, order_id).await?;

  if requested_by.map_or(false, |buyer| buyer != order.buyer_id) {
    return Err(EngineError::OrderNotFound { order_id });
  }
  if !order.status.is_cancellable() {
    return Err(EngineError::InvalidStatusTransition {
      order_id,
      from: order.status.to_string(),
      to: OrderStatus::Cancelled.to_string(),
    });
  }

  let ids: BTreeSet<Uuid> = items.iter().map(|i| i.product_id).collect();
  let locked = lock_rows_for_update(tx, &ids).await?;

  items.sort_by_key(|i| i.product_id);
  let mut lines = Vec::with_capacity(items.len());
  for item in &items {
    let product = locked.get(&item.product_id).ok_or(EngineError::ProductNotFound {
      product_id: item.product_id,
    })?;
    let stock_after = tx.adjust_stock(item.product_id, item.quantity).await?;
    lines.push(LineSnapshot {
      seller_id: item.seller_id,
      product_id: item.product_id,
      product_name: product.name.clone(),
      quantity: item.quantity,
      unit_price_cents: item.unit_price_cents,
      stock_after,
    });
  }

  let payment_status = order.payment_status.after_cancellation();
  tx.update_order_status(order_id, OrderStatus::Cancelled, payment_status).await?;
  order.status = OrderStatus::Cancelled;
  order.payment_status = payment_status;
  Ok((order, lines))
}
