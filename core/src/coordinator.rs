// storekeep/src/coordinator.rs

//! Runs a unit of work inside one store transaction and owns the locking discipline.

use futures_util::future::BoxFuture;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{event, instrument, Level};
use uuid::Uuid;

use crate::error::EngineResult;
use crate::model::Product;
use crate::store::{Store, StoreTransaction};

#[derive(Clone)]
pub struct TransactionCoordinator {
  store: Arc<dyn Store>,
}

impl TransactionCoordinator {
  pub fn new(store: Arc<dyn Store>) -> Self {
    Self { store }
  }

  /// Opens a transaction, hands it to `work`, and commits when `work` returns `Ok`.
  ///
  /// Any `Err` from `work` rolls the transaction back before the error is returned. If the
  /// rollback itself fails, the original error is still the one returned.
  #[instrument(name = "TransactionCoordinator::with_transaction", skip(self, work), err(Display))]
  pub async fn with_transaction<T, F>(&self, operation: &'static str, work: F) -> EngineResult<T>
  where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn StoreTransaction) -> BoxFuture<'t, EngineResult<T>> + Send,
  {
    let mut tx = self.store.begin().await?;
    event!(Level::TRACE, "Transaction opened.");

    let outcome = work(&mut *tx).await;

    match outcome {
      Ok(value) => {
        tx.commit().await?;
        event!(Level::DEBUG, "Transaction committed.");
        Ok(value)
      }
      Err(e) => {
        if let Err(rollback_err) = tx.rollback().await {
          event!(Level::WARN, error = %rollback_err, "Rollback failed; transaction will be discarded.");
        } else {
          event!(Level::DEBUG, error = %e, "Transaction rolled back.");
        }
        Err(e)
      }
    }
  }
}

/// Exclusively locks the given product rows in ascending id order and returns the rows found.
///
/// Every transaction that touches more than one product goes through here so that all of
/// them acquire locks in the same global order.
pub async fn lock_rows_for_update(
  tx: &mut dyn StoreTransaction,
  product_ids: &BTreeSet<Uuid>,
) -> EngineResult<BTreeMap<Uuid, Product>> {
  let ordered: Vec<Uuid> = product_ids.iter().copied().collect();
  let rows = tx.lock_products_for_update(&ordered).await?;
  event!(Level::TRACE, requested = ordered.len(), found = rows.len(), "Product rows locked.");
  Ok(rows.into_iter().map(|p| (p.id, p)).collect())
}
