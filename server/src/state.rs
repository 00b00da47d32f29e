// storefront/src/state.rs

use std::sync::Arc;
use storekeep::{
  BroadcastHub, EngineConfig, NotificationFanOut, NotificationStore, OrderLifecycle, OrderPlacementEngine, Store,
};
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Store>,
  pub notifications: Arc<dyn NotificationStore>,
  pub hub: BroadcastHub,
  pub engine: OrderPlacementEngine,
  pub lifecycle: OrderLifecycle,
  /// Only this identity may report payment outcomes.
  pub payment_service_id: Option<Uuid>,
}

impl AppState {
  /// Wires placement, lifecycle and notification fan-out over one pair of stores.
  pub fn assemble(
    store: Arc<dyn Store>,
    notifications: Arc<dyn NotificationStore>,
    hub: BroadcastHub,
    engine_config: &EngineConfig,
  ) -> Self {
    let fanout = Arc::new(NotificationFanOut::new(
      notifications.clone(),
      Arc::new(hub.clone()),
      store.clone(),
      engine_config.low_stock_threshold,
    ));
    let engine = OrderPlacementEngine::new(store.clone(), fanout.clone(), engine_config);
    let lifecycle = OrderLifecycle::new(store.clone(), fanout, engine_config);

    Self {
      store,
      notifications,
      hub,
      engine,
      lifecycle,
      payment_service_id: None,
    }
  }

  pub fn with_payment_service(mut self, payment_service_id: Option<Uuid>) -> Self {
    self.payment_service_id = payment_service_id;
    self
  }
}
