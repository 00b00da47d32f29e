// storefront/src/web/test_support.rs

use actix_web::body::MessageBody;
use actix_web::dev::{ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{web, App, Error};
use std::sync::Arc;
use storekeep::{BroadcastHub, EngineConfig, MemoryNotificationStore, MemoryStore, Product};
use uuid::Uuid;

use crate::state::AppState;
use crate::web::configure_app_routes;

/// Application state over in-memory stores, with fan-out running inline so that
/// notifications are visible as soon as a request returns.
pub struct TestApp {
  pub state: AppState,
  pub store: MemoryStore,
  pub inbox: Arc<MemoryNotificationStore>,
  pub payment_service_id: Uuid,
}

impl TestApp {
  pub fn new() -> Self {
    let fixture = Self::without_payment_service();
    let payment_service_id = fixture.payment_service_id;
    Self {
      state: fixture.state.with_payment_service(Some(payment_service_id)),
      ..fixture
    }
  }

  /// Payment callbacks are refused for every caller.
  pub fn without_payment_service() -> Self {
    let store = MemoryStore::new();
    let inbox = Arc::new(MemoryNotificationStore::new());
    let state = AppState::assemble(
      Arc::new(store.clone()),
      inbox.clone(),
      BroadcastHub::default(),
      &EngineConfig::default(),
    );
    Self {
      state,
      store,
      inbox,
      payment_service_id: Uuid::new_v4(),
    }
  }

  pub fn add_product(&self, seller_id: Uuid, name: &str, price_cents: i64, stock: i32) -> Uuid {
    self.store.insert_product(Product::new(seller_id, name, price_cents, stock))
  }

  pub fn app(
    &self,
  ) -> App<
    impl ServiceFactory<
      ServiceRequest,
      Config = (),
      Response = ServiceResponse<impl MessageBody>,
      Error = Error,
      InitError = (),
    >,
  > {
    App::new()
      .app_data(web::Data::new(self.state.clone()))
      .configure(configure_app_routes)
  }
}
