// storefront/src/web/routes.rs

use actix_web::{web, HttpResponse};
use serde_json::json;

use crate::errors::AppError;
use crate::state::AppState;
use crate::web::handlers::{notification_handlers, order_handlers, product_handlers};

/// Reports whether the store answers a trivial round trip.
async fn health_check_handler(app_state: web::Data<AppState>) -> HttpResponse {
  match app_state.store.ping().await {
    Ok(_) => HttpResponse::Ok().json(json!({ "status": "ok" })),
    Err(e) => {
      tracing::warn!(error = %e, "Health check failed to reach the store.");
      HttpResponse::ServiceUnavailable().json(json!({ "status": "degraded", "detail": e.to_string() }))
    }
  }
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  // Malformed bodies and query strings share the application's error shape.
  cfg
    .app_data(web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()));

  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      // Catalog (read-only)
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler)),
      )
      // Orders
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::place_order_handler))
          .route("", web::get().to(order_handlers::list_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}/cancel", web::post().to(order_handlers::cancel_order_handler))
          .route("/{order_id}/status", web::patch().to(order_handlers::update_status_handler))
          .route("/{order_id}/payment", web::post().to(order_handlers::record_payment_handler)),
      )
      // Inbox and live stream. Literal segments are registered before `{id}` routes.
      .service(
        web::scope("/notifications")
          .route("", web::get().to(notification_handlers::list_notifications_handler))
          .route("/unread-count", web::get().to(notification_handlers::unread_count_handler))
          .route("/stream", web::get().to(notification_handlers::stream_notifications_handler))
          .route("/{notification_id}/read", web::post().to(notification_handlers::mark_read_handler))
          .route(
            "/{notification_id}",
            web::delete().to(notification_handlers::delete_notification_handler),
          ),
      ),
  );
}
