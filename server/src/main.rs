// storefront/src/main.rs

mod config;
mod errors;
mod seed;
mod state;
mod web;

use crate::config::{AppConfig, LogFormat};
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use storekeep::store::postgres::apply_schema;
use storekeep::{BroadcastHub, PgNotificationStore, PgStore};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
  let builder = tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_span_events(FmtSpan::CLOSE); // Log when spans close, showing duration

  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> std::io::Error {
  tracing::error!(error = %err, "{}", context);
  std::io::Error::new(std::io::ErrorKind::Other, format!("{}: {}", context, err))
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  init_tracing(LogFormat::from_env());
  tracing::info!("Starting storefront server...");

  let app_config = AppConfig::from_env().map_err(|e| startup_error("Failed to load application configuration", e))?;

  let db_pool = PgPoolOptions::new()
    .max_connections(app_config.database_max_connections)
    .connect(&app_config.database_url)
    .await
    .map_err(|e| startup_error("Failed to connect to the database", e))?;
  tracing::info!(max_connections = app_config.database_max_connections, "Connected to the database.");

  if app_config.apply_schema {
    apply_schema(&db_pool)
      .await
      .map_err(|e| startup_error("Failed to apply schema", e))?;
  }

  if app_config.seed_db {
    let written = seed::seed_catalog(&db_pool)
      .await
      .map_err(|e| startup_error("Failed to seed database", e))?;
    tracing::info!(products = written, "Database seeding finished.");
  }

  let engine_config = app_config.engine_config();
  let app_state = AppState::assemble(
    Arc::new(PgStore::new(db_pool.clone()).with_lock_timeout(app_config.lock_timeout)),
    Arc::new(PgNotificationStore::new(db_pool.clone())),
    BroadcastHub::default(),
    &engine_config,
  )
  .with_payment_service(app_config.payment_service_id);
  tracing::info!(
    lock_timeout_ms = app_config.lock_timeout.as_millis() as u64,
    low_stock_threshold = app_config.low_stock_threshold,
    fanout_mode = %app_config.fanout_mode,
    "Order engine ready."
  );

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}
