// storefront/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::time::Duration;
use uuid::Uuid;
use storekeep::config::{DEFAULT_LOCK_TIMEOUT, DEFAULT_LOW_STOCK_THRESHOLD};
use storekeep::{DispatchMode, EngineConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

impl LogFormat {
  /// Read before tracing is initialised, so it cannot go through `AppConfig`.
  pub fn from_env() -> Self {
    dotenv().ok();
    match env::var("LOG_FORMAT").as_deref() {
      Ok("json") => LogFormat::Json,
      _ => LogFormat::Pretty,
    }
  }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub database_url: String,
  pub database_max_connections: u32,

  pub lock_timeout: Duration,
  pub low_stock_threshold: i32,
  pub fanout_mode: DispatchMode,

  /// Identity the payment integration authenticates as. Unset disables the payment callback.
  pub payment_service_id: Option<Uuid>,

  // Startup chores
  pub apply_schema: bool,
  pub seed_db: bool,
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok(); // Load .env file if present

    let get_env = |var_name: &str| {
      env::var(var_name).map_err(|e| AppError::Config(format!("Missing environment variable '{}': {}", var_name, e)))
    };
    let parse_flag = |var_name: &str| -> Result<bool> {
      get_env(var_name)
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .map_err(|e| AppError::Config(format!("Invalid {} value: {}", var_name, e)))
    };

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let server_port = get_env("SERVER_PORT")
      .unwrap_or_else(|_| "8080".to_string())
      .parse::<u16>()
      .map_err(|e| AppError::Config(format!("Invalid SERVER_PORT: {}", e)))?;
    let database_url = get_env("DATABASE_URL")?;
    let database_max_connections = get_env("DATABASE_MAX_CONNECTIONS")
      .unwrap_or_else(|_| "10".to_string())
      .parse::<u32>()
      .map_err(|e| AppError::Config(format!("Invalid DATABASE_MAX_CONNECTIONS: {}", e)))?;

    let lock_timeout = match get_env("LOCK_TIMEOUT_MS") {
      Ok(raw) => raw
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| AppError::Config(format!("Invalid LOCK_TIMEOUT_MS: {}", e)))?,
      Err(_) => DEFAULT_LOCK_TIMEOUT,
    };
    let low_stock_threshold = match get_env("LOW_STOCK_THRESHOLD") {
      Ok(raw) => raw
        .parse::<i32>()
        .map_err(|e| AppError::Config(format!("Invalid LOW_STOCK_THRESHOLD: {}", e)))?,
      Err(_) => DEFAULT_LOW_STOCK_THRESHOLD,
    };
    let fanout_mode = get_env("FANOUT_MODE")
      .unwrap_or_else(|_| "background".to_string())
      .parse::<DispatchMode>()
      .map_err(|e| AppError::Config(format!("Invalid FANOUT_MODE: {}", e)))?;

    let payment_service_id = match get_env("PAYMENT_SERVICE_ID") {
      Ok(raw) => Some(
        Uuid::parse_str(raw.trim()).map_err(|e| AppError::Config(format!("Invalid PAYMENT_SERVICE_ID: {}", e)))?,
      ),
      Err(_) => {
        tracing::warn!("PAYMENT_SERVICE_ID not set; payment callbacks will be refused.");
        None
      }
    };

    let apply_schema = parse_flag("APPLY_SCHEMA")?;
    let seed_db = parse_flag("SEED_DB")?;

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      database_url,
      database_max_connections,
      lock_timeout,
      low_stock_threshold,
      fanout_mode,
      payment_service_id,
      apply_schema,
      seed_db,
    })
  }

  pub fn engine_config(&self) -> EngineConfig {
    EngineConfig::default()
      .with_lock_timeout(self.lock_timeout)
      .with_low_stock_threshold(self.low_stock_threshold)
      .with_dispatch(self.fanout_mode)
  }
}
