// storefront/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use storekeep::{EngineError, ErrorKind, StoreError};
use thiserror::Error;

/// Seconds a client should wait before retrying after a lock timeout or conflict.
const RETRY_AFTER_SECS: &str = "1";

#[derive(Debug, Error)]
pub enum AppError {
  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Forbidden: {0}")]
  Forbidden(String),

  #[error("Resource Not Found: {0}")]
  NotFound(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error(transparent)]
  Engine(#[from] EngineError),
}

impl From<StoreError> for AppError {
  fn from(err: StoreError) -> Self {
    AppError::Engine(EngineError::Store(err))
  }
}

fn engine_status(err: &EngineError) -> StatusCode {
  match err {
    EngineError::InsufficientStock { .. } => StatusCode::CONFLICT,
    _ if err.is_retriable() => StatusCode::SERVICE_UNAVAILABLE,
    _ => match err.kind() {
      ErrorKind::Validation => StatusCode::BAD_REQUEST,
      ErrorKind::BusinessRule => StatusCode::UNPROCESSABLE_ENTITY,
      ErrorKind::NotFound => StatusCode::NOT_FOUND,
      ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    },
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) => StatusCode::UNAUTHORIZED,
      AppError::Forbidden(_) => StatusCode::FORBIDDEN,
      AppError::NotFound(_) => StatusCode::NOT_FOUND,
      AppError::Engine(e) => engine_status(e),
      AppError::Config(_) | AppError::Sqlx(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, "Responding with error");
    } else {
      tracing::info!(application_error = %self, status = status.as_u16(), "Request rejected");
    }

    match self {
      AppError::Engine(e) => {
        let mut builder = HttpResponse::build(status);
        if e.is_retriable() {
          builder.insert_header(("Retry-After", RETRY_AFTER_SECS));
        }
        builder.json(e.to_body())
      }
      AppError::Validation(m) => HttpResponse::BadRequest().json(json!({"kind": "validation", "message": m})),
      AppError::Auth(m) => HttpResponse::Unauthorized().json(json!({"kind": "unauthenticated", "message": m})),
      AppError::Forbidden(m) => HttpResponse::Forbidden().json(json!({"kind": "forbidden", "message": m})),
      AppError::NotFound(m) => HttpResponse::NotFound().json(json!({"kind": "not_found", "message": m})),
      AppError::Config(m) => HttpResponse::InternalServerError()
        .json(json!({"kind": "configuration", "message": "Configuration issue", "detail": m})),
      AppError::Sqlx(_) => {
        HttpResponse::InternalServerError().json(json!({"kind": "database", "message": "Database operation failed"}))
      }
    }
  }
}

// Define a Result type alias for the application
pub type Result<T, E = AppError> = std::result::Result<T, E>;
