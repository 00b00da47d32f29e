// storefront/src/web/handlers/auth.rs

use actix_web::{FromRequest, HttpRequest};
use storekeep::BuyerId;
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;

pub const USER_ID_HEADER: &str = "X-User-ID";

/// Identity resolved by the upstream gateway and forwarded in `X-User-ID`.
///
/// The same identity acts as buyer on order routes and as seller or buyer on inbox routes.
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
}

impl AuthenticatedUser {
  pub fn buyer_id(&self) -> BuyerId {
    BuyerId::from_authenticated(self.user_id)
  }
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = futures_util::future::Ready<Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
    let parsed = req
      .headers()
      .get(USER_ID_HEADER)
      .and_then(|value| value.to_str().ok())
      .and_then(|raw| Uuid::parse_str(raw.trim()).ok());

    match parsed {
      Some(user_id) => futures_util::future::ready(Ok(AuthenticatedUser { user_id })),
      None => {
        warn!("AuthenticatedUser extractor: Missing or invalid X-User-ID header.");
        futures_util::future::ready(Err(AppError::Auth(
          "User authentication required. Missing or invalid X-User-ID header.".to_string(),
        )))
      }
    }
  }
}
