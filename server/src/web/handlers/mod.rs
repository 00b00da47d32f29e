// storefront/src/web/handlers/mod.rs

pub mod auth;
pub mod notification_handlers;
pub mod order_handlers;
pub mod product_handlers;

pub use auth::AuthenticatedUser;
