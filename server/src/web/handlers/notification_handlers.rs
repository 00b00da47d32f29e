// storefront/src/web/handlers/notification_handlers.rs

use actix_web::web::Bytes;
use actix_web::{web, HttpResponse};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use storekeep::PushEvent;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::auth::AuthenticatedUser;
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct ListNotificationsQuery {
  #[serde(default)]
  pub unread_only: bool,
}

#[instrument(name = "handler::list_notifications", skip(app_state, query, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn list_notifications_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ListNotificationsQuery>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let notifications = app_state
    .notifications
    .list_for(auth_user.user_id, query.unread_only)
    .await?;
  Ok(HttpResponse::Ok().json(json!({ "notifications": notifications })))
}

#[instrument(name = "handler::unread_count", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn unread_count_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let unread = app_state.notifications.unread_count(auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(json!({ "unread": unread })))
}

#[instrument(
  name = "handler::mark_notification_read",
  skip(app_state, path, auth_user),
  fields(user_id = %auth_user.user_id, notification_id = %path.as_ref())
)]
pub async fn mark_read_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let notification_id = path.into_inner();
  if app_state.notifications.mark_read(notification_id, auth_user.user_id).await? {
    Ok(HttpResponse::Ok().json(json!({ "id": notification_id, "isRead": true })))
  } else {
    Err(AppError::NotFound(format!("Notification with ID {} not found.", notification_id)))
  }
}

#[instrument(
  name = "handler::delete_notification",
  skip(app_state, path, auth_user),
  fields(user_id = %auth_user.user_id, notification_id = %path.as_ref())
)]
pub async fn delete_notification_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let notification_id = path.into_inner();
  if app_state.notifications.delete(notification_id, auth_user.user_id).await? {
    Ok(HttpResponse::NoContent().finish())
  } else {
    Err(AppError::NotFound(format!("Notification with ID {} not found.", notification_id)))
  }
}

/// Live push events for the authenticated user as Server-Sent Events.
#[instrument(name = "handler::notification_stream", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn stream_notifications_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> HttpResponse {
  info!(subscribers = app_state.hub.subscriber_count() + 1, "Opening notification stream.");
  let events = recipient_stream(app_state.hub.subscribe(), auth_user.user_id);

  HttpResponse::Ok()
    .content_type("text/event-stream")
    .insert_header(("Cache-Control", "no-cache"))
    .streaming(events)
}

/// SSE frames for one recipient. Ends when the hub is dropped; a lagging subscriber skips
/// what it missed rather than disconnecting.
pub(crate) fn recipient_stream(
  receiver: broadcast::Receiver<PushEvent>,
  recipient_id: Uuid,
) -> impl Stream<Item = Result<Bytes, Infallible>> + 'static {
  stream::unfold(receiver, move |mut receiver| async move {
    loop {
      match receiver.recv().await {
        Ok(push) if push.recipient_id == recipient_id => match serde_json::to_string(&push) {
          Ok(payload) => {
            let frame = format!("event: notification\ndata: {}\n\n", payload);
            return Some((Ok(Bytes::from(frame)), receiver));
          }
          Err(e) => warn!(error = %e, "Dropping push event that failed to serialize."),
        },
        Ok(_) => continue,
        Err(RecvError::Lagged(skipped)) => {
          warn!(%recipient_id, skipped, "Notification stream lagged behind the hub.");
        }
        Err(RecvError::Closed) => return None,
      }
    }
  })
}
