// storekeep/src/fanout/push.rs

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{event, Level};
use uuid::Uuid;

use crate::error::FanOutError;
use crate::model::{Notification, NotificationKind, RecipientRole};

pub const DEFAULT_HUB_CAPACITY: usize = 256;

/// Real-time message for one recipient. Delivery is best-effort.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
  pub recipient_id: Uuid,
  pub recipient_role: RecipientRole,
  pub kind: NotificationKind,
  pub title: String,
  pub message: String,
  pub metadata: Value,
  /// Inbox entry this push mirrors, when it was persisted.
  pub notification_id: Option<Uuid>,
}

impl PushEvent {
  pub fn from_notification(notification: &Notification, persisted: bool) -> Self {
    Self {
      recipient_id: notification.recipient_id,
      recipient_role: notification.recipient_role,
      kind: notification.kind,
      title: notification.title.clone(),
      message: notification.message.clone(),
      metadata: notification.metadata.0.clone(),
      notification_id: persisted.then_some(notification.id),
    }
  }
}

#[async_trait]
pub trait PushChannel: Send + Sync {
  async fn push(&self, event: PushEvent) -> Result<(), FanOutError>;
}

/// In-process fan-out to live subscribers (SSE streams in the server).
///
/// Subscribers filter by recipient themselves; the hub only broadcasts.
#[derive(Clone)]
pub struct BroadcastHub {
  sender: broadcast::Sender<PushEvent>,
}

impl Default for BroadcastHub {
  fn default() -> Self {
    Self::new(DEFAULT_HUB_CAPACITY)
  }
}

impl BroadcastHub {
  pub fn new(capacity: usize) -> Self {
    let (sender, _receiver) = broadcast::channel(capacity);
    Self { sender }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<PushEvent> {
    self.sender.subscribe()
  }

  pub fn subscriber_count(&self) -> usize {
    self.sender.receiver_count()
  }
}

#[async_trait]
impl PushChannel for BroadcastHub {
  async fn push(&self, event: PushEvent) -> Result<(), FanOutError> {
    let recipient_id = event.recipient_id;
    match self.sender.send(event) {
      Ok(receivers) => {
        event!(Level::TRACE, %recipient_id, receivers, "Push event broadcast.");
      }
      // Nobody online is not a failure.
      Err(_) => {
        event!(Level::TRACE, %recipient_id, "Push event dropped, no live subscribers.");
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::NotificationPriority;

  #[tokio::test]
  async fn subscribers_receive_broadcast_events() {
    let hub = BroadcastHub::new(8);
    let mut rx = hub.subscribe();
    let note = Notification::new(
      Uuid::new_v4(),
      RecipientRole::Seller,
      NotificationKind::NewOrder,
      NotificationPriority::High,
      "New order",
      "You sold 2 items",
    );
    hub.push(PushEvent::from_notification(&note, true)).await.unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.recipient_id, note.recipient_id);
    assert_eq!(received.notification_id, Some(note.id));
  }

  #[tokio::test]
  async fn push_without_subscribers_succeeds() {
    let hub = BroadcastHub::new(8);
    let note = Notification::new(
      Uuid::new_v4(),
      RecipientRole::Buyer,
      NotificationKind::OrderConfirmed,
      NotificationPriority::Normal,
      "Order confirmed",
      "Thanks",
    );
    assert_eq!(hub.subscriber_count(), 0);
    assert!(hub.push(PushEvent::from_notification(&note, false)).await.is_ok());
  }
}
