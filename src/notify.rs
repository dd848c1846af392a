use async_trait::async_trait;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotificationKind {
    /// A booking awaits the interviewer's response (manual approval).
    Requested,
    /// An interview was put on the interviewer's schedule.
    Scheduled,
    /// The interviewer accepted or declined; sent to the requester.
    Responded,
    Cancelled,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Requested => "INTERVIEW_REQUESTED",
            NotificationKind::Scheduled => "INTERVIEW_SCHEDULED",
            NotificationKind::Responded => "INTERVIEW_RESPONDED",
            NotificationKind::Cancelled => "INTERVIEW_CANCELLED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub recipient: Ulid,
    pub payload: serde_json::Value,
}

#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification delivery failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound notification channel. Delivery is best-effort: the engine logs
/// and counts failures but never fails the operation that triggered them.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

/// Broadcast hub keyed by recipient, for in-process subscribers.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<Notification>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to notifications for a recipient. Creates the channel if needed.
    pub fn subscribe(&self, recipient: Ulid) -> broadcast::Receiver<Notification> {
        let sender = self
            .channels
            .entry(recipient)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Drop a recipient's channel.
    pub fn remove(&self, recipient: &Ulid) {
        self.channels.remove(recipient);
    }
}

#[async_trait]
impl Notifier for NotifyHub {
    /// No-op if nobody is listening.
    async fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if let Some(sender) = self.channels.get(&notification.recipient) {
            let _ = sender.send(notification);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduled(recipient: Ulid) -> Notification {
        Notification {
            kind: NotificationKind::Scheduled,
            recipient,
            payload: serde_json::json!({ "candidate_name": "Grace" }),
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = NotifyHub::new();
        let rid = Ulid::new();
        let mut rx = hub.subscribe(rid);

        hub.send(scheduled(rid)).await.unwrap();

        let received = rx.recv().await.unwrap();
        assert_eq!(received, scheduled(rid));
        assert_eq!(received.kind.as_str(), "INTERVIEW_SCHEDULED");
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        assert!(hub.send(scheduled(Ulid::new())).await.is_ok());
    }

    #[tokio::test]
    async fn recipients_are_isolated() {
        let hub = NotifyHub::new();
        let a = Ulid::new();
        let b = Ulid::new();
        let mut rx_b = hub.subscribe(b);

        hub.send(scheduled(a)).await.unwrap();
        assert!(rx_b.try_recv().is_err());

        hub.remove(&b);
        hub.send(scheduled(b)).await.unwrap();
        assert!(rx_b.try_recv().is_err());
    }
}
