use async_trait::async_trait;
use chrono::Utc;
use septra_core::notify::NotificationSink;
use septra_shared::models::events::{Audience, DomainEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

/// What leaves the engine once an operation has committed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub audience: Audience,
    pub message: String,
    pub event: DomainEvent,
    pub timestamp: i64,
}

impl Notification {
    pub fn new(audience: &Audience, event: &DomainEvent) -> Self {
        Self {
            audience: audience.clone(),
            message: event.to_string(),
            event: event.clone(),
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Writes every notification to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl NotificationSink for TracingNotifier {
    async fn notify(&self, audience: &Audience, event: &DomainEvent) {
        info!(audience = %audience, "{}", event);
    }
}

/// Publishes notifications on a tokio broadcast channel for live subscribers.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl NotificationSink for BroadcastNotifier {
    async fn notify(&self, audience: &Audience, event: &DomainEvent) {
        // No subscribers is fine, delivery is best effort
        if self.tx.send(Notification::new(audience, event)).is_err() {
            warn!(audience = %audience, "Dropped notification, no subscribers");
        }
    }
}

/// Keeps every notification in memory. Handy for tests and for an
/// operator console polling for recent activity.
#[derive(Default)]
pub struct InboxNotifier {
    inbox: Mutex<Vec<Notification>>,
}

impl InboxNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn drain(&self) -> Vec<Notification> {
        std::mem::take(&mut *self.inbox.lock().await)
    }

    pub async fn for_audience(&self, audience: &Audience) -> Vec<Notification> {
        self.inbox
            .lock()
            .await
            .iter()
            .filter(|n| &n.audience == audience)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationSink for InboxNotifier {
    async fn notify(&self, audience: &Audience, event: &DomainEvent) {
        self.inbox.lock().await.push(Notification::new(audience, event));
    }
}
