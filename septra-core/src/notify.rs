use async_trait::async_trait;
use septra_shared::models::events::{Audience, DomainEvent};

/// Fire-and-forget delivery of domain events. Implementations must not fail
/// the calling operation; delivery problems are theirs to log.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, audience: &Audience, event: &DomainEvent);
}

/// Fan a batch of events out to every audience they address.
pub async fn dispatch(sink: &dyn NotificationSink, events: &[DomainEvent]) {
    for event in events {
        for audience in event.audiences() {
            sink.notify(&audience, event).await;
        }
    }
}
