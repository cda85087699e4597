//! In-process pub/sub for programmatic embedders. A closed variant set, not
//! a dynamic event-name registry: there is exactly one way to spell each
//! event, and the compiler checks every match is exhaustive.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WatcherEvent {
    CdpAttached { target_id: String, url: String },
    CdpDetached { reason: String },
    HttpRequested { method: String, path: String },
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<WatcherEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn publish(&self, event: WatcherEvent) {
        // No subscribers is not an error; embedders that never subscribed
        // shouldn't make publishing fail.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatcherEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(WatcherEvent::CdpAttached {
            target_id: "t1".into(),
            url: "http://x".into(),
        });
        let event = rx.recv().await.unwrap();
        matches!(event, WatcherEvent::CdpAttached { .. });
    }
}
