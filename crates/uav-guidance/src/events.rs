//! Event bus for guidance events

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;
use uav_core::GuidanceEvent;

/// Broadcast channel plus a bounded history of recent events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<GuidanceEvent>,
    history: Arc<RwLock<Vec<GuidanceEvent>>>,
    max_history: usize,
    event_count: Arc<RwLock<u64>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        let max_history = capacity.max(1);

        Self {
            sender,
            history: Arc::new(RwLock::new(Vec::with_capacity(max_history))),
            max_history,
            event_count: Arc::new(RwLock::new(0)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GuidanceEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; having no subscribers is fine
    pub fn publish(&self, event: GuidanceEvent) {
        {
            let mut history = self.history.write();
            history.push(event.clone());
            if history.len() > self.max_history {
                history.remove(0);
            }
        }

        *self.event_count.write() += 1;
        debug!("Event {} published, total: {}", event.kind(), self.event_count());
        let _ = self.sender.send(event);
    }

    /// Most recent events, oldest first
    pub fn recent(&self, count: usize) -> Vec<GuidanceEvent> {
        let history = self.history.read();
        let start = history.len().saturating_sub(count);
        history[start..].to_vec()
    }

    pub fn event_count(&self) -> u64 {
        *self.event_count.read()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
