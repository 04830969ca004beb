use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use crate::session::PlaybackState;

/// Notifications the facade emits for the host UI.
#[derive(Debug, Clone, PartialEq)]
pub enum FacadeEvent {
    /// The backend became safe to command.
    Ready,
    StateChanged(PlaybackState),
    PlaybackEnded,
    PlaybackFailed(String),
    ProgressChanged { position: f64, duration: f64 },
    VolumeChanged(u8),
}

/// Fan-out of [`FacadeEvent`]s to any number of subscribers.
///
/// Subscribers whose receiver was dropped are pruned on the next broadcast.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<UnboundedSender<FacadeEvent>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> UnboundedReceiver<FacadeEvent> {
        let (tx, rx) = unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn broadcast(&self, event: FacadeEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_subscriber_receives_events() {
        let bus = EventBus::new();
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        bus.broadcast(FacadeEvent::PlaybackEnded);
        assert_eq!(a.try_recv().unwrap(), FacadeEvent::PlaybackEnded);
        assert_eq!(b.try_recv().unwrap(), FacadeEvent::PlaybackEnded);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        let rx = bus.subscribe();
        let _kept = bus.subscribe();
        drop(rx);
        bus.broadcast(FacadeEvent::VolumeChanged(10));
        assert_eq!(bus.subscriber_count(), 1);
    }
}
