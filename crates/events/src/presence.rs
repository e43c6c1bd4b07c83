//! Fire-and-forget distribution of typing-presence signals.
//!
//! Deliberately a separate channel from [`ChangeFeed`](crate::ChangeFeed):
//! presence carries no durable state, tolerates loss, and must never be able
//! to back-pressure the row-change path.

use tokio::sync::broadcast;

use cardesk_core::presence::PresenceSignal;

/// Presence is chatty and disposable; a small buffer is plenty.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out of [`PresenceSignal`]s.
pub struct PresenceBus {
    sender: broadcast::Sender<PresenceSignal>,
}

impl PresenceBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a signal. Loss is acceptable: a dropped `typing` signal is
    /// refreshed by the next debounce tick, and stale entries expire on the
    /// receiver side anyway.
    pub fn publish(&self, signal: PresenceSignal) {
        let _ = self.sender.send(signal);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PresenceSignal> {
        self.sender.subscribe()
    }
}

impl Default for PresenceBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
