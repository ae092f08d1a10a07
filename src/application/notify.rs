//! Fire-and-forget failure notifications for whoever presents errors to users.

use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CHANNEL_CAPACITY: usize = 64;

pub trait ErrorNotifier: Send + Sync {
    /// Must not block; delivery is best effort.
    fn notify(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl ErrorNotifier for NoopNotifier {
    fn notify(&self, _message: &str) {}
}

/// Fans notifications out to every current subscriber.
///
/// Slow subscribers lose the oldest messages instead of applying back-pressure.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<String>,
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender.subscribe()
    }
}

impl ErrorNotifier for BroadcastNotifier {
    fn notify(&self, message: &str) {
        if self.sender.send(message.to_string()).is_err() {
            trace!(message, "notification dropped: no subscribers");
        }
    }
}
