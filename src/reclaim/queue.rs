//! Unbounded FIFO of reclamation notifications

use super::Notification;
use flume::{Receiver, Sender};

/// Many producers, one consumer (the poller)
pub struct NotificationQueue {
    sender: Sender<Notification>,
    receiver: Receiver<Notification>,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationQueue {
    pub fn new() -> Self {
        let (sender, receiver) = flume::unbounded();
        Self { sender, receiver }
    }

    #[inline]
    pub fn push(&self, notification: Notification) {
        // Both ends live in `self`, the channel cannot be disconnected
        let _ = self.sender.send(notification);
    }

    /// Next notification without blocking
    #[inline]
    pub fn poll(&self) -> Option<Notification> {
        self.receiver.try_recv().ok()
    }

    /// Drain everything queued right now, in order
    pub fn drain(&self) -> impl Iterator<Item = Notification> + '_ {
        std::iter::from_fn(move || self.poll())
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}
