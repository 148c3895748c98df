//! Liveness polling in place of a host reclamation signal

use super::NotificationQueue;
use crate::logging::log_reclaimed;
use crate::registry::DecorationRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct ReclamationMonitor {
    registry: Arc<DecorationRegistry>,
    queue: Arc<NotificationQueue>,
}

impl ReclamationMonitor {
    pub fn new(registry: Arc<DecorationRegistry>, queue: Arc<NotificationQueue>) -> Self {
        Self { registry, queue }
    }

    /// Report targets reclaimed since the previous scan, returns how many
    pub fn scan(&self) -> usize {
        let reclaimed = self.registry.take_reclaimed();
        let count = reclaimed.len();

        for notification in reclaimed {
            log_reclaimed(notification.object, notification.decoration);
            self.queue.push(notification);
        }

        count
    }
}
