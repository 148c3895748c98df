//! Reclamation notifications
//!
//! Rust has no collector that can tell us when an object dies, so the
//! [`ReclamationMonitor`] stands in for one: it polls the weak observation of
//! every decorated target and reports each reclaimed target exactly once by
//! appending a [`Notification`] to the [`NotificationQueue`]. Detection is
//! exact (a dead `Weak` never comes back) but its latency is bounded by how
//! often the monitor runs, which is once per poll cycle.

mod monitor;
mod queue;

pub use monitor::ReclamationMonitor;
pub use queue::NotificationQueue;

use crate::identity::{DecorationId, ObjectId};

/// Token correlating a reclaimed target with exactly one decoration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Notification {
    pub object: ObjectId,
    pub decoration: DecorationId,
}

impl Notification {
    pub(crate) fn new(object: ObjectId, decoration: DecorationId) -> Self {
        Self { object, decoration }
    }
}
