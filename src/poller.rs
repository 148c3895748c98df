//! Poller - the background thread delivering reclamation notifications
//!
//! Runs on a fixed delay: the next cycle starts `poll_interval` after the
//! previous one finished. A cycle asks the monitor for newly reclaimed
//! targets, then drains the notification queue completely, handing each
//! live decoration's callback to its dispatcher. Submission is fire and
//! forget, so a cycle never waits for a callback.

use crate::config::DisposalConfig;
use crate::dispatch::panic_message;
use crate::error::{DisposalError, Result};
use crate::logging::{
    log_cycle_complete, log_dequeued, log_discarded, log_dispatch_rejected, log_poller_fault,
};
use crate::reclaim::{NotificationQueue, ReclamationMonitor};
use crate::registry::{DecorationRegistry, DecorationState};
use flume::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Outcome of one drain pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub reclaimed: usize,
    pub dispatched: usize,
    pub discarded: usize,
}

/// One poll cycle, shared by the background thread and the tests
pub(crate) struct Cycle {
    registry: Arc<DecorationRegistry>,
    queue: Arc<NotificationQueue>,
    monitor: ReclamationMonitor,
}

impl Cycle {
    pub(crate) fn new(registry: Arc<DecorationRegistry>, queue: Arc<NotificationQueue>) -> Self {
        let monitor = ReclamationMonitor::new(Arc::clone(&registry), Arc::clone(&queue));
        Self {
            registry,
            queue,
            monitor,
        }
    }

    pub(crate) fn run(&self) -> CycleStats {
        let mut stats = CycleStats {
            reclaimed: self.monitor.scan(),
            ..CycleStats::default()
        };

        for notification in self.queue.drain() {
            log_dequeued(notification.object, notification.decoration);

            let Some(decoration) = self.registry.claim(&notification) else {
                log_discarded(notification.object, notification.decoration);
                stats.discarded += 1;
                continue;
            };

            if !decoration.transition(DecorationState::Active, DecorationState::Enqueued) {
                log_discarded(notification.object, notification.decoration);
                stats.discarded += 1;
                continue;
            }

            let Some(callback) = decoration.take_callback() else {
                stats.discarded += 1;
                continue;
            };

            match decoration.dispatcher().execute(callback) {
                Ok(()) => {
                    decoration.transition(DecorationState::Enqueued, DecorationState::Executed);
                    stats.dispatched += 1;
                }
                Err(_) => {
                    log_dispatch_rejected(notification.object, notification.decoration);
                    decoration.transition(DecorationState::Enqueued, DecorationState::Cancelled);
                    stats.discarded += 1;
                }
            }
        }

        stats
    }
}

struct Running {
    stop: Sender<()>,
    done: Receiver<()>,
}

/// Handle to the background poll thread
pub struct Poller {
    running: Mutex<Option<Running>>,
}

impl Poller {
    /// Spawn the poll thread
    pub(crate) fn start(
        registry: Arc<DecorationRegistry>,
        queue: Arc<NotificationQueue>,
        config: &DisposalConfig,
    ) -> std::io::Result<Self> {
        let (stop, stop_rx) = flume::bounded::<()>(1);
        let (done_tx, done) = flume::bounded::<()>(1);
        let cycle = Cycle::new(registry, queue);
        let interval = config.poll_interval;

        thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                poll_loop(&cycle, &stop_rx, interval);
                let _ = done_tx.send(());
            })?;

        tracing::debug!(
            interval_ms = interval.as_millis() as u64,
            "Poller has been started"
        );

        Ok(Self {
            running: Mutex::new(Some(Running { stop, done })),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Stop the poll thread, waiting at most `timeout` for its current cycle
    pub fn stop(&self, timeout: Duration) -> Result<()> {
        let Some(running) = self.running.lock().take() else {
            return Ok(());
        };

        let _ = running.stop.try_send(());

        match running.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => Ok(()),
            Err(RecvTimeoutError::Timeout) => Err(DisposalError::ShutdownTimeout {
                component: "poller",
                timeout,
            }),
        }
    }
}

fn poll_loop(cycle: &Cycle, stop: &Receiver<()>, interval: Duration) {
    loop {
        match catch_unwind(AssertUnwindSafe(|| cycle.run())) {
            Ok(stats) => log_cycle_complete(stats.dispatched, stats.discarded, interval),
            Err(payload) => log_poller_fault(&panic_message(payload.as_ref())),
        }

        // Fixed delay that wakes early on stop
        match stop.recv_timeout(interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        // Without an explicit stop the thread exits at its next wake-up
        if let Some(running) = self.running.get_mut().take() {
            let _ = running.stop.try_send(());
        }
    }
}
