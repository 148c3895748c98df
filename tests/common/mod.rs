//! Shared helpers for the integration tests

#![allow(dead_code)]

use garbage_disposal::{DisposalConfig, GarbageDisposal};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Upper bound for a callback to run after its target was dropped
pub const DELIVERY_BOUND: Duration = Duration::from_secs(2);

/// Three poll cycles at the default interval
pub const THREE_CYCLES: Duration = Duration::from_millis(300);

pub fn disposal() -> GarbageDisposal {
    GarbageDisposal::with_config(
        DisposalConfig::new()
            .with_shutdown_timeout(Duration::from_secs(2))
            .with_thread_name("gd-it"),
    )
}

pub fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

pub fn increment(counter: &Arc<AtomicUsize>) -> impl FnOnce() + Send + 'static {
    let counter = Arc::clone(counter);
    move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

/// Poll `condition` until it holds or `deadline` passes
pub fn wait_for(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}
