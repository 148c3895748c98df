//! Dispatcher backed by a tokio runtime's blocking pool
//!
//! Callbacks are plain blocking closures, so they go to `spawn_blocking`:
//! a new blocking thread is started whenever none is idle, idle threads are
//! reused, and threads idle for longer than the keep-alive exit. The runtime
//! is either owned by the dispatcher (the default dispatcher of a
//! [`GarbageDisposal`](crate::GarbageDisposal)) or borrowed from the caller.

use super::{panic_message, Dispatcher, Task};
use crate::config::DisposalConfig;
use crate::error::{DisposalError, Result};
use crate::logging::log_callback_panic;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Handle, Runtime};

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count -= 1;
        if *count == 0 {
            self.0.drained.notify_all();
        }
    }
}

/// Runs callbacks with `spawn_blocking`
///
/// A dispatcher built with [`from_config`](Self::from_config) owns its
/// runtime and stops it on shutdown. One built with [`new`](Self::new) or
/// [`current`](Self::current) only stops accepting callbacks and waits for
/// the ones it submitted; the runtime stays with its owner.
pub struct TokioDispatcher {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    in_flight: Arc<InFlight>,
    shutdown: AtomicBool,
}

impl TokioDispatcher {
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            runtime: Mutex::new(None),
            in_flight: Arc::new(InFlight::default()),
            shutdown: AtomicBool::new(false),
        }
    }

    /// Dispatcher on the runtime the caller is currently running in
    ///
    /// Panics when called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Dispatcher on a runtime of its own, sized and named from `config`
    pub fn from_config(config: &DisposalConfig) -> Result<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(format!("{}-worker", config.thread_name))
            .thread_keep_alive(config.keep_alive)
            .max_blocking_threads(config.max_threads)
            .build()
            .map_err(|err| DisposalError::Startup {
                component: "dispatcher",
                cause: err.to_string(),
            })?;

        let mut dispatcher = Self::new(runtime.handle().clone());
        *dispatcher.runtime.get_mut() = Some(runtime);
        Ok(dispatcher)
    }

    /// Whether this dispatcher owns the runtime it submits to
    pub fn owns_runtime(&self) -> bool {
        self.runtime.lock().is_some()
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }
}

impl Dispatcher for TokioDispatcher {
    fn execute(&self, task: Task) -> Result<()> {
        if self.is_shutdown() {
            return Err(DisposalError::DispatcherShutdown);
        }

        *self.in_flight.count.lock() += 1;
        let guard = InFlightGuard(Arc::clone(&self.in_flight));

        let job = move || {
            let _guard = guard;
            if let Err(payload) = catch_unwind(AssertUnwindSafe(task)) {
                let worker = std::thread::current()
                    .name()
                    .unwrap_or("tokio-blocking")
                    .to_string();
                log_callback_panic(&worker, &panic_message(payload.as_ref()));
            }
        };

        // tokio panics when the OS refuses a blocking thread and none is idle
        match catch_unwind(AssertUnwindSafe(|| self.handle.spawn_blocking(job))) {
            Ok(_) => Ok(()),
            Err(payload) => Err(DisposalError::Rejected(panic_message(payload.as_ref()))),
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn shutdown(&self, timeout: Duration) -> Result<()> {
        self.shutdown.store(true, Ordering::Release);
        let started = Instant::now();

        let drained = {
            let mut count = self.in_flight.count.lock();
            self.in_flight
                .drained
                .wait_while_for(&mut count, |count| *count > 0, timeout);
            *count == 0
        };

        if let Some(runtime) = self.runtime.lock().take() {
            // A runtime cannot block on its own shutdown from async code
            if Handle::try_current().is_ok() {
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(timeout.saturating_sub(started.elapsed()));
            }
        }

        if drained {
            Ok(())
        } else {
            Err(DisposalError::ShutdownTimeout {
                component: "dispatcher",
                timeout,
            })
        }
    }
}

impl Drop for TokioDispatcher {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

impl std::fmt::Debug for TokioDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioDispatcher")
            .field("owns_runtime", &self.owns_runtime())
            .field("in_flight", &self.in_flight())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
