//! The disposal context and the process-wide instance
//!
//! [`GarbageDisposal`] owns everything the mechanism needs: the registry,
//! the notification queue, the poll thread and the default dispatcher. The
//! poll thread and the default dispatcher start lazily on first use. Rust
//! runs no exit hooks for statics, so a process using the global instance
//! calls [`shutdown`] before it exits; a context owned by the caller shuts
//! itself down when dropped.

use crate::config::DisposalConfig;
use crate::dispatch::{Dispatcher, Task, TokioDispatcher};
use crate::error::{DisposalError, Result};
use crate::handle::{completing_callback, Completion, DisposalHandle};
use crate::identity::{observe_live, ObjectId, Target};
use crate::logging::{
    log_poller_fault, log_shutdown_complete, log_shutdown_start, log_shutdown_timeout,
};
use crate::poller::Poller;
use crate::reclaim::{NotificationQueue, ReclamationMonitor};
use crate::registry::{DecorationRegistry, DECORATE_ABSENT};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Global instance behind the free functions
static GLOBAL: OnceCell<GarbageDisposal> = OnceCell::new();

pub struct GarbageDisposal {
    config: DisposalConfig,
    registry: Arc<DecorationRegistry>,
    queue: Arc<NotificationQueue>,
    poller: Mutex<Option<Poller>>,
    default_dispatcher: OnceCell<Arc<TokioDispatcher>>,
    shut_down: AtomicBool,
}

impl Default for GarbageDisposal {
    fn default() -> Self {
        Self::new()
    }
}

impl GarbageDisposal {
    pub fn new() -> Self {
        Self::with_config(DisposalConfig::default())
    }

    pub fn with_config(config: DisposalConfig) -> Self {
        Self {
            config,
            registry: Arc::new(DecorationRegistry::new()),
            queue: Arc::new(NotificationQueue::new()),
            poller: Mutex::new(None),
            default_dispatcher: OnceCell::new(),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DisposalConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<DecorationRegistry> {
        &self.registry
    }

    /// The shared default dispatcher, started on first call
    pub fn default_dispatcher(&self) -> Result<Arc<dyn Dispatcher>> {
        let dispatcher = self
            .default_dispatcher
            .get_or_try_init(|| TokioDispatcher::from_config(&self.config).map(Arc::new))?;
        Ok(Arc::clone(dispatcher) as Arc<dyn Dispatcher>)
    }

    /// Run `callback` on the default dispatcher once `target` is reclaimed
    pub fn decorate<P, F>(&self, target: P, callback: F) -> Result<()>
    where
        P: Target,
        F: FnOnce() + Send + 'static,
    {
        self.register(target, Box::new(callback), None)
    }

    /// Run `callback` on `dispatcher` once `target` is reclaimed
    pub fn decorate_with<P, F>(
        &self,
        target: P,
        callback: F,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<()>
    where
        P: Target,
        F: FnOnce() + Send + 'static,
    {
        self.register(target, Box::new(callback), Some(dispatcher))
    }

    /// Like [`decorate`](Self::decorate), passing the target's identity to
    /// the callback; the identity is captured now, not after reclamation
    pub fn decorate_with_hash<P, F>(&self, target: P, callback: F) -> Result<()>
    where
        P: Target,
        F: FnOnce(ObjectId) + Send + 'static,
    {
        let object = target.object_id();
        self.register(target, Box::new(move || callback(object)), None)
    }

    pub fn decorate_with_hash_with<P, F>(
        &self,
        target: P,
        callback: F,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<()>
    where
        P: Target,
        F: FnOnce(ObjectId) + Send + 'static,
    {
        let object = target.object_id();
        self.register(target, Box::new(move || callback(object)), Some(dispatcher))
    }

    /// Handle that completes once `target` is reclaimed and the callback ran
    pub fn decorate_async<P: Target>(&self, target: P) -> Result<DisposalHandle<()>> {
        self.register_handle(target, |_| (), None)
    }

    pub fn decorate_async_with<P: Target>(
        &self,
        target: P,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<DisposalHandle<()>> {
        self.register_handle(target, |_| (), Some(dispatcher))
    }

    /// Handle that completes with the target's identity
    pub fn decorate_async_with_hash<P: Target>(
        &self,
        target: P,
    ) -> Result<DisposalHandle<ObjectId>> {
        self.register_handle(target, |object| object, None)
    }

    pub fn decorate_async_with_hash_with<P: Target>(
        &self,
        target: P,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<DisposalHandle<ObjectId>> {
        self.register_handle(target, |object| object, Some(dispatcher))
    }

    /// Remove the decoration of `target`; its callback will never run
    pub fn undecorate<P: Target>(&self, target: P) -> Result<()> {
        self.registry.undecorate(target)
    }

    pub fn is_decorated<P: Target>(&self, target: P) -> bool {
        self.registry.is_decorated(target)
    }

    /// Report reclaimed targets right away instead of at the next poll
    ///
    /// Callbacks are still dispatched by the poll thread. Returns the number
    /// of newly reported targets.
    pub fn collect(&self) -> usize {
        ReclamationMonitor::new(Arc::clone(&self.registry), Arc::clone(&self.queue)).scan()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the poll thread, then the default dispatcher
    ///
    /// Each stop waits up to `shutdown_timeout`; a timeout is logged and
    /// shutdown moves on. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }

        let timeout = self.config.shutdown_timeout;

        // Taken under the lock ensure_poller starts it under
        let poller = self.poller.lock().take();
        if let Some(poller) = poller {
            stop_component("poller", timeout, || poller.stop(timeout));
        }

        if let Some(dispatcher) = self.default_dispatcher.get() {
            stop_component("dispatcher", timeout, || dispatcher.shutdown(timeout));
        }
    }

    fn register<P: Target>(
        &self,
        target: P,
        callback: Task,
        dispatcher: Option<Arc<dyn Dispatcher>>,
    ) -> Result<()> {
        if self.is_shut_down() {
            return Err(DisposalError::Precondition("GarbageDisposal has been shut down."));
        }

        let dispatcher = match dispatcher {
            Some(dispatcher) => dispatcher,
            None => self.default_dispatcher()?,
        };
        self.registry.decorate(target, callback, dispatcher)?;
        self.ensure_poller();
        Ok(())
    }

    fn register_handle<P, T>(
        &self,
        target: P,
        value: impl FnOnce(ObjectId) -> T,
        dispatcher: Option<Arc<dyn Dispatcher>>,
    ) -> Result<DisposalHandle<T>>
    where
        P: Target,
        T: Clone + Send + Sync + 'static,
    {
        let (object, weak) = observe_live(&target, DECORATE_ABSENT)?;
        let completion = Completion::new();
        let callback = completing_callback(&completion, object, value(object));

        self.register(target, Box::new(callback), dispatcher)?;
        Ok(DisposalHandle::new(completion, Arc::clone(&self.registry), weak, object))
    }

    fn ensure_poller(&self) {
        let mut poller = self.poller.lock();
        if poller.is_some() || self.is_shut_down() {
            return;
        }

        // Registrations are kept; the next decorate retries the start
        match Poller::start(Arc::clone(&self.registry), Arc::clone(&self.queue), &self.config) {
            Ok(started) => *poller = Some(started),
            Err(err) => log_poller_fault(&format!("failed to start poller: {err}")),
        }
    }
}

fn stop_component(component: &'static str, timeout: Duration, stop: impl FnOnce() -> Result<()>) {
    log_shutdown_start(component, timeout);
    match stop() {
        Ok(()) => log_shutdown_complete(component),
        Err(_) => log_shutdown_timeout(component, timeout),
    }
}

impl Drop for GarbageDisposal {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for GarbageDisposal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GarbageDisposal")
            .field("decorations", &self.registry.len())
            .field("queued", &self.queue.len())
            .field("poller_running", &self.poller.lock().as_ref().is_some_and(Poller::is_running))
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

// ============================================================================
// Process-wide instance
// ============================================================================

/// The process-wide instance, configured from the environment on first use
pub fn global() -> &'static GarbageDisposal {
    GLOBAL.get_or_init(|| GarbageDisposal::with_config(DisposalConfig::from_env()))
}

pub fn decorate<P, F>(target: P, callback: F) -> Result<()>
where
    P: Target,
    F: FnOnce() + Send + 'static,
{
    global().decorate(target, callback)
}

pub fn decorate_with<P, F>(target: P, callback: F, dispatcher: Arc<dyn Dispatcher>) -> Result<()>
where
    P: Target,
    F: FnOnce() + Send + 'static,
{
    global().decorate_with(target, callback, dispatcher)
}

pub fn decorate_with_hash<P, F>(target: P, callback: F) -> Result<()>
where
    P: Target,
    F: FnOnce(ObjectId) + Send + 'static,
{
    global().decorate_with_hash(target, callback)
}

pub fn decorate_with_hash_with<P, F>(
    target: P,
    callback: F,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<()>
where
    P: Target,
    F: FnOnce(ObjectId) + Send + 'static,
{
    global().decorate_with_hash_with(target, callback, dispatcher)
}

pub fn decorate_async<P: Target>(target: P) -> Result<DisposalHandle<()>> {
    global().decorate_async(target)
}

pub fn decorate_async_with<P: Target>(
    target: P,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<DisposalHandle<()>> {
    global().decorate_async_with(target, dispatcher)
}

pub fn decorate_async_with_hash<P: Target>(target: P) -> Result<DisposalHandle<ObjectId>> {
    global().decorate_async_with_hash(target)
}

pub fn decorate_async_with_hash_with<P: Target>(
    target: P,
    dispatcher: Arc<dyn Dispatcher>,
) -> Result<DisposalHandle<ObjectId>> {
    global().decorate_async_with_hash_with(target, dispatcher)
}

pub fn undecorate<P: Target>(target: P) -> Result<()> {
    global().undecorate(target)
}

/// Process exit hook: stop the global instance if it was ever used
pub fn shutdown() {
    if let Some(disposal) = GLOBAL.get() {
        disposal.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> GarbageDisposal {
        GarbageDisposal::with_config(
            DisposalConfig::new()
                .with_shutdown_timeout(Duration::from_secs(1))
                .with_thread_name("gd-context-test"),
        )
    }

    #[test]
    fn test_lazy_start() {
        let disposal = context();
        assert!(disposal.poller.lock().is_none());
        assert!(disposal.default_dispatcher.get().is_none());

        let target = Arc::new(1u8);
        disposal.decorate(&target, || {}).unwrap();
        assert!(disposal.poller.lock().is_some());
        assert!(disposal.default_dispatcher.get().is_some());
    }

    #[test]
    fn test_no_poller_after_shutdown() {
        let disposal = context();
        disposal.shutdown();

        // A registration that passed its shutdown check before the flag flipped
        disposal.ensure_poller();
        assert!(disposal.poller.lock().is_none());
    }

    #[test]
    fn test_shutdown_stops_started_poller() {
        let disposal = context();
        let target = Arc::new(2u8);
        disposal.decorate(&target, || {}).unwrap();

        disposal.shutdown();
        assert!(disposal.poller.lock().is_none());
        assert!(disposal.default_dispatcher().unwrap().is_shutdown());
    }
}
