//! Future-like handle resolved when a disposal callback runs
//!
//! The handle is an explicit state machine, `Pending → Completed` or
//! `Pending → Cancelled`, with every transition a compare-and-set under the
//! value lock. Whichever of the callback and `cancel` gets there first wins;
//! the loser observes the final state and backs off. A callback dropped
//! without running (undecorated, replaced, or refused by its dispatcher)
//! cancels the handle.

use crate::error::Cancelled;
use crate::identity::ObjectId;
use crate::logging::{log_cancel_after_reclaim, log_completion_skipped, log_handle_cancelled};
use crate::registry::DecorationRegistry;
use futures::task::AtomicWaker;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Completion state of a [`DisposalHandle`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HandleState {
    Pending = 0,
    Completed = 1,
    Cancelled = 2,
}

impl HandleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Pending,
            1 => Self::Completed,
            _ => Self::Cancelled,
        }
    }
}

/// State shared between the handle and the wrapped callback
pub(crate) struct Completion<T> {
    state: AtomicU8,
    value: Mutex<Option<T>>,
    resolved: Condvar,
    waker: AtomicWaker,
}

impl<T> Completion<T> {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(HandleState::Pending as u8),
            value: Mutex::new(None),
            resolved: Condvar::new(),
            waker: AtomicWaker::new(),
        })
    }

    fn state(&self) -> HandleState {
        HandleState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn resolve(&self, to: HandleState, value: Option<T>) -> bool {
        let mut slot = self.value.lock();
        let won = self
            .state
            .compare_exchange(
                HandleState::Pending as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();

        if won {
            *slot = value;
            self.resolved.notify_all();
            drop(slot);
            self.waker.wake();
        }
        won
    }

    /// Resolve with `value`; `false` if the handle was already resolved
    pub(crate) fn complete(&self, value: T) -> bool {
        self.resolve(HandleState::Completed, Some(value))
    }

    fn cancel(&self) -> bool {
        self.resolve(HandleState::Cancelled, None)
    }
}

impl<T: Clone> Completion<T> {
    fn outcome(&self, slot: &Option<T>) -> Option<Result<T, Cancelled>> {
        match self.state() {
            HandleState::Pending => None,
            HandleState::Cancelled => Some(Err(Cancelled)),
            HandleState::Completed => slot.clone().map(Ok),
        }
    }
}

/// Resolves the completion when run, cancels it when dropped unrun
struct Completer<T> {
    completion: Arc<Completion<T>>,
    object: ObjectId,
    value: Option<T>,
}

impl<T> Completer<T> {
    fn run(mut self) {
        if let Some(value) = self.value.take() {
            if !self.completion.complete(value) {
                log_completion_skipped(self.object);
            }
        }
    }
}

impl<T> Drop for Completer<T> {
    fn drop(&mut self) {
        if self.value.is_some() {
            self.completion.cancel();
        }
    }
}

/// Build the callback that resolves `completion` with `value`
pub(crate) fn completing_callback<T: Send + Sync + 'static>(
    completion: &Arc<Completion<T>>,
    object: ObjectId,
    value: T,
) -> impl FnOnce() + Send + 'static {
    let completer = Completer {
        completion: Arc::clone(completion),
        object,
        value: Some(value),
    };
    move || completer.run()
}

/// Best-effort revocation through the handle's own weak observation
trait Revoke: Send + Sync {
    /// `false` if the target is no longer reachable
    fn revoke(&self, registry: &DecorationRegistry) -> bool;
}

impl<V: ?Sized + Send + Sync + 'static> Revoke for Weak<V> {
    fn revoke(&self, registry: &DecorationRegistry) -> bool {
        match self.upgrade() {
            Some(target) => {
                // A live Arc always satisfies undecorate's precondition
                let _ = registry.undecorate(&target);
                true
            }
            None => false,
        }
    }
}

/// Handle returned by the `decorate_async` family
///
/// Resolves to `Ok(value)` once the callback ran, or `Err(Cancelled)` after
/// [`cancel`](Self::cancel). Usable as a [`Future`] or through the blocking
/// [`wait`](Self::wait) methods.
pub struct DisposalHandle<T> {
    completion: Arc<Completion<T>>,
    registry: Arc<DecorationRegistry>,
    target: Box<dyn Revoke>,
    object: ObjectId,
}

impl<T: Clone + Send + Sync + 'static> DisposalHandle<T> {
    pub(crate) fn new<V: ?Sized + Send + Sync + 'static>(
        completion: Arc<Completion<T>>,
        registry: Arc<DecorationRegistry>,
        target: Weak<V>,
        object: ObjectId,
    ) -> Self {
        Self {
            completion,
            registry,
            target: Box::new(target),
            object,
        }
    }

    /// Identity of the decorated object
    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn state(&self) -> HandleState {
        self.completion.state()
    }

    pub fn is_done(&self) -> bool {
        self.state() != HandleState::Pending
    }

    pub fn is_completed(&self) -> bool {
        self.state() == HandleState::Completed
    }

    pub fn is_cancelled(&self) -> bool {
        self.state() == HandleState::Cancelled
    }

    /// Cancel the handle, revoking the decoration if the target is reachable
    ///
    /// Returns `true` if this call moved the handle to cancelled. Once the
    /// target is gone the callback may already be queued or running; it is
    /// not stopped, it only no longer resolves the handle.
    pub fn cancel(&self) -> bool {
        if !self.completion.cancel() {
            return false;
        }

        if self.target.revoke(&self.registry) {
            log_handle_cancelled(self.object);
        } else {
            log_cancel_after_reclaim(self.object);
        }
        true
    }

    /// Block until resolved
    ///
    /// A decoration that is still registered when its [`GarbageDisposal`]
    /// shuts down keeps the handle pending until the context is dropped.
    /// On the process-wide instance that is never, so callers that may
    /// outlive [`shutdown`](crate::shutdown) use [`wait_timeout`](Self::wait_timeout).
    ///
    /// [`GarbageDisposal`]: crate::GarbageDisposal
    pub fn wait(&self) -> Result<T, Cancelled> {
        let mut slot = self.completion.value.lock();
        loop {
            if let Some(outcome) = self.completion.outcome(&slot) {
                return outcome;
            }
            self.completion.resolved.wait(&mut slot);
        }
    }

    /// Block until resolved or `timeout` elapses; `None` on timeout
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T, Cancelled>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.completion.value.lock();
        loop {
            if let Some(outcome) = self.completion.outcome(&slot) {
                return Some(outcome);
            }
            if self.completion.resolved.wait_until(&mut slot, deadline).timed_out() {
                return self.completion.outcome(&slot);
            }
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Future for DisposalHandle<T> {
    type Output = Result<T, Cancelled>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.completion.waker.register(cx.waker());

        let slot = self.completion.value.lock();
        match self.completion.outcome(&slot) {
            Some(outcome) => Poll::Ready(outcome),
            None => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for DisposalHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposalHandle")
            .field("object", &self.object)
            .field("state", &self.completion.state())
            .finish()
    }
}
