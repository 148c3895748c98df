//! Dispatchers - thread pools that run disposal callbacks
//!
//! The poller hands every callback to a [`Dispatcher`] and never waits for
//! it, so a slow or hanging callback cannot delay later notifications.
//!
//! [`TokioDispatcher`] is the one implementation shipped here: the default
//! dispatcher is a `TokioDispatcher` over a runtime it owns, and callers can
//! point one at a runtime of their own.

mod runtime;

#[cfg(test)]
mod tests;

pub use runtime::TokioDispatcher;

use crate::error::Result;
use std::any::Any;
use std::time::Duration;

/// Unit of work submitted to a dispatcher
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Asynchronous executor for disposal callbacks
pub trait Dispatcher: Send + Sync {
    /// Submit `task` for asynchronous execution without blocking the caller
    ///
    /// Fails with [`DisposalError::DispatcherShutdown`](crate::DisposalError::DispatcherShutdown)
    /// once the dispatcher stopped accepting work, or with
    /// [`DisposalError::Rejected`](crate::DisposalError::Rejected) when no
    /// worker can take the task. Either way the task is dropped unrun.
    fn execute(&self, task: Task) -> Result<()>;

    fn is_shutdown(&self) -> bool;

    /// Stop accepting work and wait up to `timeout` for in-flight tasks
    fn shutdown(&self, timeout: Duration) -> Result<()>;
}

/// Best-effort text of a panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
