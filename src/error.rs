//! Error types surfaced by the disposal machinery
//!
//! `Precondition` and `Startup` reach the caller of `decorate`. The other
//! variants travel between internal components and end up in logs.

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DisposalError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisposalError {
    /// Invalid argument, raised synchronously to the caller
    #[error("precondition failed: {0}")]
    Precondition(&'static str),

    /// The dispatcher no longer accepts work
    #[error("dispatcher has been shut down")]
    DispatcherShutdown,

    /// The dispatcher is running but could not start the task
    #[error("dispatcher rejected the task: {0}")]
    Rejected(String),

    /// A background thread or runtime could not be started
    #[error("failed to start {component}: {cause}")]
    Startup {
        component: &'static str,
        cause: String,
    },

    /// A graceful stop did not finish within its bound
    #[error("timed out after {timeout:?} while shutting down {component}")]
    ShutdownTimeout {
        component: &'static str,
        timeout: Duration,
    },
}

/// Resolution of a cancelled [`DisposalHandle`](crate::DisposalHandle)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("disposal handle was cancelled")]
pub struct Cancelled;
