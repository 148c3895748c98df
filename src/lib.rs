//! Garbage Disposal - run callbacks when shared objects are reclaimed
//!
//! Decorate any value shared through an [`Arc`](std::sync::Arc) with a
//! callback; once the last strong reference is dropped, a background poller
//! notices and runs the callback on a dispatcher thread. The decorated type
//! needs no changes and no explicit disposal call.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! let watched = Arc::new(String::from("connection"));
//! garbage_disposal::decorate(&watched, || println!("connection was reclaimed")).unwrap();
//!
//! drop(watched); // the callback runs after the next poll cycle
//! garbage_disposal::shutdown();
//! ```
//!
//! Design:
//! 1. [`DecorationRegistry`]: concurrent map from object identity to its
//!    decoration, holding only weak observations
//! 2. [`ReclamationMonitor`]: liveness polling that reports each reclaimed
//!    target once into the [`NotificationQueue`]
//! 3. [`Poller`]: fixed-delay background thread draining the queue
//! 4. [`Dispatcher`]: tokio blocking pool executing callbacks, fire and forget
//! 5. [`DisposalHandle`]: future-like completion with cancellation

pub mod config;
pub mod dispatch;
pub mod disposal;
pub mod error;
pub mod handle;
pub mod identity;
pub mod logging;
pub mod poller;
pub mod reclaim;
pub mod registry;

// Re-export core types
pub use config::DisposalConfig;
pub use dispatch::{Dispatcher, Task, TokioDispatcher};
pub use disposal::{
    decorate, decorate_async, decorate_async_with, decorate_async_with_hash,
    decorate_async_with_hash_with, decorate_with, decorate_with_hash, decorate_with_hash_with,
    global, shutdown, undecorate, GarbageDisposal,
};
pub use error::{Cancelled, DisposalError, Result};
pub use handle::{DisposalHandle, HandleState};
pub use identity::{DecorationId, ObjectId, Observer, Target};
pub use logging::{init_logging, LogConfig, LogFormat, LogOutput};
pub use poller::{CycleStats, Poller};
pub use reclaim::{Notification, NotificationQueue, ReclamationMonitor};
pub use registry::{Decoration, DecorationRegistry, DecorationState};
