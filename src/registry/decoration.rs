//! A single decoration and its lifecycle state machine

use crate::dispatch::{Dispatcher, Task};
use crate::identity::{DecorationId, ObjectId, Observer};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

/// Lifecycle of a decoration
///
/// ```text
/// Active ──poller──▶ Enqueued ──submitted──▶ Executed
///   │                    └──dispatcher shut down──▶ Cancelled
///   └──undecorate / replaced──▶ Removed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DecorationState {
    Active = 0,
    Enqueued = 1,
    Executed = 2,
    Cancelled = 3,
    Removed = 4,
}

impl DecorationState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Active,
            1 => Self::Enqueued,
            2 => Self::Executed,
            3 => Self::Cancelled,
            _ => Self::Removed,
        }
    }
}

pub struct Decoration {
    id: DecorationId,
    object: ObjectId,
    observer: Box<dyn Observer>,
    callback: Mutex<Option<Task>>,
    dispatcher: Arc<dyn Dispatcher>,
    state: AtomicU8,
    /// Set once the reclamation of the target has been reported
    reported: AtomicBool,
}

impl Decoration {
    pub(crate) fn new(
        object: ObjectId,
        observer: Box<dyn Observer>,
        callback: Task,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Self {
        Self {
            id: DecorationId::next(),
            object,
            observer,
            callback: Mutex::new(Some(callback)),
            dispatcher,
            state: AtomicU8::new(DecorationState::Active as u8),
            reported: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn id(&self) -> DecorationId {
        self.id
    }

    #[inline]
    pub fn object(&self) -> ObjectId {
        self.object
    }

    #[inline]
    pub fn state(&self) -> DecorationState {
        DecorationState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the decorated target is still strongly reachable
    #[inline]
    pub fn is_target_live(&self) -> bool {
        self.observer.is_live()
    }

    pub(crate) fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }

    /// Atomic state transition, fails if the current state is not `from`
    pub(crate) fn transition(&self, from: DecorationState, to: DecorationState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Returns `true` exactly once, for the first caller after reclamation
    pub(crate) fn mark_reported(&self) -> bool {
        !self.observer.is_live() && !self.reported.swap(true, Ordering::AcqRel)
    }

    /// Mark a decoration that left the registry without firing
    pub(crate) fn revoke(&self) {
        if self.transition(DecorationState::Active, DecorationState::Removed) {
            // Dropping the callback releases whatever it captured
            self.callback.lock().take();
        }
    }

    pub(crate) fn take_callback(&self) -> Option<Task> {
        self.callback.lock().take()
    }
}

impl fmt::Debug for Decoration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decoration")
            .field("id", &self.id)
            .field("object", &self.object)
            .field("state", &self.state())
            .field("live", &self.is_target_live())
            .finish()
    }
}
