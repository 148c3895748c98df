//! Object identity and weak observation
//!
//! A decorated object is a value shared through [`Arc`]. Its identity is the
//! address of the `Arc` allocation; observing it goes through [`Weak`], which
//! never keeps the value alive but does keep the allocation (and therefore
//! the address) reserved for as long as the observation exists.

use crate::error::{DisposalError, Result};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Identity token of a decorated object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(usize);

impl ObjectId {
    pub fn of<T: ?Sized>(target: &Arc<T>) -> Self {
        Self::from_addr(Arc::as_ptr(target).cast::<()>() as usize)
    }

    pub fn of_weak<T: ?Sized>(target: &Weak<T>) -> Self {
        Self::from_addr(Weak::as_ptr(target).cast::<()>() as usize)
    }

    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    pub const fn addr(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Unique id of one decoration, distinguishes successive decorations of the
/// same object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DecorationId(u64);

impl DecorationId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for DecorationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Type-erased weak observation of a target
pub trait Observer: Send + Sync {
    /// `false` once the target has been reclaimed; never flips back
    fn is_live(&self) -> bool;
}

impl<T: ?Sized + Send + Sync> Observer for Weak<T> {
    #[inline]
    fn is_live(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Something that can be decorated: an `Arc` or a `Weak` to a shared object
pub trait Target {
    type Value: ?Sized + Send + Sync + 'static;

    fn object_id(&self) -> ObjectId;

    /// Weak observation of the target, or `None` if it is already gone
    fn observe(&self) -> Option<Weak<Self::Value>>;
}

impl<T: ?Sized + Send + Sync + 'static> Target for &Arc<T> {
    type Value = T;

    fn object_id(&self) -> ObjectId {
        ObjectId::of(*self)
    }

    fn observe(&self) -> Option<Weak<T>> {
        Some(Arc::downgrade(*self))
    }
}

impl<T: ?Sized + Send + Sync + 'static> Target for &Weak<T> {
    type Value = T;

    fn object_id(&self) -> ObjectId {
        ObjectId::of_weak(*self)
    }

    fn observe(&self) -> Option<Weak<T>> {
        (self.strong_count() > 0).then(|| Weak::clone(*self))
    }
}

/// Resolve a target to its identity and a live weak observation
pub(crate) fn observe_live<P: Target>(
    target: &P,
    absent: &'static str,
) -> Result<(ObjectId, Weak<P::Value>)> {
    match target.observe() {
        Some(weak) => Ok((target.object_id(), weak)),
        None => Err(DisposalError::Precondition(absent)),
    }
}
