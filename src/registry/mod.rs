//! Decoration registry - tracks decorated objects by identity
//!
//! Design: one concurrent map from [`ObjectId`] to the live [`Decoration`]
//! of that object. Per-key atomicity from `DashMap` is all the coordination
//! needed between callers (`decorate`/`undecorate`) and the poller (which
//! claims an entry when its notification arrives). The map only ever holds
//! weak observations of its targets.

mod decoration;


pub use decoration::{Decoration, DecorationState};

use crate::dispatch::{Dispatcher, Task};
use crate::error::Result;
use crate::identity::{observe_live, DecorationId, ObjectId, Target};
use crate::logging::{log_decorated, log_not_decorated, log_replaced, log_undecorated};
use crate::reclaim::Notification;
use dashmap::DashMap;
use std::sync::Arc;

pub(crate) const DECORATE_ABSENT: &str = "Cannot decorate an absent or reclaimed object.";
const UNDECORATE_ABSENT: &str = "Cannot undecorate an absent or reclaimed object.";

pub struct DecorationRegistry {
    entries: DashMap<ObjectId, Arc<Decoration>>,
}

impl Default for DecorationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DecorationRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::with_capacity(64),
        }
    }

    /// Register `callback` to run on `dispatcher` once `target` is reclaimed
    ///
    /// Replaces (and logs) an existing decoration of the same target.
    pub fn decorate<P: Target>(
        &self,
        target: P,
        callback: Task,
        dispatcher: Arc<dyn Dispatcher>,
    ) -> Result<DecorationId> {
        let (object, weak) = observe_live(&target, DECORATE_ABSENT)?;
        let decoration = Arc::new(Decoration::new(object, Box::new(weak), callback, dispatcher));
        let id = decoration.id();

        if let Some(previous) = self.entries.insert(object, decoration) {
            log_replaced(object, previous.id());
            previous.revoke();
        }

        log_decorated(object, id);
        Ok(id)
    }

    /// Remove the decoration of `target`, if any; its callback will never run
    pub fn undecorate<P: Target>(&self, target: P) -> Result<()> {
        let (object, _) = observe_live(&target, UNDECORATE_ABSENT)?;

        match self.entries.remove(&object) {
            Some((_, decoration)) => {
                decoration.revoke();
                log_undecorated(object, decoration.id());
            }
            None => log_not_decorated(object),
        }

        Ok(())
    }

    /// Take the entry a notification refers to out of the registry
    ///
    /// Returns `None` when the entry is gone or belongs to a newer decoration.
    pub(crate) fn claim(&self, notification: &Notification) -> Option<Arc<Decoration>> {
        self.entries
            .remove_if(&notification.object, |_, decoration| {
                decoration.id() == notification.decoration
            })
            .map(|(_, decoration)| decoration)
    }

    /// Decorations whose targets were reclaimed since the last call
    pub(crate) fn take_reclaimed(&self) -> Vec<Notification> {
        self.entries
            .iter()
            .filter(|entry| entry.value().mark_reported())
            .map(|entry| Notification::new(*entry.key(), entry.value().id()))
            .collect()
    }

    pub fn get(&self, object: ObjectId) -> Option<Arc<Decoration>> {
        self.entries.get(&object).map(|entry| Arc::clone(entry.value()))
    }

    pub fn is_decorated<P: Target>(&self, target: P) -> bool {
        self.entries.contains_key(&target.object_id())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for DecorationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecorationRegistry")
            .field("entries", &self.len())
            .finish()
    }
}
