//! Watcher identity and subscription handles.
//!
//! A watcher is a (subject, selector, callback) triple registered with the
//! cache. The [`Subscription`] returned on registration is the only way to
//! end it: dropping the handle unsubscribes.

use std::cell::RefCell;
use std::rc::Weak;
use std::sync::atomic::{AtomicU64, Ordering};

use super::runtime::WatchRegistry;

/// Unique identifier for a watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId(u64);

impl WatcherId {
    /// Generate a new unique watcher ID.
    ///
    /// Uses a process-wide counter so ids are never reused, not even across
    /// caches or resets.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for WatcherId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered watcher.
///
/// Dropping this handle unsubscribes the watcher.
#[must_use = "dropping a Subscription immediately unsubscribes the watcher"]
pub struct Subscription {
    id: WatcherId,
    registry: Weak<RefCell<WatchRegistry>>,
}

impl Subscription {
    pub(crate) fn new(id: WatcherId, registry: Weak<RefCell<WatchRegistry>>) -> Self {
        Self { id, registry }
    }

    pub fn id(&self) -> WatcherId {
        self.id
    }

    /// Whether the watcher is still registered. A `reset()` of the cache
    /// ends every subscription.
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .map_or(false, |registry| registry.borrow().contains(self.id))
    }

    /// Stop watching. Same as dropping the handle.
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.borrow_mut().remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.is_active())
            .finish()
    }
}
