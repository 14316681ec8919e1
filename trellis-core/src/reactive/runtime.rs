//! Watch Runtime
//!
//! Keeps the registered watchers and delivers change notifications.
//!
//! # How It Works
//!
//! 1. On registration the watcher's subject is read once. That result is
//!    stored as the watcher's last result; the callback is not invoked.
//!
//! 2. After a mutation (or at the close of the outermost transaction) the
//!    cache re-reads every active watcher. Any mutation can change a
//!    watcher's result (a dangling reference filled in, an expiry passing),
//!    so no watcher is skipped.
//!
//! 3. Each new result is compared with the last one. Only when they differ
//!    is the callback invoked, with `(new, previous)`, and the stored result
//!    replaced.
//!
//! # Re-entrancy
//!
//! The registry is not borrowed while a callback runs, so a callback may
//! drop its own (or any other) subscription.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::trace;

use super::subscriber::WatcherId;
use crate::options::WatchOptions;
use crate::traverse::ReadResult;

/// Called with `(new, previous)` whenever a watched result changes.
pub type WatchCallback = Box<dyn FnMut(&ReadResult, &ReadResult)>;

struct Watcher {
    options: WatchOptions,
    /// Taken out while the callback runs.
    callback: Option<WatchCallback>,
    last: ReadResult,
}

/// All active watchers of one cache, in registration order.
#[derive(Default)]
pub struct WatchRegistry {
    watchers: IndexMap<WatcherId, Watcher>,
}

impl WatchRegistry {
    pub fn insert(&mut self, id: WatcherId, options: WatchOptions, callback: WatchCallback, last: ReadResult) {
        self.watchers.insert(
            id,
            Watcher {
                options,
                callback: Some(callback),
                last,
            },
        );
    }

    pub fn remove(&mut self, id: WatcherId) -> bool {
        self.watchers.shift_remove(&id).is_some()
    }

    pub fn contains(&self, id: WatcherId) -> bool {
        self.watchers.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.watchers.len()
    }

    pub fn clear(&mut self) {
        self.watchers.clear();
    }

    /// Options of every watcher, for garbage collection roots.
    pub fn subjects(&self) -> Vec<WatchOptions> {
        self.watchers.values().map(|watcher| watcher.options.clone()).collect()
    }
}

/// Re-read every watcher and notify those whose result changed.
///
/// Returns how many callbacks ran.
pub fn dispatch(
    registry: &Rc<RefCell<WatchRegistry>>,
    mut read: impl FnMut(&WatchOptions) -> ReadResult,
) -> usize {
    let ids: Vec<WatcherId> = registry.borrow().watchers.keys().copied().collect();
    let mut notified = 0;

    for id in ids {
        let Some(options) = registry.borrow().watchers.get(&id).map(|w| w.options.clone()) else {
            continue;
        };
        let next = read(&options);

        let (previous, callback) = {
            let mut registry = registry.borrow_mut();
            let Some(watcher) = registry.watchers.get_mut(&id) else {
                continue;
            };
            if !watcher.last.differs_from(&next) {
                continue;
            }
            let previous = std::mem::replace(&mut watcher.last, next.clone());
            (previous, watcher.callback.take())
        };

        let Some(mut callback) = callback else {
            continue;
        };
        trace!(watcher = ?id, entity = ?next.entity_id, "notifying watcher");
        callback(&next, &previous);
        notified += 1;

        if let Some(watcher) = registry.borrow_mut().watchers.get_mut(&id) {
            watcher.callback = Some(callback);
        }
    }

    notified
}
