//! Retain counts.
//!
//! A retained entity is a garbage collection root for as long as its count
//! is positive. Each [`Retained`] guard contributes one to the count and
//! gives it back when dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use super::entity::EntityKey;

#[derive(Debug, Default)]
pub struct RetainSet {
    counts: HashMap<EntityKey, usize>,
    /// Bumped by `clear`; guards from an older generation become inert.
    generation: u64,
}

impl RetainSet {
    pub fn count(&self, key: &EntityKey) -> usize {
        self.counts.get(key).copied().unwrap_or(0)
    }

    /// Keys with a positive count.
    pub fn roots(&self) -> impl Iterator<Item = &EntityKey> {
        self.counts.keys()
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        self.generation += 1;
    }

    fn release(&mut self, key: &EntityKey, generation: u64) {
        if generation != self.generation {
            return;
        }
        if let Some(count) = self.counts.get_mut(key) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(key);
            }
        }
    }
}

/// Increment the count for `key` and return the guard that undoes it.
pub(crate) fn retain(set: &Rc<RefCell<RetainSet>>, key: EntityKey) -> Retained {
    let generation = {
        let mut set = set.borrow_mut();
        *set.counts.entry(key.clone()).or_insert(0) += 1;
        set.generation
    };
    Retained {
        key,
        generation,
        set: Rc::downgrade(set),
    }
}

/// Keeps an entity alive across garbage collection until dropped.
#[must_use = "dropping a Retained guard immediately releases the entity"]
pub struct Retained {
    key: EntityKey,
    generation: u64,
    set: Weak<RefCell<RetainSet>>,
}

impl Retained {
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Release the entity. Same as dropping the guard.
    pub fn release(self) {}
}

impl Drop for Retained {
    fn drop(&mut self) {
        if let Some(set) = self.set.upgrade() {
            set.borrow_mut().release(&self.key, self.generation);
        }
    }
}

impl std::fmt::Debug for Retained {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Retained").field(&self.key).finish()
    }
}
