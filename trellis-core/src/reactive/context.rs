//! Batching Context
//!
//! Tracks the `transaction` and `silent` scopes that are open on a cache.
//!
//! Both are nesting counters rather than flags, so scopes can be entered
//! recursively. A [`BatchGuard`] increments its counter on entry and
//! decrements it on drop, which restores the counters even when the scoped
//! closure panics.
//!
//! - Inside a transaction, mutations only record that a flush is pending.
//!   The flush runs when the outermost transaction closes.
//! - Inside a silent scope, mutations do not schedule a flush at all.

use std::cell::Cell;
use std::rc::Rc;

/// Which counter a guard holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Transaction,
    Silent,
}

/// Nesting counters shared between a cache and its open guards.
#[derive(Debug, Default)]
pub struct BatchState {
    transactions: Cell<usize>,
    silent: Cell<usize>,
    pending: Cell<bool>,
}

impl BatchState {
    pub fn in_transaction(&self) -> bool {
        self.transactions.get() > 0
    }

    pub fn is_silent(&self) -> bool {
        self.silent.get() > 0
    }

    /// Record that a mutation happened. Returns `true` when the caller
    /// should flush right away.
    pub fn mutated(&self) -> bool {
        if self.is_silent() {
            return false;
        }
        if self.in_transaction() {
            self.pending.set(true);
            return false;
        }
        true
    }

    /// Consume the pending flag once no transaction is open.
    pub fn take_pending(&self) -> bool {
        !self.in_transaction() && self.pending.replace(false)
    }

    pub fn reset(&self) {
        self.pending.set(false);
    }

    fn counter(&self, scope: Scope) -> &Cell<usize> {
        match scope {
            Scope::Transaction => &self.transactions,
            Scope::Silent => &self.silent,
        }
    }
}

/// Scope guard. Leaves the scope when dropped.
#[must_use]
pub struct BatchGuard {
    state: Rc<BatchState>,
    scope: Scope,
}

impl BatchGuard {
    pub fn enter(state: &Rc<BatchState>, scope: Scope) -> Self {
        let counter = state.counter(scope);
        counter.set(counter.get() + 1);
        Self {
            state: Rc::clone(state),
            scope,
        }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let counter = self.state.counter(self.scope);
        debug_assert!(counter.get() > 0, "unbalanced {:?} scope", self.scope);
        counter.set(counter.get().saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutations_flush_immediately_outside_scopes() {
        let state = Rc::new(BatchState::default());
        assert!(state.mutated());
        assert!(!state.take_pending());
    }

    #[test]
    fn nested_transactions_defer_until_outermost_closes() {
        let state = Rc::new(BatchState::default());
        {
            let _outer = BatchGuard::enter(&state, Scope::Transaction);
            {
                let _inner = BatchGuard::enter(&state, Scope::Transaction);
                assert!(!state.mutated());
            }
            // Inner closed, outer still open.
            assert!(!state.take_pending());
            assert!(!state.mutated());
        }
        assert!(state.take_pending());
        assert!(!state.take_pending());
    }

    #[test]
    fn silent_scopes_drop_notifications() {
        let state = Rc::new(BatchState::default());
        {
            let _tx = BatchGuard::enter(&state, Scope::Transaction);
            let _quiet = BatchGuard::enter(&state, Scope::Silent);
            assert!(!state.mutated());
        }
        assert!(!state.take_pending());
        assert!(!state.is_silent());
    }

    #[test]
    fn guards_release_on_panic() {
        let state = Rc::new(BatchState::default());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _tx = BatchGuard::enter(&state, Scope::Transaction);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(!state.in_transaction());
    }
}
