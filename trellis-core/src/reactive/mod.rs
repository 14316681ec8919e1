//! Reactive Layer
//!
//! This module implements change notification for the cache: watchers,
//! their subscription handles, and the batching scopes that decide when
//! notifications are delivered.
//!
//! # Concepts
//!
//! ## Watchers
//!
//! A watcher observes the result of one read (subject entity, optional
//! selector, confirmed or optimistic view). It remembers the last result it
//! saw and is called back with `(new, previous)` only when the result
//! actually changes. Deeply equal data is not a change; a transition in
//! staleness is.
//!
//! ## Subscriptions
//!
//! Registering a watcher hands back a [`Subscription`]. Dropping it (or
//! calling `unsubscribe`) removes the watcher. No further callbacks happen.
//!
//! ## Batching
//!
//! `transaction` scopes defer notification until the outermost scope
//! closes, producing one round of callbacks for any number of mutations.
//! `silent` scopes suppress notification for the mutations made inside
//! them.
//!
//! # Implementation Notes
//!
//! Everything is single-threaded and synchronous. Shared state lives in
//! `Rc<RefCell<..>>`; handles hold `Weak` pointers so they never keep a
//! dropped cache alive.

mod context;
mod runtime;
mod subscriber;

pub(crate) use context::{BatchGuard, BatchState, Scope};
pub(crate) use runtime::{dispatch, WatchRegistry};
pub use runtime::WatchCallback;
pub use subscriber::{Subscription, WatcherId};
