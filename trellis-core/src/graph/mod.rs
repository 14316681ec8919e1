//! Reference Graph
//!
//! This module holds normalized entities and the machinery that reclaims
//! them.
//!
//! # Overview
//!
//! The graph is a map from [`EntityKey`] to [`Entity`]. An entity's value is
//! plain data in which every nested entity has been replaced by a reference
//! carrying only the target key, so:
//!
//! - Cycles (A references B, B references A) are ordinary edges, not
//!   ownership cycles.
//! - A reference whose target is absent is a valid, reportable condition
//!   rather than a structural error.
//!
//! Two graphs exist side by side, confirmed and optimistic, addressed by the
//! same keys. Nothing in here knows which one it is working on.

mod collector;
mod entity;
mod retain;
mod store;

pub use collector::{collect, mark, sweep, GcStats};
pub use entity::{canonical_id, Entity, EntityKey, Identity, ROOT_FIELD};
pub(crate) use retain::{retain, RetainSet};
pub use retain::Retained;
pub use store::Graph;
