//! Trellis Core
//!
//! This crate provides a normalized, reactive entity cache. It implements:
//!
//! - A schema of entity, array and scalar types with validation and
//!   custom merge functions
//! - Normalization of nested data into entities linked by references
//! - Selector-driven reads, invalidations and deletes over a graph that may
//!   contain cycles
//! - Field-level staleness from expiry times and explicit invalidation
//! - Watchers notified only when their read result changes
//! - An optimistic overlay rebuilt from a queue of speculative updates
//! - Mark-and-sweep garbage collection rooted at watchers and retains
//!
//! Everything is synchronous and single-threaded.
//!
//! # Architecture
//!
//! - `schema`: type definitions and the schema registry
//! - `selector`: selector syntax and AST
//! - `graph`: entities, keys, the graph store, retain counts and the
//!   collector
//! - `traverse`: the read, write, invalidate and delete walks
//! - `reactive`: watchers, subscriptions and batching scopes
//! - `optimistic`: the overlay and its update queue
//! - `cache`: the [`Cache`] tying it all together
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use trellis_core::{Cache, EntityKey, ObjectType, ReadOptions, Schema, ValueType, WriteOptions};
//!
//! let schema = Schema::new()
//!     .with(ObjectType::named("User").field("id", ValueType::string()).field("name", ValueType::string()))?
//!     .with(ObjectType::named("Post").field("id", ValueType::string()).field("author", "User"))?;
//! let mut cache = Cache::new(schema);
//!
//! // The nested author is stored as its own entity.
//! cache.write(WriteOptions::new(
//!     "Post",
//!     json!({ "id": "1", "author": { "id": "u1", "name": "Ada" } }),
//! ))?;
//! assert!(cache.get(&EntityKey::new("User", "u1"), false).is_some());
//!
//! let result = cache.read(&ReadOptions::new("Post").id("1").selector_text("{ author { name } }")?);
//! let data = result.data.unwrap();
//! assert_eq!(data.get("author").unwrap().get("name").unwrap().as_str(), Some("Ada"));
//! assert!(!result.stale);
//! # Ok::<(), trellis_core::Error>(())
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod optimistic;
pub mod options;
pub mod reactive;
pub mod schema;
pub mod selector;
pub mod traverse;
pub mod value;

pub use cache::Cache;
pub use config::{CacheConfig, Clock, ManualClock, SystemClock, Timestamp};
pub use data::{Data, Record};
pub use error::{Error, Result};
pub use graph::{Entity, EntityKey, GcStats, Identity, Retained};
pub use optimistic::{OptimisticUpdateId, OptimisticView, UpdateFn};
pub use options::{DeleteOptions, InvalidateOptions, ReadOptions, TargetOptions, WatchOptions, WriteOptions};
pub use reactive::{Subscription, WatcherId};
pub use schema::{ArrayType, FieldConfig, ObjectType, RefHelper, ScalarKind, ScalarType, Schema, TypeRef, ValueType};
pub use selector::{parse, Document};
pub use traverse::{DeleteResult, Expiry, InvalidField, InvalidateResult, Path, PathSegment, ReadResult, WriteResult};
pub use value::{Map, Reference, Value};
