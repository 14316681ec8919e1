//! The Cache
//!
//! [`Cache`] owns everything: the schema, the confirmed graph, the
//! optimistic overlay, the watchers, the retain counts and the batching
//! state. There is no global state; two caches are fully independent.
//!
//! # Mutation flow
//!
//! 1. The mutation is applied to the confirmed graph (or, for optimistic
//!    writes, to the overlay).
//! 2. A confirmed mutation rebuilds the overlay on top of the new data.
//! 3. Unless a transaction is open or a silent scope is active, every
//!    watcher is re-read and notified of changes.
//! 4. With `auto_gc` set, a collection follows each notification flush.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

use tracing::debug;

use crate::config::{CacheConfig, Clock, SystemClock};
use crate::error::Result;
use crate::graph::{self, Entity, EntityKey, GcStats, Graph, Identity, RetainSet, Retained};
use crate::optimistic::{OptimisticUpdateId, OptimisticView, Overlay};
use crate::options::{DeleteOptions, InvalidateOptions, ReadOptions, WatchOptions, WriteOptions};
use crate::reactive::{dispatch, BatchGuard, BatchState, Scope, Subscription, WatchRegistry, WatcherId};
use crate::schema::{Schema, TypeRef};
use crate::traverse::{DeleteResult, Engine, InvalidateResult, ReadResult, WriteResult};

/// A normalized, reactive entity cache.
pub struct Cache {
    schema: Arc<Schema>,
    config: CacheConfig,
    clock: Box<dyn Clock>,
    confirmed: Graph,
    overlay: Overlay,
    watchers: Rc<RefCell<WatchRegistry>>,
    retained: Rc<RefCell<RetainSet>>,
    batch: Rc<BatchState>,
}

fn engine<'a>(schema: &'a Schema, config: &CacheConfig, clock: &dyn Clock) -> Engine<'a> {
    Engine {
        schema,
        now: clock.now(),
        default_ttl_ms: config.default_ttl_ms,
    }
}

impl Cache {
    pub fn new(schema: impl Into<Arc<Schema>>) -> Self {
        Self::with_config(schema, CacheConfig::default())
    }

    pub fn with_config(schema: impl Into<Arc<Schema>>, config: CacheConfig) -> Self {
        Self::with_clock(schema, config, SystemClock)
    }

    pub fn with_clock(
        schema: impl Into<Arc<Schema>>,
        config: CacheConfig,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            schema: schema.into(),
            config,
            clock: Box::new(clock),
            confirmed: Graph::new(),
            overlay: Overlay::default(),
            watchers: Rc::new(RefCell::new(WatchRegistry::default())),
            retained: Rc::new(RefCell::new(RetainSet::default())),
            batch: Rc::new(BatchState::default()),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    // --- store ---

    /// The graph a read addresses. The overlay only exists while updates
    /// are queued or an optimistic write was made.
    fn graph(&self, optimistic: bool) -> &Graph {
        match self.overlay.graph() {
            Some(overlay) if optimistic => overlay,
            _ => &self.confirmed,
        }
    }

    pub fn get(&self, key: &EntityKey, optimistic: bool) -> Option<&Entity> {
        self.graph(optimistic).get(key)
    }

    /// Store an entity as-is, replacing any entity with the same key.
    pub fn set(&mut self, entity: Entity, optimistic: bool) -> Entity {
        debug!(key = %entity.key(), optimistic, "set entity");
        if optimistic {
            self.overlay.materialize(&self.confirmed).set(entity.clone());
        } else {
            self.confirmed.set(entity.clone());
            self.rebase();
        }
        self.mutated();
        entity
    }

    pub fn identify(&self, ty: &TypeRef, identity: Identity<'_>) -> Option<EntityKey> {
        EntityKey::identify(&self.schema, ty, identity)
    }

    // --- traversal ---

    pub fn read(&self, options: &ReadOptions) -> ReadResult {
        engine(&self.schema, &self.config, &*self.clock).read(self.graph(options.optimistic), options)
    }

    pub fn write(&mut self, options: WriteOptions) -> Result<WriteResult> {
        let engine = engine(&self.schema, &self.config, &*self.clock);
        let result = if options.optimistic {
            engine.write(self.overlay.materialize(&self.confirmed), &options)?
        } else {
            let result = engine.write(&mut self.confirmed, &options)?;
            self.overlay.rebuild(engine, &self.confirmed);
            result
        };
        debug!(
            entity = ?result.entity_id,
            written = result.written.len(),
            invalid = result.invalid_fields.len(),
            optimistic = options.optimistic,
            "write"
        );
        self.mutated();
        Ok(result)
    }

    pub fn delete(&mut self, options: DeleteOptions) -> Result<DeleteResult> {
        let result = engine(&self.schema, &self.config, &*self.clock).delete(&mut self.confirmed, &options)?;
        debug!(entity = ?result.entity_id, "delete");
        self.rebase();
        self.mutated();
        Ok(result)
    }

    pub fn invalidate(&mut self, options: InvalidateOptions) -> Result<InvalidateResult> {
        let result =
            engine(&self.schema, &self.config, &*self.clock).invalidate(&mut self.confirmed, &options)?;
        debug!(entity = ?result.entity_id, "invalidate");
        self.rebase();
        self.mutated();
        Ok(result)
    }

    // --- watchers ---

    /// Watch the result of a read. The callback receives `(new, previous)`
    /// each time the result changes; registering does not call it.
    pub fn watch<F>(&mut self, options: WatchOptions, callback: F) -> Subscription
    where
        F: FnMut(&ReadResult, &ReadResult) + 'static,
    {
        let id = WatcherId::new();
        let initial = self.read(&options);
        debug!(watcher = ?id, entity = ?initial.entity_id, "watch");
        self.watchers
            .borrow_mut()
            .insert(id, options, Box::new(callback), initial);
        Subscription::new(id, Rc::downgrade(&self.watchers))
    }

    pub fn watcher_count(&self) -> usize {
        self.watchers.borrow().len()
    }

    // --- batching ---

    /// Run `f` with notifications deferred until the outermost transaction
    /// closes. Watchers are notified at most once for the whole batch.
    pub fn transaction<R>(&mut self, f: impl FnOnce(&mut Cache) -> R) -> R {
        let result = {
            let _guard = BatchGuard::enter(&self.batch, Scope::Transaction);
            f(self)
        };
        if self.batch.take_pending() {
            self.flush();
        }
        result
    }

    /// Run `f` without notifying watchers of its mutations.
    pub fn silent<R>(&mut self, f: impl FnOnce(&mut Cache) -> R) -> R {
        let _guard = BatchGuard::enter(&self.batch, Scope::Silent);
        f(self)
    }

    fn mutated(&mut self) {
        if self.batch.mutated() {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let engine = engine(&self.schema, &self.config, &*self.clock);
        let confirmed = &self.confirmed;
        let overlay = self.overlay.graph();
        let notified = dispatch(&self.watchers, |options| {
            let graph = match overlay {
                Some(overlay) if options.optimistic => overlay,
                _ => confirmed,
            };
            engine.read(graph, options)
        });
        debug!(notified, "flushed notifications");

        if self.config.auto_gc {
            self.gc();
        }
    }

    /// Rebuild the overlay after confirmed data changed.
    fn rebase(&mut self) {
        let engine = engine(&self.schema, &self.config, &*self.clock);
        self.overlay.rebuild(engine, &self.confirmed);
    }

    // --- optimistic ---

    /// Queue an optimistic update. It is replayed over confirmed data on
    /// every rebuild until removed.
    pub fn add_optimistic_update<F>(&mut self, update: F) -> OptimisticUpdateId
    where
        F: FnMut(&mut OptimisticView<'_>) -> Result<()> + 'static,
    {
        let id = self.overlay.push(Box::new(update));
        debug!(update = ?id, queued = self.overlay.len(), "add optimistic update");
        self.rebase();
        self.mutated();
        id
    }

    /// Returns whether `id` was queued.
    pub fn remove_optimistic_update(&mut self, id: OptimisticUpdateId) -> bool {
        if !self.overlay.remove(id) {
            return false;
        }
        debug!(update = ?id, queued = self.overlay.len(), "remove optimistic update");
        self.rebase();
        self.mutated();
        true
    }

    // --- lifecycle ---

    /// Keep `key` (and whatever it references) alive across `gc()` until
    /// the guard is dropped.
    pub fn retain(&mut self, key: EntityKey) -> Retained {
        graph::retain(&self.retained, key)
    }

    pub fn retain_count(&self, key: &EntityKey) -> usize {
        self.retained.borrow().count(key)
    }

    /// Remove every entity not reachable from a retained entity or a
    /// watcher's subject, in both graphs.
    pub fn gc(&mut self) -> GcStats {
        let engine = engine(&self.schema, &self.config, &*self.clock);
        let mut roots: Vec<EntityKey> = self.retained.borrow().roots().cloned().collect();
        roots.extend(
            self.watchers
                .borrow()
                .subjects()
                .iter()
                .filter_map(|options| engine.identify(options)),
        );

        let mut graphs: Vec<&mut Graph> = vec![&mut self.confirmed];
        graphs.extend(self.overlay.graph_mut());
        let stats = graph::collect(roots, &mut graphs);
        debug!(marked = stats.marked, removed = stats.removed, "gc");
        stats
    }

    /// Clear all data, watchers, retains and optimistic updates.
    /// Outstanding handles stay safe to drop.
    pub fn reset(&mut self) {
        debug!(entities = self.confirmed.len(), watchers = self.watcher_count(), "reset");
        self.confirmed.clear();
        self.overlay.clear();
        self.watchers.borrow_mut().clear();
        self.retained.borrow_mut().clear();
        self.batch.reset();
    }

    // --- introspection ---

    pub fn len(&self, optimistic: bool) -> usize {
        self.graph(optimistic).len()
    }

    pub fn is_empty(&self) -> bool {
        self.confirmed.is_empty()
    }

    pub fn keys(&self, optimistic: bool) -> Vec<EntityKey> {
        self.graph(optimistic).keys().cloned().collect()
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("entities", &self.confirmed.len())
            .field("overlay", &self.overlay)
            .field("watchers", &self.watcher_count())
            .field("config", &self.config)
            .finish()
    }
}
