//! Optimistic overlay.
//!
//! The overlay is a second graph: the confirmed graph plus the effect of
//! every queued optimistic update, replayed in insertion order. It is never
//! patched. Any change to the queue or to confirmed data rebuilds it from
//! scratch, so removing an update is exact and confirmed writes are always
//! rebased under the pending speculation.
//!
//! With an empty queue there is no overlay and optimistic reads fall through
//! to the confirmed graph.

use std::fmt;

use tracing::{debug, warn};

use crate::error::Result;
use crate::graph::{Entity, EntityKey, Graph, Identity};
use crate::options::{DeleteOptions, InvalidateOptions, ReadOptions, WriteOptions};
use crate::schema::TypeRef;
use crate::traverse::{DeleteResult, Engine, InvalidateResult, ReadResult, WriteResult};

/// Identifies a queued optimistic update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OptimisticUpdateId(u64);

/// An optimistic update. Called once per rebuild against a fresh overlay.
pub type UpdateFn = Box<dyn FnMut(&mut OptimisticView<'_>) -> Result<()>>;

/// The operations an optimistic update may perform. Everything goes to the
/// overlay graph being built.
pub struct OptimisticView<'a> {
    engine: Engine<'a>,
    graph: &'a mut Graph,
}

impl<'a> OptimisticView<'a> {
    pub(crate) fn new(engine: Engine<'a>, graph: &'a mut Graph) -> Self {
        Self { engine, graph }
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Entity> {
        self.graph.get(key)
    }

    pub fn set(&mut self, entity: Entity) {
        self.graph.set(entity);
    }

    pub fn identify(&self, ty: &TypeRef, identity: Identity<'_>) -> Option<EntityKey> {
        EntityKey::identify(self.engine.schema, ty, identity)
    }

    pub fn read(&self, options: &ReadOptions) -> ReadResult {
        self.engine.read(&*self.graph, options)
    }

    pub fn write(&mut self, options: &WriteOptions) -> Result<WriteResult> {
        self.engine.write(&mut *self.graph, options)
    }

    pub fn delete(&mut self, options: &DeleteOptions) -> Result<DeleteResult> {
        self.engine.delete(&mut *self.graph, options)
    }

    pub fn invalidate(&mut self, options: &InvalidateOptions) -> Result<InvalidateResult> {
        self.engine.invalidate(&mut *self.graph, options)
    }
}

#[derive(Default)]
pub(crate) struct Overlay {
    graph: Option<Graph>,
    queue: Vec<(OptimisticUpdateId, UpdateFn)>,
    next_id: u64,
}

impl Overlay {
    pub fn graph(&self) -> Option<&Graph> {
        self.graph.as_ref()
    }

    /// The overlay graph, created from `confirmed` if there is none yet.
    pub fn materialize(&mut self, confirmed: &Graph) -> &mut Graph {
        self.graph.get_or_insert_with(|| confirmed.clone())
    }

    pub fn graph_mut(&mut self) -> Option<&mut Graph> {
        self.graph.as_mut()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn push(&mut self, update: UpdateFn) -> OptimisticUpdateId {
        let id = OptimisticUpdateId(self.next_id);
        self.next_id += 1;
        self.queue.push((id, update));
        id
    }

    pub fn remove(&mut self, id: OptimisticUpdateId) -> bool {
        let before = self.queue.len();
        self.queue.retain(|(queued, _)| *queued != id);
        self.queue.len() != before
    }

    /// Drop the queue and the overlay. Ids keep counting up.
    pub fn clear(&mut self) {
        self.queue.clear();
        self.graph = None;
    }

    /// Throw the overlay away and replay the queue over a copy of
    /// `confirmed`. An update that fails is skipped; its partial effects
    /// stay in the overlay.
    pub fn rebuild(&mut self, engine: Engine<'_>, confirmed: &Graph) {
        if self.queue.is_empty() {
            self.graph = None;
            return;
        }

        let mut graph = confirmed.clone();
        for (id, update) in &mut self.queue {
            let mut view = OptimisticView::new(engine, &mut graph);
            if let Err(error) = update(&mut view) {
                warn!(update = ?id, %error, "optimistic update failed during rebuild");
            }
        }
        debug!(updates = self.queue.len(), entities = graph.len(), "rebuilt optimistic overlay");
        self.graph = Some(graph);
    }
}

impl fmt::Debug for Overlay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlay")
            .field("updates", &self.queue.len())
            .field("entities", &self.graph.as_ref().map(Graph::len))
            .finish()
    }
}
