//! Traversal Engine
//!
//! Selection-driven walks over one graph. The same shape of walk serves
//! three modes:
//!
//! - **read** resolves references, applies the schema and builds
//!   denormalized output, collecting diagnostics on the way.
//! - **invalidate** flags every visited field as invalidated.
//! - **delete** removes the selected leaf fields, or a whole entity when no
//!   selector is given.
//!
//! Writes go the other direction: [`write`] normalizes denormalized input
//! into entities linked by references.
//!
//! Every walk is given the graph to work on. Whether that graph is the
//! confirmed store or the optimistic overlay is decided by the caller.

mod mark;
mod read;
mod write;

use std::fmt;

use smallvec::SmallVec;

use crate::config::Timestamp;
use crate::data::Data;
use crate::error::Result;
use crate::graph::{EntityKey, Graph, Identity};
use crate::options::{ReadOptions, TargetOptions, WriteOptions};
use crate::schema::Schema;
use crate::value::Value;

pub use write::Expiry;

/// One step of a path through a value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

/// Location of a field relative to the root of an operation.
pub type Path = SmallVec<[PathSegment; 6]>;

/// Render a path as `comments.0.text`.
pub fn display_path(path: &Path) -> String {
    let mut out = String::new();
    for (i, segment) in path.iter().enumerate() {
        if i > 0 {
            out.push('.');
        }
        match segment {
            PathSegment::Field(name) => out.push_str(name),
            PathSegment::Index(index) => out.push_str(&index.to_string()),
        }
    }
    out
}

/// A value that failed validation against its declared type.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidField {
    pub path: Path,
    /// The raw value as stored (or as written).
    pub value: Value,
}

impl fmt::Display for InvalidField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", display_path(&self.path), self.value.to_json())
    }
}

/// Outcome of a read.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub data: Option<Data>,
    pub entity_id: Option<EntityKey>,
    /// Earliest expiry among visited fields; `None` means never.
    pub expires_at: Option<Timestamp>,
    pub invalidated: bool,
    pub missing_fields: Vec<Path>,
    pub invalid_fields: Vec<InvalidField>,
    pub stale: bool,
}

impl ReadResult {
    /// Result for an entity that does not exist (or cannot be identified).
    pub fn empty(entity_id: Option<EntityKey>) -> Self {
        Self {
            data: None,
            entity_id,
            expires_at: None,
            invalidated: false,
            missing_fields: Vec::new(),
            invalid_fields: Vec::new(),
            stale: true,
        }
    }

    /// Whether a watcher holding `self` must be told about `next`.
    ///
    /// Data is compared structurally; identity of output objects is
    /// irrelevant.
    pub fn differs_from(&self, next: &ReadResult) -> bool {
        self.stale != next.stale
            || self.invalidated != next.invalidated
            || self.missing_fields != next.missing_fields
            || self.invalid_fields != next.invalid_fields
            || self.data != next.data
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    /// Key of the root entity; `None` for anonymous root types.
    pub entity_id: Option<EntityKey>,
    /// Every entity the write touched, in write order.
    pub written: Vec<EntityKey>,
    /// Input values that failed validation. They were stored as given.
    pub invalid_fields: Vec<InvalidField>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub entity_id: Option<EntityKey>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidateResult {
    pub entity_id: Option<EntityKey>,
}

/// Store-agnostic entry points shared by the cache and optimistic updates.
#[derive(Clone, Copy)]
pub(crate) struct Engine<'a> {
    pub schema: &'a Schema,
    pub now: Timestamp,
    pub default_ttl_ms: Option<u64>,
}

impl<'a> Engine<'a> {
    pub fn identify(&self, options: &ReadOptions) -> Option<EntityKey> {
        EntityKey::identify(self.schema, &options.ty, Identity::Id(options.id.as_ref()?))
    }

    pub fn read(&self, graph: &Graph, options: &ReadOptions) -> ReadResult {
        let Some(key) = self.identify(options) else {
            return ReadResult::empty(None);
        };
        let selection = options.selector.as_ref().map(|doc| &doc.selection_set);
        read::Reader::new(self.schema, graph, self.now).run(&options.ty, key, selection)
    }

    pub fn write(&self, graph: &mut Graph, options: &WriteOptions) -> Result<WriteResult> {
        let expiry = match &options.expires_at {
            Some(expiry) => expiry.clone(),
            // A default TTL past the end of the clock never expires.
            None => self
                .default_ttl_ms
                .and_then(|ttl| Timestamp::try_from(ttl).ok())
                .and_then(|ttl| self.now.checked_add(ttl))
                .map_or(Expiry::Never, Expiry::At),
        };
        write::Writer::new(self.schema, graph, &expiry).run(
            &options.ty,
            options.id.as_ref(),
            &options.data,
        )
    }

    pub fn invalidate(&self, graph: &mut Graph, options: &TargetOptions) -> Result<InvalidateResult> {
        let key = mark::target(self.schema, options)?;
        if let Some(key) = &key {
            mark::Marker::new(graph, mark::Mode::Invalidate).run(key, selection(options));
        }
        Ok(InvalidateResult { entity_id: key })
    }

    pub fn delete(&self, graph: &mut Graph, options: &TargetOptions) -> Result<DeleteResult> {
        let key = mark::target(self.schema, options)?;
        if let Some(key) = &key {
            mark::Marker::new(graph, mark::Mode::Delete).run(key, selection(options));
        }
        Ok(DeleteResult { entity_id: key })
    }
}

fn selection(options: &TargetOptions) -> Option<&crate::selector::SelectionSet> {
    options.selector.as_ref().map(|doc| &doc.selection_set)
}
