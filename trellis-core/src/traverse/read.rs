//! Read traversal.
//!
//! The walk keeps its own stack of partially built objects and lists, so
//! nesting depth (a long chain of references, say) costs heap, not call
//! stack. Each frame remembers where its finished value goes and how long
//! the diagnostic path was when it was opened.

use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::Arc;

use crate::config::Timestamp;
use crate::data::{Data, Record};
use crate::graph::{Entity, EntityKey, Graph, ROOT_FIELD};
use crate::schema::{Depth, RefHelper, Schema, TypeRef, ValueType};
use crate::selector::SelectionSet;
use crate::value::{Map, Value};

use super::{InvalidField, Path, PathSegment, ReadResult};

/// A value being read: stored in the graph, or produced by a computed field.
#[derive(Clone)]
enum Source<'a> {
    Graph(&'a Value),
    Computed(Rc<Value>),
}

impl<'a> Source<'a> {
    fn get(&self) -> &Value {
        match self {
            Source::Graph(value) => *value,
            Source::Computed(value) => value.as_ref(),
        }
    }

    fn field(&self, name: &str) -> Option<Source<'a>> {
        match self {
            Source::Graph(value) => {
                let value: &'a Value = *value;
                value.get(name).map(Source::Graph)
            }
            Source::Computed(value) => value.get(name).cloned().map(|v| Source::Computed(Rc::new(v))),
        }
    }

    fn item(&self, i: usize) -> Option<Source<'a>> {
        match self {
            Source::Graph(value) => {
                let value: &'a Value = *value;
                value.as_array()?.get(i).map(Source::Graph)
            }
            Source::Computed(value) => value
                .as_array()?
                .get(i)
                .cloned()
                .map(|v| Source::Computed(Rc::new(v))),
        }
    }
}

/// Where a finished value is delivered.
enum Slot {
    Root,
    Field(Rc<Record>, String),
    /// Appended to the list frame below.
    Element,
}

struct Pick<'s> {
    name: String,
    output: String,
    selection: Option<&'s SelectionSet>,
}

struct ObjectFrame<'a, 's> {
    slot: Slot,
    record: Rc<Record>,
    source: Source<'a>,
    ty: Option<Arc<ValueType>>,
    /// Set when the object is an entity's own value.
    owner: Option<&'a Entity>,
    memo_key: Option<EntityKey>,
    picks: std::vec::IntoIter<Pick<'s>>,
    depth: usize,
}

struct ListFrame<'a, 's> {
    slot: Slot,
    source: Source<'a>,
    len: usize,
    next: usize,
    element: Option<TypeRef>,
    selection: Option<&'s SelectionSet>,
    out: Vec<Data>,
    depth: usize,
}

enum Frame<'a, 's> {
    Object(ObjectFrame<'a, 's>),
    List(ListFrame<'a, 's>),
}

/// A value found inside a frame, waiting to be read.
struct Child<'a, 's> {
    source: Source<'a>,
    selection: Option<&'s SelectionSet>,
    ty: Option<Arc<ValueType>>,
    slot: Slot,
}

fn picks<'s>(map: &Map, selection: Option<&'s SelectionSet>) -> Vec<Pick<'s>> {
    match selection {
        Some(set) => set
            .expand(map.keys().map(String::as_str))
            .into_iter()
            .map(|picked| Pick {
                name: picked.name.to_string(),
                output: picked.output.to_string(),
                selection: picked.selection_set,
            })
            .collect(),
        None => map
            .keys()
            .map(|name| Pick {
                name: name.clone(),
                output: name.clone(),
                selection: None,
            })
            .collect(),
    }
}

/// State for one top-level read.
pub(crate) struct Reader<'a> {
    schema: &'a Schema,
    graph: &'a Graph,
    now: Timestamp,
    /// Output records of entities read without a selector.
    memo: HashMap<EntityKey, Rc<Record>>,
    /// Subset of `memo` still being filled in.
    building: HashSet<EntityKey>,
    output: Option<Data>,
    expires_at: Option<Timestamp>,
    invalidated: bool,
    missing: Vec<Path>,
    invalid: Vec<InvalidField>,
}

impl<'a> Reader<'a> {
    pub fn new(schema: &'a Schema, graph: &'a Graph, now: Timestamp) -> Self {
        Self {
            schema,
            graph,
            now,
            memo: HashMap::new(),
            building: HashSet::new(),
            output: None,
            expires_at: None,
            invalidated: false,
            missing: Vec::new(),
            invalid: Vec::new(),
        }
    }

    pub fn run<'s>(mut self, ty: &TypeRef, key: EntityKey, selection: Option<&'s SelectionSet>) -> ReadResult {
        if !self.graph.contains(&key) {
            return ReadResult::empty(Some(key));
        }

        let mut stack: Vec<Frame<'a, 's>> = Vec::new();
        let mut path = Path::new();
        let root_ty = self.schema.resolve(ty);
        self.entity(&mut stack, key.clone(), selection, root_ty, Slot::Root, &path);

        while let Some(top) = stack.last_mut() {
            let next = match top {
                Frame::Object(frame) => self.object_step(frame, &mut path),
                Frame::List(frame) => self.list_step(frame, &mut path),
            };
            match next {
                Some(child) => self.resolve(&mut stack, child, &path),
                None => {
                    if let Some(done) = stack.pop() {
                        let (slot, data) = self.close(done);
                        self.deliver(&mut stack, slot, Some(data));
                    }
                }
            }
        }

        let stale = self.invalidated || self.expires_at.map_or(false, |at| at <= self.now);
        ReadResult {
            data: self.output.take(),
            entity_id: Some(key),
            expires_at: self.expires_at,
            invalidated: self.invalidated,
            missing_fields: std::mem::take(&mut self.missing),
            invalid_fields: std::mem::take(&mut self.invalid),
            stale,
        }
    }

    /// Fold one field's metadata into the result.
    fn touch(&mut self, entity: &Entity, field: &str) {
        if entity.is_invalidated(field) {
            self.invalidated = true;
        }
        if let Some(at) = entity.field_expiry(field) {
            self.expires_at = Some(self.expires_at.map_or(at, |current| current.min(at)));
        }
    }

    fn deliver<'s>(&mut self, stack: &mut [Frame<'a, 's>], slot: Slot, data: Option<Data>) {
        match slot {
            Slot::Root => self.output = data,
            Slot::Field(record, output) => {
                if let Some(data) = data {
                    record.insert(&output, data);
                }
            }
            Slot::Element => {
                if let Some(Frame::List(list)) = stack.last_mut() {
                    list.out.push(data.unwrap_or(Data::Null));
                }
            }
        }
    }

    fn close(&mut self, frame: Frame<'a, '_>) -> (Slot, Data) {
        match frame {
            Frame::Object(frame) => {
                if let Some(key) = &frame.memo_key {
                    self.building.remove(key);
                }
                (frame.slot, Data::Object(frame.record))
            }
            Frame::List(frame) => (frame.slot, Data::List(frame.out)),
        }
    }

    fn entity<'s>(
        &mut self,
        stack: &mut Vec<Frame<'a, 's>>,
        key: EntityKey,
        selection: Option<&'s SelectionSet>,
        ty: Option<Arc<ValueType>>,
        slot: Slot,
        path: &Path,
    ) {
        let graph = self.graph;
        let Some(entity) = graph.get(&key) else {
            self.missing.push(path.clone());
            return self.deliver(stack, slot, None);
        };

        if selection.is_none() {
            if let Some(record) = self.memo.get(&key) {
                let data = if self.building.contains(&key) {
                    Data::Cycle(Rc::downgrade(record))
                } else {
                    Data::Object(record.clone())
                };
                return self.deliver(stack, slot, Some(data));
            }
        }

        let ty = self.schema.get(key.type_name()).cloned().or(ty);
        match &entity.value {
            Value::Object(map) => {
                let record = Rc::new(Record::default());
                let memo_key = match selection {
                    None => {
                        self.memo.insert(key.clone(), record.clone());
                        self.building.insert(key.clone());
                        Some(key)
                    }
                    Some(_) => None,
                };
                stack.push(Frame::Object(ObjectFrame {
                    slot,
                    record,
                    source: Source::Graph(&entity.value),
                    ty,
                    owner: Some(entity),
                    memo_key,
                    picks: picks(map, selection).into_iter(),
                    depth: path.len(),
                }));
            }
            other => {
                self.touch(entity, ROOT_FIELD);
                let child = Child {
                    source: Source::Graph(other),
                    selection,
                    ty,
                    slot,
                };
                self.resolve(stack, child, path);
            }
        }
    }

    /// Read `child`: finish it right away, or open a frame for it.
    fn resolve<'s>(&mut self, stack: &mut Vec<Frame<'a, 's>>, child: Child<'a, 's>, path: &Path) {
        let Child {
            source,
            selection,
            ty,
            slot,
        } = child;

        match source.get() {
            Value::Ref(reference) => {
                let key = reference.key().clone();
                self.entity(stack, key, selection, ty, slot, path);
            }
            Value::Object(map) => {
                let picks = picks(map, selection).into_iter();
                stack.push(Frame::Object(ObjectFrame {
                    slot,
                    record: Rc::new(Record::default()),
                    source,
                    ty,
                    owner: None,
                    memo_key: None,
                    picks,
                    depth: path.len(),
                }));
            }
            Value::Array(items) => {
                let len = items.len();
                let element = ty
                    .as_deref()
                    .and_then(ValueType::as_array)
                    .and_then(|array| array.element())
                    .cloned();
                stack.push(Frame::List(ListFrame {
                    slot,
                    source,
                    len,
                    next: 0,
                    element,
                    selection,
                    out: Vec::with_capacity(len),
                    depth: path.len(),
                }));
            }
            scalar => {
                let data = Data::scalar(scalar);
                self.deliver(stack, slot, Some(data));
            }
        }
    }

    /// Advance to the next picked field that has a value. Fields without
    /// one are recorded as missing on the way.
    fn object_step<'s>(&mut self, frame: &mut ObjectFrame<'a, 's>, path: &mut Path) -> Option<Child<'a, 's>> {
        let ty = frame.ty.clone();
        let object = ty.as_deref().and_then(ValueType::as_object);

        for pick in frame.picks.by_ref() {
            path.truncate(frame.depth);
            path.push(PathSegment::Field(pick.output.clone()));
            let config = object.and_then(|object| object.get_field(&pick.name));
            if let Some(entity) = frame.owner {
                self.touch(entity, &pick.name);
            }

            let source = match config.and_then(|config| config.read.as_ref()) {
                Some(read) => read(frame.source.get(), &RefHelper::new(self.schema))
                    .map(|value| Source::Computed(Rc::new(value))),
                None => frame.source.field(&pick.name),
            };
            let Some(source) = source else {
                self.missing.push(path.clone());
                continue;
            };

            let declared = config.and_then(|config| config.field_type());
            let ty = self.check(declared, source.get(), path);
            return Some(Child {
                source,
                selection: pick.selection,
                ty,
                slot: Slot::Field(frame.record.clone(), pick.output),
            });
        }
        None
    }

    fn list_step<'s>(&mut self, frame: &mut ListFrame<'a, 's>, path: &mut Path) -> Option<Child<'a, 's>> {
        while frame.next < frame.len {
            let i = frame.next;
            frame.next += 1;
            path.truncate(frame.depth);
            path.push(PathSegment::Index(i));

            let Some(source) = frame.source.item(i) else {
                frame.out.push(Data::Null);
                continue;
            };
            let ty = self.check(frame.element.as_ref(), source.get(), path);
            return Some(Child {
                source,
                selection: frame.selection,
                ty,
                slot: Slot::Element,
            });
        }
        None
    }

    /// Validate `value` against its declared type, recording a failure, and
    /// return the concrete type to continue with.
    fn check(&mut self, declared: Option<&TypeRef>, value: &Value, path: &Path) -> Option<Arc<ValueType>> {
        let declared = self.schema.resolve(declared?)?;
        if !self.schema.conforms(&declared, value, Depth::Shallow) {
            self.invalid.push(InvalidField {
                path: path.clone(),
                value: value.clone(),
            });
        }
        self.schema.resolve_wrapped(&declared, value)
    }
}
