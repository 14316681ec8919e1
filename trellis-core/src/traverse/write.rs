//! Write engine: normalization and merge.
//!
//! Input is walked top-down. Every sub-value whose (resolved) type is a named
//! entity type and whose id can be derived is written as its own entity and
//! replaced in its parent by a reference. Everything else is stored inline.
//! A parent's fields are normalized before the parent entity is fetched, so a
//! child that is the parent itself does not get clobbered.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::config::Timestamp;
use crate::error::{Error, Result};
use crate::graph::{Entity, EntityKey, Graph, Identity, ROOT_FIELD};
use crate::schema::{Depth, FieldConfig, Schema, TypeRef, ValueType};
use crate::value::{Map, Reference, Value};

use super::{InvalidField, Path, PathSegment, WriteResult};

/// Expiry stamped on the fields a write touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// Written fields never expire.
    Never,
    /// Every written field expires at this time.
    At(Timestamp),
    /// Fields of entities of the named types expire at the given time;
    /// entities of other types never expire.
    PerType(IndexMap<String, Timestamp>),
}

impl Expiry {
    fn for_type(&self, type_name: &str) -> Option<Timestamp> {
        match self {
            Expiry::Never => None,
            Expiry::At(at) => Some(*at),
            Expiry::PerType(types) => types.get(type_name).copied(),
        }
    }
}

pub(crate) struct Writer<'a> {
    schema: &'a Schema,
    graph: &'a mut Graph,
    expiry: &'a Expiry,
    written: Vec<EntityKey>,
    invalid: Vec<InvalidField>,
}

impl<'a> Writer<'a> {
    pub fn new(schema: &'a Schema, graph: &'a mut Graph, expiry: &'a Expiry) -> Self {
        Self {
            schema,
            graph,
            expiry,
            written: Vec::new(),
            invalid: Vec::new(),
        }
    }

    pub fn run(mut self, ty: &TypeRef, id: Option<&Value>, data: &Value) -> Result<WriteResult> {
        let root = self.schema.require(ty)?;
        let Some(name) = root.name() else {
            return Ok(WriteResult::default());
        };
        let identity = match id {
            Some(id) => Identity::Id(id),
            None => Identity::Data(data),
        };
        let key = EntityKey::identify(self.schema, ty, identity).ok_or_else(|| Error::MissingId {
            type_name: name.to_string(),
        })?;

        let mut path = Path::new();
        if !self.schema.conforms(&root, data, Depth::Shallow) {
            self.invalid.push(InvalidField {
                path: path.clone(),
                value: data.clone(),
            });
        }
        self.entity(&root, key.clone(), data, &mut path);

        Ok(WriteResult {
            entity_id: Some(key),
            written: self.written,
            invalid_fields: self.invalid,
        })
    }

    fn entity(&mut self, ty: &Arc<ValueType>, key: EntityKey, data: &Value, path: &mut Path) {
        let type_name = key.type_name().to_string();
        let expires_at = self.expiry.for_type(&type_name);

        match (ty.as_object(), data) {
            (Some(object), Value::Object(fields)) => {
                let mut normalized = Vec::with_capacity(fields.len());
                for (name, raw) in fields {
                    let config = object.get_field(name);
                    if config.map_or(false, FieldConfig::is_computed) {
                        continue;
                    }
                    path.push(PathSegment::Field(name.clone()));
                    let (value, concrete) = self.normalize(config.and_then(FieldConfig::field_type), raw, path);
                    path.pop();
                    normalized.push((name, config, concrete, value));
                }

                let mut entity = self
                    .graph
                    .remove(&key)
                    .filter(|entity| entity.value.as_object().is_some())
                    .unwrap_or_else(|| Entity::new(key.clone()));

                for (name, config, concrete, value) in normalized {
                    let merged = self
                        .schema
                        .merge_field(config, concrete.as_deref(), value, entity.value.get(name));
                    if let Some(map) = entity.value.as_object_mut() {
                        map.insert(name.clone(), merged);
                    }
                    stamp(&mut entity, name, expires_at);
                }
                self.graph.set(entity);
            }
            _ => {
                let concrete = self.schema.resolve_wrapped(ty, data);
                let value = self.inline(concrete.as_ref(), data, path);
                let mut entity = self
                    .graph
                    .remove(&key)
                    .unwrap_or_else(|| Entity::with_value(key.clone(), Value::Null));
                let existing = match &entity.value {
                    Value::Null => None,
                    existing => Some(existing),
                };
                entity.value = self.schema.merge_field(None, Some(ty), value, existing);
                entity.expires_at.clear();
                entity.invalidated.clear();
                stamp(&mut entity, ROOT_FIELD, expires_at);
                self.graph.set(entity);
            }
        }

        self.written.push(key);
    }

    /// Validate `raw` against its declared type, then normalize it.
    fn normalize(
        &mut self,
        declared: Option<&TypeRef>,
        raw: &Value,
        path: &mut Path,
    ) -> (Value, Option<Arc<ValueType>>) {
        let declared = declared.and_then(|ty| self.schema.resolve(ty));
        if let Some(declared) = &declared {
            if !self.schema.conforms(declared, raw, Depth::Shallow) {
                self.invalid.push(InvalidField {
                    path: path.clone(),
                    value: raw.clone(),
                });
            }
        }
        let concrete = declared.and_then(|ty| self.schema.resolve_wrapped(&ty, raw));

        if let (Some(ty), Value::Object(_)) = (&concrete, raw) {
            if ty.name().is_some() {
                let as_ref = TypeRef::Inline(ty.clone());
                if let Some(key) = EntityKey::identify(self.schema, &as_ref, Identity::Data(raw)) {
                    self.entity(ty, key.clone(), raw, path);
                    return (Value::Ref(Reference::new(key)), concrete);
                }
            }
        }

        let value = self.inline(concrete.as_ref(), raw, path);
        (value, concrete)
    }

    /// Normalize the children of a value that is stored in place.
    fn inline(&mut self, ty: Option<&Arc<ValueType>>, raw: &Value, path: &mut Path) -> Value {
        match raw {
            Value::Object(fields) => {
                let object = ty.and_then(|ty| ty.as_object());
                let mut out = Map::with_capacity(fields.len());
                for (name, child) in fields {
                    let config = object.and_then(|object| object.get_field(name));
                    if config.map_or(false, FieldConfig::is_computed) {
                        continue;
                    }
                    path.push(PathSegment::Field(name.clone()));
                    let (value, _) = self.normalize(config.and_then(FieldConfig::field_type), child, path);
                    path.pop();
                    out.insert(name.clone(), value);
                }
                Value::Object(out)
            }
            Value::Array(items) => {
                let element = ty
                    .and_then(|ty| ty.as_array())
                    .and_then(|array| array.element())
                    .cloned();
                let mut out = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    path.push(PathSegment::Index(i));
                    let (value, _) = self.normalize(element.as_ref(), item, path);
                    path.pop();
                    out.push(value);
                }
                Value::Array(out)
            }
            other => other.clone(),
        }
    }
}

/// Fresh data supersedes invalidation and carries the write's expiry.
fn stamp(entity: &mut Entity, field: &str, expires_at: Option<Timestamp>) {
    entity.invalidated.shift_remove(field);
    match expires_at {
        Some(at) => {
            entity.expires_at.insert(field.to_string(), at);
        }
        None => {
            entity.expires_at.shift_remove(field);
        }
    }
}
