//! Graph Entities
//!
//! This module defines the units stored in the reference graph and the keys
//! that address them.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

use crate::config::Timestamp;
use crate::schema::{Schema, TypeRef, ValueType};
use crate::value::{Map, Value};

/// Metadata key used for entities whose value is not an object.
pub const ROOT_FIELD: &str = "";

/// Unique identifier for an entity: `"<TypeName>:<canonical id>"`.
///
/// The key is opaque to callers, but the type-name prefix is kept addressable
/// so traversals can tell which type a reference points at.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    key: Arc<str>,
    type_len: usize,
}

impl EntityKey {
    /// Build a key from a type name and an already canonical id.
    pub fn new(type_name: &str, id: &str) -> Self {
        Self {
            key: Arc::from(format!("{type_name}:{id}")),
            type_len: type_name.len(),
        }
    }

    /// Rebuild a key from its string form.
    pub fn parse(raw: &str) -> Self {
        let type_len = raw.find(':').unwrap_or(raw.len());
        Self {
            key: Arc::from(raw),
            type_len,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn type_name(&self) -> &str {
        &self.key[..self.type_len]
    }

    /// Derive the key for a value of type `ty`.
    ///
    /// Returns `None` when the type has no name, or when no id is given and
    /// none can be read from the data.
    pub fn identify(schema: &Schema, ty: &TypeRef, identity: Identity<'_>) -> Option<Self> {
        let resolved = schema.resolve(ty)?;
        let name = resolved.name()?;
        let id = match identity {
            Identity::Id(id) => canonical_id(id)?,
            Identity::Data(data) => canonical_id(&infer_id(&resolved, data)?)?,
        };
        Some(Self::new(name, &id))
    }
}

impl fmt::Debug for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityKey({})", self.key)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl Serialize for EntityKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

/// Where to take an entity's id from.
#[derive(Debug, Clone, Copy)]
pub enum Identity<'a> {
    /// An explicit id. Composite ids are objects or arrays.
    Id(&'a Value),
    /// Read the id from the entity's key fields.
    Data(&'a Value),
}

fn infer_id(ty: &ValueType, data: &Value) -> Option<Value> {
    let object = ty.as_object()?;
    let map = data.as_object()?;
    match object.key_field_names() {
        [] => None,
        [single] => map.get(single).filter(|id| !id.is_null()).cloned(),
        fields => {
            let mut composite = Map::new();
            for field in fields {
                let id = map.get(field).filter(|id| !id.is_null())?;
                composite.insert(field.clone(), id.clone());
            }
            Some(Value::Object(composite))
        }
    }
}

/// Stable string form of an id. Object keys are sorted at every level, so
/// equal composite ids produce equal strings regardless of insertion order.
pub fn canonical_id(id: &Value) -> Option<String> {
    match id {
        Value::Null | Value::Ref(_) => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        composite => {
            let mut out = String::new();
            write_canonical(composite, &mut out);
            Some(out)
        }
    }
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null | Value::Ref(_) => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::Value::String(s.clone()).to_string()),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut fields: Vec<_> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (name, item)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(item, out);
            }
            out.push('}');
        }
    }
}

/// A stored entity.
///
/// `expires_at` and `invalidated` are keyed by top-level field name and only
/// ever name fields present in `value`. Non-object values keep their
/// metadata under [`ROOT_FIELD`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entity {
    key: EntityKey,
    pub value: Value,
    pub expires_at: IndexMap<String, Timestamp>,
    pub invalidated: IndexMap<String, bool>,
}

impl Entity {
    /// An entity with an empty object value.
    pub fn new(key: EntityKey) -> Self {
        Self::with_value(key, Value::Object(Map::new()))
    }

    pub fn with_value(key: EntityKey, value: Value) -> Self {
        Self {
            key,
            value,
            expires_at: IndexMap::new(),
            invalidated: IndexMap::new(),
        }
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn type_name(&self) -> &str {
        self.key.type_name()
    }

    /// Names of the metadata slots this entity's value currently has.
    pub fn field_names(&self) -> Vec<String> {
        match &self.value {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => vec![ROOT_FIELD.to_string()],
        }
    }

    pub fn is_invalidated(&self, field: &str) -> bool {
        self.invalidated.get(field).copied().unwrap_or(false)
    }

    pub fn field_expiry(&self, field: &str) -> Option<Timestamp> {
        self.expires_at.get(field).copied()
    }

    pub fn invalidate_field(&mut self, field: &str) {
        if self.has_slot(field) {
            self.invalidated.insert(field.to_string(), true);
        }
    }

    /// Drop a field together with its metadata.
    pub fn remove_field(&mut self, field: &str) -> Option<Value> {
        self.expires_at.shift_remove(field);
        self.invalidated.shift_remove(field);
        self.value.as_object_mut()?.shift_remove(field)
    }

    /// Keys of every entity this one references.
    pub fn references(&self) -> Vec<EntityKey> {
        let mut out = Vec::new();
        self.value.collect_references(&mut out);
        out
    }

    fn has_slot(&self, field: &str) -> bool {
        match &self.value {
            Value::Object(map) => map.contains_key(field),
            _ => field == ROOT_FIELD,
        }
    }
}
