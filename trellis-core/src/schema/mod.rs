//! Type System
//!
//! Describes the shapes of entities and values: which fields exist, what
//! type each holds, how incoming data is merged into stored data, and which
//! fields are computed at read time instead of stored.
//!
//! # Entity Types
//!
//! Any object, array or scalar type that carries a name is an entity type.
//! Values of an entity type are stored once, under a key derived from the
//! type name and the value's id, and every other place that holds them
//! stores a reference instead.
//!
//! # Wrappers
//!
//! Unions and non-null wrappers never describe stored data directly. They
//! are resolved against a concrete runtime value by
//! [`Schema::resolve_wrapped`] before anything walks into the value.
//!
//! # Computed Fields
//!
//! A field with a `read` function is produced on demand from the raw value
//! of the object that declares it. The function gets a [`RefHelper`] so it
//! can point at other entities without knowing how keys are built.

mod registry;
mod types;

pub use registry::{Depth, Schema};
pub use types::{
    ArrayType, FieldConfig, MergeFn, ObjectType, ReadFn, ScalarKind, ScalarType, TypeRef,
    ValueType,
};

use crate::graph::{EntityKey, Identity};
use crate::value::{Reference, Value};

/// Capability handed to computed-field readers.
pub struct RefHelper<'a> {
    schema: &'a Schema,
}

impl<'a> RefHelper<'a> {
    pub(crate) fn new(schema: &'a Schema) -> Self {
        Self { schema }
    }

    /// A reference to the entity of type `ty` with the given id, or `None`
    /// if that pair cannot be identified.
    pub fn reference(&self, ty: impl Into<TypeRef>, id: impl Into<Value>) -> Option<Value> {
        let id = id.into();
        EntityKey::identify(self.schema, &ty.into(), Identity::Id(&id))
            .map(|key| Value::Ref(Reference::new(key)))
    }
}
