//! Schema registry, validation and merging.

use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::schema::types::{FieldConfig, ScalarKind, TypeRef, ValueType};
use crate::value::Value;

/// How far [`Schema::conforms`] looks into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Depth {
    /// Only the outer shape. Used by traversals, which check children as
    /// they reach them.
    Shallow,
    /// Every declared field and element, recursively.
    Deep,
}

/// The set of named types known to a cache.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    types: IndexMap<Arc<str>, Arc<ValueType>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named type and return a reference to it.
    pub fn define(&mut self, ty: impl Into<ValueType>) -> Result<TypeRef> {
        let ty = ty.into();
        let name: Arc<str> = Arc::from(ty.name().ok_or(Error::NotNamed)?);
        self.types.insert(name.clone(), Arc::new(ty));
        Ok(TypeRef::Named(name))
    }

    /// Builder form of [`Schema::define`].
    pub fn with(mut self, ty: impl Into<ValueType>) -> Result<Self> {
        self.define(ty)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ValueType>> {
        self.types.get(name)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.types.keys().map(|name| &**name)
    }

    /// Look up the type behind a reference. Unknown names resolve to `None`.
    pub fn resolve(&self, ty: &TypeRef) -> Option<Arc<ValueType>> {
        match ty {
            TypeRef::Named(name) => self.types.get(name).cloned(),
            TypeRef::Inline(ty) => Some(ty.clone()),
        }
    }

    /// Like [`Schema::resolve`], but an unknown name is an error.
    pub fn require(&self, ty: &TypeRef) -> Result<Arc<ValueType>> {
        self.resolve(ty).ok_or_else(|| Error::UnknownType {
            name: ty.name().unwrap_or_default().to_string(),
        })
    }

    /// Check a value against a type, recursing into declared fields and
    /// elements.
    pub fn validate(&self, ty: &TypeRef, value: &Value) -> bool {
        match self.resolve(ty) {
            Some(ty) => self.conforms(&ty, value, Depth::Deep),
            None => true,
        }
    }

    /// Check a value against a resolved type.
    ///
    /// Null conforms to everything except a non-null wrapper. A reference
    /// conforms to a named type with the same name as its target.
    pub fn conforms(&self, ty: &ValueType, value: &Value, depth: Depth) -> bool {
        match (ty, value) {
            (ValueType::NonNull(inner), value) => {
                !value.is_null() && self.conforms_ref(inner, value, depth)
            }
            (ValueType::Union(members), value) => members
                .iter()
                .any(|member| self.conforms_ref(member, value, depth)),
            (_, Value::Null) => true,
            (ty, Value::Ref(r)) => ty.name() == Some(r.key().type_name()),
            (ValueType::Object(object), Value::Object(map)) => {
                depth == Depth::Shallow
                    || object.fields().all(|(name, config)| {
                        match (config.field_type(), map.get(name)) {
                            (Some(field_ty), Some(field)) if !config.is_computed() => {
                                self.conforms_ref(field_ty, field, depth)
                            }
                            _ => true,
                        }
                    })
            }
            (ValueType::Array(array), Value::Array(items)) => {
                depth == Depth::Shallow
                    || match array.element() {
                        Some(element) => items
                            .iter()
                            .all(|item| self.conforms_ref(element, item, depth)),
                        None => true,
                    }
            }
            (ValueType::Scalar(scalar), value) => matches!(
                (scalar.kind(), value),
                (ScalarKind::Boolean, Value::Bool(_))
                    | (ScalarKind::Number, Value::Number(_))
                    | (ScalarKind::String, Value::String(_))
            ),
            _ => false,
        }
    }

    fn conforms_ref(&self, ty: &TypeRef, value: &Value, depth: Depth) -> bool {
        match self.resolve(ty) {
            Some(ty) => self.conforms(&ty, value, depth),
            None => true,
        }
    }

    /// Unwrap unions and non-null wrappers down to the concrete type that
    /// describes `value`.
    ///
    /// Returns `None` when no member matches, or when a non-null wrapper meets
    /// null.
    pub fn resolve_wrapped(&self, ty: &Arc<ValueType>, value: &Value) -> Option<Arc<ValueType>> {
        match &**ty {
            ValueType::NonNull(inner) => {
                if value.is_null() {
                    return None;
                }
                let inner = self.resolve(inner)?;
                self.resolve_wrapped(&inner, value)
            }
            ValueType::Union(members) => members.iter().find_map(|member| {
                let member = self.resolve(member)?;
                if self.conforms(&member, value, Depth::Deep) {
                    self.resolve_wrapped(&member, value)
                } else {
                    None
                }
            }),
            _ => Some(ty.clone()),
        }
    }

    /// Resolve a type reference and unwrap it against `value` in one step.
    pub fn concrete(&self, ty: Option<&TypeRef>, value: &Value) -> Option<Arc<ValueType>> {
        let ty = self.resolve(ty?)?;
        self.resolve_wrapped(&ty, value)
    }

    /// Combine an incoming value with what is already stored.
    ///
    /// A field-level merge function wins over a type-level one; without
    /// either, two plain objects are shallow-merged and anything else is
    /// replaced.
    pub fn merge_field(
        &self,
        config: Option<&FieldConfig>,
        ty: Option<&ValueType>,
        incoming: Value,
        existing: Option<&Value>,
    ) -> Value {
        if let Some(merge) = config
            .and_then(|config| config.write.as_ref())
            .or_else(|| ty.and_then(ValueType::merge_fn))
        {
            return merge(&incoming, existing);
        }
        match (incoming, existing) {
            (Value::Object(incoming), Some(Value::Object(existing))) => {
                let mut merged = existing.clone();
                merged.extend(incoming);
                Value::Object(merged)
            }
            (incoming, _) => incoming,
        }
    }
}
