//! Type descriptions.
//!
//! Types are immutable once built and shared behind `Arc`. Fields refer to
//! other named types by name ([`TypeRef::Named`]) so recursive schemas never
//! need an ownership cycle; anonymous nested shapes are carried inline.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::schema::RefHelper;
use crate::value::Value;

/// Computed-field reader: receives the raw stored value of the object the
/// field belongs to and a helper that turns (type, id) into a reference.
pub type ReadFn = Arc<dyn Fn(&Value, &RefHelper<'_>) -> Option<Value> + Send + Sync>;

/// Merge function: `(incoming, existing) -> stored`.
pub type MergeFn = Arc<dyn Fn(&Value, Option<&Value>) -> Value + Send + Sync>;

/// A reference to a type, either by name or inline.
#[derive(Clone)]
pub enum TypeRef {
    Named(Arc<str>),
    Inline(Arc<ValueType>),
}

impl TypeRef {
    pub fn named(name: &str) -> Self {
        TypeRef::Named(Arc::from(name))
    }

    /// Name of the referenced type, if it has one.
    pub fn name(&self) -> Option<&str> {
        match self {
            TypeRef::Named(name) => Some(name),
            TypeRef::Inline(ty) => ty.name(),
        }
    }
}

impl fmt::Debug for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::Inline(ty) => ty.fmt(f),
        }
    }
}

impl From<&str> for TypeRef {
    fn from(name: &str) -> Self {
        TypeRef::named(name)
    }
}

impl From<Arc<ValueType>> for TypeRef {
    fn from(ty: Arc<ValueType>) -> Self {
        TypeRef::Inline(ty)
    }
}

impl From<ValueType> for TypeRef {
    fn from(ty: ValueType) -> Self {
        TypeRef::Inline(Arc::new(ty))
    }
}

impl From<ObjectType> for TypeRef {
    fn from(ty: ObjectType) -> Self {
        ValueType::Object(ty).into()
    }
}

impl From<ArrayType> for TypeRef {
    fn from(ty: ArrayType) -> Self {
        ValueType::Array(ty).into()
    }
}

impl From<ScalarType> for TypeRef {
    fn from(ty: ScalarType) -> Self {
        ValueType::Scalar(ty).into()
    }
}

/// The shape of a value.
#[derive(Debug)]
pub enum ValueType {
    Object(ObjectType),
    Array(ArrayType),
    Scalar(ScalarType),
    /// The first member matching the runtime value wins.
    Union(Vec<TypeRef>),
    /// Rejects null; otherwise behaves as the wrapped type.
    NonNull(TypeRef),
}

impl ValueType {
    pub fn string() -> Self {
        ValueType::Scalar(ScalarType::new(ScalarKind::String))
    }

    pub fn number() -> Self {
        ValueType::Scalar(ScalarType::new(ScalarKind::Number))
    }

    pub fn boolean() -> Self {
        ValueType::Scalar(ScalarType::new(ScalarKind::Boolean))
    }

    pub fn array(of: impl Into<TypeRef>) -> Self {
        ValueType::Array(ArrayType::of(of))
    }

    pub fn union<I, T>(members: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TypeRef>,
    {
        ValueType::Union(members.into_iter().map(Into::into).collect())
    }

    pub fn non_null(inner: impl Into<TypeRef>) -> Self {
        ValueType::NonNull(inner.into())
    }

    /// Name of an entity type. Unions and non-null wrappers are never named.
    pub fn name(&self) -> Option<&str> {
        match self {
            ValueType::Object(ty) => ty.name.as_deref(),
            ValueType::Array(ty) => ty.name.as_deref(),
            ValueType::Scalar(ty) => ty.name.as_deref(),
            ValueType::Union(_) | ValueType::NonNull(_) => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectType> {
        match self {
            ValueType::Object(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayType> {
        match self {
            ValueType::Array(ty) => Some(ty),
            _ => None,
        }
    }

    /// Type-level merge function, if any.
    pub fn merge_fn(&self) -> Option<&MergeFn> {
        match self {
            ValueType::Object(ty) => ty.write.as_ref(),
            ValueType::Array(ty) => ty.write.as_ref(),
            _ => None,
        }
    }
}

impl From<ObjectType> for ValueType {
    fn from(ty: ObjectType) -> Self {
        ValueType::Object(ty)
    }
}

impl From<ArrayType> for ValueType {
    fn from(ty: ArrayType) -> Self {
        ValueType::Array(ty)
    }
}

impl From<ScalarType> for ValueType {
    fn from(ty: ScalarType) -> Self {
        ValueType::Scalar(ty)
    }
}

/// An object shape with declared fields.
///
/// Undeclared fields are allowed and pass through untyped.
pub struct ObjectType {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) fields: IndexMap<String, FieldConfig>,
    pub(crate) key_fields: Vec<String>,
    pub(crate) write: Option<MergeFn>,
}

impl ObjectType {
    /// An anonymous object shape. It is never stored as an entity.
    pub fn new() -> Self {
        Self {
            name: None,
            fields: IndexMap::new(),
            key_fields: vec!["id".to_string()],
            write: None,
        }
    }

    /// An entity type.
    pub fn named(name: &str) -> Self {
        Self {
            name: Some(Arc::from(name)),
            ..Self::new()
        }
    }

    pub fn field(mut self, name: &str, config: impl Into<FieldConfig>) -> Self {
        self.fields.insert(name.to_string(), config.into());
        self
    }

    /// Declare a computed field. It is never stored.
    pub fn computed<F>(self, name: &str, read: F) -> Self
    where
        F: Fn(&Value, &RefHelper<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.field(name, FieldConfig::new().read(read))
    }

    /// Fields whose values together form the entity id. Defaults to `["id"]`.
    pub fn key_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.key_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Merge function used for values of this type when the field declares none.
    pub fn write<F>(mut self, merge: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) -> Value + Send + Sync + 'static,
    {
        self.write = Some(Arc::new(merge));
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldConfig> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldConfig)> {
        self.fields.iter().map(|(name, config)| (name.as_str(), config))
    }

    pub fn key_field_names(&self) -> &[String] {
        &self.key_fields
    }
}

impl Default for ObjectType {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectType")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("key_fields", &self.key_fields)
            .finish_non_exhaustive()
    }
}

/// A sequence shape.
pub struct ArrayType {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) of: Option<TypeRef>,
    pub(crate) write: Option<MergeFn>,
}

impl ArrayType {
    pub fn of(element: impl Into<TypeRef>) -> Self {
        Self {
            name: None,
            of: Some(element.into()),
            write: None,
        }
    }

    /// An array whose elements are not typed.
    pub fn untyped() -> Self {
        Self {
            name: None,
            of: None,
            write: None,
        }
    }

    /// Give the array a name, making it usable as a root entity type.
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn write<F>(mut self, merge: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) -> Value + Send + Sync + 'static,
    {
        self.write = Some(Arc::new(merge));
        self
    }

    pub fn element(&self) -> Option<&TypeRef> {
        self.of.as_ref()
    }
}

impl fmt::Debug for ArrayType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayType")
            .field("name", &self.name)
            .field("of", &self.of)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Boolean,
    Number,
    String,
}

#[derive(Debug, Clone)]
pub struct ScalarType {
    pub(crate) name: Option<Arc<str>>,
    pub(crate) kind: ScalarKind,
}

impl ScalarType {
    pub fn new(kind: ScalarKind) -> Self {
        Self { name: None, kind }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(Arc::from(name));
        self
    }

    pub fn kind(&self) -> ScalarKind {
        self.kind
    }
}

/// Per-field configuration of an object type.
#[derive(Clone, Default)]
pub struct FieldConfig {
    pub(crate) ty: Option<TypeRef>,
    pub(crate) read: Option<ReadFn>,
    pub(crate) write: Option<MergeFn>,
}

impl FieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ty(mut self, ty: impl Into<TypeRef>) -> Self {
        self.ty = Some(ty.into());
        self
    }

    pub fn read<F>(mut self, read: F) -> Self
    where
        F: Fn(&Value, &RefHelper<'_>) -> Option<Value> + Send + Sync + 'static,
    {
        self.read = Some(Arc::new(read));
        self
    }

    pub fn write<F>(mut self, merge: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) -> Value + Send + Sync + 'static,
    {
        self.write = Some(Arc::new(merge));
        self
    }

    pub fn field_type(&self) -> Option<&TypeRef> {
        self.ty.as_ref()
    }

    pub fn is_computed(&self) -> bool {
        self.read.is_some()
    }
}

impl fmt::Debug for FieldConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldConfig")
            .field("ty", &self.ty)
            .field("computed", &self.read.is_some())
            .field("custom_write", &self.write.is_some())
            .finish()
    }
}

macro_rules! field_config_from_type {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FieldConfig {
                fn from(ty: $ty) -> Self {
                    FieldConfig::new().ty(ty)
                }
            }
        )*
    };
}

field_config_from_type!(&str, TypeRef, Arc<ValueType>, ValueType, ObjectType, ArrayType, ScalarType);
