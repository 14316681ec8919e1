//! Operation options.
//!
//! Each operation takes a small options struct built with chained setters:
//!
//! ```rust
//! use trellis_core::ReadOptions;
//!
//! let options = ReadOptions::new("Post")
//!     .id("1")
//!     .selector_text("{ title author { name } }")
//!     .unwrap();
//! assert!(!options.optimistic);
//! ```

use std::sync::Arc;

use crate::error::Result;
use crate::schema::TypeRef;
use crate::selector::{parse, Document};
use crate::traverse::Expiry;
use crate::value::Value;

/// Options for [`Cache::read`](crate::Cache::read) and
/// [`Cache::watch`](crate::Cache::watch).
#[derive(Debug, Clone)]
pub struct ReadOptions {
    pub ty: TypeRef,
    pub id: Option<Value>,
    /// `None` selects everything, following references all the way down.
    pub selector: Option<Arc<Document>>,
    /// Read the optimistic overlay instead of confirmed data.
    pub optimistic: bool,
}

impl ReadOptions {
    pub fn new(ty: impl Into<TypeRef>) -> Self {
        Self {
            ty: ty.into(),
            id: None,
            selector: None,
            optimistic: false,
        }
    }

    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn select(mut self, selector: Arc<Document>) -> Self {
        self.selector = Some(selector);
        self
    }

    /// Parse and attach a selector.
    pub fn selector_text(self, text: &str) -> Result<Self> {
        Ok(self.select(Arc::new(parse(text)?)))
    }

    pub fn optimistic(mut self) -> Self {
        self.optimistic = true;
        self
    }
}

/// Watchers observe exactly what a read with the same options returns.
pub type WatchOptions = ReadOptions;

/// Options for [`Cache::write`](crate::Cache::write).
#[derive(Debug, Clone)]
pub struct WriteOptions {
    pub ty: TypeRef,
    /// Explicit id. Without one, the id is read from `data`.
    pub id: Option<Value>,
    pub data: Value,
    /// `None` falls back to the configured default TTL.
    pub expires_at: Option<Expiry>,
    /// Write straight into the optimistic overlay.
    pub optimistic: bool,
}

impl WriteOptions {
    pub fn new(ty: impl Into<TypeRef>, data: impl Into<Value>) -> Self {
        Self {
            ty: ty.into(),
            id: None,
            data: data.into(),
            expires_at: None,
            optimistic: false,
        }
    }

    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn expires_at(mut self, expiry: Expiry) -> Self {
        self.expires_at = Some(expiry);
        self
    }

    pub fn optimistic(mut self) -> Self {
        self.optimistic = true;
        self
    }
}

/// Options for [`Cache::delete`](crate::Cache::delete) and
/// [`Cache::invalidate`](crate::Cache::invalidate).
#[derive(Debug, Clone)]
pub struct TargetOptions {
    pub ty: TypeRef,
    pub id: Option<Value>,
    /// `None` targets the entity itself rather than selected fields.
    pub selector: Option<Arc<Document>>,
}

impl TargetOptions {
    pub fn new(ty: impl Into<TypeRef>) -> Self {
        Self {
            ty: ty.into(),
            id: None,
            selector: None,
        }
    }

    pub fn id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn select(mut self, selector: Arc<Document>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn selector_text(self, text: &str) -> Result<Self> {
        Ok(self.select(Arc::new(parse(text)?)))
    }
}

pub type DeleteOptions = TargetOptions;
pub type InvalidateOptions = TargetOptions;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    #[test]
    fn selector_text_surfaces_syntax_errors() {
        let err = ReadOptions::new("Post").selector_text("{ title").unwrap_err();
        assert!(matches!(err, Error::Syntax { .. }));
    }

    #[test]
    fn ids_accept_json_and_scalars() {
        let composite = WriteOptions::new("Membership", json!({})).id(json!({ "org": 1, "user": 2 }));
        assert!(matches!(composite.id, Some(Value::Object(_))));

        let target = TargetOptions::new("Post").id(3);
        assert_eq!(target.id, Some(Value::from(3)));
    }
}
