//! Error types for the cache.
//!
//! Only structural misuse is an error. Data conditions met while walking the
//! graph (missing fields, invalid fields, dangling references, staleness) are
//! reported inside the operation results instead.

use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced to callers of the cache.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed selector text.
    #[error("selector syntax error at offset {offset}: {message}")]
    Syntax {
        /// What the parser expected or found.
        message: String,
        /// Byte offset into the selector text.
        offset: usize,
    },

    /// A mutation targeted a named entity type without a derivable id.
    #[error("cannot derive an id for entity type '{type_name}'")]
    MissingId { type_name: String },

    /// A named type reference that the schema does not define.
    #[error("unknown type: '{name}'")]
    UnknownType { name: String },

    /// Only named types can be registered in a schema.
    #[error("cannot define an anonymous type in the schema")]
    NotNamed,
}

impl Error {
    pub(crate) fn syntax(message: impl Into<String>, offset: usize) -> Self {
        Error::Syntax {
            message: message.into(),
            offset,
        }
    }
}
