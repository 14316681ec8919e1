//! Selector Language
//!
//! A selector is a tree-shaped field picker:
//!
//! ```text
//! { title author { name } heading: "display title" * }
//! ```
//!
//! Parsing does no schema validation; unknown field names are simply missing
//! at traversal time. Parsed documents are immutable and meant to be shared
//! (`Arc<Document>`) across many operations.

mod ast;
mod parser;

pub use ast::{Document, Field, Picked, Selection, SelectionSet};
pub use parser::parse;

use std::str::FromStr;

use crate::error::Error;

impl FromStr for Document {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        parse(text)
    }
}
