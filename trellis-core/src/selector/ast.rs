//! Selector syntax tree.

use std::fmt;

use super::parser::is_ident_char;

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub selection_set: SelectionSet,
}

/// The fields picked at one level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionSet {
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Field(Field),
    /// `*`: every field present on the value at this level.
    Wildcard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
    /// Whether the name was written as a quoted string.
    pub quoted: bool,
    pub selection_set: Option<SelectionSet>,
}

impl Field {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            quoted: false,
            selection_set: None,
        }
    }

    /// Key under which the field appears in read output.
    pub fn output_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl SelectionSet {
    pub fn has_wildcard(&self) -> bool {
        self.selections
            .iter()
            .any(|selection| matches!(selection, Selection::Wildcard))
    }

    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.selections.iter().filter_map(|selection| match selection {
            Selection::Field(field) => Some(field),
            Selection::Wildcard => None,
        })
    }

    /// Expand this set against the field names present on a value.
    ///
    /// Explicit fields keep their position; the wildcard expands in place to
    /// every present field not also listed explicitly.
    pub fn expand<'s: 'n, 'n, I>(&'s self, present: I) -> Vec<Picked<'s, 'n>>
    where
        I: IntoIterator<Item = &'n str>,
    {
        let mut picked = Vec::new();
        let mut present = Some(present);
        for selection in &self.selections {
            match selection {
                Selection::Field(field) => picked.push(Picked {
                    name: &field.name,
                    output: field.output_key(),
                    selection_set: field.selection_set.as_ref(),
                }),
                Selection::Wildcard => {
                    let Some(present) = present.take() else {
                        continue;
                    };
                    for name in present {
                        if self.fields().any(|field| field.name == name) {
                            continue;
                        }
                        picked.push(Picked {
                            name,
                            output: name,
                            selection_set: None,
                        });
                    }
                }
            }
        }
        picked
    }
}

/// One field chosen by a selection set, after wildcard expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Picked<'s, 'n> {
    pub name: &'n str,
    pub output: &'n str,
    pub selection_set: Option<&'s SelectionSet>,
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.selection_set.fmt(f)
    }
}

impl fmt::Display for SelectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for selection in &self.selections {
            f.write_str(" ")?;
            match selection {
                Selection::Wildcard => f.write_str("*")?,
                Selection::Field(field) => {
                    if let Some(alias) = &field.alias {
                        write_name(f, alias, false)?;
                        f.write_str(": ")?;
                    }
                    write_name(f, &field.name, field.quoted)?;
                    if let Some(nested) = &field.selection_set {
                        write!(f, " {nested}")?;
                    }
                }
            }
        }
        f.write_str(" }")
    }
}

/// Write a name bare when it lexes as an identifier, quoted otherwise.
/// Quoted names only use the escapes the lexer understands.
fn write_name(f: &mut fmt::Formatter<'_>, name: &str, quoted: bool) -> fmt::Result {
    if !quoted && !name.is_empty() && name.chars().all(is_ident_char) {
        return f.write_str(name);
    }
    f.write_str("\"")?;
    for c in name.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}
