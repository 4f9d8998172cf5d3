//! xml2py — convert an XML/DocBook command reference into Python client
//! modules with embedded reStructuredText docstrings.
//!
//! The pipeline: auxiliary entity/link/graphics files are loaded into lookup
//! tables ([`load`]), each command source file is parsed into an element tree
//! ([`ast`]), the command model is extracted from that tree ([`command`],
//! [`args`]), and the tree is rendered to RST through a single render
//! context ([`ast::render`]).

pub mod args;
pub mod ast;
pub mod command;
pub mod custom;
pub mod load;
pub mod text;

use std::collections::HashMap;

/// Entity-name → replacement text (or group-code pair) mappings.
pub type Terms = HashMap<String, TermValue>;

/// Anchor-id → link target mappings, loaded from the link databases.
pub type Links = HashMap<String, LinkTarget>;

/// Graphic base name (extension stripped) → on-disk filename.
pub type Fcache = HashMap<String, String>;

/// Raw command token → generated function name.
pub type NameMap = HashMap<String, String>;

/// Value of a resolved entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TermValue {
    /// Plain replacement text.
    Text(String),
    /// Group-code entity mapping a command to a class/type pair.
    Group { class_name: String, type_name: String },
}

impl TermValue {
    /// Replacement text, or `None` for group codes.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TermValue::Text(s) => Some(s),
            TermValue::Group { .. } => None,
        }
    }
}

/// Resolved target of an anchor, as stored in a link database.
#[derive(Debug, Clone, Default)]
pub struct LinkTarget {
    /// Stem of the database file the anchor was found in.
    pub root_name: String,
    /// Title of that database's top-level document.
    pub root_title: String,
    /// Page path relative to the root document.
    pub href: String,
    /// Display text recorded for the anchor, possibly empty.
    pub text: String,
}

/// Resolve a command token through the name map; unmapped names render
/// unchanged.
pub fn py_name<'a>(name: &'a str, name_map: &'a NameMap) -> &'a str {
    name_map.get(name).map(String::as_str).unwrap_or(name)
}

/// Errors that abort processing of a single command file.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// An argument name that survives normalization but is not a valid
    /// identifier. The signature cannot be silently skipped.
    #[error("invalid argument name {name:?} in command {command:?}")]
    InvalidArgumentName { command: String, name: String },

    /// The source file has no recognizable command wrapper element.
    #[error("{0}: no refentry element found")]
    NotACommandFile(String),

    /// Two commands collapse to the same generated name.
    #[error("commands {first:?} and {second:?} both map to {py_name:?}")]
    NameCollision {
        first: String,
        second: String,
        py_name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn py_name_unmapped_passes_through() {
        let map = NameMap::new();
        assert_eq!(py_name("*VGET", &map), "*VGET");
    }

    #[test]
    fn py_name_mapped() {
        let mut map = NameMap::new();
        map.insert("*VGET".to_string(), "star_vget".to_string());
        assert_eq!(py_name("*VGET", &map), "star_vget");
    }
}
