//! SQL Dialect Metadata
//!
//! Drivers describe their SQL dialect with these types; DDL generation reads
//! quoting and column type names from here instead of hardcoding per-driver
//! logic.

use crate::TypeAffinity;
use std::borrow::Cow;

/// Information about a column data type
#[derive(Debug, Clone)]
pub struct DataTypeInfo {
    /// Type name as written in DDL (e.g., "INTEGER")
    pub name: Cow<'static, str>,
    /// Storage affinity the type maps to
    pub affinity: TypeAffinity,
    /// Brief description
    pub description: Option<Cow<'static, str>>,
}

impl DataTypeInfo {
    pub const fn new(name: &'static str, affinity: TypeAffinity) -> Self {
        Self {
            name: Cow::Borrowed(name),
            affinity,
            description: None,
        }
    }

    pub const fn with_desc(
        name: &'static str,
        affinity: TypeAffinity,
        description: &'static str,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            affinity,
            description: Some(Cow::Borrowed(description)),
        }
    }
}

/// Complete dialect information provided by a driver
#[derive(Debug, Clone)]
pub struct DialectInfo {
    /// Dialect identifier (e.g., "sqlite")
    pub id: Cow<'static, str>,
    /// Display name (e.g., "SQLite")
    pub display_name: Cow<'static, str>,
    /// Data types, the first entry per affinity is the canonical one
    pub data_types: Vec<DataTypeInfo>,
    /// Identifier quote character
    pub identifier_quote: char,
    /// String literal quote character
    pub string_quote: char,
    /// Statement terminator
    pub statement_terminator: char,
}

impl DialectInfo {
    /// Quote an identifier, doubling any embedded quote characters
    pub fn quote_ident(&self, name: &str) -> String {
        let q = self.identifier_quote;
        let escaped = name.replace(q, &format!("{q}{q}"));
        format!("{q}{escaped}{q}")
    }

    /// Canonical column type name for an affinity
    pub fn type_name(&self, affinity: TypeAffinity) -> &str {
        self.data_types
            .iter()
            .find(|t| t.affinity == affinity)
            .map(|t| t.name.as_ref())
            .unwrap_or_else(|| affinity.as_str())
    }
}

impl Default for DialectInfo {
    fn default() -> Self {
        Self {
            id: Cow::Borrowed("generic"),
            display_name: Cow::Borrowed("Generic SQL"),
            data_types: Vec::new(),
            identifier_quote: '"',
            string_quote: '\'',
            statement_terminator: ';',
        }
    }
}
