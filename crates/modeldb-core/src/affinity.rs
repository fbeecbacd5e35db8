//! SQL storage affinities and the lookup table that maps declared field types
//! onto them.
//!
//! The registry starts with the built-in field types. Custom types are added
//! either explicitly (`register`) or as an alias of an already known name
//! (`register_alias`). An alias is resolved on first lookup and the resolved
//! entry is cached under the alias name, so later changes to the target do not
//! affect aliases that were already looked up.

use crate::model::FieldType;
use crate::{ModelDbError, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Storage class a declared field type maps onto
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeAffinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

impl TypeAffinity {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeAffinity::Integer => "INTEGER",
            TypeAffinity::Text => "TEXT",
            TypeAffinity::Blob => "BLOB",
            TypeAffinity::Real => "REAL",
            TypeAffinity::Numeric => "NUMERIC",
        }
    }

    /// Determine the affinity of a declared column type using SQLite's rules
    /// (see "Determination Of Column Affinity" in the SQLite docs).
    pub fn from_declared(decl: &str) -> Self {
        let upper = decl.to_uppercase();
        if upper.contains("INT") {
            TypeAffinity::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            TypeAffinity::Text
        } else if upper.is_empty() || upper.contains("BLOB") {
            TypeAffinity::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            TypeAffinity::Real
        } else {
            TypeAffinity::Numeric
        }
    }
}

impl std::fmt::Display for TypeAffinity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved SQL type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlType {
    pub affinity: TypeAffinity,
    pub nullable: bool,
}

impl SqlType {
    pub const fn new(affinity: TypeAffinity) -> Self {
        Self {
            affinity,
            nullable: false,
        }
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Lookup table from field type names to SQL types
#[derive(Debug)]
pub struct TypeRegistry {
    entries: RwLock<HashMap<String, SqlType>>,
    aliases: RwLock<HashMap<String, String>>,
}

/// Alias chains longer than this are treated as cycles.
const MAX_ALIAS_DEPTH: usize = 16;

impl TypeRegistry {
    /// Create a registry pre-populated with the built-in field types
    pub fn new() -> Self {
        let registry = Self {
            entries: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
        };
        registry.register("int", SqlType::new(TypeAffinity::Integer));
        registry.register("bool", SqlType::new(TypeAffinity::Integer));
        registry.register("float", SqlType::new(TypeAffinity::Real));
        registry.register("str", SqlType::new(TypeAffinity::Text));
        registry.register("bytes", SqlType::new(TypeAffinity::Blob));
        // Mappings and sequences are stored JSON-encoded.
        registry.register("dict", SqlType::new(TypeAffinity::Blob));
        registry.register("list", SqlType::new(TypeAffinity::Blob));
        registry
    }

    /// Shared registry holding only the built-in types
    pub fn builtin() -> &'static TypeRegistry {
        static BUILTIN: OnceLock<TypeRegistry> = OnceLock::new();
        BUILTIN.get_or_init(TypeRegistry::new)
    }

    /// Register (or replace) the SQL type for a type name
    pub fn register(&self, name: impl Into<String>, sql_type: SqlType) {
        let name = name.into();
        tracing::debug!(type_name = %name, affinity = %sql_type.affinity, "registering field type");
        self.aliases.write().remove(&name);
        self.entries.write().insert(name, sql_type);
    }

    /// Register `name` as resolving to whatever `target` resolves to
    pub fn register_alias(&self, name: impl Into<String>, target: impl Into<String>) {
        let name = name.into();
        let target = target.into();
        tracing::debug!(type_name = %name, target = %target, "registering field type alias");
        self.entries.write().remove(&name);
        self.aliases.write().insert(name, target);
    }

    /// Check whether a type name is known (directly or through an alias)
    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name) || self.aliases.read().contains_key(name)
    }

    /// Look up a type name, following and caching aliases
    pub fn lookup(&self, name: &str) -> Option<SqlType> {
        if let Some(found) = self.entries.read().get(name) {
            return Some(*found);
        }

        let mut current = name.to_string();
        for _ in 0..MAX_ALIAS_DEPTH {
            let next = self.aliases.read().get(&current).cloned()?;
            let resolved = self.entries.read().get(&next).copied();
            if let Some(found) = resolved {
                tracing::trace!(type_name = %name, target = %next, "caching resolved alias");
                self.aliases.write().remove(name);
                self.entries.write().insert(name.to_string(), found);
                return Some(found);
            }
            current = next;
        }

        tracing::warn!(type_name = %name, "alias chain too deep or cyclic");
        None
    }

    /// Resolve a field type to its SQL type.
    ///
    /// Type arguments of `dict` and `list` must resolve as well, even though
    /// the container's own affinity decides the column type.
    pub fn resolve(&self, field_type: &FieldType) -> Result<SqlType> {
        match field_type {
            FieldType::Optional(inner) => Ok(self.resolve(inner)?.nullable()),
            FieldType::Dict(..) | FieldType::List(_) => {
                for arg in field_type.args() {
                    self.resolve(arg)?;
                }
                self.lookup(field_type.name()).ok_or_else(|| {
                    ModelDbError::Schema(format!("No valid SQL type found for '{}'", field_type))
                })
            }
            FieldType::Custom(name) => self.lookup(name).ok_or_else(|| {
                ModelDbError::Schema(format!("No SQL type registered for custom type '{}'", name))
            }),
            other => self.lookup(other.name()).ok_or_else(|| {
                ModelDbError::Schema(format!("No valid SQL type found for '{}'", other))
            }),
        }
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}
