//! Record shapes
//!
//! A `ModelSchema` is the declared, ordered set of named and typed fields that
//! describes one kind of stored record. Shapes are either built by hand with
//! `ModelSchema::builder` or declared by a Rust type through the `Model` trait,
//! where `SqlField` maps the Rust field types onto `FieldType`.
//!
//! ```ignore
//! struct ExampleModel;
//!
//! impl Model for ExampleModel {
//!     fn schema() -> Result<ModelSchema> {
//!         ModelSchema::builder("ExampleModel")
//!             .field::<i64>("a")
//!             .field::<HashMap<String, String>>("b")
//!             .field_with::<Vec<u8>>("c", FieldMeta::indexed())
//!             .build()
//!     }
//! }
//! ```

use crate::affinity::{TypeAffinity, TypeRegistry};
use crate::{ModelDbError, Result};
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Declared type of a model field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    Int,
    Bool,
    Float,
    Str,
    Bytes,
    /// Mapping from key type to value type
    Dict(Box<FieldType>, Box<FieldType>),
    List(Box<FieldType>),
    /// The inner type or NULL
    Optional(Box<FieldType>),
    /// A type resolved through the `TypeRegistry` by name
    Custom(String),
}

impl FieldType {
    /// Base type name, without type arguments
    pub fn name(&self) -> &str {
        match self {
            FieldType::Int => "int",
            FieldType::Bool => "bool",
            FieldType::Float => "float",
            FieldType::Str => "str",
            FieldType::Bytes => "bytes",
            FieldType::Dict(..) => "dict",
            FieldType::List(_) => "list",
            FieldType::Optional(_) => "optional",
            FieldType::Custom(name) => name,
        }
    }

    /// Type arguments in declaration order
    pub fn args(&self) -> Vec<&FieldType> {
        match self {
            FieldType::Dict(k, v) => vec![k.as_ref(), v.as_ref()],
            FieldType::List(item) => vec![item.as_ref()],
            FieldType::Optional(inner) => vec![inner.as_ref()],
            _ => Vec::new(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, FieldType::Optional(_))
    }

    /// The type with any `Optional` wrappers removed
    pub fn non_null(&self) -> &FieldType {
        match self {
            FieldType::Optional(inner) => inner.non_null(),
            other => other,
        }
    }

    /// Introspect this type against the built-in type registry
    pub fn introspect(&self) -> TypeInfo {
        self.introspect_with(TypeRegistry::builtin())
    }

    /// Introspect this type, resolving its affinity through `registry`
    pub fn introspect_with(&self, registry: &TypeRegistry) -> TypeInfo {
        let resolved = registry.resolve(self).ok();
        TypeInfo {
            name: self.name().to_string(),
            args: self.args().iter().map(|a| a.to_string()).collect(),
            nullable: self.is_nullable(),
            affinity: resolved.map(|t| t.affinity),
            metadata: serde_json::Map::new(),
        }
    }

    fn check_dict_keys(&self) -> std::result::Result<(), String> {
        match self {
            FieldType::Dict(key, value) => {
                if key.as_ref() != &FieldType::Str {
                    return Err(format!("dict keys must be str, found {}", key));
                }
                value.check_dict_keys()
            }
            FieldType::List(inner) | FieldType::Optional(inner) => inner.check_dict_keys(),
            _ => Ok(()),
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::Dict(k, v) => write!(f, "dict[{}, {}]", k, v),
            FieldType::List(item) => write!(f, "list[{}]", item),
            FieldType::Optional(inner) => write!(f, "{} | None", inner),
            other => f.write_str(other.name()),
        }
    }
}

/// Introspection data for a declared field type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypeInfo {
    /// Base type name
    pub name: String,
    /// Rendered type arguments
    pub args: Vec<String>,
    pub nullable: bool,
    /// Storage affinity, `None` if the type is not registered
    pub affinity: Option<TypeAffinity>,
    /// Out-of-band field metadata (empty for bare types)
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl std::fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type={}", self.name)?;
        if !self.args.is_empty() {
            write!(f, " args=[{}]", self.args.join(", "))?;
        }
        write!(f, " nullable={}", self.nullable)?;
        match self.affinity {
            Some(affinity) => write!(f, " affinity={}", affinity)?,
            None => write!(f, " affinity=?")?,
        }
        if !self.metadata.is_empty() {
            write!(f, " metadata={}", serde_json::Value::Object(self.metadata.clone()))?;
        }
        Ok(())
    }
}

/// Out-of-band annotations attached to a field.
///
/// The keys `index`, `unique` and `primary_key` are interpreted as booleans;
/// every other key is kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMeta {
    extra: serde_json::Map<String, serde_json::Value>,
}

const FLAG_KEYS: [&str; 3] = ["index", "unique", "primary_key"];

impl FieldMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata marking the field as an index candidate
    pub fn indexed() -> Self {
        Self::new().flag("index")
    }

    pub fn unique() -> Self {
        Self::new().flag("unique")
    }

    pub fn primary() -> Self {
        Self::new().flag("primary_key")
    }

    /// Build metadata from an `extra` JSON object
    pub fn from_extra(extra: serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(extra) = extra else {
            return Err(ModelDbError::Schema(
                "Field metadata must be a JSON object".into(),
            ));
        };
        for (key, value) in &extra {
            check_flag(key, value)?;
        }
        Ok(Self { extra })
    }

    /// Set a metadata key; `index`, `unique` and `primary_key` only take booleans
    pub fn with(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        check_flag(&key, &value)?;
        self.extra.insert(key, value);
        Ok(self)
    }

    fn flag(mut self, key: &str) -> Self {
        self.extra.insert(key.to_string(), serde_json::Value::Bool(true));
        self
    }

    fn is_set(&self, key: &str) -> bool {
        self.extra
            .get(key)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn is_indexed(&self) -> bool {
        self.is_set("index")
    }

    pub fn is_unique(&self) -> bool {
        self.is_set("unique")
    }

    pub fn is_primary_key(&self) -> bool {
        self.is_set("primary_key")
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.extra.get(key)
    }

    pub fn extra(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.extra
    }
}

fn check_flag(key: &str, value: &serde_json::Value) -> Result<()> {
    if FLAG_KEYS.contains(&key) && !value.is_boolean() {
        return Err(ModelDbError::Schema(format!(
            "Field metadata key '{}' must be a boolean, found {}",
            key, value
        )));
    }
    Ok(())
}

/// A single declared field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    #[serde(default)]
    pub meta: FieldMeta,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            meta: FieldMeta::default(),
        }
    }

    pub fn with_meta(mut self, meta: FieldMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Introspection data for this field's type, including its metadata
    pub fn describe(&self, registry: &TypeRegistry) -> TypeInfo {
        let mut info = self.field_type.introspect_with(registry);
        info.metadata = self.meta.extra().clone();
        info
    }
}

/// A validated record shape
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSchema {
    name: String,
    table: String,
    fields: Vec<FieldDef>,
}

impl ModelSchema {
    pub fn builder(name: impl Into<String>) -> ModelSchemaBuilder {
        ModelSchemaBuilder::new(name)
    }

    /// Model name as declared
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the backing table
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Fields in declaration order
    pub fn fields(&self) -> impl ExactSizeIterator<Item = &FieldDef> {
        self.fields.iter()
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn primary_key(&self) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.meta.is_primary_key())
    }

    /// Fields carrying an index hint
    pub fn indexed_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.meta.is_indexed())
    }
}

/// Builder for `ModelSchema`; validation happens in `build`
#[derive(Debug, Clone)]
pub struct ModelSchemaBuilder {
    name: String,
    table: Option<String>,
    fields: Vec<FieldDef>,
}

impl ModelSchemaBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            fields: Vec::new(),
        }
    }

    /// Override the backing table name
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Add a field whose type is derived from a Rust type
    pub fn field<T: SqlField>(self, name: impl Into<String>) -> Self {
        self.field_type(name, T::field_type(), FieldMeta::default())
    }

    /// Add a field with metadata whose type is derived from a Rust type
    pub fn field_with<T: SqlField>(self, name: impl Into<String>, meta: FieldMeta) -> Self {
        self.field_type(name, T::field_type(), meta)
    }

    /// Add a field with an explicit type
    pub fn field_type(mut self, name: impl Into<String>, field_type: FieldType, meta: FieldMeta) -> Self {
        self.fields.push(FieldDef::new(name, field_type).with_meta(meta));
        self
    }

    pub fn build(self) -> Result<ModelSchema> {
        if !is_identifier(&self.name) {
            return Err(ModelDbError::Schema(format!(
                "Invalid model name '{}'",
                self.name
            )));
        }
        if self.fields.is_empty() {
            return Err(ModelDbError::Schema(format!(
                "Model '{}' declares no fields",
                self.name
            )));
        }

        let table = self
            .table
            .unwrap_or_else(|| self.name.to_case(Case::Snake));
        if !is_identifier(&table) {
            return Err(ModelDbError::Schema(format!("Invalid table name '{}'", table)));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !is_identifier(&field.name) {
                return Err(ModelDbError::Schema(format!(
                    "Invalid field name '{}' in model '{}'",
                    field.name, self.name
                )));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(ModelDbError::Schema(format!(
                    "Duplicate field '{}' in model '{}'",
                    field.name, self.name
                )));
            }
            field.field_type.check_dict_keys().map_err(|msg| {
                ModelDbError::Schema(format!("Field '{}': {}", field.name, msg))
            })?;
        }

        let primary_keys: Vec<&FieldDef> = self
            .fields
            .iter()
            .filter(|f| f.meta.is_primary_key())
            .collect();
        if primary_keys.len() > 1 {
            return Err(ModelDbError::Schema(format!(
                "Model '{}' declares more than one primary key",
                self.name
            )));
        }
        if let Some(pk) = primary_keys.first()
            && pk.field_type.is_nullable()
        {
            return Err(ModelDbError::Schema(format!(
                "Primary key '{}' cannot be optional",
                pk.name
            )));
        }

        Ok(ModelSchema {
            name: self.name,
            table,
            fields: self.fields,
        })
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A type that declares a record shape
pub trait Model {
    fn schema() -> Result<ModelSchema>;
}

/// Maps a Rust type onto a declared field type
pub trait SqlField {
    fn field_type() -> FieldType;
}

macro_rules! impl_sql_field {
    ($($ty:ty => $variant:expr),* $(,)?) => {
        $(
            impl SqlField for $ty {
                fn field_type() -> FieldType {
                    $variant
                }
            }
        )*
    };
}

impl_sql_field! {
    i64 => FieldType::Int,
    i32 => FieldType::Int,
    u32 => FieldType::Int,
    bool => FieldType::Bool,
    f64 => FieldType::Float,
    f32 => FieldType::Float,
    String => FieldType::Str,
    Vec<u8> => FieldType::Bytes,
}

impl<T: SqlField> SqlField for Option<T> {
    fn field_type() -> FieldType {
        FieldType::Optional(Box::new(T::field_type()))
    }
}

impl<K: SqlField, V: SqlField, S> SqlField for HashMap<K, V, S> {
    fn field_type() -> FieldType {
        FieldType::Dict(Box::new(K::field_type()), Box::new(V::field_type()))
    }
}

impl<K: SqlField, V: SqlField> SqlField for BTreeMap<K, V> {
    fn field_type() -> FieldType {
        FieldType::Dict(Box::new(K::field_type()), Box::new(V::field_type()))
    }
}
