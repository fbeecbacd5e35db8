//! modeldb Core - Core abstractions and traits for the model registry
//!
//! This crate provides the fundamental traits and types that all other
//! modeldb crates depend on. It defines:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` - Trait for database connections
//! - `SchemaIntrospection` - Trait for inspecting live tables
//! - `ModelSchema` - Declared record shapes and their field types
//! - `TypeRegistry` - Lookup table from field types to SQL storage types
//! - Common types like `Value`, `Row`, `Record`, etc.

pub mod affinity;
pub mod codec;
mod config;
mod connection;
mod ddl;
mod dialect;
mod driver;
mod error;
pub mod model;
mod schema;
mod stream;
mod types;

pub use affinity::{SqlType, TypeAffinity, TypeRegistry};
pub use config::*;
pub use connection::*;
pub use ddl::*;
pub use dialect::*;
pub use driver::*;
pub use error::*;
pub use model::{FieldDef, FieldMeta, FieldType, Model, ModelSchema, ModelSchemaBuilder, SqlField, TypeInfo};
pub use schema::*;
pub use stream::*;
pub use types::*;
