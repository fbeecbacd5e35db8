//! modeldb Drivers - Database driver implementations
//!
//! This crate provides concrete implementations of the database driver traits
//! defined in `modeldb-core`, selected by cargo feature.

#[cfg(feature = "sqlite")]
pub use modeldb_driver_sqlite as sqlite;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from modeldb-core
pub use modeldb_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, DriverCapabilities, ModelDbError,
    QueryResult, Result, Row, RowStream, SchemaIntrospection, StatementResult, Transaction, Value,
};
