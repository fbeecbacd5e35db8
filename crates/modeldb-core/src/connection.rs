//! Connection trait and transaction handling

use crate::{QueryResult, Result, RowStream, SchemaIntrospection, StatementResult, Value};
use async_trait::async_trait;

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "sqlite")
    fn driver_name(&self) -> &str;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute several semicolon-separated statements without parameters
    async fn execute_batch(&self, sql: &str) -> Result<()>;

    /// Run a query and receive its rows incrementally.
    ///
    /// The default implementation materializes the whole result first; drivers
    /// that can produce rows lazily should override it.
    async fn stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        let result = self.query(sql, params).await?;
        let columns = result.columns.iter().map(|c| c.name.clone()).collect();
        Ok(RowStream::from_rows(columns, result.rows))
    }

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;

    /// Get schema introspection interface if supported
    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        None
    }
}

/// A database transaction
///
/// Dropping a transaction that was neither committed nor rolled back rolls it
/// back.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;
}
