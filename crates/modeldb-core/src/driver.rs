//! Database driver trait definition

use crate::{Connection, ConnectionConfig, DialectInfo, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Capabilities that a driver may support
#[derive(Debug, Clone, Default)]
pub struct DriverCapabilities {
    /// Supports transactions
    pub supports_transactions: bool,
    /// Supports multiple statements in one call
    pub supports_multiple_statements: bool,
    /// Supports `CREATE ... IF NOT EXISTS`
    pub supports_if_not_exists: bool,
    /// Produces rows lazily when streaming
    pub supports_streaming: bool,
    /// Supports in-memory databases
    pub supports_in_memory: bool,
    /// Maximum parameters per query (None = no limit)
    pub max_parameters: Option<usize>,
}

/// Core driver trait that all database drivers must implement
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Unique identifier for this driver (e.g., "sqlite")
    fn name(&self) -> &'static str;

    /// Display name for logs and UI
    fn display_name(&self) -> &'static str {
        self.name()
    }

    /// Connection-string schemes handled by this driver
    fn schemes(&self) -> &'static [&'static str] {
        &[]
    }

    /// Supported features/capabilities
    fn capabilities(&self) -> DriverCapabilities;

    /// Get SQL dialect information
    fn dialect_info(&self) -> DialectInfo {
        DialectInfo::default()
    }

    /// Parse a connection string into a configuration
    fn parse_connection_string(&self, conn_str: &str) -> Result<ConnectionConfig>;

    /// Build a connection string from configuration
    fn build_connection_string(&self, config: &ConnectionConfig) -> String;

    /// Create a new connection
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>>;

    /// Open a connection and run a trivial query
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        let conn = self.connect(config).await?;
        conn.query("SELECT 1", &[]).await?;
        conn.close().await
    }
}
