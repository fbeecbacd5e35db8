//! SQLite driver implementation

use async_trait::async_trait;
use modeldb_core::{
    Connection, ConnectionConfig, DatabaseDriver, DialectInfo, DriverCapabilities, Result,
};
use std::sync::Arc;

use crate::SqliteConnection;

/// SQLite database driver
pub struct SqliteDriver;

impl SqliteDriver {
    /// Create a new SQLite driver instance
    pub fn new() -> Self {
        tracing::debug!("SQLite driver initialized");
        Self
    }
}

impl Default for SqliteDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for SqliteDriver {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn display_name(&self) -> &'static str {
        "SQLite"
    }

    fn schemes(&self) -> &'static [&'static str] {
        &["sqlite"]
    }

    fn capabilities(&self) -> DriverCapabilities {
        DriverCapabilities {
            supports_transactions: true,
            supports_multiple_statements: true,
            supports_if_not_exists: true,
            supports_streaming: true,
            supports_in_memory: true,
            max_parameters: Some(999),
        }
    }

    fn dialect_info(&self) -> DialectInfo {
        crate::sqlite_dialect()
    }

    fn parse_connection_string(&self, conn_str: &str) -> Result<ConnectionConfig> {
        crate::parse_connection_string(conn_str)
    }

    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        crate::build_connection_string(config)
    }

    #[tracing::instrument(skip(self, config), fields(database = config.database.as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let conn = SqliteConnection::open(config).inspect_err(|e| {
            tracing::error!(error = %e, "failed to connect to SQLite database");
        })?;

        tracing::info!(path = %conn.path(), "SQLite connection created");
        Ok(Arc::new(conn))
    }
}
