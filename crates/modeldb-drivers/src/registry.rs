//! Driver registry for managing available database drivers

use modeldb_core::{ConnectionConfig, DatabaseDriver, DialectInfo, ModelDbError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of available database drivers, addressable by name or by
/// connection-string scheme
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn DatabaseDriver>>,
    schemes: HashMap<String, String>,
}

impl DriverRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            drivers: HashMap::new(),
            schemes: HashMap::new(),
        }
    }

    /// Create a registry with all built-in drivers registered
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();

        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(crate::sqlite::SqliteDriver::new()));

        registry
    }

    /// Register a new driver
    pub fn register(&mut self, driver: Arc<dyn DatabaseDriver>) {
        let name = driver.name().to_string();
        tracing::info!(driver = %name, "registering database driver");
        for scheme in driver.schemes() {
            self.schemes.insert(scheme.to_ascii_lowercase(), name.clone());
        }
        self.drivers.insert(name, driver);
    }

    /// Get a driver by name
    pub fn get(&self, name: &str) -> Option<Arc<dyn DatabaseDriver>> {
        let driver = self.drivers.get(name).cloned();
        if driver.is_none() {
            tracing::warn!(driver = %name, "driver not found in registry");
        }
        driver
    }

    /// Get the driver handling a connection-string scheme
    pub fn for_scheme(&self, scheme: &str) -> Option<Arc<dyn DatabaseDriver>> {
        self.schemes
            .get(&scheme.to_ascii_lowercase())
            .and_then(|name| self.drivers.get(name))
            .cloned()
    }

    /// Resolve the driver for a connection string and parse it
    pub fn for_connection_string(
        &self,
        conn_str: &str,
    ) -> Result<(Arc<dyn DatabaseDriver>, ConnectionConfig)> {
        let scheme = ConnectionConfig::scheme_of(conn_str)?;
        let driver = self.for_scheme(scheme).ok_or_else(|| {
            let mut known: Vec<&str> = self.schemes.keys().map(String::as_str).collect();
            known.sort_unstable();
            ModelDbError::Configuration(format!(
                "No driver for scheme '{}' (available: {})",
                scheme,
                known.join(", ")
            ))
        })?;
        let config = driver.parse_connection_string(conn_str)?;
        Ok((driver, config))
    }

    /// List all registered driver names
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// Check if a driver is registered
    pub fn has(&self, name: &str) -> bool {
        self.drivers.contains_key(name)
    }

    /// Get dialect info for a driver by name
    pub fn dialect_info(&self, name: &str) -> Option<DialectInfo> {
        self.drivers.get(name).map(|driver| driver.dialect_info())
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(all(test, feature = "sqlite"))]
mod tests {
    use super::*;

    #[test]
    fn resolves_sqlite_by_scheme() {
        let registry = DriverRegistry::with_defaults();
        assert!(registry.has("sqlite"));
        assert_eq!(registry.list(), vec!["sqlite"]);

        let (driver, config) = registry
            .for_connection_string("sqlite:////tmp/data.db")
            .unwrap();
        assert_eq!(driver.name(), "sqlite");
        assert_eq!(config.database.as_deref(), Some("/tmp/data.db"));
        assert_eq!(
            registry.dialect_info("sqlite").map(|d| d.id.to_string()),
            Some("sqlite".to_string())
        );
    }

    #[test]
    fn unknown_scheme_is_a_configuration_error() {
        let registry = DriverRegistry::with_defaults();
        let err = match registry.for_connection_string("postgres://localhost/db") {
            Err(e) => e,
            Ok(_) => panic!("postgres should not resolve"),
        };
        assert!(matches!(err, ModelDbError::Configuration(_)));
        assert!(err.to_string().contains("available: sqlite"));
    }
}
