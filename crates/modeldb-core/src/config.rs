//! Connection configuration

use crate::{ModelDbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Connection configuration produced by a driver from a connection string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Driver ID (e.g., "sqlite")
    pub driver: String,
    /// Database name or file path (`:memory:` for in-memory databases)
    pub database: Option<String>,
    /// Additional connection parameters
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl ConnectionConfig {
    /// Create a new configuration with default values
    pub fn new(driver: &str) -> Self {
        Self {
            driver: driver.to_string(),
            database: None,
            params: BTreeMap::new(),
        }
    }

    /// Create a SQLite configuration
    pub fn new_sqlite(database_path: &str) -> Self {
        let mut config = Self::new("sqlite");
        config.database = Some(database_path.to_string());
        config
    }

    /// Set a connection parameter
    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        let val = value.into();
        let str_val = match val {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        self.params.insert(key.to_string(), str_val);
        self
    }

    /// Get a string parameter
    pub fn get_string(&self, key: &str) -> Option<String> {
        if let Some(val) = self.params.get(key) {
            return Some(val.clone());
        }
        match key {
            "database" | "path" => self.database.clone(),
            _ => None,
        }
    }

    /// Get a boolean parameter (`true`/`false`, `1`/`0`, `on`/`off`, `yes`/`no`)
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let Some(raw) = self.params.get(key) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" | "yes" => Ok(Some(true)),
            "false" | "0" | "off" | "no" => Ok(Some(false)),
            _ => Err(ModelDbError::Configuration(format!(
                "Parameter '{}' expects a boolean, got '{}'",
                key, raw
            ))),
        }
    }

    /// Get an unsigned integer parameter
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>> {
        self.params
            .get(key)
            .map(|raw| {
                raw.parse::<u64>().map_err(|_| {
                    ModelDbError::Configuration(format!(
                        "Parameter '{}' expects a non-negative integer, got '{}'",
                        key, raw
                    ))
                })
            })
            .transpose()
    }

    /// Extract the scheme of a connection string (`sqlite` in `sqlite:///data.db`)
    pub fn scheme_of(conn_str: &str) -> Result<&str> {
        let (scheme, _) = conn_str.split_once(':').ok_or_else(|| {
            ModelDbError::Configuration(format!(
                "Connection string '{}' has no scheme (expected e.g. 'sqlite:///data.db')",
                conn_str
            ))
        })?;
        let valid = scheme
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if !valid {
            return Err(ModelDbError::Configuration(format!(
                "Invalid scheme '{}' in connection string",
                scheme
            )));
        }
        Ok(scheme)
    }
}
