//! SQLite connection strings
//!
//! `sqlite::memory:`, `sqlite:////abs/path.db` (four slashes for an absolute
//! path), `sqlite:///rel.db` or `sqlite://rel.db`, each optionally followed by
//! `?key=value&...`.

use modeldb_core::{ConnectionConfig, ModelDbError, Result};
use url::form_urlencoded;

pub(crate) const MEMORY: &str = ":memory:";

const SCHEME: &str = "sqlite";

const KNOWN_PARAMS: &[&str] = &[
    "mode",
    "journal_mode",
    "synchronous",
    "foreign_keys",
    "busy_timeout",
];

const MODES: &[&str] = &["ro", "rw", "rwc", "memory"];
const JOURNAL_MODES: &[&str] = &["DELETE", "TRUNCATE", "PERSIST", "MEMORY", "WAL", "OFF"];
const SYNCHRONOUS: &[&str] = &["OFF", "NORMAL", "FULL", "EXTRA", "0", "1", "2", "3"];

/// Parse a `sqlite:` connection string into a configuration
pub fn parse_connection_string(conn_str: &str) -> Result<ConnectionConfig> {
    let scheme = ConnectionConfig::scheme_of(conn_str)?;
    if !scheme.eq_ignore_ascii_case(SCHEME) {
        return Err(ModelDbError::Configuration(format!(
            "Scheme '{}' is not handled by the SQLite driver",
            scheme
        )));
    }

    let rest = &conn_str[scheme.len() + 1..];
    let (location, query) = match rest.split_once('?') {
        Some((location, query)) => (location, Some(query)),
        None => (rest, None),
    };

    let mut config = ConnectionConfig::new(SCHEME);
    config.database = Some(parse_location(location, conn_str)?);

    if let Some(query) = query {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            config.params.insert(key.into_owned(), value.into_owned());
        }
    }
    validate_params(&mut config)?;

    if config.params.get("mode").map(String::as_str) == Some("memory") {
        config.database = Some(MEMORY.to_string());
    }

    tracing::trace!(database = ?config.database, params = ?config.params, "parsed SQLite connection string");
    Ok(config)
}

fn parse_location(location: &str, conn_str: &str) -> Result<String> {
    if location == MEMORY {
        return Ok(MEMORY.to_string());
    }

    let Some(after_authority) = location.strip_prefix("//") else {
        if location.is_empty() {
            return Err(missing_path(conn_str));
        }
        return Ok(location.to_string());
    };

    if after_authority.is_empty() || after_authority == MEMORY {
        return Ok(MEMORY.to_string());
    }

    match after_authority.strip_prefix('/') {
        Some("") => Err(missing_path(conn_str)),
        Some(path) if path == MEMORY => Ok(MEMORY.to_string()),
        // `sqlite:////abs` keeps one leading slash, `sqlite:///rel` keeps none
        Some(path) => Ok(path.to_string()),
        None => Ok(after_authority.to_string()),
    }
}

fn missing_path(conn_str: &str) -> ModelDbError {
    ModelDbError::Configuration(format!(
        "Connection string '{}' has no database path",
        conn_str
    ))
}

fn validate_params(config: &mut ConnectionConfig) -> Result<()> {
    if let Some(unknown) = config
        .params
        .keys()
        .find(|key| !KNOWN_PARAMS.contains(&key.as_str()))
    {
        return Err(ModelDbError::Configuration(format!(
            "Unknown SQLite connection parameter '{}' (expected one of: {})",
            unknown,
            KNOWN_PARAMS.join(", ")
        )));
    }

    if let Some(mode) = config.params.get_mut("mode") {
        *mode = mode.to_ascii_lowercase();
        check_choice("mode", mode, MODES)?;
    }
    for (key, choices) in [("journal_mode", JOURNAL_MODES), ("synchronous", SYNCHRONOUS)] {
        if let Some(value) = config.params.get_mut(key) {
            *value = value.to_ascii_uppercase();
            check_choice(key, value, choices)?;
        }
    }

    config.get_bool("foreign_keys")?;
    config.get_u64("busy_timeout")?;
    Ok(())
}

fn check_choice(key: &str, value: &str, choices: &[&str]) -> Result<()> {
    if choices.contains(&value) {
        Ok(())
    } else {
        Err(ModelDbError::Configuration(format!(
            "Invalid value '{}' for '{}' (expected one of: {})",
            value,
            key,
            choices.join(", ")
        )))
    }
}

/// Render a configuration back into its canonical connection string
pub fn build_connection_string(config: &ConnectionConfig) -> String {
    let database = config
        .get_string("database")
        .unwrap_or_else(|| MEMORY.to_string());

    let mut conn_str = if database == MEMORY {
        format!("{}:{}", SCHEME, MEMORY)
    } else {
        format!("{}:///{}", SCHEME, database)
    };

    if !config.params.is_empty() {
        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(config.params.iter())
            .finish();
        conn_str.push('?');
        conn_str.push_str(&query);
    }
    conn_str
}
