//! Command-line arguments and the optional TOML configuration file

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::logging::LoggingConfig;

/// Database used when neither a flag nor the config file names one
pub const DEFAULT_DATABASE: &str = "sqlite:////tmp/data.db";

#[derive(Parser, Debug)]
#[command(name = "modeldb", version, about = "Register record shapes as SQL tables")]
pub struct Cli {
    /// Database connection string (e.g. sqlite:////tmp/data.db)
    #[arg(short, long, env = "MODELDB_DATABASE", global = true)]
    pub database: Option<String>,

    /// Path to a TOML configuration file
    #[arg(long, env = "MODELDB_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level for modeldb crates (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Also write JSON logs to the log directory
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Commands {
    /// Print the example model's field types and register it
    Demo,
    /// Run a query and print its rows
    Query {
        /// SQL to run
        sql: String,
    },
    /// Show the columns and indexes of a table
    Describe {
        /// Table name
        table: String,
    },
}

/// Contents of the TOML configuration file
#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    pub database: Option<String>,
    #[serde(default)]
    pub logging: FileLogging,
}

#[derive(Debug, Default, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileLogging {
    pub level: Option<String>,
    pub json: Option<bool>,
    pub log_dir: Option<PathBuf>,
    /// Log to stderr (default true)
    pub console: Option<bool>,
    /// Include file and line in console logs
    pub location: Option<bool>,
    /// Log span open/close events
    pub spans: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file '{}'", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config file '{}'", path.display()))
    }
}

/// Settings after merging flags, environment and config file
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database: String,
    pub logging: LoggingConfig,
}

impl Settings {
    /// Command-line values win over file values, which win over defaults
    pub fn resolve(cli: &Cli, file: FileConfig) -> Self {
        let database = cli
            .database
            .clone()
            .or(file.database)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string());

        let mut logging = LoggingConfig::default();
        if let Some(level) = cli.log_level.as_deref().or(file.logging.level.as_deref()) {
            logging = logging.with_level(level);
        }
        logging.enable_json_logs = cli.json_logs || file.logging.json.unwrap_or(false);
        if let Some(dir) = file.logging.log_dir {
            logging.log_dir = dir;
        }
        if let Some(console) = file.logging.console {
            logging.enable_console_logs = console;
        }
        logging.include_location = file.logging.location.unwrap_or(false);
        logging.enable_spans = file.logging.spans.unwrap_or(false);

        Self { database, logging }
    }

    /// Build settings from parsed arguments, reading the config file if given
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Ok(Self::resolve(cli, file))
    }
}
