//! `modeldb` command-line tool

mod commands;
mod config;
mod demo;
mod logging;

use anyhow::Context;
use clap::Parser;
use config::{Cli, Commands, Settings};
use modeldb_connection::Database;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load(&cli)?;
    let _log_guard = logging::init(&settings.logging)?;

    let db = Database::new(&settings.database)
        .with_context(|| format!("opening database '{}'", settings.database))?;
    tracing::debug!(database = %settings.database, command = ?cli.command, "running command");

    let result = match &cli.command {
        Commands::Demo => demo::run(&db).await,
        Commands::Query { sql } => commands::query(&db, sql).await,
        Commands::Describe { table } => commands::describe(&db, table).await,
    };

    db.close().await?;
    result
}
