//! The `query` and `describe` commands

use anyhow::Context;
use comfy_table::{Cell, ContentArrangement, Table, presets::UTF8_FULL};
use modeldb_connection::Database;
use modeldb_core::{ColumnInfo, IndexInfo, Value};

/// Render a value for a table cell; bytes are shown as hex
pub fn cell_text(value: &Value) -> String {
    match value {
        Value::Bytes(bytes) => {
            let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
            format!("x'{hex}'")
        }
        other => other.to_string(),
    }
}

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(headers.iter().map(Cell::new));
    table
}

/// Stream the rows of `sql` into a table and print it
pub async fn query(db: &Database, sql: &str) -> anyhow::Result<()> {
    let mut stream = db
        .start_query(sql)
        .await
        .with_context(|| format!("running query: {sql}"))?;

    let headers: Vec<&str> = stream.columns().iter().map(String::as_str).collect();
    let mut table = new_table(&headers);
    let mut count = 0usize;
    while let Some(row) = stream.next().await {
        let row = row.context("reading query results")?;
        table.add_row(row.values.iter().map(cell_text));
        count += 1;
    }

    println!("{table}");
    println!("{count} row(s)");
    Ok(())
}

/// Table of column definitions
pub fn columns_table(columns: &[ColumnInfo]) -> Table {
    let mut table = new_table(&["#", "column", "type", "nullable", "default", "pk"]);
    for column in columns {
        table.add_row(vec![
            column.ordinal.to_string(),
            column.name.clone(),
            column.data_type.clone(),
            column.nullable.to_string(),
            column.default_value.clone().unwrap_or_default(),
            if column.is_primary_key { "yes" } else { "" }.to_string(),
        ]);
    }
    table
}

/// Table of index definitions
pub fn indexes_table(indexes: &[IndexInfo]) -> Table {
    let mut table = new_table(&["index", "columns", "unique"]);
    for index in indexes {
        table.add_row(vec![
            index.name.clone(),
            index.columns.join(", "),
            index.is_unique.to_string(),
        ]);
    }
    table
}

/// Print the columns and indexes of a table
pub async fn describe(db: &Database, table: &str) -> anyhow::Result<()> {
    let conn = db.connection().await?;
    let introspection = conn
        .as_schema_introspection()
        .context("the database driver cannot describe tables")?;

    let columns = introspection.get_columns(table).await?;
    if columns.is_empty() {
        anyhow::bail!("table '{table}' does not exist");
    }
    let indexes = introspection.get_indexes(table).await?;

    println!("{}", columns_table(&columns));
    if indexes.is_empty() {
        println!("no indexes");
    } else {
        println!("{}", indexes_table(&indexes));
    }
    Ok(())
}
