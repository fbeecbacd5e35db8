//! SQLite connection implementation

use async_trait::async_trait;
use modeldb_core::{
    ColumnInfo, ColumnMeta, Connection, ConnectionConfig, IndexInfo, ModelDbError, QueryResult,
    Result, Row, RowStream, SchemaIntrospection, StatementResult, TableInfo, Transaction, Value,
};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::{Connection as RusqliteConnection, OpenFlags, params_from_iter};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;

use crate::conn_string::MEMORY;

/// Rows buffered between the blocking reader and a `RowStream` consumer
const STREAM_BUFFER: usize = 64;

/// Poll interval while waiting for the connection lock
const LOCK_POLL: Duration = Duration::from_millis(50);

/// How long a statement waits for a live stream to let go of the connection
const STREAM_RELEASE_WAIT: Duration = Duration::from_millis(250);

/// The rusqlite connection plus whether a row stream currently owns it
struct SharedConnection {
    conn: Mutex<RusqliteConnection>,
    streaming: AtomicBool,
}

impl SharedConnection {
    fn new(conn: RusqliteConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
            streaming: AtomicBool::new(false),
        }
    }

    /// Lock the connection for one statement.
    ///
    /// Waits as long as ordinary statements hold the lock. A live row stream
    /// keeps it until drained or dropped, so in that case this fails once
    /// `STREAM_RELEASE_WAIT` has passed.
    fn lock(&self) -> Result<MutexGuard<'_, RusqliteConnection>> {
        loop {
            if let Some(guard) = self.conn.try_lock_for(LOCK_POLL) {
                return Ok(guard);
            }
            if self.streaming.load(Ordering::Acquire) {
                return self.conn.try_lock_for(STREAM_RELEASE_WAIT).ok_or_else(|| {
                    ModelDbError::Connection(
                        "A row stream is in progress on this connection; drain or drop it first"
                            .into(),
                    )
                });
            }
        }
    }
}

/// Clears the streaming flag when the streaming task finishes
struct StreamingFlag(Arc<SharedConnection>);

impl Drop for StreamingFlag {
    fn drop(&mut self) {
        self.0.streaming.store(false, Ordering::Release);
    }
}

/// SQLite connection wrapper
///
/// A stream started with [`Connection::stream`] holds the connection until it
/// is exhausted or dropped. Statements issued meanwhile fail with
/// `ModelDbError::Connection` instead of waiting for it.
pub struct SqliteConnection {
    shared: Arc<SharedConnection>,
    path: String,
    closed: AtomicBool,
}

impl SqliteConnection {
    /// Open a SQLite database described by `config`
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let path = config.get_string("database").ok_or_else(|| {
            ModelDbError::Configuration("SQLite requires a database path or ':memory:'".into())
        })?;
        let mode = config.get_string("mode").unwrap_or_else(|| "rwc".into());
        let in_memory = path == MEMORY || mode == "memory";
        tracing::info!(path = %path, mode = %mode, "opening SQLite database");

        let conn = if in_memory {
            RusqliteConnection::open_in_memory().map_err(|e| {
                ModelDbError::Connection(format!("Failed to open in-memory database: {}", e))
            })?
        } else {
            let expanded_path = Self::expand_path(&path)?;
            let flags = match mode.as_str() {
                "ro" => OpenFlags::SQLITE_OPEN_READ_ONLY,
                "rw" => OpenFlags::SQLITE_OPEN_READ_WRITE,
                _ => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            } | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX;

            let file_path = std::path::Path::new(&expanded_path);
            if let Some(parent) = file_path.parent()
                && !parent.exists()
            {
                return Err(ModelDbError::Connection(format!(
                    "Parent directory does not exist: {}",
                    parent.display()
                )));
            }

            RusqliteConnection::open_with_flags(&expanded_path, flags).map_err(|e| {
                ModelDbError::Connection(format!(
                    "Failed to open SQLite database at '{}': {}",
                    expanded_path, e
                ))
            })?
        };

        Self::apply_pragmas(&conn, config, in_memory || mode == "ro")?;

        tracing::info!(path = %path, "SQLite database connection established");
        Ok(Self {
            shared: Arc::new(SharedConnection::new(conn)),
            path,
            closed: AtomicBool::new(false),
        })
    }

    /// Open an in-memory database with default settings
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&ConnectionConfig::new_sqlite(MEMORY))
    }

    fn apply_pragmas(
        conn: &RusqliteConnection,
        config: &ConnectionConfig,
        skip_default_journal: bool,
    ) -> Result<()> {
        let foreign_keys = config.get_bool("foreign_keys")?.unwrap_or(true);
        conn.pragma_update(None, "foreign_keys", if foreign_keys { "ON" } else { "OFF" })
            .map_err(|e| {
                ModelDbError::Connection(format!("Failed to set foreign keys: {}", e))
            })?;

        let journal_mode = match config.get_string("journal_mode") {
            Some(mode) => Some(mode),
            None if skip_default_journal => None,
            None => Some("WAL".to_string()),
        };
        if let Some(journal_mode) = journal_mode {
            conn.pragma_update(None, "journal_mode", &journal_mode)
                .map_err(|e| {
                    ModelDbError::Connection(format!("Failed to set journal mode: {}", e))
                })?;
        }

        let synchronous = config
            .get_string("synchronous")
            .unwrap_or_else(|| "NORMAL".to_string());
        conn.pragma_update(None, "synchronous", &synchronous)
            .map_err(|e| {
                ModelDbError::Connection(format!("Failed to set synchronous mode: {}", e))
            })?;

        if let Some(ms) = config.get_u64("busy_timeout")? {
            conn.busy_timeout(Duration::from_millis(ms)).map_err(|e| {
                ModelDbError::Connection(format!("Failed to set busy timeout: {}", e))
            })?;
        }

        Ok(())
    }

    /// Expand `~/` to the home directory and make relative paths absolute
    fn expand_path(path: &str) -> Result<String> {
        if path.starts_with("file:") {
            return Ok(path.to_string());
        }

        let expanded = if let Some(rest) = path.strip_prefix("~/") {
            let home = dirs::home_dir().ok_or_else(|| {
                ModelDbError::Configuration("Unable to determine home directory".into())
            })?;
            home.join(rest)
        } else if path.starts_with('~') {
            return Err(ModelDbError::Configuration(
                "User-specific home directories (~user) are not supported".into(),
            ));
        } else {
            std::path::PathBuf::from(path)
        };

        let absolute = if expanded.is_relative() {
            std::env::current_dir()?.join(expanded)
        } else {
            expanded
        };
        Ok(absolute.to_string_lossy().to_string())
    }

    /// Database path this connection was opened with
    pub fn path(&self) -> &str {
        &self.path
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ModelDbError::Connection("Connection is closed".into()));
        }
        Ok(())
    }

    async fn count(&self, sql: &str, params: &[Value]) -> Result<i64> {
        let result = self.query(sql, params).await?;
        result
            .rows
            .first()
            .and_then(|row| row.get(0))
            .and_then(Value::as_i64)
            .ok_or_else(|| ModelDbError::Query("Count is not an integer".into()))
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn driver_name(&self) -> &str {
        "sqlite"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        self.ensure_open()?;
        let conn = self.shared.lock()?;
        run_execute(&conn, sql, params)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        self.ensure_open()?;
        let conn = self.shared.lock()?;
        run_query(&conn, sql, params)
    }

    async fn execute_batch(&self, sql: &str) -> Result<()> {
        self.ensure_open()?;
        tracing::debug!("executing SQL batch");
        let conn = self.shared.lock()?;
        conn.execute_batch(sql)
            .map_err(|e| ModelDbError::Query(format!("Failed to execute batch: {}", e)))
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn stream(&self, sql: &str, params: &[Value]) -> Result<RowStream> {
        self.ensure_open()?;
        let sql = sql.to_string();
        let params = values_to_rusqlite(params)?;
        // Lets a stream that is already shutting down release the connection.
        drop(self.shared.lock()?);
        if self.shared.streaming.swap(true, Ordering::AcqRel) {
            return Err(ModelDbError::Connection(
                "A row stream is already in progress on this connection".into(),
            ));
        }
        let flag = StreamingFlag(Arc::clone(&self.shared));
        let (ready_tx, ready_rx) = oneshot::channel();

        tokio::task::spawn_blocking(move || {
            let shared = Arc::clone(&flag.0);
            let conn = shared.conn.lock();
            stream_rows(&conn, &sql, &params, ready_tx);
            drop(flag);
            drop(conn);
        });

        ready_rx.await.map_err(|_| {
            ModelDbError::Driver("Streaming task ended before the query started".into())
        })?
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        self.ensure_open()?;
        tracing::debug!("beginning SQLite transaction");
        {
            let conn = self.shared.lock()?;
            conn.execute_batch("BEGIN DEFERRED").map_err(|e| {
                ModelDbError::Query(format!("Failed to begin transaction: {}", e))
            })?;
        }
        Ok(Box::new(SqliteTransaction {
            shared: Arc::clone(&self.shared),
            committed: false,
            rolled_back: false,
        }))
    }

    async fn close(&self) -> Result<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::info!(path = %self.path, "closing SQLite connection");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn as_schema_introspection(&self) -> Option<&dyn SchemaIntrospection> {
        Some(self)
    }
}

#[async_trait]
impl SchemaIntrospection for SqliteConnection {
    #[tracing::instrument(skip(self))]
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let result = self
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                &[],
            )
            .await?;

        let mut tables = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let Some(name) = row.get(0).and_then(Value::as_str) else {
                continue;
            };
            let count_sql = format!("SELECT COUNT(*) FROM \"{}\"", name.replace('"', "\"\""));
            tables.push(TableInfo {
                name: name.to_string(),
                row_count: self.count(&count_sql, &[]).await.ok(),
                index_count: self
                    .count(
                        "SELECT COUNT(*) FROM pragma_index_list(?1)",
                        &[Value::from(name)],
                    )
                    .await
                    .ok(),
            });
        }

        tracing::debug!(table_count = tables.len(), "tables listed");
        Ok(tables)
    }

    #[tracing::instrument(skip(self))]
    async fn get_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let result = self
            .query(
                "SELECT cid, name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1)",
                &[Value::from(table)],
            )
            .await?;

        let columns = result
            .rows
            .iter()
            .map(|row| ColumnInfo {
                ordinal: row.get(0).and_then(Value::as_i64).unwrap_or(0) as usize,
                name: row.get(1).and_then(Value::as_str).unwrap_or("").to_string(),
                data_type: row.get(2).and_then(Value::as_str).unwrap_or("").to_string(),
                nullable: row.get(3).and_then(Value::as_i64).unwrap_or(0) == 0,
                default_value: row
                    .get(4)
                    .filter(|v| !v.is_null())
                    .map(|v| v.to_string()),
                is_primary_key: row.get(5).and_then(Value::as_i64).unwrap_or(0) > 0,
            })
            .collect();

        Ok(columns)
    }

    #[tracing::instrument(skip(self))]
    async fn get_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let result = self
            .query(
                "SELECT name, \"unique\", origin FROM pragma_index_list(?1) ORDER BY name",
                &[Value::from(table)],
            )
            .await?;

        let mut indexes = Vec::with_capacity(result.rows.len());
        for row in &result.rows {
            let Some(name) = row.get(0).and_then(Value::as_str) else {
                continue;
            };
            let columns = self
                .query(
                    "SELECT name FROM pragma_index_info(?1) ORDER BY seqno",
                    &[Value::from(name)],
                )
                .await?
                .rows
                .iter()
                .filter_map(|r| r.get(0).and_then(Value::as_str).map(str::to_string))
                .collect();

            indexes.push(IndexInfo {
                name: name.to_string(),
                columns,
                is_unique: row.get(1).and_then(Value::as_i64).unwrap_or(0) == 1,
                is_primary: row.get(2).and_then(Value::as_str) == Some("pk"),
                index_type: "btree".to_string(),
            });
        }

        Ok(indexes)
    }
}

/// SQLite transaction wrapper.
///
/// Issues raw `BEGIN DEFERRED` / `COMMIT` / `ROLLBACK` SQL so that it can share
/// the connection without rusqlite's borrow-based transaction lifetime.
pub struct SqliteTransaction {
    shared: Arc<SharedConnection>,
    committed: bool,
    rolled_back: bool,
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if !self.committed && !self.rolled_back {
            tracing::warn!(
                "SQLite transaction dropped without commit or rollback, issuing automatic rollback"
            );
            let result = self.shared.lock().and_then(|conn| {
                conn.execute_batch("ROLLBACK")
                    .map_err(|e| ModelDbError::Query(e.to_string()))
            });
            if let Err(e) = result {
                tracing::error!(error = %e, "automatic rollback on drop failed");
            }
        }
    }
}

#[async_trait]
impl Transaction for SqliteTransaction {
    async fn commit(mut self: Box<Self>) -> Result<()> {
        if self.rolled_back {
            return Err(ModelDbError::Query("Transaction already rolled back".into()));
        }
        if self.committed {
            return Err(ModelDbError::Query("Transaction already committed".into()));
        }

        {
            let conn = self.shared.lock()?;
            conn.execute_batch("COMMIT").map_err(|e| {
                ModelDbError::Query(format!("Failed to commit transaction: {}", e))
            })?;
        }

        self.committed = true;
        tracing::debug!("SQLite transaction committed");
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        if self.committed {
            return Err(ModelDbError::Query("Transaction already committed".into()));
        }
        if self.rolled_back {
            return Ok(());
        }

        {
            let conn = self.shared.lock()?;
            conn.execute_batch("ROLLBACK").map_err(|e| {
                ModelDbError::Query(format!("Failed to rollback transaction: {}", e))
            })?;
        }

        self.rolled_back = true;
        tracing::debug!("SQLite transaction rolled back");
        Ok(())
    }

    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing query in SQLite transaction");
        let conn = self.shared.lock()?;
        run_query(&conn, sql, params)
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        tracing::debug!(sql_preview = %sql.chars().take(100).collect::<String>(), "executing statement in SQLite transaction");
        let conn = self.shared.lock()?;
        run_execute(&conn, sql, params)
    }
}

fn run_execute(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<StatementResult> {
    let rusqlite_params = values_to_rusqlite(params)?;
    let rows_affected = conn
        .execute(sql, params_from_iter(rusqlite_params.iter()))
        .map_err(|e| ModelDbError::Query(format!("Failed to execute statement: {}", e)))?;

    tracing::debug!(affected_rows = rows_affected, "statement executed");
    Ok(StatementResult {
        is_query: false,
        result: None,
        affected_rows: rows_affected as u64,
        error: None,
    })
}

fn run_query(conn: &RusqliteConnection, sql: &str, params: &[Value]) -> Result<QueryResult> {
    let start_time = std::time::Instant::now();
    let rusqlite_params = values_to_rusqlite(params)?;

    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| ModelDbError::Query(format!("Failed to prepare query: {}", e)))?;

    // Declared types come from sqlite3_column_decltype
    let columns: Vec<ColumnMeta> = stmt
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| ColumnMeta {
            name: col.name().to_string(),
            data_type: col.decl_type().unwrap_or("DYNAMIC").to_string(),
            nullable: true,
            ordinal: idx,
        })
        .collect();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let mut rows = Vec::new();
    let mut query_rows = stmt
        .query(params_from_iter(rusqlite_params.iter()))
        .map_err(|e| ModelDbError::Query(format!("Failed to execute query: {}", e)))?;

    while let Some(row) = query_rows
        .next()
        .map_err(|e| ModelDbError::Query(format!("Failed to fetch row: {}", e)))?
    {
        rows.push(read_row(row, &column_names)?);
    }

    let execution_time_ms = start_time.elapsed().as_millis() as u64;
    tracing::debug!(
        row_count = rows.len(),
        execution_time_ms = execution_time_ms,
        "query executed successfully"
    );
    Ok(QueryResult {
        id: uuid::Uuid::new_v4(),
        columns,
        rows,
        affected_rows: 0,
        execution_time_ms,
    })
}

/// Feed the rows of `sql` into a `RowStream`, handing the stream back through
/// `ready` once the statement has started.
fn stream_rows(
    conn: &RusqliteConnection,
    sql: &str,
    params: &[rusqlite::types::Value],
    ready: oneshot::Sender<Result<RowStream>>,
) {
    let mut stmt = match conn.prepare(sql) {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = ready.send(Err(ModelDbError::Query(format!(
                "Failed to prepare query: {}",
                e
            ))));
            return;
        }
    };
    let columns: Vec<String> = stmt
        .column_names()
        .into_iter()
        .map(str::to_string)
        .collect();

    let mut query_rows = match stmt.query(params_from_iter(params.iter())) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = ready.send(Err(ModelDbError::Query(format!(
                "Failed to execute query: {}",
                e
            ))));
            return;
        }
    };

    let (tx, stream) = RowStream::channel(columns.clone(), STREAM_BUFFER);
    if ready.send(Ok(stream)).is_err() {
        return;
    }

    let mut sent = 0usize;
    loop {
        let item = match query_rows.next() {
            Ok(Some(row)) => read_row(row, &columns),
            Ok(None) => break,
            Err(e) => Err(ModelDbError::Query(format!("Failed to fetch row: {}", e))),
        };
        let failed = item.is_err();
        if tx.blocking_send(item).is_err() {
            tracing::debug!(rows_sent = sent, "row stream dropped by consumer");
            return;
        }
        if failed {
            return;
        }
        sent += 1;
    }
    tracing::debug!(rows_sent = sent, "row stream exhausted");
}

fn read_row(row: &rusqlite::Row, columns: &[String]) -> Result<Row> {
    let values = (0..columns.len())
        .map(|idx| rusqlite_to_value(row, idx))
        .collect::<Result<Vec<_>>>()?;
    Ok(Row::new(columns.to_vec(), values))
}

/// Convert our Value types to rusqlite-compatible types
fn values_to_rusqlite(values: &[Value]) -> Result<Vec<rusqlite::types::Value>> {
    values.iter().map(value_to_rusqlite).collect()
}

fn value_to_rusqlite(value: &Value) -> Result<rusqlite::types::Value> {
    Ok(match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Bool(b) => rusqlite::types::Value::Integer(i64::from(*b)),
        Value::Int64(i) => rusqlite::types::Value::Integer(*i),
        Value::Float64(f) => rusqlite::types::Value::Real(*f),
        Value::String(s) => rusqlite::types::Value::Text(s.clone()),
        Value::Bytes(b) => rusqlite::types::Value::Blob(b.clone()),
        Value::List(_) | Value::Map(_) => {
            return Err(ModelDbError::NotSupported(format!(
                "Cannot bind a {} value directly, encode it first",
                value.kind()
            )));
        }
    })
}

/// Convert rusqlite row value to our Value type
fn rusqlite_to_value(row: &rusqlite::Row, idx: usize) -> Result<Value> {
    use rusqlite::types::ValueRef;

    let value_ref = row
        .get_ref(idx)
        .map_err(|e| ModelDbError::Query(e.to_string()))?;

    Ok(match value_ref {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int64(i),
        ValueRef::Real(f) => Value::Float64(f),
        ValueRef::Text(s) => Value::String(String::from_utf8_lossy(s).to_string()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn blobs_stay_bytes() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let result = conn
            .query("SELECT ?1", &[Value::Bytes(b"{\"k\":\"v\"}".to_vec())])
            .await
            .unwrap();
        assert_eq!(
            result.rows[0].get(0),
            Some(&Value::Bytes(b"{\"k\":\"v\"}".to_vec()))
        );
    }

    #[tokio::test]
    async fn closed_connection_rejects_work() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.query("SELECT 1", &[]).await,
            Err(ModelDbError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn nested_values_must_be_encoded() {
        let conn = SqliteConnection::open_in_memory().unwrap();
        let err = conn
            .query("SELECT ?1", &[Value::List(vec![Value::Int64(1)])])
            .await
            .unwrap_err();
        assert!(matches!(err, ModelDbError::NotSupported(_)));
    }

    #[test]
    fn missing_parent_directory_is_rejected() {
        let config = ConnectionConfig::new_sqlite("/definitely/not/here/data.db");
        assert!(matches!(
            SqliteConnection::open(&config),
            Err(ModelDbError::Connection(_))
        ));
    }

    #[test]
    fn relative_paths_become_absolute() {
        let expanded = SqliteConnection::expand_path("data.db").unwrap();
        assert!(std::path::Path::new(&expanded).is_absolute());
        assert!(SqliteConnection::expand_path("~someone/data.db").is_err());
    }
}
