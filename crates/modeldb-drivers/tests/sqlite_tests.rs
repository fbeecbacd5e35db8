#![cfg(feature = "sqlite")]

/// Integration tests for the SQLite driver
use futures::StreamExt;
use modeldb_drivers::sqlite::{SqliteConnection, SqliteDriver};
use modeldb_drivers::{Connection, ConnectionConfig, DatabaseDriver, ModelDbError, Value};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Helper to create a file database with a small table
async fn setup_test_database() -> (TempDir, SqliteConnection) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("test.db");
    let conn = SqliteConnection::open(&ConnectionConfig::new_sqlite(path.to_str().unwrap()))
        .expect("Failed to create test database");

    conn.execute_batch(
        r#"CREATE TABLE users (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            avatar BLOB,
            score REAL
        );
        CREATE INDEX idx_users_score ON users(score);"#,
    )
    .await
    .expect("Failed to setup schema");

    for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
        conn.execute(
            "INSERT INTO users (id, name, avatar, score) VALUES (?, ?, ?, ?)",
            &[
                Value::Int64(id),
                Value::from(name),
                Value::Bytes(vec![0, 159, 146, 150]),
                Value::Float64(id as f64 * 1.5),
            ],
        )
        .await
        .expect("Failed to insert row");
    }

    (dir, conn)
}

#[tokio::test]
async fn test_query_returns_typed_values() {
    let (_dir, conn) = setup_test_database().await;

    let result = conn
        .query("SELECT id, name, avatar, score FROM users ORDER BY id", &[])
        .await
        .unwrap();

    assert_eq!(result.row_count(), 3);
    assert_eq!(result.columns[2].data_type, "BLOB");
    let first = &result.rows[0];
    assert_eq!(first.get_by_name("name"), Some(&Value::from("alice")));
    assert_eq!(
        first.get_by_name("avatar"),
        Some(&Value::Bytes(vec![0, 159, 146, 150]))
    );
    assert_eq!(first.get_by_name("score"), Some(&Value::Float64(1.5)));
}

#[tokio::test]
async fn test_schema_introspection() {
    let (_dir, conn) = setup_test_database().await;
    let introspection = conn.as_schema_introspection().unwrap();

    let tables = introspection.list_tables().await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "users");
    assert_eq!(tables[0].row_count, Some(3));

    let columns = introspection.get_columns("users").await.unwrap();
    let names: Vec<_> = columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "name", "avatar", "score"]);
    assert!(columns[0].is_primary_key);
    assert!(!columns[1].nullable);
    assert_eq!(columns[2].data_type, "BLOB");

    let indexes = introspection.get_indexes("users").await.unwrap();
    let score_index = indexes
        .iter()
        .find(|i| i.name == "idx_users_score")
        .expect("score index");
    assert_eq!(score_index.columns, vec!["score".to_string()]);
    assert!(!score_index.is_unique);
    assert!(indexes.iter().any(|i| i.is_unique && i.columns == ["name"]));

    assert!(introspection.get_columns("missing").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let (_dir, conn) = setup_test_database().await;

    let tx = conn.begin_transaction().await.unwrap();
    tx.execute("DELETE FROM users WHERE id = 1", &[]).await.unwrap();
    tx.rollback().await.unwrap();

    let tx = conn.begin_transaction().await.unwrap();
    tx.execute("DELETE FROM users WHERE id = 2", &[]).await.unwrap();
    let inside = tx.query("SELECT COUNT(*) FROM users", &[]).await.unwrap();
    assert_eq!(inside.rows[0].get(0), Some(&Value::Int64(2)));
    tx.commit().await.unwrap();

    {
        let tx = conn.begin_transaction().await.unwrap();
        tx.execute("DELETE FROM users", &[]).await.unwrap();
        // dropped without commit
    }

    let result = conn
        .query("SELECT id FROM users ORDER BY id", &[])
        .await
        .unwrap();
    let ids: Vec<_> = result.rows.iter().filter_map(|r| r.get(0)?.as_i64()).collect();
    assert_eq!(ids, vec![1, 3]);
}

#[tokio::test]
async fn test_stream_yields_rows_in_order() {
    let (_dir, conn) = setup_test_database().await;

    let mut stream = conn
        .stream("SELECT name FROM users ORDER BY id", &[])
        .await
        .unwrap();
    assert_eq!(stream.columns(), &["name".to_string()]);

    let mut names = Vec::new();
    while let Some(row) = stream.next().await {
        names.push(row.unwrap().get(0).unwrap().as_str().unwrap().to_string());
    }
    assert_eq!(names, vec!["alice", "bob", "carol"]);
    assert!(stream.next().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_stream_releases_connection() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute("CREATE TABLE n (v INTEGER NOT NULL)", &[])
        .await
        .unwrap();
    conn.execute(
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000) \
         INSERT INTO n SELECT x FROM c",
        &[],
    )
    .await
    .unwrap();

    let mut stream = conn.stream("SELECT v FROM n ORDER BY v", &[]).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.get(0), Some(&Value::Int64(1)));
    drop(stream);

    let count = conn.query("SELECT COUNT(*) FROM n", &[]).await.unwrap();
    assert_eq!(count.rows[0].get(0), Some(&Value::Int64(1000)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_stream_fails_other_statements_fast() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    conn.execute("CREATE TABLE n (v INTEGER NOT NULL)", &[])
        .await
        .unwrap();
    conn.execute(
        "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 200) \
         INSERT INTO n SELECT x FROM c",
        &[],
    )
    .await
    .unwrap();

    let mut stream = conn.stream("SELECT v FROM n ORDER BY v", &[]).await.unwrap();
    stream.next().await.unwrap().unwrap();

    let blocked = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        conn.query("SELECT COUNT(*) FROM n", &[]),
    )
    .await
    .expect("statement should not wait for the stream");
    assert!(matches!(blocked, Err(ModelDbError::Connection(_))));

    let second = conn.stream("SELECT v FROM n", &[]).await;
    assert!(matches!(second, Err(ModelDbError::Connection(_))));

    let mut rest = 1;
    while let Some(row) = stream.next().await {
        row.unwrap();
        rest += 1;
    }
    assert_eq!(rest, 200);

    let count = conn.query("SELECT COUNT(*) FROM n", &[]).await.unwrap();
    assert_eq!(count.rows[0].get(0), Some(&Value::Int64(200)));
}

#[tokio::test]
async fn test_stream_reports_prepare_errors() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let err = conn.stream("SELECT * FROM nowhere", &[]).await.unwrap_err();
    assert!(matches!(err, ModelDbError::Query(_)));

    let values: Vec<_> = conn
        .stream("SELECT 1 UNION ALL SELECT 2", &[])
        .await
        .unwrap()
        .map(|r| r.unwrap().get(0).and_then(Value::as_i64).unwrap())
        .collect()
        .await;
    assert_eq!(values, vec![1, 2]);
}

#[tokio::test]
async fn test_driver_applies_connection_string_pragmas() {
    let dir = tempfile::tempdir().unwrap();
    let driver = SqliteDriver::new();
    let conn_str = format!(
        "sqlite:///{}?foreign_keys=off&synchronous=full",
        dir.path().join("pragmas.db").display()
    );
    let config = driver.parse_connection_string(&conn_str).unwrap();
    let conn = driver.connect(&config).await.unwrap();

    let fk = conn.query("PRAGMA foreign_keys", &[]).await.unwrap();
    assert_eq!(fk.rows[0].get(0), Some(&Value::Int64(0)));
    let journal = conn.query("PRAGMA journal_mode", &[]).await.unwrap();
    assert_eq!(journal.rows[0].get(0), Some(&Value::from("wal")));
    let sync = conn.query("PRAGMA synchronous", &[]).await.unwrap();
    assert_eq!(sync.rows[0].get(0), Some(&Value::Int64(2)));
}

#[tokio::test]
async fn test_read_only_mode_rejects_writes() {
    let (dir, conn) = setup_test_database().await;
    conn.close().await.unwrap();

    let config = ConnectionConfig::new_sqlite(dir.path().join("test.db").to_str().unwrap())
        .with_param("mode", "ro");
    let ro = SqliteConnection::open(&config).unwrap();
    assert!(ro.query("SELECT COUNT(*) FROM users", &[]).await.is_ok());
    assert!(ro.execute("DELETE FROM users", &[]).await.is_err());
}

#[tokio::test]
async fn test_driver_test_connection() {
    let driver = SqliteDriver::new();
    let config = driver.parse_connection_string("sqlite::memory:").unwrap();
    driver.test_connection(&config).await.unwrap();
    assert!(driver.capabilities().supports_streaming);
    assert_eq!(driver.build_connection_string(&config), "sqlite::memory:");
}
