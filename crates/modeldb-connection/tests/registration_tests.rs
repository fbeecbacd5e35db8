/// Integration tests for model registration against SQLite
use futures::StreamExt;
use modeldb_connection::Database;
use modeldb_core::{FieldMeta, FieldType, Model, ModelDbError, ModelSchema, Record, Result, Value};
use pretty_assertions::assert_eq;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

struct ExampleModel;

impl Model for ExampleModel {
    fn schema() -> Result<ModelSchema> {
        ModelSchema::builder("ExampleModel")
            .field::<i64>("a")
            .field::<HashMap<String, String>>("b")
            .field_with::<Vec<u8>>("c", FieldMeta::indexed())
            .build()
    }
}

fn file_database() -> (TempDir, Database) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let conn_str = format!("sqlite:///{}", dir.path().join("data.db").display());
    let db = Database::new(&conn_str).expect("Failed to create database handle");
    (dir, db)
}

fn example_record(a: i64) -> Record {
    let b = HashMap::from([("key".to_string(), format!("value-{a}"))]);
    Record::new()
        .with("a", a)
        .with("b", b)
        .with("c", vec![a as u8, 0xff])
}

#[tokio::test]
async fn test_register_example_model_creates_table_and_index() {
    let (_dir, db) = file_database();
    assert!(!db.is_connected());

    assert!(db.register_model::<ExampleModel>().await.unwrap());
    assert!(db.is_connected());
    assert_eq!(db.registered_models(), vec!["ExampleModel".to_string()]);

    let registered = db.registered("ExampleModel").unwrap();
    assert_eq!(registered.table_name(), "example_model");
    assert_eq!(registered.primary_key, None);

    let conn = db.connection().await.unwrap();
    let introspection = conn.as_schema_introspection().unwrap();
    let columns: Vec<(String, String, bool)> = introspection
        .get_columns("example_model")
        .await
        .unwrap()
        .into_iter()
        .map(|c| (c.name, c.data_type, c.nullable))
        .collect();
    assert_eq!(
        columns,
        vec![
            ("a".to_string(), "INTEGER".to_string(), false),
            ("b".to_string(), "BLOB".to_string(), false),
            ("c".to_string(), "BLOB".to_string(), false),
        ]
    );

    let indexes = introspection.get_indexes("example_model").await.unwrap();
    assert_eq!(indexes.len(), 1);
    assert_eq!(indexes[0].name, "idx_example_model_c");
    assert_eq!(indexes[0].columns, vec!["c".to_string()]);
}

#[tokio::test]
async fn test_register_twice_returns_false() {
    let (_dir, db) = file_database();
    assert!(db.register_model::<ExampleModel>().await.unwrap());
    assert!(!db.register_model::<ExampleModel>().await.unwrap());
    assert_eq!(db.registered_models().len(), 1);
}

#[tokio::test]
async fn test_conflicting_shape_under_same_name_fails() {
    let (_dir, db) = file_database();
    db.register_model::<ExampleModel>().await.unwrap();

    let other = ModelSchema::builder("ExampleModel")
        .field::<String>("a")
        .build()
        .unwrap();
    let err = db.register_schema(other).await.unwrap_err();
    assert!(matches!(err, ModelDbError::Schema(_)));
}

#[tokio::test]
async fn test_existing_table_with_other_layout_is_rejected() {
    let (dir, db) = file_database();
    db.register_model::<ExampleModel>().await.unwrap();
    db.close().await.unwrap();

    // A fresh handle on the same file sees the table created above
    let conn_str = format!("sqlite:///{}", dir.path().join("data.db").display());
    let fresh = Database::new(&conn_str).unwrap();
    let clashing = ModelSchema::builder("Example")
        .table("example_model")
        .field::<String>("a")
        .field::<f64>("z")
        .field_with::<String>("z_key", FieldMeta::indexed())
        .build()
        .unwrap();
    let err = fresh.register_schema(clashing).await.unwrap_err();
    assert!(matches!(err, ModelDbError::Schema(_)));
    assert!(fresh.registered_models().is_empty());

    // Rolled back: no index was created for the rejected shape
    let conn = fresh.connection().await.unwrap();
    let indexes = conn
        .as_schema_introspection()
        .unwrap()
        .get_indexes("example_model")
        .await
        .unwrap();
    assert!(indexes.iter().all(|i| i.name != "idx_example_model_z_key"));

    // The original shape still matches the stored table
    assert!(fresh.register_model::<ExampleModel>().await.unwrap());
}

#[tokio::test]
async fn test_unresolvable_custom_type_fails_before_connecting() {
    let db = Database::new("sqlite::memory:").unwrap();
    let schema = ModelSchema::builder("Tagged")
        .field_type("id", FieldType::Custom("uuid".into()), FieldMeta::new())
        .build()
        .unwrap();
    assert!(matches!(
        db.register_schema(schema).await,
        Err(ModelDbError::Schema(_))
    ));
    assert!(!db.is_connected());
}

#[tokio::test]
async fn test_custom_type_resolved_through_alias() {
    let db = Database::new("sqlite::memory:").unwrap();
    db.type_registry().register_alias("uuid", "str");
    let schema = ModelSchema::builder("Tagged")
        .field_type("id", FieldType::Custom("uuid".into()), FieldMeta::primary())
        .build()
        .unwrap();
    assert!(db.register_schema(schema).await.unwrap());
    assert_eq!(
        db.registered("Tagged").unwrap().primary_key.as_deref(),
        Some("id")
    );
}

#[tokio::test]
async fn test_insert_and_fetch_round_trip() {
    let (_dir, db) = file_database();
    db.register_model::<ExampleModel>().await.unwrap();

    for a in 1..=3 {
        assert_eq!(db.insert("ExampleModel", &example_record(a)).await.unwrap(), 1);
    }

    let records = db.fetch_all("ExampleModel").await.unwrap();
    assert_eq!(records.len(), 3);
    for (record, a) in records.iter().zip(1..=3) {
        let expected = example_record(a);
        assert_eq!(record.get("a"), expected.get("a"));
        assert_eq!(record.get("b"), expected.get("b"));
        assert_eq!(record.get("c"), expected.get("c"));
    }
}

#[tokio::test]
async fn test_insert_validates_records() {
    let db = Database::new("sqlite::memory:").unwrap();
    db.register_model::<ExampleModel>().await.unwrap();

    let missing = Record::new().with("a", 1i64);
    let unknown = example_record(1).with("d", true);
    let mismatched = example_record(1).with("a", "one");

    for record in [missing, unknown, mismatched] {
        assert!(matches!(
            db.insert("ExampleModel", &record).await,
            Err(ModelDbError::Validation(_))
        ));
    }
    assert!(matches!(
        db.insert("Nope", &example_record(1)).await,
        Err(ModelDbError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_optional_fields_default_to_null() {
    let db = Database::new("sqlite::memory:").unwrap();
    let schema = ModelSchema::builder("Note")
        .field_with::<i64>("id", FieldMeta::primary())
        .field::<Option<String>>("body")
        .build()
        .unwrap();
    db.register_schema(schema).await.unwrap();

    db.insert("Note", &Record::new().with("id", 2i64)).await.unwrap();
    db.insert("Note", &Record::new().with("id", 1i64).with("body", "hi"))
        .await
        .unwrap();

    let records = db.fetch_all("Note").await.unwrap();
    assert_eq!(records[0].get("body"), Some(&Value::from("hi")));
    assert_eq!(records[1].get("body"), Some(&Value::Null));
}

#[tokio::test]
async fn test_start_query_streams_rows_in_order() {
    let (_dir, db) = file_database();
    db.register_model::<ExampleModel>().await.unwrap();
    for a in [3, 1, 2] {
        db.insert("ExampleModel", &example_record(a)).await.unwrap();
    }

    let mut stream = db
        .start_query("SELECT a FROM example_model ORDER BY a")
        .await
        .unwrap();
    assert_eq!(stream.columns(), &["a".to_string()]);

    let mut seen = Vec::new();
    while let Some(row) = stream.next().await {
        seen.push(row.unwrap().get(0).and_then(Value::as_i64).unwrap());
    }
    assert_eq!(seen, vec![1, 2, 3]);
    assert!(stream.next().await.is_none());

    let empty: Vec<_> = db
        .start_query("SELECT a FROM example_model WHERE a > 10")
        .await
        .unwrap()
        .collect()
        .await;
    assert!(empty.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_live_stream_makes_other_operations_fail_fast() {
    let (_dir, db) = file_database();
    let schema = ModelSchema::builder("N").field::<i64>("v").build().unwrap();
    db.register_schema(schema).await.unwrap();
    for v in 0..200i64 {
        db.insert("N", &Record::new().with("v", v)).await.unwrap();
    }

    let mut stream = db.start_query("SELECT v FROM n").await.unwrap();
    stream.next().await.unwrap().unwrap();

    let during = tokio::time::timeout(Duration::from_secs(5), db.fetch_all("N"))
        .await
        .expect("fetch_all should not wait for the stream");
    assert!(matches!(during, Err(ModelDbError::Connection(_))));

    drop(stream);
    assert_eq!(db.fetch_all("N").await.unwrap().len(), 200);
}

#[tokio::test]
async fn test_custom_types_inside_containers_must_resolve() {
    let db = Database::new("sqlite::memory:").unwrap();
    let unresolved = ModelSchema::builder("Tags")
        .field_type(
            "m",
            FieldType::Dict(
                Box::new(FieldType::Str),
                Box::new(FieldType::Custom("never_registered".into())),
            ),
            FieldMeta::new(),
        )
        .build()
        .unwrap();
    assert!(matches!(
        db.register_schema(unresolved).await,
        Err(ModelDbError::Schema(_))
    ));
    assert!(!db.is_connected());
}

#[tokio::test]
async fn test_list_of_aliased_custom_type_round_trips() {
    let db = Database::new("sqlite::memory:").unwrap();
    db.type_registry().register_alias("uuid", "str");
    let schema = ModelSchema::builder("Batch")
        .field_type(
            "m",
            FieldType::List(Box::new(FieldType::Custom("uuid".into()))),
            FieldMeta::new(),
        )
        .build()
        .unwrap();
    db.register_schema(schema).await.unwrap();

    let ids = Value::List(vec![Value::from("abc"), Value::from("def")]);
    db.insert("Batch", &Record::new().with("m", ids.clone()))
        .await
        .unwrap();
    let records = db.fetch_all("Batch").await.unwrap();
    assert_eq!(records[0].get("m"), Some(&ids));
}

#[tokio::test]
async fn test_non_finite_floats_in_dicts_are_rejected() {
    let db = Database::new("sqlite::memory:").unwrap();
    let schema = ModelSchema::builder("Scores")
        .field::<HashMap<String, f64>>("m")
        .build()
        .unwrap();
    db.register_schema(schema).await.unwrap();

    let nan = BTreeMap::from([("x".to_string(), Value::Float64(f64::NAN))]);
    assert!(matches!(
        db.insert("Scores", &Record::new().with("m", Value::Map(nan))).await,
        Err(ModelDbError::Validation(_))
    ));

    let ok = BTreeMap::from([("x".to_string(), Value::Float64(0.5))]);
    db.insert("Scores", &Record::new().with("m", Value::Map(ok.clone())))
        .await
        .unwrap();
    let records = db.fetch_all("Scores").await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].get("m"), Some(&Value::Map(ok)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_registration_does_not_roll_back_concurrent_inserts() {
    let (_dir, db) = file_database();
    db.register_model::<ExampleModel>().await.unwrap();
    db.connection()
        .await
        .unwrap()
        .execute("CREATE TABLE clash (x TEXT)", &[])
        .await
        .unwrap();
    let db = Arc::new(db);

    let registrar = {
        let db = Arc::clone(&db);
        tokio::spawn(async move {
            for i in 0..20 {
                let clashing = ModelSchema::builder(format!("Clash{i}"))
                    .table("clash")
                    .field::<i64>("a")
                    .build()
                    .unwrap();
                assert!(matches!(
                    db.register_schema(clashing).await,
                    Err(ModelDbError::Schema(_))
                ));
            }
        })
    };
    let writer = {
        let db = Arc::clone(&db);
        tokio::spawn(async move {
            for a in 0..50 {
                assert_eq!(db.insert("ExampleModel", &example_record(a)).await.unwrap(), 1);
            }
        })
    };
    registrar.await.unwrap();
    writer.await.unwrap();

    assert_eq!(db.fetch_all("ExampleModel").await.unwrap().len(), 50);
}

#[test]
fn test_malformed_connection_strings_fail_eagerly() {
    for conn_str in ["not a url", "postgres://localhost/db", "sqlite:///x.db?bogus=1"] {
        assert!(matches!(
            Database::new(conn_str),
            Err(ModelDbError::Configuration(_))
        ));
    }
}

#[tokio::test]
async fn test_close_is_idempotent() {
    let db = Database::new("sqlite::memory:").unwrap();
    db.close().await.unwrap();
    db.register_model::<ExampleModel>().await.unwrap();
    db.close().await.unwrap();
    db.close().await.unwrap();
    assert!(!db.is_connected());
    assert!(db.fetch_all("ExampleModel").await.is_err());
}
