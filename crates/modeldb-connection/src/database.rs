//! Database handle

use modeldb_core::{
    Connection, ConnectionConfig, DatabaseDriver, DdlGenerator, DialectInfo, Model, ModelDbError,
    ModelSchema, Record, Result, RowStream, SqlType, TypeRegistry, Value, codec,
};
use modeldb_drivers::DriverRegistry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::registration::{RegisteredModel, verify_columns};

/// Handle to a database target and the models registered against it.
///
/// The connection string is parsed when the handle is created; the connection
/// itself is opened on first use.
pub struct Database {
    conn_str: String,
    driver: Arc<dyn DatabaseDriver>,
    config: ConnectionConfig,
    dialect: DialectInfo,
    connection: OnceCell<Arc<dyn Connection>>,
    types: TypeRegistry,
    models: RwLock<HashMap<String, RegisteredModel>>,
    /// Registration holds this exclusively for its whole transaction; every
    /// other statement issued through the handle takes it shared.
    gate: tokio::sync::RwLock<()>,
}

impl Database {
    /// Create a handle using the built-in drivers
    pub fn new(conn_str: &str) -> Result<Self> {
        Self::with_drivers(conn_str, &DriverRegistry::with_defaults())
    }

    /// Create a handle resolving the driver from `drivers`
    #[tracing::instrument(skip(drivers))]
    pub fn with_drivers(conn_str: &str, drivers: &DriverRegistry) -> Result<Self> {
        let (driver, config) = drivers.for_connection_string(conn_str)?;
        tracing::debug!(driver = driver.name(), database = ?config.database, "database handle created");

        Ok(Self {
            conn_str: conn_str.to_string(),
            dialect: driver.dialect_info(),
            driver,
            config,
            connection: OnceCell::new(),
            types: TypeRegistry::new(),
            models: RwLock::new(HashMap::new()),
            gate: tokio::sync::RwLock::new(()),
        })
    }

    /// Connection string the handle was created from
    pub fn connection_string(&self) -> &str {
        &self.conn_str
    }

    /// Parsed connection configuration
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Name of the driver serving this handle
    pub fn driver_name(&self) -> &str {
        self.driver.name()
    }

    /// SQL dialect of the driver
    pub fn dialect(&self) -> &DialectInfo {
        &self.dialect
    }

    /// Field type lookup table used by this handle
    pub fn type_registry(&self) -> &TypeRegistry {
        &self.types
    }

    /// Whether the underlying connection has been opened
    pub fn is_connected(&self) -> bool {
        self.connection
            .get()
            .is_some_and(|conn| !conn.is_closed())
    }

    /// The underlying connection, opened on first call
    pub async fn connection(&self) -> Result<Arc<dyn Connection>> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                tracing::info!(driver = self.driver.name(), "opening database connection");
                self.driver.connect(&self.config).await
            })
            .await?;
        Ok(Arc::clone(conn))
    }

    /// Register the shape declared by `M`
    pub async fn register_model<M: Model>(&self) -> Result<bool> {
        self.register_schema(M::schema()?).await
    }

    /// Register a record shape, creating its table and indexes.
    ///
    /// Returns `false` if an identical shape is already registered under the
    /// same name.
    #[tracing::instrument(skip(self, schema), fields(model = %schema.name(), table = %schema.table_name()))]
    pub async fn register_schema(&self, schema: ModelSchema) -> Result<bool> {
        let _exclusive = self.gate.write().await;

        let expected = schema
            .fields()
            .map(|field| Ok((field.name.clone(), self.types.resolve(&field.field_type)?)))
            .collect::<Result<Vec<(String, SqlType)>>>()?;

        let existing = self
            .models
            .read()
            .get(schema.name())
            .map(|registered| registered.schema == schema);
        match existing {
            Some(true) => {
                tracing::debug!("model already registered with an identical shape");
                return Ok(false);
            }
            Some(false) => {
                return Err(ModelDbError::Schema(format!(
                    "Model '{}' is already registered with a different shape",
                    schema.name()
                )));
            }
            None => {}
        }

        let statements = DdlGenerator::registration_statements(&schema, &self.types, &self.dialect)?;
        let Some((create_table, create_indexes)) = statements.split_first() else {
            return Err(ModelDbError::Other("No DDL generated".into()));
        };

        let conn = self.connection().await?;
        let tx = conn.begin_transaction().await?;
        tx.execute(create_table, &[]).await?;

        let columns = match conn.as_schema_introspection() {
            Some(introspection) => {
                let live = introspection.get_columns(schema.table_name()).await?;
                if let Err(e) = verify_columns(&schema, &expected, &live) {
                    tracing::warn!(error = %e, "existing table does not match model");
                    tx.rollback().await?;
                    return Err(e);
                }
                live
            }
            None => {
                tracing::warn!(
                    driver = self.driver.name(),
                    "driver has no schema introspection, skipping table verification"
                );
                Vec::new()
            }
        };

        for sql in create_indexes {
            tx.execute(sql, &[]).await?;
        }
        tx.commit().await?;

        tracing::info!(
            fields = schema.len(),
            indexes = create_indexes.len(),
            "model registered"
        );
        self.models.write().insert(
            schema.name().to_string(),
            RegisteredModel::new(schema, columns),
        );
        Ok(true)
    }

    /// Names of all registered models, sorted
    pub fn registered_models(&self) -> Vec<String> {
        let mut names: Vec<String> = self.models.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Look up a registered model by name
    pub fn registered(&self, name: &str) -> Option<RegisteredModel> {
        self.models.read().get(name).cloned()
    }

    fn require_model(&self, name: &str) -> Result<RegisteredModel> {
        self.registered(name)
            .ok_or_else(|| ModelDbError::NotFound(format!("Model '{}' is not registered", name)))
    }

    /// Insert one record into a registered model's table.
    ///
    /// Fields missing from the record are stored as NULL when the field is
    /// optional; any other missing or unknown field is a validation error.
    #[tracing::instrument(skip(self, record), fields(fields = record.len()))]
    pub async fn insert(&self, model: &str, record: &Record) -> Result<u64> {
        let registered = self.require_model(model)?;
        let schema = &registered.schema;

        if let Some((unknown, _)) = record.iter().find(|(name, _)| schema.field(name).is_none()) {
            return Err(ModelDbError::Validation(format!(
                "Model '{}' has no field '{}'",
                model, unknown
            )));
        }

        let params = schema
            .fields()
            .map(|field| {
                let value = match record.get(&field.name) {
                    Some(value) => value.clone(),
                    None if field.field_type.is_nullable() => Value::Null,
                    None => {
                        return Err(ModelDbError::Validation(format!(
                            "Missing value for field '{}'",
                            field.name
                        )));
                    }
                };
                codec::encode(&field.field_type, &value, &self.types).map_err(|e| in_field(&field.name, e))
            })
            .collect::<Result<Vec<Value>>>()?;

        let sql = DdlGenerator::insert(schema, &self.dialect);
        let _shared = self.gate.read().await;
        let result = self.connection().await?.execute(&sql, &params).await?;
        Ok(result.affected_rows)
    }

    /// Read every record of a registered model's table
    #[tracing::instrument(skip(self))]
    pub async fn fetch_all(&self, model: &str) -> Result<Vec<Record>> {
        let registered = self.require_model(model)?;
        let schema = &registered.schema;

        let sql = DdlGenerator::select_all(schema, &self.dialect);
        let result = {
            let _shared = self.gate.read().await;
            self.connection().await?.query(&sql, &[]).await?
        };

        result
            .rows
            .into_iter()
            .map(|row| {
                let mut record = Record::new();
                for (idx, field) in schema.fields().enumerate() {
                    let stored = row.get(idx).cloned().unwrap_or(Value::Null);
                    let value = codec::decode(&field.field_type, stored, &self.types)
                        .map_err(|e| in_field(&field.name, e))?;
                    record.insert(field.name.clone(), value);
                }
                Ok(record)
            })
            .collect()
    }

    /// Start a query whose rows are consumed incrementally.
    ///
    /// The stream holds the connection until it is exhausted or dropped;
    /// other operations on the handle fail with a connection error meanwhile.
    #[tracing::instrument(skip(self, sql), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    pub async fn start_query(&self, sql: &str) -> Result<RowStream> {
        let _shared = self.gate.read().await;
        self.connection().await?.stream(sql, &[]).await
    }

    /// Close the underlying connection if it was opened
    pub async fn close(&self) -> Result<()> {
        match self.connection.get() {
            Some(conn) => conn.close().await,
            None => Ok(()),
        }
    }
}

fn in_field(field: &str, err: ModelDbError) -> ModelDbError {
    match err {
        ModelDbError::Validation(msg) => {
            ModelDbError::Validation(format!("Field '{}': {}", field, msg))
        }
        other => other,
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("conn_str", &self.conn_str)
            .field("driver", &self.driver.name())
            .field("connected", &self.is_connected())
            .field("models", &self.registered_models())
            .finish()
    }
}
