//! Registered models and live-table verification

use modeldb_core::{ColumnInfo, ModelDbError, ModelSchema, Result, SqlType, TypeAffinity};
use serde::Serialize;

/// A record shape that has been registered against a database
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredModel {
    /// Name of the primary-key field, if the shape declares one
    pub primary_key: Option<String>,
    /// The registered shape
    pub schema: ModelSchema,
    /// Columns of the backing table as reported by the database
    pub columns: Vec<ColumnInfo>,
}

impl RegisteredModel {
    pub(crate) fn new(schema: ModelSchema, columns: Vec<ColumnInfo>) -> Self {
        Self {
            primary_key: schema.primary_key().map(|f| f.name.clone()),
            schema,
            columns,
        }
    }

    /// Table backing this model
    pub fn table_name(&self) -> &str {
        self.schema.table_name()
    }
}

/// Check that a live table has exactly the columns a shape expects.
///
/// Columns are matched by name; types are compared by storage affinity.
pub(crate) fn verify_columns(
    schema: &ModelSchema,
    expected: &[(String, SqlType)],
    live: &[ColumnInfo],
) -> Result<()> {
    let mut problems = Vec::new();

    for (name, sql_type) in expected {
        match live.iter().find(|c| c.name.eq_ignore_ascii_case(name)) {
            None => problems.push(format!("missing column '{}'", name)),
            Some(column) => {
                let affinity = TypeAffinity::from_declared(&column.data_type);
                if affinity != sql_type.affinity {
                    problems.push(format!(
                        "column '{}' is {} but the model expects {}",
                        name, affinity, sql_type.affinity
                    ));
                }
            }
        }
    }
    for column in live {
        if !expected.iter().any(|(name, _)| column.name.eq_ignore_ascii_case(name)) {
            problems.push(format!("unexpected column '{}'", column.name));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(ModelDbError::Schema(format!(
            "Table '{}' does not match model '{}': {}",
            schema.table_name(),
            schema.name(),
            problems.join("; ")
        )))
    }
}
