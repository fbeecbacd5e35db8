//! The `demo` command: declare the example model, print its field types and
//! register it.

use modeldb_connection::Database;
use modeldb_core::{FieldMeta, Model, ModelSchema, Result, TypeRegistry};
use std::collections::HashMap;

/// Example record shape with an integer, a string mapping and indexed bytes
pub struct ExampleModel;

impl Model for ExampleModel {
    fn schema() -> Result<ModelSchema> {
        ModelSchema::builder("ExampleModel")
            .field::<i64>("a")
            .field::<HashMap<String, String>>("b")
            .field_with::<Vec<u8>>("c", FieldMeta::indexed())
            .build()
    }
}

/// One `<name> <type info>` line per field, in declaration order
pub fn field_lines(schema: &ModelSchema, registry: &TypeRegistry) -> Vec<String> {
    schema
        .fields()
        .map(|field| format!("{} {}", field.name, field.describe(registry)))
        .collect()
}

/// One-line summary of a registration attempt
pub fn registration_summary(schema: &ModelSchema, created: bool) -> String {
    if created {
        format!(
            "registered {} as table {}",
            schema.name(),
            schema.table_name()
        )
    } else {
        format!("{} was already registered", schema.name())
    }
}

pub async fn run(db: &Database) -> anyhow::Result<()> {
    let schema = ExampleModel::schema()?;

    for line in field_lines(&schema, db.type_registry()) {
        println!("{line}");
    }
    println!();

    let created = db.register_schema(schema.clone()).await?;
    println!("{}", registration_summary(&schema, created));
    Ok(())
}
