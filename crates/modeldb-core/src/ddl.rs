//! DDL generation for registered record shapes
//!
//! Generates CREATE TABLE, CREATE INDEX, DROP TABLE and the INSERT/SELECT
//! statements used for records. Identifier quoting and column type names come
//! from the driver's `DialectInfo`, field types are resolved through the
//! `TypeRegistry`.

use crate::model::{FieldDef, ModelSchema};
use crate::{DialectInfo, Result, SqlType, TypeRegistry};

/// DDL Generator for creating SQL statements from model schemas
///
/// This is a stateless utility: all methods are associated functions that
/// take the schema and dialect as input.
pub struct DdlGenerator;

impl DdlGenerator {
    /// Generate the CREATE TABLE statement
    pub fn create_table(
        schema: &ModelSchema,
        registry: &TypeRegistry,
        dialect: &DialectInfo,
    ) -> Result<String> {
        let column_defs = schema
            .fields()
            .map(|field| {
                let sql_type = registry.resolve(&field.field_type)?;
                Ok(Self::column_definition(field, sql_type, dialect))
            })
            .collect::<Result<Vec<String>>>()?;

        Ok(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            dialect.quote_ident(schema.table_name()),
            column_defs.join(",\n")
        ))
    }

    /// Generate a single column definition
    pub fn column_definition(field: &FieldDef, sql_type: SqlType, dialect: &DialectInfo) -> String {
        let mut def = format!(
            "  {} {}",
            dialect.quote_ident(&field.name),
            dialect.type_name(sql_type.affinity)
        );

        if !sql_type.nullable {
            def.push_str(" NOT NULL");
        }
        if field.meta.is_primary_key() {
            def.push_str(" PRIMARY KEY");
        } else if field.meta.is_unique() && !field.meta.is_indexed() {
            // Indexed unique fields get a UNIQUE INDEX instead.
            def.push_str(" UNIQUE");
        }

        def
    }

    /// Name of the index generated for an indexed field
    pub fn index_name(table: &str, field: &str) -> String {
        format!("idx_{}_{}", table, field)
    }

    /// Generate one CREATE INDEX statement per field carrying an index hint
    pub fn create_indexes(schema: &ModelSchema, dialect: &DialectInfo) -> Vec<String> {
        let table = schema.table_name();
        schema
            .indexed_fields()
            .filter(|field| !field.meta.is_primary_key())
            .map(|field| {
                format!(
                    "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
                    if field.meta.is_unique() { "UNIQUE " } else { "" },
                    dialect.quote_ident(&Self::index_name(table, &field.name)),
                    dialect.quote_ident(table),
                    dialect.quote_ident(&field.name)
                )
            })
            .collect()
    }

    /// All statements needed to register a schema, in execution order
    pub fn registration_statements(
        schema: &ModelSchema,
        registry: &TypeRegistry,
        dialect: &DialectInfo,
    ) -> Result<Vec<String>> {
        let mut statements = vec![Self::create_table(schema, registry, dialect)?];
        statements.extend(Self::create_indexes(schema, dialect));
        Ok(statements)
    }

    /// Generate DROP TABLE statement
    pub fn drop_table(schema: &ModelSchema, dialect: &DialectInfo) -> String {
        format!(
            "DROP TABLE IF EXISTS {}",
            dialect.quote_ident(schema.table_name())
        )
    }

    /// Generate a parameterized INSERT covering every field in declaration order
    pub fn insert(schema: &ModelSchema, dialect: &DialectInfo) -> String {
        let columns: Vec<String> = schema
            .fields()
            .map(|f| dialect.quote_ident(&f.name))
            .collect();
        let placeholders = vec!["?"; columns.len()].join(", ");
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            dialect.quote_ident(schema.table_name()),
            columns.join(", "),
            placeholders
        )
    }

    /// Generate a SELECT of every field in declaration order
    pub fn select_all(schema: &ModelSchema, dialect: &DialectInfo) -> String {
        let columns: Vec<String> = schema
            .fields()
            .map(|f| dialect.quote_ident(&f.name))
            .collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.join(", "),
            dialect.quote_ident(schema.table_name())
        );
        if let Some(pk) = schema.primary_key() {
            sql.push_str(&format!(" ORDER BY {}", dialect.quote_ident(&pk.name)));
        }
        sql
    }
}
