//! SQLite dialect information

use modeldb_core::{DataTypeInfo, DialectInfo, TypeAffinity};
use std::borrow::Cow;

/// Build the SQLite dialect info
pub fn sqlite_dialect() -> DialectInfo {
    DialectInfo {
        id: Cow::Borrowed("sqlite"),
        display_name: Cow::Borrowed("SQLite"),
        data_types: sqlite_data_types(),
        identifier_quote: '"',
        string_quote: '\'',
        statement_terminator: ';',
    }
}

fn sqlite_data_types() -> Vec<DataTypeInfo> {
    vec![
        DataTypeInfo::with_desc(
            "INTEGER",
            TypeAffinity::Integer,
            "Signed integer, stored in 0 to 8 bytes",
        ),
        DataTypeInfo::with_desc("TEXT", TypeAffinity::Text, "UTF-8 text string"),
        DataTypeInfo::with_desc("BLOB", TypeAffinity::Blob, "Bytes stored exactly as input"),
        DataTypeInfo::with_desc("REAL", TypeAffinity::Real, "8-byte IEEE floating point"),
        DataTypeInfo::with_desc(
            "NUMERIC",
            TypeAffinity::Numeric,
            "Integer or real, whichever is lossless",
        ),
        DataTypeInfo::new("INT", TypeAffinity::Integer),
        DataTypeInfo::new("BIGINT", TypeAffinity::Integer),
        DataTypeInfo::new("BOOLEAN", TypeAffinity::Numeric),
        DataTypeInfo::new("VARCHAR", TypeAffinity::Text),
        DataTypeInfo::new("DOUBLE", TypeAffinity::Real),
    ]
}
