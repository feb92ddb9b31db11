//! Column types and table creation
//!
//! Every table gets a synthetic UUID primary key (`_id`) and a creation
//! timestamp (`createdat`) ahead of the declared columns. Identifiers are
//! emitted unquoted, so PostgreSQL folds them to lower case.

use datanest_core::{CompiledSchema, FieldType, ID_FIELD};

/// Creation-timestamp column present on every table
pub const CREATED_COLUMN: &str = "createdat";

/// Needed for `gen_random_uuid()` on servers older than 13
pub const CREATE_EXTENSION: &str = r#"CREATE EXTENSION IF NOT EXISTS "pgcrypto""#;

/// Column type used in `CREATE TABLE`.
pub fn column_type(kind: &FieldType) -> String {
    match kind {
        FieldType::Array(inner) => format!("{}[]", scalar_type(inner)),
        FieldType::Serial => "SERIAL".to_string(),
        other => scalar_type(other).to_string(),
    }
}

/// Type a bound parameter is cast to before it meets the column.
///
/// Fixed-width types cast through their variable-width form so that an
/// oversized value is rejected by the column instead of truncated by the cast.
pub fn cast_type(kind: &FieldType) -> String {
    match kind {
        FieldType::Array(inner) => format!("{}[]", cast_scalar(inner)),
        other => cast_scalar(other).to_string(),
    }
}

fn cast_scalar(kind: &FieldType) -> &'static str {
    match kind {
        FieldType::Serial => "INT",
        FieldType::Char => "TEXT",
        FieldType::Binary => "VARBIT",
        other => scalar_type(other),
    }
}

fn scalar_type(kind: &FieldType) -> &'static str {
    match kind {
        FieldType::Timestamp => "TIMESTAMPTZ",
        FieldType::Date => "DATE",
        FieldType::Time => "TIME",
        FieldType::Interval => "INTERVAL",
        FieldType::Number | FieldType::Serial => "INT",
        FieldType::BigNumber => "BIGINT",
        FieldType::SmallNumber => "SMALLINT",
        FieldType::Double => "FLOAT",
        FieldType::Real => "REAL",
        FieldType::Numeric => "NUMERIC",
        FieldType::Char => "CHAR",
        FieldType::String => "VARCHAR",
        FieldType::Text => "TEXT",
        FieldType::Object => "JSON",
        FieldType::SmartObject => "JSONB",
        FieldType::Binary => "BIT",
        FieldType::Boolean => "BOOLEAN",
        FieldType::Uuid => "UUID",
        FieldType::Box => "BOX",
        FieldType::Line => "LINE",
        FieldType::Point => "POINT",
        FieldType::LineSegment => "LSEG",
        FieldType::Polygon => "POLYGON",
        FieldType::Inet => "INET",
        FieldType::MacAddr => "MACADDR",
        FieldType::Array(_) => "JSONB",
    }
}

/// Cast target for any addressable column, synthetic ones included
pub fn column_cast(schema: &CompiledSchema, column: &str) -> Option<String> {
    match column {
        ID_FIELD => Some("UUID".to_string()),
        CREATED_COLUMN => Some("TIMESTAMPTZ".to_string()),
        _ => schema.field(column).map(|spec| cast_type(&spec.kind)),
    }
}

/// `"<name> <TYPE>"` for every declared field, comma separated
pub fn column_definitions(schema: &CompiledSchema) -> String {
    schema
        .fields()
        .iter()
        .map(|(name, spec)| format!("{} {}", name, column_type(&spec.kind)))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Idempotent table creation for a compiled schema
pub fn create_table(table: &str, schema: &CompiledSchema) -> String {
    let mut columns = vec![
        format!("{} UUID PRIMARY KEY DEFAULT gen_random_uuid()", ID_FIELD),
        format!("{} TIMESTAMPTZ DEFAULT clock_timestamp()", CREATED_COLUMN),
    ];
    let declared = column_definitions(schema);
    if !declared.is_empty() {
        columns.push(declared);
    }
    format!("CREATE TABLE IF NOT EXISTS {} ({})", table, columns.join(", "))
}
