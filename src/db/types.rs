//! Row decoding.
//!
//! Entity rows are decoded column by column into [`Value`]s, guided by the
//! [`ColumnKind`] declared on the entity. Ad-hoc query results have no
//! declared kinds; they go through [`RowToJson`], which classifies each
//! column by its database type name.
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction

use crate::db::DatabaseType;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnKind, Value};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Date,
    Time,
    Timestamp,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") {
        return TypeCategory::Integer;
    }

    // Boolean
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Float types
    if lower.contains("float") || lower.contains("double") || lower == "real" {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // Temporal types; SQLite stores these as text
    if db == DatabaseType::Postgres {
        if lower.starts_with("timestamp") {
            return TypeCategory::Timestamp;
        }
        if lower == "date" {
            return TypeCategory::Date;
        }
        if lower == "time" {
            return TypeCategory::Time;
        }
    }

    // Binary types
    if lower.contains("blob") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Binary Encoding
// =============================================================================

/// Binary column values are rendered as base64 text.
pub fn decode_binary_value(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    JsonValue::String(STANDARD.encode(bytes))
}

fn decode_error(idx: usize, kind: ColumnKind, err: sqlx::Error) -> DbError {
    DbError::internal(format!(
        "Failed to decode column {} as {:?}: {}",
        idx, kind, err
    ))
}

// =============================================================================
// Typed Decoding
// =============================================================================

/// Decode the columns of a row with known kinds.
pub trait DecodeRow {
    fn decode_value(&self, idx: usize, kind: ColumnKind) -> DbResult<Value>;

    fn decode_values(&self, kinds: &[ColumnKind]) -> DbResult<Vec<Value>> {
        kinds
            .iter()
            .enumerate()
            .map(|(idx, kind)| self.decode_value(idx, *kind))
            .collect()
    }
}

impl DecodeRow for PgRow {
    fn decode_value(&self, idx: usize, kind: ColumnKind) -> DbResult<Value> {
        postgres::decode_value(self, idx, kind).map_err(|e| decode_error(idx, kind, e))
    }
}

impl DecodeRow for SqliteRow {
    fn decode_value(&self, idx: usize, kind: ColumnKind) -> DbResult<Value> {
        sqlite::decode_value(self, idx, kind).map_err(|e| decode_error(idx, kind, e))
    }
}

// =============================================================================
// Row to JSON Trait
// =============================================================================

/// Trait for converting database rows to JSON maps.
pub trait RowToJson {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue>;
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let category = categorize_type(col.type_info().name(), DatabaseType::Postgres);
                let value = postgres::decode_column(self, idx, col.type_info().name(), category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                // Expression columns have no declared type; use the stored value's.
                let declared = col.type_info();
                let type_name = if declared.is_null() {
                    self.try_get_raw(idx)
                        .map(|raw| raw.type_info().name().to_string())
                        .unwrap_or_default()
                } else {
                    declared.name().to_string()
                };
                let category = categorize_type(&type_name, DatabaseType::SQLite);
                let value = sqlite::decode_column(self, idx, &type_name, category);
                (col.name().to_string(), value)
            })
            .collect()
    }
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod postgres {
    use super::*;

    pub fn decode_value(row: &PgRow, idx: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
        let type_name = row.column(idx).type_info().name().to_ascii_uppercase();
        let value = match kind {
            ColumnKind::Int => match type_name.as_str() {
                "INT2" => row.try_get::<Option<i16>, _>(idx)?.map(|v| Value::Int(v.into())),
                "INT4" => row.try_get::<Option<i32>, _>(idx)?.map(|v| Value::Int(v.into())),
                _ => row.try_get::<Option<i64>, _>(idx)?.map(Value::Int),
            },
            ColumnKind::Float => match type_name.as_str() {
                "FLOAT4" => row
                    .try_get::<Option<f32>, _>(idx)?
                    .map(|v| Value::Float(v.into())),
                _ => row.try_get::<Option<f64>, _>(idx)?.map(Value::Float),
            },
            ColumnKind::Bool => row.try_get::<Option<bool>, _>(idx)?.map(Value::Bool),
            ColumnKind::Text => row.try_get::<Option<String>, _>(idx)?.map(Value::Text),
            ColumnKind::Date => row.try_get::<Option<NaiveDate>, _>(idx)?.map(Value::Date),
            ColumnKind::Time => row.try_get::<Option<NaiveTime>, _>(idx)?.map(Value::Time),
            ColumnKind::Timestamp => match type_name.as_str() {
                "TIMESTAMPTZ" => row
                    .try_get::<Option<DateTime<Utc>>, _>(idx)?
                    .map(|v| Value::Timestamp(v.naive_utc())),
                _ => row
                    .try_get::<Option<NaiveDateTime>, _>(idx)?
                    .map(Value::Timestamp),
            },
            ColumnKind::Json => row.try_get::<Option<JsonValue>, _>(idx)?.map(Value::Json),
        };
        Ok(value.unwrap_or(Value::Null))
    }

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        let decoded = match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_value(row, idx, ColumnKind::Int).map(|v| v.to_json()),
            TypeCategory::Boolean => decode_value(row, idx, ColumnKind::Bool).map(|v| v.to_json()),
            TypeCategory::Float => decode_value(row, idx, ColumnKind::Float).map(|v| v.to_json()),
            TypeCategory::Json => decode_value(row, idx, ColumnKind::Json).map(|v| v.to_json()),
            TypeCategory::Date => decode_value(row, idx, ColumnKind::Date).map(|v| v.to_json()),
            TypeCategory::Time => decode_value(row, idx, ColumnKind::Time).map(|v| v.to_json()),
            TypeCategory::Timestamp => {
                decode_value(row, idx, ColumnKind::Timestamp).map(|v| v.to_json())
            }
            TypeCategory::Binary => row
                .try_get::<Option<Vec<u8>>, _>(idx)
                .map(|v| v.map(|b| decode_binary_value(&b)).unwrap_or(JsonValue::Null)),
            TypeCategory::Text | TypeCategory::Unknown => {
                decode_value(row, idx, ColumnKind::Text).map(|v| v.to_json())
            }
        };
        decoded.unwrap_or_else(|e| {
            tracing::warn!(column = idx, type_name = %type_name, error = %e, "Failed to decode column");
            JsonValue::Null
        })
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Result<JsonValue, sqlx::Error> {
        Ok(row
            .try_get::<Option<Decimal>, _>(idx)?
            .map(|v| JsonValue::String(v.to_string()))
            .unwrap_or(JsonValue::Null))
    }
}

mod sqlite {
    use super::*;

    pub fn decode_value(
        row: &SqliteRow,
        idx: usize,
        kind: ColumnKind,
    ) -> Result<Value, sqlx::Error> {
        let value = match kind {
            ColumnKind::Int => row.try_get_unchecked::<Option<i64>, _>(idx)?.map(Value::Int),
            ColumnKind::Float => row
                .try_get_unchecked::<Option<f64>, _>(idx)?
                .map(Value::Float),
            ColumnKind::Bool => row
                .try_get_unchecked::<Option<bool>, _>(idx)?
                .map(Value::Bool),
            ColumnKind::Text => row
                .try_get_unchecked::<Option<String>, _>(idx)?
                .map(Value::Text),
            ColumnKind::Date => row
                .try_get_unchecked::<Option<NaiveDate>, _>(idx)?
                .map(Value::Date),
            ColumnKind::Time => row
                .try_get_unchecked::<Option<NaiveTime>, _>(idx)?
                .map(Value::Time),
            ColumnKind::Timestamp => row
                .try_get_unchecked::<Option<NaiveDateTime>, _>(idx)?
                .map(Value::Timestamp),
            // SQLite stores JSON as text
            ColumnKind::Json => row
                .try_get_unchecked::<Option<String>, _>(idx)?
                .map(|s| Value::Json(serde_json::from_str(&s).unwrap_or(JsonValue::String(s)))),
        };
        Ok(value.unwrap_or(Value::Null))
    }

    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> JsonValue {
        let decoded = match category {
            TypeCategory::Integer => decode_value(row, idx, ColumnKind::Int).map(|v| v.to_json()),
            TypeCategory::Boolean => decode_value(row, idx, ColumnKind::Bool).map(|v| v.to_json()),
            TypeCategory::Float | TypeCategory::Decimal => {
                decode_value(row, idx, ColumnKind::Float).map(|v| v.to_json())
            }
            TypeCategory::Binary => row
                .try_get_unchecked::<Option<Vec<u8>>, _>(idx)
                .map(|v| v.map(|b| decode_binary_value(&b)).unwrap_or(JsonValue::Null)),
            _ => decode_text(row, idx, type_name),
        };
        decoded.unwrap_or_else(|e| {
            tracing::warn!(column = idx, type_name = %type_name, error = %e, "Failed to decode column");
            JsonValue::Null
        })
    }

    fn decode_text(row: &SqliteRow, idx: usize, type_name: &str) -> Result<JsonValue, sqlx::Error> {
        let Some(v) = row.try_get_unchecked::<Option<String>, _>(idx)? else {
            return Ok(JsonValue::Null);
        };
        if type_name.to_lowercase().contains("json") {
            if let Ok(json) = serde_json::from_str::<JsonValue>(&v) {
                return Ok(json);
            }
        }
        Ok(JsonValue::String(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categorize_type_integer() {
        assert_eq!(
            categorize_type("INT4", DatabaseType::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("BIGINT", DatabaseType::Postgres),
            TypeCategory::Integer
        );
        assert_eq!(
            categorize_type("INTEGER", DatabaseType::SQLite),
            TypeCategory::Integer
        );
    }

    #[test]
    fn test_categorize_type_decimal() {
        assert_eq!(
            categorize_type("NUMERIC", DatabaseType::Postgres),
            TypeCategory::Decimal
        );
        // SQLite NUMERIC is a float
        assert_eq!(
            categorize_type("numeric", DatabaseType::SQLite),
            TypeCategory::Float
        );
    }

    #[test]
    fn test_categorize_type_temporal() {
        assert_eq!(
            categorize_type("TIMESTAMPTZ", DatabaseType::Postgres),
            TypeCategory::Timestamp
        );
        assert_eq!(
            categorize_type("DATE", DatabaseType::Postgres),
            TypeCategory::Date
        );
        // SQLite keeps temporal values as text
        assert_eq!(
            categorize_type("DATE", DatabaseType::SQLite),
            TypeCategory::Unknown
        );
    }

    #[test]
    fn test_categorize_type_json() {
        assert_eq!(
            categorize_type("jsonb", DatabaseType::Postgres),
            TypeCategory::Json
        );
        assert_eq!(
            categorize_type("VARCHAR", DatabaseType::Postgres),
            TypeCategory::Text
        );
    }

    #[test]
    fn test_decode_binary_value() {
        assert_eq!(
            decode_binary_value(b"hello world"),
            JsonValue::String("aGVsbG8gd29ybGQ=".to_string())
        );
        assert_eq!(
            decode_binary_value(&[0xFF, 0xFE, 0x00, 0x01]),
            JsonValue::String("//4AAQ==".to_string())
        );
    }
}
