//! Parameter binding utilities for database queries.
//!
//! This module binds statement [`Param`]s to backend-specific query objects.
//! NULLs are bound with the SQL type of the column they target so PostgreSQL
//! can resolve operators and implicit casts.

use crate::db::sql::Param;
use crate::models::{ColumnKind, Value};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{Postgres, Sqlite};

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q Param,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match &param.value {
        Value::Null => bind_postgres_null(query, param.kind),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        Value::Json(v) => query.bind(Json(v)),
    }
}

fn bind_postgres_null<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    kind: Option<ColumnKind>,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match kind {
        Some(ColumnKind::Int) => query.bind(None::<i64>),
        Some(ColumnKind::Float) => query.bind(None::<f64>),
        Some(ColumnKind::Bool) => query.bind(None::<bool>),
        Some(ColumnKind::Date) => query.bind(None::<NaiveDate>),
        Some(ColumnKind::Time) => query.bind(None::<NaiveTime>),
        Some(ColumnKind::Timestamp) => query.bind(None::<NaiveDateTime>),
        Some(ColumnKind::Json) => query.bind(None::<Json<JsonValue>>),
        Some(ColumnKind::Text) | None => query.bind(None::<String>),
    }
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q Param,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match &param.value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Date(v) => query.bind(*v),
        Value::Time(v) => query.bind(*v),
        Value::Timestamp(v) => query.bind(*v),
        // SQLite doesn't have native JSON type, store as string
        Value::Json(v) => query.bind(v.to_string()),
    }
}
