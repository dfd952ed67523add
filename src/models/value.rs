//! Column values and their conversions.
//!
//! `Value` is the dynamically-typed cell that flows between entities, filters
//! and the SQL layer. `FieldValue` connects it to the concrete Rust field types
//! used in entity structs.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;
use std::fmt;

/// Formats accepted when coercing text into temporal values.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];
const TIME_FORMATS: &[&str] = &["%H:%M:%S%.f", "%H:%M"];

/// A single column value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
    Json(JsonValue),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Short type label used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
            Value::Time(_) => "time",
            Value::Timestamp(_) => "timestamp",
            Value::Json(_) => "json",
        }
    }

    /// JSON rendering. Temporal values use ISO-8601 text.
    pub fn to_json(&self) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Bool(v) => JsonValue::Bool(*v),
            Value::Int(v) => JsonValue::Number((*v).into()),
            Value::Float(v) => serde_json::Number::from_f64(*v)
                .map(JsonValue::Number)
                .unwrap_or_else(|| JsonValue::String(v.to_string())),
            Value::Text(v) => JsonValue::String(v.clone()),
            Value::Date(v) => JsonValue::String(v.format("%Y-%m-%d").to_string()),
            Value::Time(v) => JsonValue::String(v.format("%H:%M:%S%.f").to_string()),
            Value::Timestamp(v) => JsonValue::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string()),
            Value::Json(v) => v.clone(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Text(v) => write!(f, "'{}'", v),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )+
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    i64 => Int,
    f64 => Float,
    String => Text,
    &str => Text,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => Timestamp,
    JsonValue => Json,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Storage kind of a column. Drives coercion and typed binding of NULLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Int,
    Float,
    Bool,
    Text,
    Date,
    Time,
    Timestamp,
    Json,
}

impl ColumnKind {
    /// Convert `value` into this kind, accepting lossless and textual forms.
    pub fn coerce(self, value: Value) -> Result<Value, String> {
        let mismatch = |v: &Value| format!("expected {:?}, got {}", self, v.type_name());
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ColumnKind::Json, Value::Json(v)) => Ok(Value::Json(v)),
            (ColumnKind::Json, other) => Ok(Value::Json(other.to_json())),
            (ColumnKind::Int, Value::Int(v)) => Ok(Value::Int(v)),
            (ColumnKind::Int, Value::Bool(v)) => Ok(Value::Int(v as i64)),
            (ColumnKind::Float, Value::Float(v)) => Ok(Value::Float(v)),
            (ColumnKind::Float, Value::Int(v)) => Ok(Value::Float(v as f64)),
            (ColumnKind::Bool, Value::Bool(v)) => Ok(Value::Bool(v)),
            (ColumnKind::Bool, Value::Int(v @ (0 | 1))) => Ok(Value::Bool(v == 1)),
            (ColumnKind::Text, Value::Text(v)) => Ok(Value::Text(v)),
            (ColumnKind::Date, Value::Date(v)) => Ok(Value::Date(v)),
            (ColumnKind::Date, Value::Timestamp(v)) => Ok(Value::Date(v.date())),
            (ColumnKind::Date, Value::Text(s)) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|e| format!("invalid date '{}': {}", s, e)),
            (ColumnKind::Time, Value::Time(v)) => Ok(Value::Time(v)),
            (ColumnKind::Time, Value::Text(s)) => parse_time(&s)
                .map(Value::Time)
                .ok_or_else(|| format!("invalid time '{}'", s)),
            (ColumnKind::Timestamp, Value::Timestamp(v)) => Ok(Value::Timestamp(v)),
            (ColumnKind::Timestamp, Value::Date(v)) => {
                Ok(Value::Timestamp(v.and_time(NaiveTime::MIN)))
            }
            (ColumnKind::Timestamp, Value::Text(s)) => parse_datetime(&s)
                .map(Value::Timestamp)
                .ok_or_else(|| format!("invalid timestamp '{}'", s)),
            (_, other) => Err(mismatch(&other)),
        }
    }
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(s, fmt).ok())
}

fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

/// A Rust type that can be stored in an entity column.
pub trait FieldValue: Sized {
    const KIND: ColumnKind;
    const NULLABLE: bool = false;

    fn to_value(&self) -> Value;
    fn from_value(value: Value) -> Result<Self, String>;
}

macro_rules! field_value {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl FieldValue for $ty {
            const KIND: ColumnKind = ColumnKind::$kind;

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, String> {
                match ColumnKind::$kind.coerce(value)? {
                    Value::$variant(v) => Ok(v),
                    Value::Null => Err("unexpected NULL".to_string()),
                    other => Err(format!("unexpected {}", other.type_name())),
                }
            }
        }
    };
}

field_value!(i64, Int, Int);
field_value!(f64, Float, Float);
field_value!(bool, Bool, Bool);
field_value!(String, Text, Text);
field_value!(NaiveDate, Date, Date);
field_value!(NaiveTime, Time, Time);
field_value!(NaiveDateTime, Timestamp, Timestamp);
field_value!(JsonValue, Json, Json);

impl<T: FieldValue> FieldValue for Option<T> {
    const KIND: ColumnKind = T::KIND;
    const NULLABLE: bool = true;

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(None),
            // JSON null in a nullable JSON column reads back as absent.
            Value::Json(JsonValue::Null) => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Primary-key value, one entry per key column.
#[derive(Debug, Clone, PartialEq)]
pub struct Key(pub Vec<Value>);

impl Key {
    pub fn values(&self) -> &[Value] {
        &self.0
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Self {
        Key(vec![Value::Int(v)])
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Self {
        Key(vec![Value::Text(v.to_string())])
    }
}

impl From<String> for Key {
    fn from(v: String) -> Self {
        Key(vec![Value::Text(v)])
    }
}

impl From<(i64, i64)> for Key {
    fn from((a, b): (i64, i64)) -> Self {
        Key(vec![Value::Int(a), Value::Int(b)])
    }
}

impl From<(i64, i64, i64)> for Key {
    fn from((a, b, c): (i64, i64, i64)) -> Self {
        Key(vec![Value::Int(a), Value::Int(b), Value::Int(c)])
    }
}

impl From<(i64, &str)> for Key {
    fn from((a, b): (i64, &str)) -> Self {
        Key(vec![Value::Int(a), Value::Text(b.to_string())])
    }
}

/// Ordered column assignments for updates.
///
/// Names may be qualified (`"events.name"`); the qualifier is ignored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fields(Vec<(String, Value)>);

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assignment, builder style.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.push((name.into(), value.into()));
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.push((name.into(), value.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Fields(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Strip a `table.` qualifier from an attribute name.
pub fn strip_qualifier(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}
