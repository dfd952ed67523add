//! Error types for the F3 data layer.
//!
//! This module defines all error types using `thiserror`. Each variant carries
//! enough context (table, column, key) for a caller to report the failure
//! without inspecting the underlying driver error.

use std::time::Duration;
use thiserror::Error;

/// SQLSTATE for a statement cancelled by `statement_timeout`.
const PG_QUERY_CANCELED: &str = "57014";
/// SQLITE_INTERRUPT, raised when the progress handler aborts a statement.
const SQLITE_INTERRUPT: &str = "9";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "23503" for a foreign key violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("No row in '{table}' matches key {key}")]
    NotFound { table: String, key: String },

    #[error("More than one row in '{table}' matches key {key}")]
    MultipleRows { table: String, key: String },

    #[error("Conflict: {message}")]
    Conflict {
        message: String,
        sql_state: Option<String>,
    },

    #[error("'{table}' has no attribute '{attribute}'")]
    UnknownAttribute { table: String, attribute: String },

    #[error("Invalid value for '{table}.{column}': {reason}")]
    InvalidValue {
        table: String,
        column: String,
        reason: String,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Timeout: {operation} exceeded {limit_ms}ms")]
    Timeout { operation: String, limit_ms: u64 },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Hierarchy cycle in '{table}' at id {id}")]
    HierarchyCycle { table: String, id: i64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn not_found(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            table: table.into(),
            key: key.into(),
        }
    }

    pub fn multiple_rows(table: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MultipleRows {
            table: table.into(),
            key: key.into(),
        }
    }

    /// Create a uniqueness conflict error.
    pub fn conflict(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Conflict {
            message: message.into(),
            sql_state,
        }
    }

    pub fn unknown_attribute(table: impl Into<String>, attribute: impl Into<String>) -> Self {
        Self::UnknownAttribute {
            table: table.into(),
            attribute: attribute.into(),
        }
    }

    pub fn invalid_value(
        table: impl Into<String>,
        column: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidValue {
            table: table.into(),
            column: column.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a timeout error for an operation that ran past `limit`.
    pub fn timeout(operation: impl Into<String>, limit: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit_ms: limit.as_millis() as u64,
        }
    }

    pub fn migration(message: impl Into<String>) -> Self {
        Self::Migration {
            message: message.into(),
        }
    }

    pub fn hierarchy_cycle(table: impl Into<String>, id: i64) -> Self {
        Self::HierarchyCycle {
            table: table.into(),
            id,
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Configuration { .. } => {
                Some("Set DATABASE_HOST, DATABASE_USER, DATABASE_PASSWORD and DATABASE_SCHEMA")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// True when the server aborted a statement because its deadline passed.
    pub fn is_statement_cancelled(&self) -> bool {
        match self {
            Self::Database {
                sql_state: Some(code),
                ..
            } => code == PG_QUERY_CANCELED || code == SQLITE_INTERRUPT,
            _ => false,
        }
    }

    /// True for uniqueness and primary-key violations.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                if db_err.is_unique_violation() {
                    return DbError::conflict(db_err.message(), code);
                }
                let suggestion = if db_err.is_foreign_key_violation() {
                    "Referenced row does not exist or is still referenced"
                } else if db_err.is_check_violation() {
                    "Value violates a check constraint"
                } else {
                    "Check the SQL syntax and referenced objects"
                };
                DbError::database(db_err.message(), code, suggestion)
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            // Callers that know the configured acquire timeout report it as a Timeout.
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out acquiring a pooled connection",
                "Raise DB_ACQUIRE_TIMEOUT or DB_MAX_CONNECTIONS",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found in result: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::Migrate(err) => DbError::migration(err.to_string()),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        match err {
            sqlx::migrate::MigrateError::Execute(inner) => {
                DbError::migration(format!("migration statement failed: {}", inner))
            }
            other => DbError::migration(other.to_string()),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
