//! Backend identification and dispatch macros.
//!
//! The dispatch macros expand a match over `DbPool` / `DbTransaction`
//! variants at compile time so per-backend code stays side by side.

/// Database backend type for dispatch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum DatabaseType {
    Postgres,
    SQLite,
}

impl DatabaseType {
    /// Detect the backend from a connection URL scheme.
    pub fn from_connection_string(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?.to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Some(Self::Postgres),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Bind placeholder for the `n`th (1-based) parameter.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${}", n),
            Self::SQLite => "?".to_string(),
        }
    }

    /// Expression evaluating to the current UTC timestamp.
    pub fn utc_now(self) -> &'static str {
        match self {
            Self::Postgres => "timezone('utc', now())",
            Self::SQLite => "strftime('%Y-%m-%d %H:%M:%f', 'now')",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgresql"),
            Self::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Macro for generating database dispatch match arms.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Same as [`impl_db_dispatch!`] for an open `DbTransaction`.
#[macro_export]
macro_rules! impl_tx_dispatch {
    ($tx:expr, { $($variant:ident($t:ident) => $body:expr),+ $(,)? }) => {
        match $tx {
            $(
                $crate::db::session::DbTransaction::$variant($t) => $body,
            )+
        }
    };
}

pub use impl_db_dispatch;
pub use impl_tx_dispatch;
