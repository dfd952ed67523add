//! Configuration handling for the F3 data layer.
//!
//! Connection settings come from environment variables (optionally loaded from
//! a `.env` file by the binary) and can be overridden on the command line.

use crate::db::DatabaseType;
use crate::error::{DbError, DbResult};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::time::Duration;
use url::Url;

pub const DEFAULT_POSTGRES_PORT: u16 = 5432;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CLOUD_SQL_SOCKET_DIR: &str = "/cloudsql";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 1;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection pool configuration options.
#[derive(Debug, Clone, Default, PartialEq, clap::Args, serde::Serialize, serde::Deserialize)]
pub struct PoolOptions {
    /// Maximum connections in pool (default: 10 for PostgreSQL, 1 for SQLite)
    #[arg(long = "max-connections", env = "DB_MAX_CONNECTIONS")]
    pub max_connections: Option<u32>,
    /// Minimum connections in pool (default: 1)
    #[arg(long = "min-connections", env = "DB_MIN_CONNECTIONS")]
    pub min_connections: Option<u32>,
    /// Idle timeout in seconds (default: 600)
    #[arg(long = "idle-timeout", env = "DB_IDLE_TIMEOUT")]
    pub idle_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    #[arg(long = "acquire-timeout", env = "DB_ACQUIRE_TIMEOUT")]
    pub acquire_timeout_secs: Option<u64>,
}

impl PoolOptions {
    /// Get max_connections with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    /// Get min_connections with default value.
    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    /// Get idle_timeout with default value.
    pub fn idle_timeout_or_default(&self) -> u64 {
        self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS)
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> u64 {
        self.acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS)
    }

    /// Validate pool options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
        }
        if let Some(min) = self.min_connections {
            if min == 0 {
                return Err("min_connections must be greater than 0".to_string());
            }
            if let Some(max) = self.max_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Database connection settings.
///
/// The four `DATABASE_*` values are required unless `DATABASE_URL` is given.
/// `USE_GCP` and `SQL_ECHO` default to false and accept any of
/// `true/false/yes/no/1/0` in any case.
#[derive(Debug, Clone, PartialEq, Parser)]
pub struct DatabaseSettings {
    /// Full connection URL (postgres://... or sqlite:...); overrides the DATABASE_* parts
    #[arg(long = "database-url", env = "DATABASE_URL")]
    pub url: Option<String>,

    /// Database host, or the Cloud SQL instance connection name when USE_GCP is set
    #[arg(long = "database-host", env = "DATABASE_HOST")]
    pub host: Option<String>,

    #[arg(long = "database-user", env = "DATABASE_USER")]
    pub user: Option<String>,

    #[arg(long = "database-password", env = "DATABASE_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Database (schema) name
    #[arg(long = "database-schema", env = "DATABASE_SCHEMA")]
    pub schema: Option<String>,

    /// Connect through the managed Cloud SQL connector instead of direct TCP
    #[arg(
        long = "use-gcp",
        env = "USE_GCP",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub use_gcp: bool,

    /// Socket directory of the Cloud SQL Auth Proxy
    #[arg(
        long = "cloud-sql-socket-dir",
        env = "CLOUD_SQL_SOCKET_DIR",
        default_value = DEFAULT_CLOUD_SQL_SOCKET_DIR
    )]
    pub socket_dir: String,

    /// Echo every SQL statement to the log
    #[arg(
        long = "sql-echo",
        env = "SQL_ECHO",
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new(),
        num_args = 0..=1,
        default_value = "false",
        default_missing_value = "true"
    )]
    pub echo: bool,

    /// Per-operation timeout in seconds
    #[arg(
        long = "query-timeout",
        env = "DB_QUERY_TIMEOUT",
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS
    )]
    pub query_timeout: u64,

    #[command(flatten)]
    pub pool: PoolOptions,
}

impl DatabaseSettings {
    /// Read settings from the environment only.
    pub fn from_env() -> DbResult<Self> {
        Self::try_parse_from(["f3-data"]).map_err(|e| DbError::configuration(e.to_string()))
    }

    /// Settings for an explicit connection URL (e.g. `sqlite:/tmp/f3.db`).
    pub fn with_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Which backend these settings select.
    pub fn database_type(&self) -> DbResult<DatabaseType> {
        match &self.url {
            Some(url) => DatabaseType::from_connection_string(url).ok_or_else(|| {
                DbError::configuration(format!(
                    "Unsupported DATABASE_URL scheme: {}",
                    url.split(':').next().unwrap_or_default()
                ))
            }),
            None => Ok(DatabaseType::Postgres),
        }
    }

    /// Return a required component, failing with the variable that is missing.
    pub(crate) fn require<'a>(value: &'a Option<String>, var: &str) -> DbResult<&'a str> {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DbError::configuration(format!("{var} is not set")))
    }

    /// Direct TCP connection URL built from the DATABASE_* parts.
    pub fn direct_url(&self) -> DbResult<String> {
        if let Some(url) = &self.url {
            return Ok(url.clone());
        }
        let host = Self::require(&self.host, "DATABASE_HOST")?;
        let user = Self::require(&self.user, "DATABASE_USER")?;
        let password = Self::require(&self.password, "DATABASE_PASSWORD")?;
        let schema = Self::require(&self.schema, "DATABASE_SCHEMA")?;

        let mut url = Url::parse(&format!("postgresql://{host}:{DEFAULT_POSTGRES_PORT}"))
            .map_err(|e| DbError::configuration(format!("Invalid DATABASE_HOST: {e}")))?;
        url.set_username(user)
            .map_err(|_| DbError::configuration("Invalid DATABASE_USER"))?;
        url.set_password(Some(password))
            .map_err(|_| DbError::configuration("Invalid DATABASE_PASSWORD"))?;
        url.set_path(&format!("/{schema}"));
        Ok(url.to_string())
    }

    /// Connection URL with the password masked, for logging.
    pub fn redacted_url(&self) -> String {
        match self.direct_url() {
            Ok(raw) => match Url::parse(&raw) {
                Ok(mut url) if url.password().is_some() => {
                    let _ = url.set_password(Some("****"));
                    url.to_string()
                }
                _ => raw,
            },
            Err(_) => "<incomplete>".to_string(),
        }
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout)
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            user: None,
            password: None,
            schema: None,
            use_gcp: false,
            socket_dir: DEFAULT_CLOUD_SQL_SOCKET_DIR.to_string(),
            echo: false,
            query_timeout: DEFAULT_QUERY_TIMEOUT_SECS,
            pool: PoolOptions::default(),
        }
    }
}
