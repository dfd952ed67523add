//! Transactional sessions.
//!
//! A [`Session`] owns one pooled connection with an open transaction. It is
//! created by [`SessionProvider::get_session`] and consumed by either
//! [`Session::commit`] or [`Session::rollback`]; dropping it rolls back.
//!
//! [`SessionProvider::get_session`]: crate::db::SessionProvider::get_session

use crate::db::DatabaseType;
use crate::db::params::{bind_postgres_param, bind_sqlite_param};
use crate::db::sql::{Param, Statement};
use crate::db::types::{DecodeRow, RowToJson};
use crate::error::{DbError, DbResult};
use crate::models::{ColumnKind, Value};
use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use sqlx::{Postgres, Sqlite, Transaction};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use uuid::Uuid;

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    Postgres(Transaction<'static, Postgres>),
    SQLite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Get the database type for this transaction.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbTransaction::Postgres(_) => DatabaseType::Postgres,
            DbTransaction::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        impl_tx_dispatch!(self, {
            Postgres(tx) => tx.commit().await.map_err(DbError::from),
            SQLite(tx) => sqlite::commit(tx).await,
        })
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        impl_tx_dispatch!(self, {
            Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            SQLite(tx) => sqlite::rollback(tx).await,
        })
    }
}

/// One unit of work against the store.
pub struct Session {
    id: Uuid,
    tx: DbTransaction,
    echo: bool,
    started: Instant,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("db_type", &self.tx.db_type())
            .field("echo", &self.echo)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub(crate) fn new(tx: DbTransaction, echo: bool) -> Self {
        let session = Self {
            id: Uuid::new_v4(),
            tx,
            echo,
            started: Instant::now(),
        };
        debug!(session_id = %session.id, db_type = %session.db_type(), "Session opened");
        session
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn db_type(&self) -> DatabaseType {
        self.tx.db_type()
    }

    fn log_statement(&self, sql: &str, params: usize) {
        if self.echo {
            info!(session_id = %self.id, sql = %sql, params, "SQL");
        } else {
            debug!(session_id = %self.id, sql = %sql, params, "SQL");
        }
    }

    /// Cap how long statements in this session may run.
    ///
    /// PostgreSQL gets a transaction-scoped `statement_timeout`; SQLite gets a
    /// progress handler that interrupts the running statement once the
    /// deadline has passed. Either way the server stops working on a
    /// statement whose caller has given up.
    pub async fn set_statement_timeout(&mut self, timeout: Duration) -> DbResult<()> {
        let timeout_ms = timeout.as_millis().max(1) as u64;
        impl_tx_dispatch!(&mut self.tx, {
            Postgres(tx) => postgres::set_statement_timeout(tx, timeout_ms).await?,
            SQLite(tx) => sqlite::set_statement_timeout(tx, timeout).await?,
        });
        debug!(session_id = %self.id, timeout_ms, "Statement timeout set");
        Ok(())
    }

    /// Run a row-returning statement and decode each row with `kinds`.
    pub async fn fetch(
        &mut self,
        stmt: &Statement,
        kinds: &[ColumnKind],
    ) -> DbResult<Vec<Vec<Value>>> {
        self.log_statement(&stmt.sql, stmt.params.len());
        let rows = impl_tx_dispatch!(&mut self.tx, {
            Postgres(tx) => postgres::fetch(tx, stmt, kinds).await?,
            SQLite(tx) => sqlite::fetch(tx, stmt, kinds).await?,
        });
        debug!(session_id = %self.id, rows = rows.len(), "Fetched rows");
        Ok(rows)
    }

    /// Run a statement and return the number of affected rows.
    pub async fn execute(&mut self, stmt: &Statement) -> DbResult<u64> {
        self.log_statement(&stmt.sql, stmt.params.len());
        let rows_affected = impl_tx_dispatch!(&mut self.tx, {
            Postgres(tx) => postgres::execute(tx, stmt).await?,
            SQLite(tx) => sqlite::execute(tx, stmt).await?,
        });
        debug!(session_id = %self.id, rows_affected, "Executed statement");
        Ok(rows_affected)
    }

    /// Run arbitrary SQL and return rows as JSON maps.
    pub async fn fetch_json(
        &mut self,
        sql: &str,
        params: &[Value],
    ) -> DbResult<Vec<serde_json::Map<String, JsonValue>>> {
        let stmt = Statement {
            sql: sql.to_string(),
            params: params
                .iter()
                .cloned()
                .map(|value| Param { value, kind: None })
                .collect(),
        };
        self.log_statement(&stmt.sql, stmt.params.len());
        impl_tx_dispatch!(&mut self.tx, {
            Postgres(tx) => postgres::fetch_json(tx, &stmt).await,
            SQLite(tx) => sqlite::fetch_json(tx, &stmt).await,
        })
    }

    pub async fn commit(self) -> DbResult<()> {
        let (id, elapsed) = (self.id, self.started.elapsed());
        self.tx.commit().await?;
        debug!(session_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Session committed");
        Ok(())
    }

    pub async fn rollback(self) -> DbResult<()> {
        let (id, elapsed) = (self.id, self.started.elapsed());
        self.tx.rollback().await?;
        debug!(session_id = %id, elapsed_ms = elapsed.as_millis() as u64, "Session rolled back");
        Ok(())
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================

mod postgres {
    use super::*;
    use sqlx::postgres::PgRow;

    pub async fn set_statement_timeout(
        tx: &mut Transaction<'static, Postgres>,
        timeout_ms: u64,
    ) -> DbResult<()> {
        // SET does not take bind parameters.
        let sql = format!("SET LOCAL statement_timeout = {}", timeout_ms);
        sqlx::query(&sql).execute(&mut **tx).await?;
        Ok(())
    }

    pub async fn fetch(
        tx: &mut Transaction<'static, Postgres>,
        stmt: &Statement,
        kinds: &[ColumnKind],
    ) -> DbResult<Vec<Vec<Value>>> {
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_postgres_param(query, param);
        }
        let rows: Vec<PgRow> = query.fetch(&mut **tx).try_collect().await?;
        rows.iter().map(|row| row.decode_values(kinds)).collect()
    }

    pub async fn execute(
        tx: &mut Transaction<'static, Postgres>,
        stmt: &Statement,
    ) -> DbResult<u64> {
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_postgres_param(query, param);
        }
        Ok(query.execute(&mut **tx).await?.rows_affected())
    }

    pub async fn fetch_json(
        tx: &mut Transaction<'static, Postgres>,
        stmt: &Statement,
    ) -> DbResult<Vec<serde_json::Map<String, JsonValue>>> {
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_postgres_param(query, param);
        }
        let rows: Vec<PgRow> = query.fetch(&mut **tx).try_collect().await?;
        Ok(rows.iter().map(|r| r.to_json_map()).collect())
    }
}

mod sqlite {
    use super::*;
    use sqlx::sqlite::SqliteRow;

    /// VM instructions between deadline checks.
    const PROGRESS_INTERVAL: i32 = 1_000;

    pub async fn set_statement_timeout(
        tx: &mut Transaction<'static, Sqlite>,
        timeout: Duration,
    ) -> DbResult<()> {
        let deadline = Instant::now() + timeout;
        tx.lock_handle()
            .await?
            .set_progress_handler(PROGRESS_INTERVAL, move || Instant::now() < deadline);
        Ok(())
    }

    /// The deadline must not interrupt COMMIT or ROLLBACK.
    async fn clear_statement_timeout(tx: &mut Transaction<'static, Sqlite>) -> DbResult<()> {
        tx.lock_handle().await?.remove_progress_handler();
        Ok(())
    }

    pub async fn commit(mut tx: Transaction<'static, Sqlite>) -> DbResult<()> {
        clear_statement_timeout(&mut tx).await?;
        tx.commit().await.map_err(DbError::from)
    }

    pub async fn rollback(mut tx: Transaction<'static, Sqlite>) -> DbResult<()> {
        clear_statement_timeout(&mut tx).await?;
        tx.rollback().await.map_err(DbError::from)
    }

    pub async fn fetch(
        tx: &mut Transaction<'static, Sqlite>,
        stmt: &Statement,
        kinds: &[ColumnKind],
    ) -> DbResult<Vec<Vec<Value>>> {
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_sqlite_param(query, param);
        }
        let rows: Vec<SqliteRow> = query.fetch(&mut **tx).try_collect().await?;
        rows.iter().map(|row| row.decode_values(kinds)).collect()
    }

    pub async fn execute(tx: &mut Transaction<'static, Sqlite>, stmt: &Statement) -> DbResult<u64> {
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_sqlite_param(query, param);
        }
        Ok(query.execute(&mut **tx).await?.rows_affected())
    }

    pub async fn fetch_json(
        tx: &mut Transaction<'static, Sqlite>,
        stmt: &Statement,
    ) -> DbResult<Vec<serde_json::Map<String, JsonValue>>> {
        let mut query = sqlx::query(&stmt.sql);
        for param in &stmt.params {
            query = bind_sqlite_param(query, param);
        }
        let rows: Vec<SqliteRow> = query.fetch(&mut **tx).try_collect().await?;
        Ok(rows.iter().map(|r| r.to_json_map()).collect())
    }
}
