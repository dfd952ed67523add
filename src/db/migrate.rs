//! Embedded schema migrations and seed data.

use crate::db::pool::DbPool;
use crate::error::DbResult;
use sqlx::migrate::Migrator;
use tracing::info;

pub static PG_MIGRATOR: Migrator = sqlx::migrate!("./migrations/postgres");
pub static SQLITE_MIGRATOR: Migrator = sqlx::migrate!("./migrations/sqlite");

/// Apply every pending migration for the pool's backend.
pub async fn run_migrations(pool: &DbPool) -> DbResult<()> {
    info!(db_type = %pool.db_type(), "Running migrations");
    impl_db_dispatch!(pool, {
        Postgres(p) => PG_MIGRATOR.run(p).await?,
        SQLite(p) => SQLITE_MIGRATOR.run(p).await?,
    });
    info!("Migrations complete");
    Ok(())
}
