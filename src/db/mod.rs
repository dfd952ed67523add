//! Database access layer.
//!
//! This module provides:
//! - Connection pool and session management
//! - SQL statement rendering and parameter binding
//! - Row decoding
//! - The generic access façade and eager relationship loading
//! - Hierarchy traversal
//! - Embedded migrations

#[macro_use]
pub mod macros;
pub mod hierarchy;
pub mod loader;
pub mod manager;
pub mod migrate;
pub mod params;
pub mod pool;
pub mod session;
pub mod sql;
pub mod types;

pub use macros::DatabaseType;
pub use manager::{DbManager, RawQuery};
pub use migrate::run_migrations;
pub use pool::{CloudSqlConnector, DbPool, ManagedConnector, SessionProvider, create_pool};
pub use session::{DbTransaction, Session};
pub use sql::OnConflict;
