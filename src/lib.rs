//! F3 data models.
//!
//! This library defines the F3 relational data model (orgs, locations,
//! events, users, attendance, achievements, roles and positions) and a
//! generic data-access layer over PostgreSQL or SQLite.

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::DatabaseSettings;
pub use db::{DbManager, RawQuery, SessionProvider};
pub use error::{DbError, DbResult};
