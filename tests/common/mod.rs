//! Shared fixtures for integration tests.
//!
//! Each test gets its own migrated SQLite file in a temporary directory.
//! PostgreSQL tests get their own schema on the server named by
//! `TEST_POSTGRES_URL` and are skipped when it is not set.

#![allow(dead_code)]

use chrono::NaiveDate;
use f3_data_models::db::run_migrations;
use f3_data_models::models::{Event, Location, Org, User};
use f3_data_models::{DatabaseSettings, DbManager, SessionProvider};
use std::ops::Deref;
use std::sync::Arc;
use tempfile::TempDir;

/// Org type ids as seeded.
pub const AO: i64 = 1;
pub const REGION: i64 = 2;
pub const AREA: i64 = 3;
pub const SECTOR: i64 = 4;
pub const NATION: i64 = 5;

pub struct TestDb {
    pub manager: DbManager,
    _dir: Option<TempDir>,
    /// Server URL and the schema created for this test.
    postgres: Option<(String, String)>,
}

impl Deref for TestDb {
    type Target = DbManager;

    fn deref(&self) -> &DbManager {
        &self.manager
    }
}

/// Create a migrated, seeded SQLite database.
pub async fn setup() -> TestDb {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite:{}", dir.path().join("f3.db").display());
    let provider = Arc::new(SessionProvider::new(DatabaseSettings::with_url(url)));
    let pool = provider.get_engine().await.unwrap();
    run_migrations(&pool).await.unwrap();

    TestDb {
        manager: DbManager::new(provider),
        _dir: Some(dir),
        postgres: None,
    }
}

/// Create a migrated, seeded schema on the PostgreSQL server named by
/// `TEST_POSTGRES_URL`, or `None` when the variable is not set.
pub async fn setup_postgres() -> Option<TestDb> {
    let server_url = match std::env::var("TEST_POSTGRES_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("Skipping test: TEST_POSTGRES_URL not set");
            return None;
        }
    };

    let schema = format!("f3_test_{}", uuid::Uuid::new_v4().simple());
    let admin = sqlx::PgPool::connect(&server_url).await.unwrap();
    sqlx::query(&format!("CREATE SCHEMA {}", schema))
        .execute(&admin)
        .await
        .unwrap();
    admin.close().await;

    let mut url = url::Url::parse(&server_url).unwrap();
    url.query_pairs_mut()
        .append_pair("options", &format!("-c search_path={}", schema));
    let provider = Arc::new(SessionProvider::new(DatabaseSettings::with_url(url.to_string())));
    let pool = provider.get_engine().await.unwrap();
    run_migrations(&pool).await.unwrap();

    Some(TestDb {
        manager: DbManager::new(provider),
        _dir: None,
        postgres: Some((server_url, schema)),
    })
}

impl TestDb {
    /// Close the pool and drop the test schema, if any.
    pub async fn teardown(self) {
        self.manager.provider().dispose().await;
        if let Some((server_url, schema)) = self.postgres {
            let admin = sqlx::PgPool::connect(&server_url).await.unwrap();
            sqlx::query(&format!("DROP SCHEMA {} CASCADE", schema))
                .execute(&admin)
                .await
                .unwrap();
            admin.close().await;
        }
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub async fn create_org(db: &DbManager, name: &str, org_type_id: i64, parent_id: Option<i64>) -> Org {
    db.create_record(&Org {
        name: name.to_string(),
        org_type_id,
        parent_id,
        is_active: true,
        ..Org::default()
    })
    .await
    .unwrap()
}

pub async fn create_location(db: &DbManager, org: &Org, name: &str) -> Location {
    db.create_record(&Location {
        org_id: org.id,
        name: name.to_string(),
        is_active: true,
        lat: Some(35.2271),
        lon: Some(-80.8431),
        ..Location::default()
    })
    .await
    .unwrap()
}

pub async fn create_event(db: &DbManager, org: &Org, location: Option<&Location>, name: &str) -> Event {
    db.create_record(&Event {
        org_id: org.id,
        location_id: location.map(|l| l.id),
        name: name.to_string(),
        is_active: true,
        start_date: date(2024, 3, 1),
        ..Event::default()
    })
    .await
    .unwrap()
}

pub async fn create_user(db: &DbManager, f3_name: &str) -> User {
    db.create_record(&User {
        f3_name: Some(f3_name.to_string()),
        email: format!("{}@example.com", f3_name.to_lowercase()),
        ..User::default()
    })
    .await
    .unwrap()
}
