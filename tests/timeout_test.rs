//! Integration tests for the per-operation timeout.

mod common;

use common::setup;
use f3_data_models::models::OrgType;
use f3_data_models::{DbError, RawQuery};
use std::time::{Duration, Instant};

/// Counts to 300 million; minutes of work if nothing stops it.
const LONG_COUNT: &str = "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 300000000) \
                          SELECT count(*) AS n FROM c";

#[tokio::test]
async fn test_slow_query_times_out_near_the_limit() {
    let db = setup().await;
    let bounded = db.manager.clone().with_timeout(Duration::from_millis(200));

    let start = Instant::now();
    let err = bounded
        .execute_sql_query(&RawQuery::new(LONG_COUNT))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, DbError::Timeout { limit_ms: 200, .. }), "{err:?}");
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[tokio::test]
async fn test_connection_is_usable_after_a_timeout() {
    let db = setup().await;
    let bounded = db.manager.clone().with_timeout(Duration::from_millis(200));

    let err = bounded
        .execute_sql_query(&RawQuery::new(LONG_COUNT))
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    // The SQLite pool has a single connection, so this reuses it.
    let start = Instant::now();
    let org_types = bounded.find_records::<OrgType>(&[]).await.unwrap();
    assert_eq!(org_types.len(), 5);
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_fast_work_is_unaffected_by_a_short_limit() {
    let db = setup().await;
    let bounded = db.manager.clone().with_timeout(Duration::from_millis(500));

    let rows = bounded
        .execute_sql_query(&RawQuery::new(
            "WITH RECURSIVE c(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM c WHERE x < 1000) \
             SELECT count(*) AS n FROM c",
        ))
        .await
        .unwrap();
    assert_eq!(rows[0].get("n"), Some(&serde_json::json!(1000)));
}
