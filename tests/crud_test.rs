//! Integration tests for the basic create/read/update/delete operations.

mod common;

use common::{REGION, create_event, create_location, create_org, create_user, date, setup};
use f3_data_models::DbError;
use f3_data_models::models::{Entity, Event, Fields, Filter, Key, Location, Org, OrgType, Related, Value};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn test_create_then_get_round_trips_every_field() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    let location = create_location(&db, &region, "The Park").await;

    let input = Event {
        org_id: region.id,
        location_id: Some(location.id),
        name: "Bootcamp at The Park".to_string(),
        is_active: true,
        start_date: date(2024, 3, 1),
        start_time: chrono::NaiveTime::from_hms_opt(5, 30, 0),
        day_of_week: Some(4),
        preblast_ts: Some(1709272800.123),
        meta: Some(json!({"source": "test", "tags": [1, 2]})),
        ..Event::default()
    };
    let created = db.create_record(&input).await.unwrap();
    assert!(created.id > 0);
    assert_eq!(created.created, created.updated);

    let fetched: Event = db.get(created.id).await.unwrap();
    assert_eq!(fetched, created);

    let mut expected = input.to_dict();
    expected.insert("id".to_string(), json!(created.id));
    assert_eq!(fetched.to_dict(), expected);
}

#[tokio::test]
async fn test_update_refreshes_updated_only() {
    let db = setup().await;
    let org = create_org(&db, "Example Region 1", REGION, None).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let rows = db
        .update_record::<Org>(
            org.id,
            &Fields::new()
                .set("orgs.name", "Renamed Region")
                .set("website", "https://example.com"),
        )
        .await
        .unwrap();
    assert_eq!(rows, 1);

    let after: Org = db.get(org.id).await.unwrap();
    assert_eq!(after.name, "Renamed Region");
    assert_eq!(after.website.as_deref(), Some("https://example.com"));
    assert_eq!(after.created, org.created);
    assert!(after.updated > org.updated);
}

#[tokio::test]
async fn test_update_records_by_filter() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    create_location(&db, &region, "North").await;
    create_location(&db, &region, "South").await;

    let rows = db
        .update_records::<Location>(
            &[Location::col("org_id").eq(region.id)],
            &Fields::new().set("is_active", false),
        )
        .await
        .unwrap();
    assert_eq!(rows, 2);

    let active = db
        .find_records::<Location>(&[Location::col("is_active").eq(true)])
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn test_update_unknown_column_fails() {
    let db = setup().await;
    let org = create_org(&db, "Example Region 1", REGION, None).await;

    let err = db
        .update_record::<Org>(org.id, &Fields::new().set("nonexistent", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UnknownAttribute { .. }));
}

#[tokio::test]
async fn test_false_filter_returns_empty() {
    let db = setup().await;
    let rows = db.find_records::<OrgType>(&[Filter::never()]).await.unwrap();
    assert!(rows.is_empty());

    let first = db.find_first_record::<OrgType>(&[Filter::never()]).await.unwrap();
    assert!(first.is_none());
}

#[tokio::test]
async fn test_find_first_record_orders_by_key() {
    let db = setup().await;
    let first = db
        .find_first_record::<OrgType>(&[OrgType::col("id").gt(2)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.name, "Area");
}

#[tokio::test]
async fn test_get_missing_row_is_not_found() {
    let db = setup().await;
    let err = db.get::<Org>(999_i64).await.unwrap_err();
    assert!(matches!(err, DbError::NotFound { .. }));
    assert!(err.to_string().contains("orgs"));
}

#[tokio::test]
async fn test_get_with_wrong_key_arity() {
    let db = setup().await;
    let err = db.get::<Org>(Key::from((1, 2))).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidInput { .. }));
}

#[tokio::test]
async fn test_get_unknown_relationship() {
    let db = setup().await;
    let err = db
        .get_loaded::<OrgType>(1, &Related::named(["nonexistent"]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::UnknownAttribute { .. }));
}

#[tokio::test]
async fn test_create_records_returns_generated_ids() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    let events = db
        .create_records(&[
            Event {
                org_id: region.id,
                name: "Run".to_string(),
                start_date: date(2024, 3, 2),
                ..Event::default()
            },
            Event {
                org_id: region.id,
                name: "Ruck".to_string(),
                start_date: date(2024, 3, 3),
                ..Event::default()
            },
        ])
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].id < events[1].id);
    assert!(events.iter().all(|e| e.created == e.updated));
}

#[tokio::test]
async fn test_failed_batch_commits_nothing() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;

    let err = db
        .create_records(&[
            Location {
                org_id: region.id,
                name: "Kept?".to_string(),
                ..Location::default()
            },
            Location {
                org_id: 12345,
                name: "Dangling".to_string(),
                ..Location::default()
            },
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }));

    let locations = db.find_records::<Location>(&[]).await.unwrap();
    assert!(locations.is_empty());
}

#[tokio::test]
async fn test_delete_record() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    let event = create_event(&db, &region, None, "Bootcamp").await;

    assert_eq!(db.delete_record::<Event>(event.id).await.unwrap(), 1);
    assert_eq!(db.delete_record::<Event>(event.id).await.unwrap(), 0);
    assert!(matches!(
        db.get::<Event>(event.id).await,
        Err(DbError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_filters_coerce_text_dates() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    create_event(&db, &region, None, "March").await;

    let found = db
        .find_records::<Event>(&[
            Event::col("start_date").ge("2024-03-01"),
            Event::col("location_id").eq(Value::Null),
        ])
        .await
        .unwrap();
    assert_eq!(found.len(), 1);

    let none = db
        .find_records::<Event>(&[Event::col("start_date").gt("2024-03-01")])
        .await
        .unwrap();
    assert!(none.is_empty());
}

#[tokio::test]
async fn test_returned_records_outlive_the_session() {
    let db = setup().await;
    let user = create_user(&db, "Sasquatch").await;
    db.manager.provider().dispose().await;

    let mut detached = user.clone();
    detached.update(&Fields::new().set("users.f3_name", "Changed")).unwrap();
    let stored: f3_data_models::models::User = db.get(user.id).await.unwrap();
    assert_eq!(stored.f3_name.as_deref(), Some("Sasquatch"));
    assert_eq!(detached.f3_name.as_deref(), Some("Changed"));
}
