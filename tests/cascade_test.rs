//! Integration tests for deletes and the cascades hanging off events.

mod common;

use common::{REGION, create_event, create_org, create_user, date, setup};
use f3_data_models::models::{
    Attendance, AttendanceXAttendanceType, Entity, Event, EventTagXEvent, EventXEventType, Filter,
    Org, Related,
};

struct Series {
    series: Event,
    instances: Vec<Event>,
}

async fn create_series(db: &f3_data_models::DbManager, org: &Org) -> Series {
    let series = db
        .create_record(&Event {
            org_id: org.id,
            name: "Weekly Bootcamp".to_string(),
            is_series: true,
            is_active: true,
            start_date: date(2024, 3, 4),
            day_of_week: Some(0),
            recurrence_pattern: Some("weekly".to_string()),
            recurrence_interval: Some(1),
            ..Event::default()
        })
        .await
        .unwrap();

    let instances = db
        .create_records(&[
            Event {
                org_id: org.id,
                series_id: Some(series.id),
                name: "Weekly Bootcamp".to_string(),
                is_active: true,
                start_date: date(2024, 3, 4),
                ..Event::default()
            },
            Event {
                org_id: org.id,
                series_id: Some(series.id),
                name: "Weekly Bootcamp".to_string(),
                is_active: true,
                start_date: date(2024, 3, 11),
                ..Event::default()
            },
        ])
        .await
        .unwrap();

    Series { series, instances }
}

#[tokio::test]
async fn test_deleting_a_series_removes_instances_and_links() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    let Series { series, instances } = create_series(&db, &region).await;
    let user = create_user(&db, "Sasquatch").await;

    let attendance = db
        .create_record(&Attendance {
            event_id: instances[0].id,
            user_id: user.id,
            is_planned: true,
            ..Attendance::default()
        })
        .await
        .unwrap();
    db.create_record(&AttendanceXAttendanceType {
        attendance_id: attendance.id,
        attendance_type_id: 2,
    })
    .await
    .unwrap();
    db.create_records(&[
        EventTagXEvent {
            event_id: series.id,
            event_tag_id: 1,
        },
        EventTagXEvent {
            event_id: instances[1].id,
            event_tag_id: 2,
        },
    ])
    .await
    .unwrap();
    db.create_record(&EventXEventType {
        event_id: instances[0].id,
        event_type_id: 1,
    })
    .await
    .unwrap();

    assert_eq!(db.delete_record::<Event>(series.id).await.unwrap(), 1);

    assert!(db.find_records::<Event>(&[]).await.unwrap().is_empty());
    assert!(db.find_records::<Attendance>(&[]).await.unwrap().is_empty());
    assert!(
        db.find_records::<AttendanceXAttendanceType>(&[])
            .await
            .unwrap()
            .is_empty()
    );
    assert!(db.find_records::<EventTagXEvent>(&[]).await.unwrap().is_empty());
    assert!(db.find_records::<EventXEventType>(&[]).await.unwrap().is_empty());

    // Neither the org nor the user belongs to the series.
    assert!(db.find_first_record::<Org>(&[]).await.unwrap().is_some());
    assert_eq!(db.get::<f3_data_models::models::User>(user.id).await.unwrap(), user);
}

#[tokio::test]
async fn test_delete_records_returns_loaded_rows() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    let Series { series, instances } = create_series(&db, &region).await;
    create_event(&db, &region, None, "Convergence").await;

    let deleted = db
        .delete_records::<Event>(
            &[Event::col("id").eq(series.id)],
            &Related::named(["instances"]),
        )
        .await
        .unwrap();

    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].id, series.id);
    let loaded: Vec<Event> = deleted[0].related("instances").unwrap();
    assert_eq!(loaded, instances);

    let remaining = db.find_records::<Event>(&[]).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].name, "Convergence");
}

#[tokio::test]
async fn test_delete_records_by_filter() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    create_event(&db, &region, None, "Bootcamp").await;
    create_event(&db, &region, None, "Ruck").await;
    create_event(&db, &region, None, "Run").await;

    let deleted = db
        .delete_records::<Event>(&[Event::col("name").like("R%")], &Related::None)
        .await
        .unwrap();
    let mut names: Vec<String> = deleted.into_iter().map(|e| e.into_inner().name).collect();
    names.sort();
    assert_eq!(names, vec!["Ruck", "Run"]);

    let remaining = db.find_records::<Event>(&[]).await.unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_delete_missing_row_affects_nothing() {
    let db = setup().await;
    assert_eq!(db.delete_record::<Event>(12345_i64).await.unwrap(), 0);
    assert!(
        db.delete_records::<Event>(&[Filter::never()], &Related::All)
            .await
            .unwrap()
            .is_empty()
    );
}
