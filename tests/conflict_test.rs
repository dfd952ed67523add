//! Integration tests for the two conflict policies and uniqueness errors.

mod common;

use common::{REGION, create_event, create_location, create_org, create_user, setup};
use f3_data_models::DbError;
use f3_data_models::models::{
    Attendance, EventTagXEvent, OrgType, OrgXSlack, SlackSpace, User,
};
use serde_json::json;

#[tokio::test]
async fn test_create_or_ignore_keeps_existing_row() {
    let db = setup().await;
    let before: OrgType = db.get(1_i64).await.unwrap();

    let inserted = db
        .create_or_ignore(&[
            OrgType {
                id: 1,
                name: "Changed".to_string(),
                description: Some("should not land".to_string()),
                ..OrgType::default()
            },
            OrgType {
                id: 42,
                name: "Brand New".to_string(),
                ..OrgType::default()
            },
        ])
        .await
        .unwrap();
    assert_eq!(inserted, 1);

    let after: OrgType = db.get(1_i64).await.unwrap();
    assert_eq!(after, before);
    let added: OrgType = db.get(42_i64).await.unwrap();
    assert_eq!(added.name, "Brand New");
}

#[tokio::test]
async fn test_upsert_overwrites_every_column() {
    let db = setup().await;
    let before: OrgType = db.get(1_i64).await.unwrap();

    let stored = db
        .upsert_records(&[OrgType {
            id: 1,
            name: "Changed".to_string(),
            description: Some("replaced".to_string()),
            ..OrgType::default()
        }])
        .await
        .unwrap();
    assert_eq!(stored.len(), 1);

    let after: OrgType = db.get(1_i64).await.unwrap();
    assert_eq!(after, stored[0]);
    assert_eq!(after.name, "Changed");
    assert_eq!(after.description.as_deref(), Some("replaced"));
    assert_eq!(after.created, before.created);
    assert!(after.updated >= before.updated);
}

#[tokio::test]
async fn test_upsert_clears_columns_missing_from_incoming_row() {
    let db = setup().await;
    db.upsert_records(&[SlackSpace {
        team_id: "T0001".to_string(),
        workspace_name: Some("F3 Example".to_string()),
        settings: Some(json!({"welcome": true})),
        ..SlackSpace::default()
    }])
    .await
    .unwrap();

    let stored = db
        .upsert_records(&[SlackSpace {
            team_id: "T0001".to_string(),
            workspace_name: Some("F3 Renamed".to_string()),
            ..SlackSpace::default()
        }])
        .await
        .unwrap();
    assert_eq!(stored[0].workspace_name.as_deref(), Some("F3 Renamed"));
    assert_eq!(stored[0].settings, None);
}

#[tokio::test]
async fn test_link_rows_are_deduplicated() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    let event = create_event(&db, &region, None, "Bootcamp").await;
    let link = EventTagXEvent {
        event_id: event.id,
        event_tag_id: 1,
    };

    assert_eq!(db.create_or_ignore(&[link.clone(), link.clone()]).await.unwrap(), 1);
    assert_eq!(db.upsert_records(&[link.clone()]).await.unwrap(), vec![link.clone()]);

    let err = db.create_record(&link).await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn test_text_keyed_link_rows() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    db.create_record(&SlackSpace {
        team_id: "T0001".to_string(),
        ..SlackSpace::default()
    })
    .await
    .unwrap();

    let link = OrgXSlack {
        org_id: region.id,
        slack_space_id: "T0001".to_string(),
    };
    assert_eq!(db.create_or_ignore(&[link.clone(), link]).await.unwrap(), 1);
}

#[tokio::test]
async fn test_duplicate_attendance_is_a_conflict() {
    let db = setup().await;
    let region = create_org(&db, "Example Region 1", REGION, None).await;
    let location = create_location(&db, &region, "The Park").await;
    let event = create_event(&db, &region, Some(&location), "Bootcamp").await;
    let first = create_user(&db, "Sasquatch").await;
    let second = create_user(&db, "Mothman").await;

    for user in [&first, &second] {
        db.create_record(&Attendance {
            event_id: event.id,
            user_id: user.id,
            is_planned: true,
            ..Attendance::default()
        })
        .await
        .unwrap();
    }

    let err = db
        .create_record(&Attendance {
            event_id: event.id,
            user_id: first.id,
            is_planned: true,
            ..Attendance::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Conflict { .. }));

    // The actual (not planned) row is a different triple.
    db.create_record(&Attendance {
        event_id: event.id,
        user_id: first.id,
        is_planned: false,
        ..Attendance::default()
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_duplicate_email_is_a_conflict() {
    let db = setup().await;
    create_user(&db, "Sasquatch").await;

    let err = db
        .create_record(&User {
            f3_name: Some("Imposter".to_string()),
            email: "sasquatch@example.com".to_string(),
            ..User::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let ignored = db
        .create_or_ignore(&[User {
            email: "sasquatch@example.com".to_string(),
            ..User::default()
        }])
        .await
        .unwrap();
    assert_eq!(ignored, 0);
}
