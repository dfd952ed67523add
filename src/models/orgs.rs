//! Organizations, their locations and Slack workspaces.

use crate::entity;
use crate::models::events::{Event, EventTag, EventType};
use crate::models::users::{SlackUser, User};
use crate::models::{Achievement, Position};
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

entity! {
    /// Level of an org in the hierarchy (AO, Region, Area, Sector, Nation).
    pub struct OrgType in "org_types" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            orgs: has_many(Org, id => org_type_id),
            positions: has_many(Position, id => org_type_id),
        }
    }
}

entity! {
    /// A node in the organizational hierarchy.
    ///
    /// `parent_id` points at the enclosing org; the store only checks that it
    /// exists; cycles are rejected by [`DbManager::set_org_parent`].
    ///
    /// [`DbManager::set_org_parent`]: crate::db::DbManager::set_org_parent
    pub struct Org in "orgs" {
        key(id);
        columns {
            id: i64 [generated],
            parent_id: Option<i64>,
            org_type_id: i64,
            default_location_id: Option<i64>,
            name: String,
            description: Option<String>,
            is_active: bool,
            logo_url: Option<String>,
            website: Option<String>,
            email: Option<String>,
            twitter: Option<String>,
            facebook: Option<String>,
            instagram: Option<String>,
            last_annual_review: Option<chrono::NaiveDate>,
            meta: Option<JsonValue>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            parent: belongs_to(Org, parent_id => id),
            children: has_many(Org, id => parent_id),
            org_type: belongs_to(OrgType, org_type_id => id),
            locations: has_many(Location, id => org_id),
            events: has_many(Event, id => org_id),
            users: has_many(User, id => home_region_id),
            event_types: many_to_many(EventType, "event_types_x_org", org_id => event_type_id),
            event_tags: many_to_many(EventTag, "event_tags_x_org", org_id => event_tag_id),
            achievements: many_to_many(Achievement, "achievements_x_org", org_id => achievement_id),
            slack_spaces: many_to_many(SlackSpace, "org_x_slack", org_id => slack_space_id),
        }
    }
}

entity! {
    /// A physical place where an org meets.
    pub struct Location in "locations" {
        key(id);
        columns {
            id: i64 [generated],
            org_id: i64,
            name: String,
            description: Option<String>,
            is_active: bool,
            lat: Option<f64>,
            lon: Option<f64>,
            address_street: Option<String>,
            address_city: Option<String>,
            address_state: Option<String>,
            address_zip: Option<String>,
            address_country: Option<String>,
            meta: Option<JsonValue>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            org: belongs_to(Org, org_id => id),
            events: has_many(Event, id => location_id),
        }
    }
}

entity! {
    /// A Slack workspace, keyed by its team id.
    pub struct SlackSpace in "slack_spaces" {
        key(team_id);
        columns {
            team_id: String,
            workspace_name: Option<String>,
            bot_token: Option<String>,
            settings: Option<JsonValue>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            orgs: many_to_many(Org, "org_x_slack", slack_space_id => org_id),
            slack_users: has_many(SlackUser, team_id => slack_team_id),
        }
    }
}

entity! {
    pub struct OrgXSlack in "org_x_slack" {
        key(org_id, slack_space_id);
        columns {
            org_id: i64,
            slack_space_id: String,
        }
        relations {
            org: belongs_to(Org, org_id => id),
            slack_space: belongs_to(SlackSpace, slack_space_id => team_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, Fields, Key, RelationKind, Value};

    #[test]
    fn test_to_dict_has_every_non_audit_column() {
        let org = Org::default();
        let dict = org.to_dict();
        assert_eq!(dict.len(), Org::meta().columns.len() - 2);
        assert!(dict.contains_key("instagram"));
        assert!(dict["instagram"].is_null());
        assert!(!dict.contains_key("created"));
        assert!(!dict.contains_key("updated"));
    }

    #[test]
    fn test_get_returns_none_for_unknown_attribute() {
        let org = Org {
            name: "Example Region 1".to_string(),
            ..Org::default()
        };
        assert_eq!(org.get("name"), Some(Value::from("Example Region 1")));
        assert_eq!(org.get("parent_id"), Some(Value::Null));
        assert_eq!(org.get("no_such_column"), None);
    }

    #[test]
    fn test_update_strips_qualifier() {
        let mut org = Org::default();
        org.update(&Fields::new().set("orgs.name", "Renamed").set("is_active", true))
            .unwrap();
        assert_eq!(org.name, "Renamed");
        assert!(org.is_active);
    }

    #[test]
    fn test_update_unknown_attribute_fails() {
        let mut org = Org::default();
        let err = org
            .update(&Fields::new().set("name", "ok").set("bogus", 1))
            .unwrap_err();
        assert!(matches!(err, crate::DbError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_update_rejects_null_in_required_column() {
        let mut org = Org::default();
        let err = org
            .update(&Fields::new().set("name", Value::Null))
            .unwrap_err();
        assert!(matches!(err, crate::DbError::InvalidValue { .. }));
    }

    #[test]
    fn test_slack_space_keyed_by_team_id() {
        let space = SlackSpace {
            team_id: "T0001".to_string(),
            ..SlackSpace::default()
        };
        assert_eq!(space.get_id(), Key::from("T0001"));
        assert_eq!(SlackSpace::meta().primary_key, &["team_id"]);
    }

    #[test]
    fn test_relation_metadata() {
        let meta = Org::meta();
        let parent = meta.relation("parent").unwrap();
        assert_eq!(parent.target().name, "orgs");
        assert_eq!(
            parent.kind,
            RelationKind::BelongsTo {
                local: "parent_id",
                remote: "id"
            }
        );
        assert!(meta.relation("slack_spaces").is_some());
        assert!(meta.is_audited());
        assert!(!OrgXSlack::meta().is_audited());
    }
}
