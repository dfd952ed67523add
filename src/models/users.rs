//! Users, their Slack identities and expansion requests.

use crate::entity;
use crate::models::achievements::Achievement;
use crate::models::events::Attendance;
use crate::models::orgs::{Org, SlackSpace};
use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

entity! {
    /// A member. `email` is unique across the table.
    pub struct User in "users" {
        key(id);
        columns {
            id: i64 [generated],
            f3_name: Option<String>,
            first_name: Option<String>,
            last_name: Option<String>,
            email: String,
            phone: Option<String>,
            home_region_id: Option<i64>,
            avatar_url: Option<String>,
            meta: Option<JsonValue>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            home_region: belongs_to(Org, home_region_id => id),
            attendance: has_many(Attendance, id => user_id),
            slack_users: has_many(SlackUser, id => user_id),
            achievements: many_to_many(Achievement, "achievements_x_users", user_id => achievement_id),
            expansions: many_to_many(Expansion, "expansions_x_users", user_id => expansion_id),
        }
    }
}

entity! {
    /// A Slack account in one workspace, optionally linked to a [`User`].
    pub struct SlackUser in "slack_users" {
        key(id);
        columns {
            id: i64 [generated],
            slack_id: String,
            user_name: String,
            email: String,
            is_admin: bool,
            is_owner: bool,
            is_bot: bool,
            user_id: Option<i64>,
            avatar_url: Option<String>,
            slack_team_id: String,
            strava_access_token: Option<String>,
            strava_refresh_token: Option<String>,
            strava_expires_at: Option<NaiveDateTime>,
            strava_athlete_id: Option<i64>,
            meta: Option<JsonValue>,
            slack_updated: Option<NaiveDateTime>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            user: belongs_to(User, user_id => id),
            slack_space: belongs_to(SlackSpace, slack_team_id => team_id),
        }
    }
}

entity! {
    /// Request for a new area, with the requester's pinned location.
    pub struct Expansion in "expansions" {
        key(id);
        columns {
            id: i64 [generated],
            area: String,
            pinned_lat: f64,
            pinned_lon: f64,
            user_lat: f64,
            user_lon: f64,
            interested_in_organizing: bool,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            users: many_to_many(User, "expansions_x_users", expansion_id => user_id),
        }
    }
}

entity! {
    pub struct ExpansionXUser in "expansions_x_users" {
        key(expansion_id, user_id);
        columns {
            expansion_id: i64,
            user_id: i64,
            /// Defaults to the store's UTC now when left unset.
            request_date: Option<NaiveDateTime> [generated],
            notes: Option<String>,
        }
        relations {
            expansion: belongs_to(Expansion, expansion_id => id),
            user: belongs_to(User, user_id => id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Entity, RelationKind};

    #[test]
    fn test_slack_user_references_team_id() {
        let rel = SlackUser::meta().relation("slack_space").unwrap();
        assert_eq!(rel.target().name, "slack_spaces");
        assert_eq!(
            rel.kind,
            RelationKind::BelongsTo {
                local: "slack_team_id",
                remote: "team_id"
            }
        );
    }

    #[test]
    fn test_expansion_link_defaults() {
        let meta = ExpansionXUser::meta();
        let column = meta.column("request_date").unwrap();
        assert!(column.generated);
        assert!(!column.audit);
        assert!(!meta.is_audited());
    }

    #[test]
    fn test_user_to_dict() {
        let user = User {
            email: "pax@example.com".to_string(),
            ..User::default()
        };
        let dict = user.to_dict();
        assert_eq!(dict["email"], "pax@example.com");
        assert!(dict["f3_name"].is_null());
        assert_eq!(dict.len(), 9);
    }
}
