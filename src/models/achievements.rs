use crate::entity;
use crate::models::orgs::Org;
use crate::models::users::User;
use chrono::NaiveDateTime;

entity! {
    /// An award such as "The Priest", phrased through `verb` in announcements.
    pub struct Achievement in "achievements" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            verb: String,
            image_url: Option<String>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            users: many_to_many(User, "achievements_x_users", achievement_id => user_id),
            orgs: many_to_many(Org, "achievements_x_org", achievement_id => org_id),
        }
    }
}

entity! {
    pub struct AchievementXUser in "achievements_x_users" {
        key(achievement_id, user_id);
        columns {
            achievement_id: i64,
            user_id: i64,
            /// Defaults to the store's UTC now when left unset.
            date_awarded: Option<NaiveDateTime> [generated],
        }
        relations {
            achievement: belongs_to(Achievement, achievement_id => id),
            user: belongs_to(User, user_id => id),
        }
    }
}

entity! {
    /// Achievements enabled for an org.
    pub struct AchievementXOrg in "achievements_x_org" {
        key(achievement_id, org_id);
        columns {
            achievement_id: i64,
            org_id: i64,
        }
        relations {
            achievement: belongs_to(Achievement, achievement_id => id),
            org: belongs_to(Org, org_id => id),
        }
    }
}
