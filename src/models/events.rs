//! Events, their taxonomy, and attendance.

use crate::entity;
use crate::models::orgs::{Location, Org};
use crate::models::users::User;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde_json::Value as JsonValue;

entity! {
    pub struct EventCategory in "event_categories" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            event_types: has_many(EventType, id => category_id),
        }
    }
}

entity! {
    /// Kind of activity (Bootcamp, Run, QSource, ...).
    pub struct EventType in "event_types" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            acronym: Option<String>,
            category_id: i64,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            category: belongs_to(EventCategory, category_id => id),
            events: many_to_many(Event, "events_x_event_types", event_type_id => event_id),
            orgs: many_to_many(Org, "event_types_x_org", event_type_id => org_id),
        }
    }
}

entity! {
    pub struct EventTag in "event_tags" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            color: Option<String>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            events: many_to_many(Event, "event_tags_x_events", event_tag_id => event_id),
            orgs: many_to_many(Org, "event_tags_x_org", event_tag_id => org_id),
        }
    }
}

entity! {
    /// A scheduled event or the definition of a recurring series.
    ///
    /// Instances of a series point back at it through `series_id`; deleting
    /// the series removes the instances along with their attendance and
    /// type/tag links.
    pub struct Event in "events" {
        key(id);
        columns {
            id: i64 [generated],
            org_id: i64,
            location_id: Option<i64>,
            series_id: Option<i64>,
            is_series: bool,
            is_active: bool,
            highlight: bool,
            start_date: NaiveDate,
            end_date: Option<NaiveDate>,
            start_time: Option<NaiveTime>,
            end_time: Option<NaiveTime>,
            /// 0 = Monday
            day_of_week: Option<i64>,
            name: String,
            description: Option<String>,
            recurrence_pattern: Option<String>,
            recurrence_interval: Option<i64>,
            index_within_interval: Option<i64>,
            pax_count: Option<i64>,
            fng_count: Option<i64>,
            preblast: Option<String>,
            backblast: Option<String>,
            preblast_rich: Option<JsonValue>,
            backblast_rich: Option<JsonValue>,
            /// Slack message timestamp of the preblast.
            preblast_ts: Option<f64>,
            backblast_ts: Option<f64>,
            meta: Option<JsonValue>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            org: belongs_to(Org, org_id => id),
            location: belongs_to(Location, location_id => id),
            series: belongs_to(Event, series_id => id),
            instances: has_many(Event, id => series_id),
            event_types: many_to_many(EventType, "events_x_event_types", event_id => event_type_id),
            event_tags: many_to_many(EventTag, "event_tags_x_events", event_id => event_tag_id),
            attendance: has_many(Attendance, id => event_id),
        }
    }
}

entity! {
    /// Event types enabled for an org.
    pub struct EventTypeXOrg in "event_types_x_org" {
        key(event_type_id, org_id);
        columns {
            event_type_id: i64,
            org_id: i64,
            is_default: bool,
        }
        relations {
            event_type: belongs_to(EventType, event_type_id => id),
            org: belongs_to(Org, org_id => id),
        }
    }
}

entity! {
    /// Event tags enabled for an org, optionally recolored.
    pub struct EventTagXOrg in "event_tags_x_org" {
        key(event_tag_id, org_id);
        columns {
            event_tag_id: i64,
            org_id: i64,
            color_override: Option<String>,
        }
        relations {
            event_tag: belongs_to(EventTag, event_tag_id => id),
            org: belongs_to(Org, org_id => id),
        }
    }
}

entity! {
    pub struct EventTagXEvent in "event_tags_x_events" {
        key(event_id, event_tag_id);
        columns {
            event_id: i64,
            event_tag_id: i64,
        }
        relations {
            event: belongs_to(Event, event_id => id),
            event_tag: belongs_to(EventTag, event_tag_id => id),
        }
    }
}

entity! {
    pub struct EventXEventType in "events_x_event_types" {
        key(event_id, event_type_id);
        columns {
            event_id: i64,
            event_type_id: i64,
        }
        relations {
            event: belongs_to(Event, event_id => id),
            event_type: belongs_to(EventType, event_type_id => id),
        }
    }
}

entity! {
    /// PAX, Q or Co-Q.
    pub struct AttendanceType in "attendance_types" {
        key(id);
        columns {
            id: i64 [generated],
            type_name as "type": String,
            description: Option<String>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            attendance: many_to_many(
                Attendance,
                "attendance_x_attendance_types",
                attendance_type_id => attendance_id
            ),
        }
    }
}

entity! {
    /// A user's planned or actual participation in an event.
    ///
    /// At most one planned and one actual row exist per (event, user).
    pub struct Attendance in "attendance" {
        key(id);
        columns {
            id: i64 [generated],
            event_id: i64,
            user_id: i64,
            is_planned: bool,
            meta: Option<JsonValue>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            event: belongs_to(Event, event_id => id),
            user: belongs_to(User, user_id => id),
            attendance_types: many_to_many(
                AttendanceType,
                "attendance_x_attendance_types",
                attendance_id => attendance_type_id
            ),
        }
    }
}

entity! {
    pub struct AttendanceXAttendanceType in "attendance_x_attendance_types" {
        key(attendance_id, attendance_type_id);
        columns {
            attendance_id: i64,
            attendance_type_id: i64,
        }
        relations {
            attendance: belongs_to(Attendance, attendance_id => id),
            attendance_type: belongs_to(AttendanceType, attendance_type_id => id),
        }
    }
}
