//! Data model for F3 orgs, events, users and attendance.
//!
//! This module re-exports the entity machinery and every table type.

pub mod access;
pub mod achievements;
pub mod entity;
pub mod events;
pub mod filter;
pub mod orgs;
pub mod users;
pub mod value;

// Re-export commonly used types
pub use access::{Permission, Position, PositionXOrgXUser, Role, RoleXPermission, RoleXUserXOrg};
pub use achievements::{Achievement, AchievementXOrg, AchievementXUser};
pub use entity::{Column, Entity, Loaded, Record, Relation, RelationKind, TableMeta};
pub use events::{
    Attendance, AttendanceType, AttendanceXAttendanceType, Event, EventCategory, EventTag,
    EventTagXEvent, EventTagXOrg, EventType, EventTypeXOrg, EventXEventType,
};
pub use filter::{ColumnRef, CompareOp, Filter, Related};
pub use orgs::{Location, Org, OrgType, OrgXSlack, SlackSpace};
pub use users::{Expansion, ExpansionXUser, SlackUser, User};
pub use value::{ColumnKind, FieldValue, Fields, Key, Value};
