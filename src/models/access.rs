//! Roles, permissions and positions.

use crate::entity;
use crate::models::orgs::{Org, OrgType};
use crate::models::users::User;
use chrono::NaiveDateTime;

entity! {
    pub struct Role in "roles" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            permissions: many_to_many(Permission, "roles_x_permissions", role_id => permission_id),
        }
    }
}

entity! {
    pub struct Permission in "permissions" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            roles: many_to_many(Role, "roles_x_permissions", permission_id => role_id),
        }
    }
}

entity! {
    pub struct RoleXPermission in "roles_x_permissions" {
        key(role_id, permission_id);
        columns {
            role_id: i64,
            permission_id: i64,
        }
        relations {
            role: belongs_to(Role, role_id => id),
            permission: belongs_to(Permission, permission_id => id),
        }
    }
}

entity! {
    /// A role granted to a user within one org.
    pub struct RoleXUserXOrg in "roles_x_users_x_org" {
        key(role_id, user_id, org_id);
        columns {
            role_id: i64,
            user_id: i64,
            org_id: i64,
        }
        relations {
            role: belongs_to(Role, role_id => id),
            user: belongs_to(User, user_id => id),
            org: belongs_to(Org, org_id => id),
        }
    }
}

entity! {
    /// An office such as "Site Q" or "Nantan".
    ///
    /// Generic positions leave both `org_type_id` and `org_id` unset.
    pub struct Position in "positions" {
        key(id);
        columns {
            id: i64 [generated],
            name: String,
            description: Option<String>,
            org_type_id: Option<i64>,
            org_id: Option<i64>,
            created: NaiveDateTime [generated, audit],
            updated: NaiveDateTime [generated, audit],
        }
        relations {
            org_type: belongs_to(OrgType, org_type_id => id),
            org: belongs_to(Org, org_id => id),
        }
    }
}

entity! {
    pub struct PositionXOrgXUser in "positions_x_orgs_x_users" {
        key(position_id, org_id, user_id);
        columns {
            position_id: i64,
            org_id: i64,
            user_id: i64,
        }
        relations {
            position: belongs_to(Position, position_id => id),
            org: belongs_to(Org, org_id => id),
            user: belongs_to(User, user_id => id),
        }
    }
}
