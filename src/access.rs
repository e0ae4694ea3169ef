//! Which role may do what. A fixed table, nothing more.

use crate::error::{FreeBooksError, Result};
use crate::model::{Role, School, User};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Dashboard,
    Approvals,
    UserManagement,
    Reports,
    DeliveryEntry,
    Collection,
    Submission,
    OwnSubmission,
    Inventory,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::Dashboard,
        Action::Approvals,
        Action::UserManagement,
        Action::Reports,
        Action::DeliveryEntry,
        Action::Collection,
        Action::Submission,
        Action::OwnSubmission,
        Action::Inventory,
    ];

    pub fn route(self) -> &'static str {
        match self {
            Action::Dashboard => "/dashboard",
            Action::Approvals => "/approvals",
            Action::UserManagement => "/users",
            Action::Reports => "/reports",
            Action::DeliveryEntry => "/deliveries",
            Action::Collection => "/collection",
            Action::Submission => "/submission",
            Action::OwnSubmission => "/submission/mine",
            Action::Inventory => "/inventory",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.route())
    }
}

const ADMIN: &[Action] = &[
    Action::Dashboard,
    Action::Approvals,
    Action::UserManagement,
    Action::Reports,
    Action::Inventory,
];

const STAFF: &[Action] = &[
    Action::Dashboard,
    Action::DeliveryEntry,
    Action::Collection,
    Action::Reports,
];

const SCHOOL: &[Action] = &[Action::Dashboard, Action::Submission, Action::OwnSubmission];

pub fn permitted_actions(role: Role) -> &'static [Action] {
    match role {
        Role::Admin => ADMIN,
        Role::Staff => STAFF,
        Role::School => SCHOOL,
    }
}

pub fn can_access(role: Role, action: Action) -> bool {
    permitted_actions(role).contains(&action)
}

pub fn authorize(user: &User, action: Action) -> Result<()> {
    if can_access(user.role, action) {
        Ok(())
    } else {
        Err(FreeBooksError::Forbidden {
            role: user.role,
            action,
        })
    }
}

/// School accounts only see their own record; other roles see everything.
pub fn can_view_school(user: &User, school: &School) -> bool {
    match user.role {
        Role::School => user.school_id.as_deref() == Some(school.id.as_str()),
        Role::Admin | Role::Staff => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn user(role: Role, school_id: Option<&str>) -> User {
        User {
            id: "u1".to_string(),
            username: "someone".to_string(),
            password: String::new(),
            role,
            school_id: school_id.map(str::to_string),
        }
    }

    #[test]
    fn table_matches_roles() {
        let allowed = |role: Role| {
            Action::ALL
                .into_iter()
                .filter(|a| can_access(role, *a))
                .map(Action::route)
                .collect::<Vec<_>>()
        };
        assert_eq!(
            allowed(Role::Admin),
            vec!["/dashboard", "/approvals", "/users", "/reports", "/inventory"]
        );
        assert_eq!(
            allowed(Role::Staff),
            vec!["/dashboard", "/reports", "/deliveries", "/collection"]
        );
        assert_eq!(
            allowed(Role::School),
            vec!["/dashboard", "/submission", "/submission/mine"]
        );
    }

    #[test]
    fn authorize_reports_role_and_action() {
        let err = authorize(&user(Role::School, None), Action::Approvals).unwrap_err();
        assert_eq!(err.to_string(), "role school may not access /approvals");
        assert!(authorize(&user(Role::Admin, None), Action::Approvals).is_ok());
    }
}
