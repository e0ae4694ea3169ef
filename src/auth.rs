use crate::error::{FreeBooksError, Result};
use crate::model::{Role, User};
use crate::store::Repository;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

/// A logged-in user, persisted as `session.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user: User,
    pub logged_in_at: DateTime<Utc>,
}

/// Login and user management over a repository.
pub struct AuthService<'a, R: Repository> {
    repo: &'a mut R,
}

impl<'a, R: Repository> AuthService<'a, R> {
    pub fn new(repo: &'a mut R) -> Self {
        Self { repo }
    }

    pub fn login(&self, username: &str, password: &str) -> Result<Session> {
        let user = self
            .repo
            .user_by_username(username.trim())
            .filter(|u| u.password == password)
            .ok_or_else(|| {
                warn!(username, "login refused");
                FreeBooksError::InvalidCredentials
            })?;
        info!(username = %user.username, role = %user.role, "logged in");
        Ok(Session {
            token: Uuid::new_v4().to_string(),
            user: user.clone(),
            logged_in_at: Utc::now(),
        })
    }

    /// Confirms the session still belongs to a known user and returns it fresh.
    pub fn current_user(&self, session: Option<&Session>) -> Result<User> {
        let session = session.ok_or(FreeBooksError::NotAuthenticated)?;
        self.repo
            .users()
            .iter()
            .find(|u| u.id == session.user.id)
            .cloned()
            .ok_or(FreeBooksError::NotAuthenticated)
    }

    pub fn add_user(
        &mut self,
        username: &str,
        password: &str,
        role: Role,
        school_id: Option<String>,
    ) -> Result<User> {
        let username = username.trim();
        if username.chars().count() < 3 {
            return Err(FreeBooksError::InvalidInput(
                "username must be at least 3 characters".to_string(),
            ));
        }
        if password.is_empty() {
            return Err(FreeBooksError::InvalidInput("password is required".to_string()));
        }
        // A school account without a school id is linked on its first submission.
        if role == Role::School
            && let Some(id) = school_id.as_deref()
            && self.repo.school(id).is_none()
        {
            return Err(FreeBooksError::NotFound(format!("school {id}")));
        }

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password: password.to_string(),
            role,
            school_id: if role == Role::School { school_id } else { None },
        };
        self.repo.insert_user(user.clone())?;
        info!(username, %role, "user added");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRepository;

    #[test]
    fn login_with_bootstrap_admin() {
        let mut repo = MemoryRepository::seeded();
        let auth = AuthService::new(&mut repo);
        let session = auth.login("admin", "admin").unwrap();
        assert_eq!(session.user.role, Role::Admin);
        assert_eq!(auth.current_user(Some(&session)).unwrap().username, "admin");
        assert!(matches!(
            auth.login("admin", "wrong"),
            Err(FreeBooksError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.current_user(None),
            Err(FreeBooksError::NotAuthenticated)
        ));
    }

    #[test]
    fn school_users_must_point_at_a_known_school() {
        let mut repo = MemoryRepository::seeded();
        let mut auth = AuthService::new(&mut repo);
        assert!(matches!(
            auth.add_user("headmaster", "pw", Role::School, Some("missing".to_string())),
            Err(FreeBooksError::NotFound(_))
        ));
        let head = auth.add_user("headmaster", "pw", Role::School, None).unwrap();
        assert_eq!(head.school_id, None);
        let staff = auth
            .add_user("desk1", "pw", Role::Staff, Some("ignored".to_string()))
            .unwrap();
        assert_eq!(staff.school_id, None);
        assert!(auth.login("desk1", "pw").is_ok());
    }
}
