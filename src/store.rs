//! Record storage: the `Repository` seam, an in-memory implementation, and
//! the JSON snapshot files that keep state between runs.

use crate::auth::Session;
use crate::error::{FreeBooksError, Result};
use crate::inventory::Inventory;
use crate::model::{IssueRecord, Role, School, Student, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STATE_FILE: &str = "state.json";
const INVENTORY_FILE: &str = "inventory.json";
const SESSION_FILE: &str = "session.json";

pub trait Repository {
    fn schools(&self) -> &[School];
    fn insert_school(&mut self, school: School);
    fn update_school(&mut self, school: School) -> Result<()>;

    fn students(&self) -> &[Student];
    fn insert_student(&mut self, student: Student);
    fn update_student(&mut self, student: Student) -> Result<()>;
    fn remove_school_students(&mut self, school_id: &str);

    fn issue_records(&self) -> &[IssueRecord];
    fn insert_issue_record(&mut self, record: IssueRecord);

    fn users(&self) -> &[User];
    fn insert_user(&mut self, user: User) -> Result<()>;
    fn update_user(&mut self, user: User) -> Result<()>;

    fn school(&self, id: &str) -> Option<&School> {
        self.schools().iter().find(|s| s.id == id)
    }

    fn student(&self, id: &str) -> Option<&Student> {
        self.students().iter().find(|s| s.id == id)
    }

    fn user_by_username(&self, username: &str) -> Option<&User> {
        self.users().iter().find(|u| u.username == username)
    }
}

fn replace_by_id<T>(items: &mut [T], item: T, id: impl Fn(&T) -> &str, kind: &str) -> Result<()> {
    let key = id(&item).to_string();
    let slot = items
        .iter_mut()
        .find(|existing| id(existing) == key)
        .ok_or_else(|| FreeBooksError::NotFound(format!("{kind} {key}")))?;
    *slot = item;
    Ok(())
}

/// Vectors in memory; also the shape of `state.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRepository {
    #[serde(default)]
    schools: Vec<School>,
    #[serde(default)]
    students: Vec<Student>,
    #[serde(default)]
    issue_records: Vec<IssueRecord>,
    #[serde(default)]
    users: Vec<User>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// A fresh store with the bootstrap `admin`/`admin` account.
    pub fn seeded() -> Self {
        let mut repo = Self::new();
        repo.users.push(User {
            id: uuid::Uuid::new_v4().to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            role: Role::Admin,
            school_id: None,
        });
        repo
    }
}

impl Repository for MemoryRepository {
    fn schools(&self) -> &[School] {
        &self.schools
    }

    fn insert_school(&mut self, school: School) {
        self.schools.push(school);
    }

    fn update_school(&mut self, school: School) -> Result<()> {
        replace_by_id(&mut self.schools, school, |s| s.id.as_str(), "school")
    }

    fn students(&self) -> &[Student] {
        &self.students
    }

    fn insert_student(&mut self, student: Student) {
        self.students.push(student);
    }

    fn update_student(&mut self, student: Student) -> Result<()> {
        replace_by_id(&mut self.students, student, |s| s.id.as_str(), "student")
    }

    fn remove_school_students(&mut self, school_id: &str) {
        self.students.retain(|s| s.school_id != school_id);
    }

    fn issue_records(&self) -> &[IssueRecord] {
        &self.issue_records
    }

    fn insert_issue_record(&mut self, record: IssueRecord) {
        self.issue_records.push(record);
    }

    fn users(&self) -> &[User] {
        &self.users
    }

    fn insert_user(&mut self, user: User) -> Result<()> {
        if self.user_by_username(&user.username).is_some() {
            return Err(FreeBooksError::InvalidInput(format!(
                "username {} is already taken",
                user.username
            )));
        }
        self.users.push(user);
        Ok(())
    }

    fn update_user(&mut self, user: User) -> Result<()> {
        replace_by_id(&mut self.users, user, |u| u.id.as_str(), "user")
    }
}

/// JSON files under a data directory. Missing files load as defaults; there
/// is no schema version.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), "snapshot store opened");
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        let path = self.dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn write<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(value)?;
        fs::write(self.dir.join(name), json)?;
        Ok(())
    }

    /// Loads the saved repository. A fresh directory gets the bootstrap admin
    /// account, written out at once so its id stays stable across runs.
    pub fn load_state(&self) -> Result<MemoryRepository> {
        match self.read(STATE_FILE)? {
            Some(repo) => Ok(repo),
            None => {
                info!("no saved state, starting with the bootstrap admin account");
                let repo = MemoryRepository::seeded();
                self.save_state(&repo)?;
                Ok(repo)
            }
        }
    }

    pub fn save_state(&self, repo: &MemoryRepository) -> Result<()> {
        self.write(STATE_FILE, repo)
    }

    pub fn load_inventory(&self) -> Result<Inventory> {
        Ok(self.read(INVENTORY_FILE)?.unwrap_or_default())
    }

    pub fn save_inventory(&self, inventory: &Inventory) -> Result<()> {
        self.write(INVENTORY_FILE, inventory)
    }

    pub fn load_session(&self) -> Result<Option<Session>> {
        self.read(SESSION_FILE)
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        self.write(SESSION_FILE, session)
    }

    pub fn clear_session(&self) -> Result<()> {
        let path = self.dir.join(SESSION_FILE);
        if path.exists() {
            fs::remove_file(path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SchoolStatus;
    use chrono::Utc;

    fn school(id: &str) -> School {
        School {
            id: id.to_string(),
            name: "Fijai Basic".to_string(),
            total_declared: 10,
            classes: vec![],
            students: vec![],
            status: SchoolStatus::Pending,
            delivery_proofs: vec![],
            created_at: Utc::now(),
            notes: None,
            contact: None,
            submitted_by: None,
            reviewed_by: None,
            review_note: None,
            delivered_at: None,
        }
    }

    #[test]
    fn update_replaces_in_place() {
        let mut repo = MemoryRepository::new();
        repo.insert_school(school("s1"));
        let mut changed = school("s1");
        changed.status = SchoolStatus::Approved;
        repo.update_school(changed).unwrap();
        assert_eq!(repo.school("s1").unwrap().status, SchoolStatus::Approved);
        assert!(matches!(
            repo.update_school(school("nope")),
            Err(FreeBooksError::NotFound(_))
        ));
    }

    #[test]
    fn duplicate_usernames_are_refused() {
        let mut repo = MemoryRepository::seeded();
        let admin = repo.user_by_username("admin").unwrap().clone();
        assert!(repo.insert_user(admin).is_err());
    }

    #[test]
    fn snapshot_files_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path().join("data")).unwrap();

        let fresh = store.load_state().unwrap();
        assert!(fresh.user_by_username("admin").is_some());
        assert_eq!(store.load_inventory().unwrap(), Inventory::default());
        assert!(store.load_session().unwrap().is_none());

        let mut repo = fresh.clone();
        repo.insert_school(school("s1"));
        store.save_state(&repo).unwrap();
        let mut inventory = Inventory::new();
        inventory.add_stock(2024, 400, 1_000.0);
        store.save_inventory(&inventory).unwrap();

        assert_eq!(store.load_state().unwrap(), repo);
        assert_eq!(store.load_inventory().unwrap().remaining(), 400);

        store.clear_session().unwrap();
    }

    #[test]
    fn bootstrap_admin_keeps_its_id_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::open(dir.path()).unwrap();
        let first = store.load_state().unwrap();
        assert!(dir.path().join(STATE_FILE).exists());
        let second = store.load_state().unwrap();
        assert_eq!(
            first.user_by_username("admin").unwrap().id,
            second.user_by_username("admin").unwrap().id
        );
    }
}
