//! Submission review and book distribution workflows.

use crate::error::{FreeBooksError, Result};
use crate::inventory::Inventory;
use crate::model::{
    BOOKS_PER_STUDENT, ClaimantInfo, ClassEntry, EXTERNAL_SCHOOL, IssueChannel, IssueRecord, Role,
    RosterStudent, School, SchoolStatus, Student, SubmissionDraft, User,
};
use crate::store::Repository;
use crate::validate::{parse_dob, total_declared, validate_school_submission};
use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// Student id used on the aggregate record for declared students with no roster line.
pub const BULK_STUDENT: &str = "bulk";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub school: School,
    pub warnings: Vec<String>,
}

fn non_empty(s: Option<&String>) -> Option<String> {
    s.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn load_school<R: Repository>(repo: &R, id: &str) -> Result<School> {
    repo.school(id)
        .cloned()
        .ok_or_else(|| FreeBooksError::NotFound(format!("school {id}")))
}

fn check_transition(school: &School, to: SchoolStatus) -> Result<()> {
    if school.status.can_transition(to) {
        Ok(())
    } else {
        warn!(school = %school.id, from = %school.status, %to, "status change refused");
        Err(FreeBooksError::InvalidTransition {
            id: school.id.clone(),
            from: school.status,
            to,
        })
    }
}

pub struct SubmissionService<'a, R: Repository> {
    repo: &'a mut R,
}

impl<'a, R: Repository> SubmissionService<'a, R> {
    pub fn new(repo: &'a mut R) -> Self {
        Self { repo }
    }

    pub fn submit(&mut self, draft: &SubmissionDraft, by: &User) -> Result<Submission> {
        self.submit_at(draft, by, Utc::now())
    }

    /// Stores a draft as a pending school if it has no blocking errors.
    ///
    /// A school account that already owns a rejected record resubmits into
    /// that record; one that owns a record in any other state is refused.
    pub fn submit_at(
        &mut self,
        draft: &SubmissionDraft,
        by: &User,
        now: DateTime<Utc>,
    ) -> Result<Submission> {
        let result = validate_school_submission(draft, now.date_naive());
        if !result.is_valid {
            warn!(errors = result.errors.len(), "submission refused");
            return Err(FreeBooksError::Validation(result.errors));
        }

        let existing = match (by.role, by.school_id.as_deref()) {
            (Role::School, Some(id)) => {
                let school = load_school(&*self.repo, id)?;
                check_transition(&school, SchoolStatus::Pending)?;
                Some(school)
            }
            _ => None,
        };
        let id = existing
            .as_ref()
            .map(|s| s.id.clone())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let classes: Vec<_> = draft
            .classes
            .iter()
            .map(|c| ClassEntry {
                class_name: c.class_name.trim().to_string(),
                declared_count: c.declared_count,
            })
            .collect();
        let total_declared = total_declared(&classes).ok_or_else(|| {
            FreeBooksError::InvalidInput("declared count too large".to_string())
        })?;
        let students: Vec<RosterStudent> = draft
            .students
            .iter()
            .filter_map(|s| {
                parse_dob(&s.dob).map(|dob| RosterStudent {
                    name: s.name.trim().to_string(),
                    dob,
                    class_name: s.class_name.trim().to_string(),
                    issued: false,
                })
            })
            .collect();

        let school = School {
            id: id.clone(),
            name: draft.name.trim().to_string(),
            total_declared,
            classes,
            students,
            status: SchoolStatus::Pending,
            delivery_proofs: Vec::new(),
            created_at: now,
            notes: non_empty(draft.notes.as_ref()),
            contact: draft.contact.clone(),
            submitted_by: Some(by.username.clone()),
            reviewed_by: None,
            review_note: None,
            delivered_at: None,
        };

        if existing.is_some() {
            self.repo.remove_school_students(&id);
            self.repo.update_school(school.clone())?;
        } else {
            self.repo.insert_school(school.clone());
        }
        for s in &school.students {
            self.repo.insert_student(Student {
                id: Uuid::new_v4().to_string(),
                name: s.name.clone(),
                dob: s.dob,
                school_id: id.clone(),
                class_name: Some(s.class_name.clone()),
                issued: false,
                claimant_info: None,
            });
        }

        if by.role == Role::School && by.school_id.is_none() {
            let mut linked = by.clone();
            linked.school_id = Some(id.clone());
            self.repo.update_user(linked)?;
        }

        info!(
            school = %school.id,
            name = %school.name,
            declared = school.total_declared,
            roster = school.students.len(),
            warnings = result.warnings.len(),
            "submission stored"
        );
        Ok(Submission {
            school,
            warnings: result.warnings,
        })
    }

    pub fn approve(&mut self, id: &str, by: &User) -> Result<School> {
        self.review(id, SchoolStatus::Approved, by, None)
    }

    pub fn reject(&mut self, id: &str, by: &User, reason: &str) -> Result<School> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(FreeBooksError::InvalidInput(
                "a rejection needs a reason".to_string(),
            ));
        }
        self.review(id, SchoolStatus::Rejected, by, Some(reason.to_string()))
    }

    fn review(
        &mut self,
        id: &str,
        to: SchoolStatus,
        by: &User,
        note: Option<String>,
    ) -> Result<School> {
        let mut school = load_school(&*self.repo, id)?;
        check_transition(&school, to)?;
        school.status = to;
        school.reviewed_by = Some(by.username.clone());
        school.review_note = note;
        self.repo.update_school(school.clone())?;
        info!(school = %school.id, status = %to, by = %by.username, "submission reviewed");
        Ok(school)
    }

    /// Schools the user may see, newest first.
    pub fn visible_schools(&self, user: &User) -> Vec<School> {
        let mut schools: Vec<School> = self
            .repo
            .schools()
            .iter()
            .filter(|s| crate::access::can_view_school(user, s))
            .cloned()
            .collect();
        schools.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        schools
    }
}

pub struct DistributionService<'a, R: Repository> {
    repo: &'a mut R,
    inventory: &'a mut Inventory,
}

impl<'a, R: Repository> DistributionService<'a, R> {
    pub fn new(repo: &'a mut R, inventory: &'a mut Inventory) -> Self {
        Self { repo, inventory }
    }

    fn issue(
        &mut self,
        student_id: &str,
        school_id: &str,
        books: u64,
        by: &User,
        channel: IssueChannel,
    ) -> IssueRecord {
        let record = IssueRecord {
            id: Uuid::new_v4().to_string(),
            student_id: student_id.to_string(),
            school_id: school_id.to_string(),
            books,
            issued_at: Utc::now(),
            issued_by: by.username.clone(),
            channel,
        };
        self.repo.insert_issue_record(record.clone());
        record
    }

    /// Delivers books for every declared student of an approved school.
    ///
    /// Each roster student not yet served at the walk-in desk gets a 20-book
    /// issue record; declared students beyond the roster share one bulk
    /// record. The books taken from stock equal the sum of those records.
    pub fn record_delivery(&mut self, id: &str, proofs: &[String], by: &User) -> Result<School> {
        let mut school = load_school(&*self.repo, id)?;
        check_transition(&school, SchoolStatus::Delivered)?;

        let pending: Vec<Student> = self
            .repo
            .students()
            .iter()
            .filter(|s| s.school_id == school.id && !s.issued)
            .cloned()
            .collect();
        let declared = u64::try_from(school.total_declared).unwrap_or(0);
        let uncovered = declared.saturating_sub(school.students.len() as u64);
        let bulk_books = Inventory::books_for(uncovered)?;
        let books = self
            .inventory
            .record_delivery((pending.len() as u64).saturating_add(uncovered))?;

        let now = Utc::now();
        school.status = SchoolStatus::Delivered;
        school.delivered_at = Some(now);
        school
            .delivery_proofs
            .extend(proofs.iter().map(|p| p.trim().to_string()).filter(|p| !p.is_empty()));
        for s in &mut school.students {
            s.issued = true;
        }
        self.repo.update_school(school.clone())?;

        for mut student in pending.iter().cloned() {
            student.issued = true;
            self.repo.update_student(student)?;
        }
        for student in &pending {
            self.issue(&student.id, &school.id, BOOKS_PER_STUDENT, by, IssueChannel::SchoolDelivery);
        }
        if uncovered > 0 {
            self.issue(BULK_STUDENT, &school.id, bulk_books, by, IssueChannel::SchoolDelivery);
        }

        info!(
            school = %school.id,
            books,
            remaining = self.inventory.remaining(),
            "delivery recorded"
        );
        Ok(school)
    }

    /// Walk-in collection of one student's books.
    pub fn collect(
        &mut self,
        student_id: &str,
        claimant: Option<ClaimantInfo>,
        by: &User,
    ) -> Result<IssueRecord> {
        let mut student = self
            .repo
            .student(student_id)
            .cloned()
            .ok_or_else(|| FreeBooksError::NotFound(format!("student {student_id}")))?;
        if student.issued {
            warn!(student = %student.id, "books already issued");
            return Err(FreeBooksError::AlreadyIssued(student.id));
        }
        if let Some(c) = &claimant
            && c.voter_id.trim().is_empty()
        {
            return Err(FreeBooksError::InvalidInput(
                "claimant voter id is required".to_string(),
            ));
        }

        self.inventory.record_collection()?;

        student.issued = true;
        student.claimant_info = claimant;
        self.repo.update_student(student.clone())?;

        if !student.is_external()
            && let Some(mut school) = self.repo.school(&student.school_id).cloned()
            && let Some(pos) = school
                .students
                .iter()
                .position(|s| !s.issued && s.name == student.name && s.dob == student.dob)
        {
            school.students[pos].issued = true;
            self.repo.update_school(school)?;
        }

        let record = self.issue(
            &student.id,
            &student.school_id,
            BOOKS_PER_STUDENT,
            by,
            IssueChannel::WalkIn,
        );
        info!(
            student = %student.id,
            remaining = self.inventory.remaining(),
            "collection recorded"
        );
        Ok(record)
    }

    /// Adds a walk-in student who is not on any school's roster.
    pub fn register_external(
        &mut self,
        name: &str,
        dob: &str,
        class_name: Option<&str>,
    ) -> Result<Student> {
        let name = name.trim();
        if name.chars().count() < crate::validate::STUDENT_NAME_MIN_LEN {
            return Err(FreeBooksError::InvalidInput(
                "name must be at least 2 characters".to_string(),
            ));
        }
        let dob = parse_dob(dob)
            .ok_or_else(|| FreeBooksError::InvalidInput("date of birth is invalid".to_string()))?;
        let student = Student {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            dob,
            school_id: EXTERNAL_SCHOOL.to_string(),
            class_name: class_name
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            issued: false,
            claimant_info: None,
        };
        self.repo.insert_student(student.clone());
        info!(student = %student.id, "external student registered");
        Ok(student)
    }
}
