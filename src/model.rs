use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Books handed out per student, whether through a school delivery or a walk-in.
pub const BOOKS_PER_STUDENT: u64 = 20;

/// Marker stored in `Student::school_id` for walk-ins with no school record.
pub const EXTERNAL_SCHOOL: &str = "external";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchoolStatus {
    Pending,
    Approved,
    Delivered,
    Rejected,
}

impl SchoolStatus {
    /// Review moves pending records on; only a rejected record can be resubmitted.
    pub fn can_transition(self, to: SchoolStatus) -> bool {
        matches!(
            (self, to),
            (SchoolStatus::Pending, SchoolStatus::Approved)
                | (SchoolStatus::Pending, SchoolStatus::Rejected)
                | (SchoolStatus::Approved, SchoolStatus::Delivered)
                | (SchoolStatus::Rejected, SchoolStatus::Pending)
        )
    }
}

impl fmt::Display for SchoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SchoolStatus::Pending => "pending",
            SchoolStatus::Approved => "approved",
            SchoolStatus::Delivered => "delivered",
            SchoolStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    School,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Staff => "staff",
            Role::School => "school",
        };
        f.write_str(s)
    }
}

/// One class line of a submission: how many students the school claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassEntry {
    pub class_name: String,
    pub declared_count: i64,
}

/// A roster line as typed or imported; `dob` stays raw until validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentEntry {
    pub name: String,
    pub dob: String,
    pub class_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

/// What a school representative sends in before it becomes a `School`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub classes: Vec<ClassEntry>,
    #[serde(default)]
    pub students: Vec<StudentEntry>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
}

/// A roster student attached to a school record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterStudent {
    pub name: String,
    pub dob: NaiveDate,
    pub class_name: String,
    #[serde(default)]
    pub issued: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub id: String,
    pub name: String,
    pub total_declared: i64,
    pub classes: Vec<ClassEntry>,
    #[serde(default)]
    pub students: Vec<RosterStudent>,
    pub status: SchoolStatus,
    #[serde(default)]
    pub delivery_proofs: Vec<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub contact: Option<ContactInfo>,
    #[serde(default)]
    pub submitted_by: Option<String>,
    #[serde(default)]
    pub reviewed_by: Option<String>,
    #[serde(default)]
    pub review_note: Option<String>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Who turned up at the desk to collect on a student's behalf.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimantInfo {
    pub voter_id: String,
    #[serde(default)]
    pub proof_urls: Vec<String>,
    #[serde(default)]
    pub claimant_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub name: String,
    pub dob: NaiveDate,
    /// A school id, or [`EXTERNAL_SCHOOL`].
    pub school_id: String,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub issued: bool,
    #[serde(default)]
    pub claimant_info: Option<ClaimantInfo>,
}

impl Student {
    pub fn is_external(&self) -> bool {
        self.school_id == EXTERNAL_SCHOOL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IssueChannel {
    SchoolDelivery,
    WalkIn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueRecord {
    pub id: String,
    pub student_id: String,
    pub school_id: String,
    pub books: u64,
    pub issued_at: DateTime<Utc>,
    pub issued_by: String,
    pub channel: IssueChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    /// Compared as plain text; there is no credential hardening here.
    pub password: String,
    pub role: Role,
    #[serde(default)]
    pub school_id: Option<String>,
}
