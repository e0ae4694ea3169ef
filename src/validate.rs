//! Submission checks for school enrollment drafts.
//!
//! Problems are split into blocking errors and warnings. Only errors make a
//! draft invalid; a declared-versus-roster mismatch is always a warning.

use crate::model::{ClassEntry, ContactInfo, StudentEntry, SubmissionDraft};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

pub const NAME_MIN_LEN: usize = 2;
pub const NAME_MAX_LEN: usize = 100;
pub const NOTES_MAX_LEN: usize = 500;
pub const STUDENT_NAME_MIN_LEN: usize = 2;
pub const MIN_AGE: i32 = 5;
pub const MAX_AGE: i32 = 18;
pub const HIGH_TOTAL_DECLARED: i64 = 5000;
pub const HIGH_CLASS_DECLARED: i64 = 1000;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9\s\-()]{7,20}$").expect("phone pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationResult {
    fn from_parts(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }
}

/// Outcome of checking one roster line against the per-student rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StudentCheck {
    pub dob: Option<NaiveDate>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReconciliation {
    pub class_name: String,
    pub declared: i64,
    pub actual: usize,
}

impl ClassReconciliation {
    pub fn matches(&self) -> bool {
        self.declared == self.actual as i64
    }
}

/// Sum of declared counts across classes, or `None` if it overflows.
pub fn total_declared(classes: &[ClassEntry]) -> Option<i64> {
    classes
        .iter()
        .try_fold(0i64, |acc, c| acc.checked_add(c.declared_count))
}

/// Parses the date formats accepted for a date of birth.
pub fn parse_dob(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|dt| dt.date())
}

/// Calendar-year age, ignoring month and day.
pub fn age_in_year(dob: NaiveDate, current_year: i32) -> i32 {
    current_year - dob.year()
}

pub fn age_out_of_range(age: i32) -> bool {
    !(MIN_AGE..=MAX_AGE).contains(&age)
}

pub fn check_student(entry: &StudentEntry, current_year: i32) -> StudentCheck {
    let mut check = StudentCheck::default();

    if entry.name.trim().chars().count() < STUDENT_NAME_MIN_LEN {
        check
            .errors
            .push(format!("name must be at least {STUDENT_NAME_MIN_LEN} characters"));
    }

    match parse_dob(&entry.dob) {
        Some(dob) => {
            check.dob = Some(dob);
            let age = age_in_year(dob, current_year);
            if age_out_of_range(age) {
                check.warnings.push(format!(
                    "age {age} is outside the expected range {MIN_AGE}-{MAX_AGE}"
                ));
            }
        }
        None => check.errors.push("date of birth is invalid".to_string()),
    }

    if entry.class_name.trim().is_empty() {
        check.errors.push("class name is required".to_string());
    }

    check
}

/// Validates a draft as of `today`. Pure; touches no storage.
pub fn validate_school_submission(draft: &SubmissionDraft, today: NaiveDate) -> ValidationResult {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let name_len = draft.name.trim().chars().count();
    if !(NAME_MIN_LEN..=NAME_MAX_LEN).contains(&name_len) {
        errors.push(format!(
            "School name must be between {NAME_MIN_LEN} and {NAME_MAX_LEN} characters"
        ));
    }

    let total = check_classes(&draft.classes, &mut errors, &mut warnings);

    let current_year = today.year();
    for (i, student) in draft.students.iter().enumerate() {
        let check = check_student(student, current_year);
        let label = format!("Student {}", i + 1);
        errors.extend(check.errors.iter().map(|e| format!("{label}: {e}")));
        warnings.extend(
            check
                .warnings
                .iter()
                .map(|w| format!("{label} ({}): {w}", student.name.trim())),
        );
    }

    if !draft.students.is_empty() && draft.students.len() as i64 != total {
        warnings.push(format!(
            "Student count ({}) does not match total declared ({total})",
            draft.students.len()
        ));
    }

    if let Some(notes) = &draft.notes
        && notes.chars().count() > NOTES_MAX_LEN
    {
        errors.push(format!("Notes must be {NOTES_MAX_LEN} characters or fewer"));
    }

    if let Some(contact) = &draft.contact {
        check_contact(contact, &mut errors, &mut warnings);
    }

    ValidationResult::from_parts(errors, warnings)
}

fn check_classes(classes: &[ClassEntry], errors: &mut Vec<String>, warnings: &mut Vec<String>) -> i64 {
    if classes.is_empty() {
        errors.push("At least one class is required".to_string());
        return 0;
    }

    let mut seen = HashSet::new();
    for (i, class) in classes.iter().enumerate() {
        let name = class.class_name.trim();
        if name.is_empty() {
            errors.push(format!("Class {}: class name is required", i + 1));
        } else if !seen.insert(name.to_lowercase()) {
            errors.push(format!("Duplicate class name: {name}"));
        }

        if class.declared_count <= 0 {
            errors.push(format!(
                "Class {}: declared count must be greater than 0",
                i + 1
            ));
        } else if class.declared_count > HIGH_CLASS_DECLARED {
            warnings.push(format!(
                "Class {name} declared count ({}) is unusually high",
                class.declared_count
            ));
        }
    }

    let Some(total) = total_declared(classes) else {
        errors.push("Total declared count is too large".to_string());
        return 0;
    };
    if total <= 0 {
        errors.push("Total declared students must be greater than 0".to_string());
    } else if total > HIGH_TOTAL_DECLARED {
        warnings.push(format!("Total declared count ({total}) is unusually high"));
    }
    total
}

fn check_contact(contact: &ContactInfo, errors: &mut Vec<String>, warnings: &mut Vec<String>) {
    if let Some(email) = contact.email.as_deref().map(str::trim)
        && !email.is_empty()
        && !EMAIL_RE.is_match(email)
    {
        errors.push("Email address is invalid".to_string());
    }
    if let Some(phone) = contact.phone.as_deref().map(str::trim)
        && !phone.is_empty()
        && !PHONE_RE.is_match(phone)
    {
        warnings.push("Phone number format looks invalid".to_string());
    }
}

/// Declared count next to roster count, per class name (case-insensitive).
///
/// Roster classes that were never declared show up with `declared == 0`.
pub fn reconcile_classes<'a, I>(classes: &[ClassEntry], roster_classes: I) -> Vec<ClassReconciliation>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut actual: BTreeMap<String, usize> = BTreeMap::new();
    let mut display: BTreeMap<String, String> = BTreeMap::new();
    for class_name in roster_classes {
        let key = class_name.trim().to_lowercase();
        *actual.entry(key.clone()).or_default() += 1;
        display
            .entry(key)
            .or_insert_with(|| class_name.trim().to_string());
    }

    let mut out: Vec<ClassReconciliation> = classes
        .iter()
        .map(|c| {
            let key = c.class_name.trim().to_lowercase();
            ClassReconciliation {
                class_name: c.class_name.trim().to_string(),
                declared: c.declared_count,
                actual: actual.remove(&key).unwrap_or(0),
            }
        })
        .collect();

    out.extend(actual.into_iter().map(|(key, count)| ClassReconciliation {
        class_name: display.remove(&key).unwrap_or(key),
        declared: 0,
        actual: count,
    }));
    out
}
