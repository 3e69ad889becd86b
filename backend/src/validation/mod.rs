//! Consistency validation for import rows.
//!
//! Two passes, both collecting every failure:
//!
//! - [`check_fields`] looks only at the raw cells (required codes, numeric
//!   ranges, enumerated values). It runs before any reference lookup.
//! - [`check_ownership`] looks at the resolved records and checks that they
//!   belong together (course and session to the institution, semester to the
//!   program, remote records to one of the scope's remote ids).
//!
//! [`validate`] runs both and classifies the row.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::models::{ImportKind, MappingCandidate, ResolvedCandidate, ResolvedRecord, ValidationOutcome};

/// Registration status values, matched case-insensitively.
pub const REGISTRATION_STATUSES: [&str; 5] =
    ["Pending", "Approved", "Rejected", "Cancelled", "Completed"];

/// Values of the `Status` column on offering and mapping templates.
pub const ACTIVE_STATUSES: [&str; 2] = ["Active", "Inactive"];

/// Largest fee a registration may carry.
const MAX_FEE: f64 = 999_999.99;

/// Registration columns that must hold `TRUE` or `FALSE`.
const REGISTRATION_FLAGS: [(&str, &str); 2] = [("is_regular", "Is regular"), ("fee_paid", "Fee paid")];

/// Mapping columns holding `Yes` or `No`.
const YES_NO_FIELDS: [(&str, &str); 2] = [
    ("annual_semester", "Annual semester"),
    ("registration_based", "Registration based"),
];

/// Optional registration dates, `YYYY-MM-DD`.
const DATE_FIELDS: [(&str, &str); 3] = [
    ("registration_date", "Registration date"),
    ("payment_date", "Payment date"),
    ("approved_date", "Approved date"),
];

static TRANSACTION_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Mark columns on course mappings, all bounded to 0..=100.
const MARK_FIELDS: [(&str, &str); 8] = [
    ("internal_max_mark", "Internal max mark"),
    ("internal_pass_mark", "Internal pass mark"),
    ("internal_converted_mark", "Internal converted mark"),
    ("external_max_mark", "External max mark"),
    ("external_pass_mark", "External pass mark"),
    ("external_converted_mark", "External converted mark"),
    ("total_max_mark", "Total max mark"),
    ("total_pass_mark", "Total pass mark"),
];

const PASS_WITHIN_MAX: [(&str, &str, &str); 3] = [
    ("internal_pass_mark", "internal_max_mark", "Internal"),
    ("external_pass_mark", "external_max_mark", "External"),
    ("total_pass_mark", "total_max_mark", "Total"),
];

// =============================================================================
// Cell values
// =============================================================================

/// Registration status of a row: `Registration Status`, else `Status`.
pub fn registration_status(candidate: &MappingCandidate) -> Option<&str> {
    candidate
        .attribute("registration_status")
        .or_else(|| candidate.attribute("status"))
}

/// Canonical spelling of a registration status, if it is one.
pub fn canonical_status(value: &str) -> Option<&'static str> {
    REGISTRATION_STATUSES
        .iter()
        .find(|s| s.eq_ignore_ascii_case(value.trim()))
        .copied()
}

/// `Some(true)` for TRUE/Yes/Active, `Some(false)` for FALSE/No/Inactive.
pub fn flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "active" => Some(true),
        "false" | "no" | "inactive" => Some(false),
        _ => None,
    }
}

/// Whether an offering or mapping row is active: the `Status` column, else
/// `is_active`, else active.
pub fn row_is_active(attributes: &BTreeMap<String, String>) -> bool {
    attributes
        .get("status")
        .or_else(|| attributes.get("is_active"))
        .and_then(|v| flag(v))
        .unwrap_or(true)
}

// =============================================================================
// Field checks
// =============================================================================

/// Required code columns that are blank, as messages.
pub fn missing_required(kind: ImportKind, candidate: &MappingCandidate) -> Vec<String> {
    let codes = &candidate.codes;
    let mut errors = Vec::new();

    if codes.institution_code.is_empty() {
        errors.push("Institution code is required".to_string());
    }
    if kind.requires_program() {
        if codes.program_code.is_empty() {
            errors.push("Program code is required".to_string());
        }
        if codes.semester_key().is_empty() {
            errors.push("Semester code or name is required".to_string());
        }
    }
    if kind.requires_regulation() && codes.regulation_code.is_empty() {
        errors.push("Regulation code is required".to_string());
    }
    if kind.requires_student() && codes.register_no.is_empty() {
        errors.push("Student register number is required".to_string());
    }
    if codes.course_code.is_empty() {
        errors.push("Course code is required".to_string());
    }
    if kind.requires_session() && codes.session_code.is_empty() {
        errors.push("Session code is required".to_string());
    }
    errors
}

/// Every check that needs no reference data.
pub fn check_fields(kind: ImportKind, candidate: &MappingCandidate) -> Vec<String> {
    let mut errors = missing_required(kind, candidate);
    match kind {
        ImportKind::CourseOffering => {
            check_semester_number(candidate, &mut errors);
            check_enrollment(candidate, &mut errors);
            check_active_status(candidate, &mut errors);
        }
        ImportKind::CourseMapping => {
            check_semester_number(candidate, &mut errors);
            check_marks(candidate, &mut errors);
            check_active_status(candidate, &mut errors);
            for (key, label) in YES_NO_FIELDS {
                if let Some(value) = candidate.attribute(key) {
                    if flag(value).is_none() {
                        errors.push(format!("{} must be Yes or No", label));
                    }
                }
            }
        }
        ImportKind::ExamRegistration => check_registration(candidate, &mut errors),
    }
    errors
}

/// `None` when the cell is absent, `Some(Err(()))` when it is not a finite number.
fn number(candidate: &MappingCandidate, key: &str) -> Option<Result<f64, ()>> {
    let value = candidate.attribute(key)?;
    Some(match value.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(n),
        _ => Err(()),
    })
}

fn is_whole(n: f64) -> bool {
    n.fract() == 0.0
}

fn check_semester_number(candidate: &MappingCandidate, errors: &mut Vec<String>) {
    for key in ["semester", "semester_number"] {
        match number(candidate, key) {
            Some(Ok(n)) if is_whole(n) && (1.0..=12.0).contains(&n) => {}
            Some(_) => errors.push("Semester must be between 1 and 12".to_string()),
            None => {}
        }
    }
}

fn check_enrollment(candidate: &MappingCandidate, errors: &mut Vec<String>) {
    let max = match number(candidate, "max_enrollment") {
        Some(Ok(n)) if is_whole(n) && n > 0.0 => Some(n),
        Some(_) => {
            errors.push("Max enrollment must be greater than 0".to_string());
            None
        }
        None => None,
    };

    match number(candidate, "enrolled_count") {
        Some(Ok(n)) if n < 0.0 => errors.push("Enrolled count cannot be negative".to_string()),
        Some(Ok(n)) => {
            if let Some(max) = max {
                if n > max {
                    errors.push("Enrolled count cannot exceed max enrollment".to_string());
                }
            }
        }
        Some(Err(())) => errors.push("Enrolled count must be a number".to_string()),
        None => {}
    }
}

fn check_active_status(candidate: &MappingCandidate, errors: &mut Vec<String>) {
    if let Some(status) = candidate.attribute("status") {
        if !ACTIVE_STATUSES.iter().any(|s| s.eq_ignore_ascii_case(status.trim())) {
            errors.push(format!("Status must be Active or Inactive (got \"{}\")", status));
        }
    }
    if let Some(value) = candidate.attribute("is_active") {
        let v = value.trim();
        if !v.eq_ignore_ascii_case("true") && !v.eq_ignore_ascii_case("false") {
            errors.push("Is active must be TRUE or FALSE".to_string());
        }
    }
}

fn check_registration(candidate: &MappingCandidate, errors: &mut Vec<String>) {
    match number(candidate, "attempt_number") {
        Some(Ok(n)) if is_whole(n) && (1.0..=10.0).contains(&n) => {}
        Some(_) => errors.push("Attempt number must be between 1 and 10".to_string()),
        None => {}
    }

    match number(candidate, "fee_amount") {
        Some(Ok(n)) if n < 0.0 => errors.push("Fee amount cannot be negative".to_string()),
        Some(Ok(n)) if n > MAX_FEE => {
            errors.push("Fee amount cannot exceed 999,999.99".to_string())
        }
        Some(Err(())) => errors.push("Fee amount must be a number".to_string()),
        _ => {}
    }

    if let Some(status) = registration_status(candidate) {
        if canonical_status(status).is_none() {
            errors.push(format!(
                "Registration status must be one of {} (got \"{}\")",
                REGISTRATION_STATUSES.join(", "),
                status
            ));
        }
    }

    for (key, label) in REGISTRATION_FLAGS {
        if let Some(value) = candidate.attribute(key) {
            let v = value.trim();
            if !v.eq_ignore_ascii_case("true") && !v.eq_ignore_ascii_case("false") {
                errors.push(format!("{} must be TRUE or FALSE", label));
            }
        }
    }

    for (key, label) in DATE_FIELDS {
        if let Some(value) = candidate.attribute(key) {
            if NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").is_err() {
                errors.push(format!("{} must be a valid date (YYYY-MM-DD)", label));
            }
        }
    }

    if let Some(txn) = candidate.attribute("payment_transaction_id") {
        if !TRANSACTION_ID.is_match(txn) {
            errors.push(
                "Transaction ID can only contain letters, numbers, hyphens and underscores"
                    .to_string(),
            );
        }
    }
}

fn check_marks(candidate: &MappingCandidate, errors: &mut Vec<String>) {
    for (key, label) in MARK_FIELDS {
        match number(candidate, key) {
            Some(Ok(n)) if (0.0..=100.0).contains(&n) => {}
            Some(_) => errors.push(format!("{} must be between 0 and 100", label)),
            None => {}
        }
    }

    for (pass, max, label) in PASS_WITHIN_MAX {
        if let (Some(Ok(p)), Some(Ok(m))) = (number(candidate, pass), number(candidate, max)) {
            if p > m {
                errors.push(format!(
                    "{} pass mark cannot exceed {} max mark",
                    label,
                    label.to_lowercase()
                ));
            }
        }
    }

    match number(candidate, "course_order") {
        Some(Ok(n)) if is_whole(n) && n >= 0.0 => {}
        Some(_) => errors.push("Course order must be a whole number of 0 or more".to_string()),
        None => {}
    }
}

// =============================================================================
// Ownership checks
// =============================================================================

/// Cross-entity consistency of a fully resolved row.
pub fn check_ownership(resolved: &ResolvedCandidate) -> Vec<String> {
    let scope = &resolved.scope;
    let codes = &resolved.candidate.codes;
    let mut errors = Vec::new();
    let local_owned = |id: &Option<String>| id.as_deref() == Some(scope.institution_id.as_str());

    if let Some(session) = &resolved.session {
        if !local_owned(&session.institution_id) {
            errors.push(format!(
                "Session \"{}\" does not belong to institution \"{}\"",
                session.code, scope.institution_code
            ));
        }
    }

    if !local_owned(&resolved.course.institution_id) {
        errors.push(format!(
            "Course \"{}\" does not belong to institution \"{}\"",
            resolved.course.code, scope.institution_code
        ));
    }

    if let Some(student) = &resolved.student {
        if !local_owned(&student.institution_id) {
            errors.push(format!(
                "Student \"{}\" does not belong to institution \"{}\"",
                student.code, scope.institution_code
            ));
        }
    }

    if let (Some(program), Some(semester)) = (&resolved.program, &resolved.semester) {
        if semester.program_id.as_deref() != Some(program.id.as_str()) {
            errors.push(format!(
                "Semester \"{}\" does not belong to program \"{}\"",
                codes.semester_key(),
                program.code
            ));
        }
    }

    let remote_owned = |id: &Option<String>| id.as_deref().is_some_and(|i| scope.contains_remote(i));

    if let Some(program) = &resolved.program {
        if !remote_owned(&program.institution_id) {
            errors.push(format!(
                "Program \"{}\" does not belong to institution \"{}\"",
                program.code, scope.institution_code
            ));
        }
    }

    if let Some(regulation) = &resolved.regulation {
        if !remote_owned(&regulation.institution_id) {
            errors.push(format!(
                "Regulation \"{}\" does not belong to institution \"{}\"",
                regulation.code, scope.institution_code
            ));
        }
    }

    if let Some(n) = resolved.semester.as_ref().and_then(|s| s.ordinal) {
        if !(1..=12).contains(&n) {
            errors.push("Semester must be between 1 and 12".to_string());
        }
    }

    errors
}

/// Classify a resolved row. `valid` only when no check fails.
pub fn validate(resolved: &ResolvedCandidate) -> ValidationOutcome {
    let mut errors = check_fields(resolved.kind, &resolved.candidate);
    errors.extend(check_ownership(resolved));

    if errors.is_empty() {
        ValidationOutcome::Valid {
            row_number: resolved.candidate.row_number,
            codes: resolved.candidate.codes.clone(),
            record: ResolvedRecord::from(resolved),
        }
    } else {
        ValidationOutcome::error(&resolved.candidate, errors)
    }
}
