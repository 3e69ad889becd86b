//! Field alias normalization for reference records.
//!
//! The remote service and the local backend disagree on field names (and the
//! remote service stores the program code in `program_id`). Everything is mapped
//! onto [`ReferenceEntity`] here so the rest of the crate sees one shape.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::models::{Institution, ReferenceEntity, ReferenceKind};

static TRAILING_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\d+)$").unwrap());
static ROMAN_NUMERAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(VIII|VII|VI|IV|V|III|II|I)\b").unwrap());
static ANY_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d+)\b").unwrap());

// =============================================================================
// Field access
// =============================================================================

/// Render a scalar JSON value as a trimmed string. Empty strings count as absent.
fn scalar(value: &Value) -> Option<String> {
    let s = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => return None,
    };
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// First present field among `keys`.
fn first_of(record: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|k| record.get(*k).and_then(scalar))
}

fn is_inactive(record: &Value) -> bool {
    match record.get("is_active") {
        Some(Value::Bool(b)) => !b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("false"),
        _ => false,
    }
}

struct Aliases {
    code: &'static [&'static str],
    name: &'static [&'static str],
}

fn aliases(kind: ReferenceKind) -> Aliases {
    match kind {
        ReferenceKind::Institution => Aliases {
            code: &["institution_code", "code"],
            name: &["institution_name", "name"],
        },
        // MyJKKN carries the program code in `program_id`.
        ReferenceKind::Program => Aliases {
            code: &["program_id", "program_code", "code"],
            name: &["program_name", "name", "title"],
        },
        ReferenceKind::Semester => Aliases {
            code: &["semester_code", "code"],
            name: &["semester_name", "name"],
        },
        ReferenceKind::Regulation => Aliases {
            code: &["regulation_code", "code"],
            name: &["regulation_name", "name", "title"],
        },
        ReferenceKind::Course => Aliases {
            code: &["course_code", "code"],
            name: &["course_name", "course_title", "name", "title"],
        },
        ReferenceKind::Session => Aliases {
            code: &["session_code", "exam_session_code", "code"],
            name: &["session_name", "exam_session_name", "name"],
        },
        ReferenceKind::Offering => Aliases {
            code: &["course_code", "code"],
            name: &["course_name", "course_title", "name"],
        },
        ReferenceKind::Student => Aliases {
            code: &["register_number", "stu_register_no", "register_no"],
            name: &["student_name", "name", "first_name"],
        },
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Map a raw record onto a [`ReferenceEntity`].
///
/// `fetched_under` is the institution id the query was scoped to; it is used when
/// the record does not state its own. Returns `None` for inactive records and
/// records without an id or any usable code/name.
pub fn normalize_entity(
    kind: ReferenceKind,
    record: &Value,
    fetched_under: &str,
) -> Option<ReferenceEntity> {
    if is_inactive(record) {
        return None;
    }

    let id = first_of(record, &["id"])?;
    let names = aliases(kind);
    let code = first_of(record, names.code).unwrap_or_default();
    let name = first_of(record, names.name).unwrap_or_default();
    if code.is_empty() && name.is_empty() {
        return None;
    }

    let institution_id = first_of(record, &["institution_id", "institutions_id"])
        .or_else(|| Some(fetched_under.to_string()));

    let (program_id, ordinal) = if kind == ReferenceKind::Semester {
        let number = record
            .get("semester_number")
            .and_then(scalar)
            .and_then(|n| n.parse::<u32>().ok());
        (
            first_of(record, &["program_id"]),
            number.or_else(|| semester_ordinal(&code, &name)),
        )
    } else {
        (None, None)
    };

    Some(ReferenceEntity {
        kind,
        id,
        code,
        name,
        institution_id,
        program_id,
        ordinal,
    })
}

/// Semester number from the code suffix (`BCA-3`), a Roman numeral in the name
/// (`Semester IV`), or any number in the name.
pub fn semester_ordinal(code: &str, name: &str) -> Option<u32> {
    if let Some(caps) = TRAILING_NUMBER.captures(code) {
        if let Ok(n) = caps[1].parse() {
            return Some(n);
        }
    }
    if let Some(caps) = ROMAN_NUMERAL.captures(name) {
        return roman_value(&caps[1]);
    }
    ANY_NUMBER
        .captures(name)
        .and_then(|caps| caps[1].parse().ok())
}

fn roman_value(numeral: &str) -> Option<u32> {
    let n = match numeral {
        "I" => 1,
        "II" => 2,
        "III" => 3,
        "IV" => 4,
        "V" => 5,
        "VI" => 6,
        "VII" => 7,
        "VIII" => 8,
        _ => return None,
    };
    Some(n)
}

/// Map a local institution record, reading its remote ids from
/// `myjkkn_institution_ids` (array or comma-separated string).
pub fn normalize_institution(record: &Value) -> Option<Institution> {
    if is_inactive(record) {
        return None;
    }
    let id = first_of(record, &["id"])?;
    let names = aliases(ReferenceKind::Institution);
    let code = first_of(record, names.code)?;
    let name = first_of(record, names.name).unwrap_or_default();

    let remote_ids = match record.get("myjkkn_institution_ids") {
        Some(Value::Array(items)) => items.iter().filter_map(scalar).collect(),
        Some(Value::String(s)) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    };

    Some(Institution { id, code, name, remote_ids })
}
