//! Domain models for the import pipeline.
//!
//! - [`RawRow`] - one spreadsheet/CSV/JSON row, header label to string value
//! - [`ImportKind`] - which workflow a file belongs to
//! - [`Institution`] / [`InstitutionScope`] - local institution and the remote ids it maps to
//! - [`ReferenceEntity`] - canonical program/semester/regulation/course/session record
//! - [`MappingCandidate`] - a row awaiting resolution
//! - [`ValidationOutcome`] - terminal classification of one row
//! - [`UploadSummary`] - result of committing the valid rows

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A raw imported row: header label to cell value, as found in the file.
pub type RawRow = BTreeMap<String, String>;

/// Normalize a header label so `"Institution Code *"`, `"Institution Code"`
/// and `"institution_code"` all compare equal.
pub fn normalize_header(label: &str) -> String {
    label
        .trim()
        .trim_end_matches('*')
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .split('_')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

// =============================================================================
// Import Kind
// =============================================================================

/// The workflow a file is imported into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum ImportKind {
    /// Course offered in an examination session for a program semester.
    CourseOffering,
    /// Course placed in a program/regulation/semester curriculum.
    CourseMapping,
    /// Student registered for a course offering in an examination session.
    ExamRegistration,
}

impl ImportKind {
    /// CRUD resource the accepted rows are posted to.
    pub fn resource(&self) -> &'static str {
        match self {
            Self::CourseOffering => "course-management/course-offering",
            Self::CourseMapping => "course-management/course-mapping",
            Self::ExamRegistration => "exam-management/exam-registrations",
        }
    }

    /// Rows are placed in a program semester (offerings and mappings).
    pub fn requires_program(&self) -> bool {
        !matches!(self, Self::ExamRegistration)
    }

    pub fn requires_session(&self) -> bool {
        matches!(self, Self::CourseOffering | Self::ExamRegistration)
    }

    pub fn requires_regulation(&self) -> bool {
        matches!(self, Self::CourseMapping)
    }

    pub fn requires_student(&self) -> bool {
        matches!(self, Self::ExamRegistration)
    }
}

impl fmt::Display for ImportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CourseOffering => write!(f, "course-offering"),
            Self::CourseMapping => write!(f, "course-mapping"),
            Self::ExamRegistration => write!(f, "exam-registration"),
        }
    }
}

impl FromStr for ImportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_header(s).as_str() {
            "course_offering" | "offering" => Ok(Self::CourseOffering),
            "course_mapping" | "mapping" => Ok(Self::CourseMapping),
            "exam_registration" | "registration" => Ok(Self::ExamRegistration),
            other => Err(format!("unknown import kind '{}'", other)),
        }
    }
}

// =============================================================================
// Reference Entities
// =============================================================================

/// Kind of reference record a code resolves to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Institution,
    Program,
    Semester,
    Regulation,
    Course,
    Session,
    /// Course offering, the course a student registers for.
    Offering,
    Student,
}

impl ReferenceKind {
    /// Capitalised label used in row messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Institution => "Institution",
            Self::Program => "Program",
            Self::Semester => "Semester",
            Self::Regulation => "Regulation",
            Self::Course => "Course",
            Self::Session => "Session",
            Self::Offering => "Course offering",
            Self::Student => "Student",
        }
    }

    /// Plural used in "not found in available ..." messages.
    pub fn plural(&self) -> &'static str {
        match self {
            Self::Institution => "institutions",
            Self::Program => "programs",
            Self::Semester => "semesters",
            Self::Regulation => "regulations",
            Self::Course => "courses",
            Self::Session => "sessions",
            Self::Offering => "course offerings",
            Self::Student => "students",
        }
    }

    /// Whether records of this kind live in the remote reference service.
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Program | Self::Semester | Self::Regulation)
    }
}

/// A canonical reference record after alias normalization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferenceEntity {
    pub kind: ReferenceKind,
    /// Stable identifier in its system of record.
    pub id: String,
    /// Human code (program code, course code, ...).
    pub code: String,
    /// Display name.
    pub name: String,
    /// Institution the record was fetched under: a remote id for remote kinds,
    /// the local institution id for local kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub institution_id: Option<String>,
    /// Owning program (semesters only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    /// Semester number / ordering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
}

/// A local institution record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Institution {
    pub id: String,
    pub code: String,
    pub name: String,
    /// Remote reference ids (aided, self-financing, ...) this institution maps to.
    #[serde(default)]
    pub remote_ids: Vec<String>,
}

impl Institution {
    pub fn scope(&self) -> InstitutionScope {
        InstitutionScope {
            institution_id: self.id.clone(),
            institution_code: self.code.clone(),
            remote_ids: self.remote_ids.clone(),
        }
    }
}

/// Bound for every reference query made on behalf of one institution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct InstitutionScope {
    pub institution_id: String,
    pub institution_code: String,
    /// Ordered remote ids; empty means no remote data may be returned.
    pub remote_ids: Vec<String>,
}

impl InstitutionScope {
    pub fn new(
        institution_id: impl Into<String>,
        institution_code: impl Into<String>,
        remote_ids: Vec<String>,
    ) -> Self {
        Self {
            institution_id: institution_id.into(),
            institution_code: institution_code.into(),
            remote_ids,
        }
    }

    pub fn contains_remote(&self, id: &str) -> bool {
        self.remote_ids.iter().any(|r| r == id)
    }
}

// =============================================================================
// Candidates
// =============================================================================

/// The human codes of one row, as entered.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RowCodes {
    pub institution_code: String,
    pub program_code: String,
    pub regulation_code: String,
    pub semester_code: String,
    pub semester_name: String,
    pub course_code: String,
    pub session_code: String,
    /// Student register number (registrations only).
    #[serde(default)]
    pub register_no: String,
}

impl RowCodes {
    /// Value used to look up the semester: the code when given, else the name.
    pub fn semester_key(&self) -> &str {
        if self.semester_code.is_empty() {
            &self.semester_name
        } else {
            &self.semester_code
        }
    }

    /// Semester as shown in the preview: the name when given, else the code.
    pub fn semester_display(&self) -> &str {
        if self.semester_name.is_empty() {
            &self.semester_code
        } else {
            &self.semester_name
        }
    }

    /// Short label for error lists: `JKKN / BCA / BCA101`, or
    /// `JKKN / REG001 / BCA101` for registrations.
    pub fn label(&self) -> String {
        [
            &self.institution_code,
            &self.program_code,
            &self.register_no,
            &self.course_code,
        ]
            .iter()
            .filter(|s| !s.is_empty())
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" / ")
    }
}

/// A row awaiting resolution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MappingCandidate {
    /// 1-based row number as seen in the file, header included.
    pub row_number: usize,
    pub codes: RowCodes,
    /// Remaining non-empty cells keyed by normalized header.
    pub attributes: BTreeMap<String, String>,
}

const CODE_FIELDS: [&str; 8] = [
    "institution_code",
    "program_code",
    "regulation_code",
    "semester_code",
    "semester_name",
    "course_code",
    "session_code",
    "student_register_no",
];

impl MappingCandidate {
    /// Build a candidate from a raw row at `index` (0-based data index).
    pub fn from_raw(index: usize, raw: &RawRow) -> Self {
        let mut normalized: BTreeMap<String, String> = BTreeMap::new();
        for (label, value) in raw {
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            let key = canonical_key(&normalize_header(label));
            normalized.entry(key).or_insert_with(|| value.to_string());
        }

        let mut take = |key: &str| normalized.remove(key).unwrap_or_default();
        let codes = RowCodes {
            institution_code: take(CODE_FIELDS[0]),
            program_code: take(CODE_FIELDS[1]),
            regulation_code: take(CODE_FIELDS[2]),
            semester_code: take(CODE_FIELDS[3]),
            semester_name: take(CODE_FIELDS[4]),
            course_code: take(CODE_FIELDS[5]),
            session_code: take(CODE_FIELDS[6]),
            register_no: take(CODE_FIELDS[7]),
        };

        Self {
            row_number: index + 2,
            codes,
            attributes: normalized,
        }
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }
}

/// Header aliases seen in templates exported by different pages.
fn canonical_key(normalized: &str) -> String {
    match normalized {
        "institution" => "institution_code",
        "program" | "program_id" => "program_code",
        "regulation" => "regulation_code",
        "course" => "course_code",
        "session" | "exam_session_code" | "examination_session_code" => "session_code",
        "student_register_number" | "register_number" | "register_no" | "stu_register_no" => {
            "student_register_no"
        }
        "transaction_id" => "payment_transaction_id",
        other => other,
    }
    .to_string()
}

/// A candidate whose codes all resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCandidate {
    pub kind: ImportKind,
    pub candidate: MappingCandidate,
    pub scope: InstitutionScope,
    /// Program and semester; absent for registrations.
    pub program: Option<ReferenceEntity>,
    pub semester: Option<ReferenceEntity>,
    /// The course, or for registrations the course offering.
    pub course: ReferenceEntity,
    pub regulation: Option<ReferenceEntity>,
    pub session: Option<ReferenceEntity>,
    pub student: Option<ReferenceEntity>,
}

/// Canonical identifiers of an accepted row, ready to persist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedRecord {
    pub institution_id: String,
    pub institution_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub program_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semester_number: Option<u32>,
    /// Course id, or the course offering id for registrations.
    pub course_id: String,
    pub course_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regulation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub register_no: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl From<&ResolvedCandidate> for ResolvedRecord {
    fn from(r: &ResolvedCandidate) -> Self {
        Self {
            institution_id: r.scope.institution_id.clone(),
            institution_code: r.scope.institution_code.clone(),
            program_id: r.program.as_ref().map(|e| e.id.clone()),
            program_code: r.program.as_ref().map(|e| e.code.clone()),
            semester_id: r.semester.as_ref().map(|e| e.id.clone()),
            semester_code: r.semester.as_ref().map(|e| e.code.clone()),
            semester_name: r.semester.as_ref().map(|e| e.name.clone()),
            semester_number: r.semester.as_ref().and_then(|e| e.ordinal),
            course_id: r.course.id.clone(),
            course_code: r.course.code.clone(),
            regulation_id: r.regulation.as_ref().map(|e| e.id.clone()),
            regulation_code: r.regulation.as_ref().map(|e| e.code.clone()),
            session_id: r.session.as_ref().map(|e| e.id.clone()),
            session_code: r.session.as_ref().map(|e| e.code.clone()),
            student_id: r.student.as_ref().map(|e| e.id.clone()),
            register_no: r.student.as_ref().map(|e| e.code.clone()),
            attributes: r.candidate.attributes.clone(),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Terminal classification of one imported row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ValidationOutcome {
    /// Every code resolved and every check passed.
    Valid {
        row_number: usize,
        codes: RowCodes,
        record: ResolvedRecord,
    },
    /// At least one problem; all collected messages in order.
    Error {
        row_number: usize,
        codes: RowCodes,
        errors: Vec<String>,
    },
}

impl ValidationOutcome {
    pub fn error(candidate: &MappingCandidate, errors: Vec<String>) -> Self {
        Self::Error {
            row_number: candidate.row_number,
            codes: candidate.codes.clone(),
            errors,
        }
    }

    pub fn row_number(&self) -> usize {
        match self {
            Self::Valid { row_number, .. } | Self::Error { row_number, .. } => *row_number,
        }
    }

    pub fn codes(&self) -> &RowCodes {
        match self {
            Self::Valid { codes, .. } | Self::Error { codes, .. } => codes,
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    /// Error messages; empty for valid rows.
    pub fn errors(&self) -> &[String] {
        match self {
            Self::Valid { .. } => &[],
            Self::Error { errors, .. } => errors,
        }
    }
}

/// One line of the preview table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRow {
    pub row_number: usize,
    pub status: String,
    pub institution: String,
    pub course: String,
    pub session: String,
    pub program: String,
    pub semester: String,
    pub errors: Vec<String>,
}

impl From<&ValidationOutcome> for PreviewRow {
    fn from(outcome: &ValidationOutcome) -> Self {
        let codes = outcome.codes();
        Self {
            row_number: outcome.row_number(),
            status: if outcome.is_valid() { "valid" } else { "error" }.to_string(),
            institution: codes.institution_code.clone(),
            course: codes.course_code.clone(),
            session: codes.session_code.clone(),
            program: codes.program_code.clone(),
            semester: codes.semester_display().to_string(),
            errors: outcome.errors().to_vec(),
        }
    }
}

// =============================================================================
// Upload Summary
// =============================================================================

/// A row the backend refused at commit time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UploadError {
    pub row: usize,
    pub label: String,
    pub message: String,
}

/// Result of committing the valid rows of a preview.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UploadSummary {
    /// Number of valid rows offered for commit.
    pub total: usize,
    pub success: usize,
    pub failed: usize,
    /// Set when the loop was abandoned between rows.
    #[serde(default)]
    pub cancelled: bool,
    #[serde(default)]
    pub errors: Vec<UploadError>,
}

// =============================================================================
// Tests
// =============================================================================
