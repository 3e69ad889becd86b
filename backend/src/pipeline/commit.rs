//! Commit Coordinator - persist the valid rows of a preview, one at a time.
//!
//! Rows are posted sequentially. A rejected row is recorded and the loop moves on;
//! nothing already written is rolled back.

use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::api::logs::{log_error, log_info, log_success, log_warning};
use crate::models::{ImportKind, ResolvedRecord, UploadError, UploadSummary, ValidationOutcome};
use crate::store::CrudBackend;
use crate::validation::{canonical_status, flag, row_is_active};

/// Shared flag to stop a commit between rows.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Posts accepted rows to the CRUD backend.
pub struct Committer<'a> {
    backend: &'a dyn CrudBackend,
    kind: ImportKind,
    cancel: CancelHandle,
}

impl<'a> Committer<'a> {
    pub fn new(backend: &'a dyn CrudBackend, kind: ImportKind) -> Self {
        Self {
            backend,
            kind,
            cancel: CancelHandle::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = cancel;
        self
    }

    /// Persist every `valid` outcome. `success + failed == total` unless cancelled.
    pub async fn commit(&self, outcomes: &[ValidationOutcome]) -> UploadSummary {
        let valid: Vec<_> = outcomes
            .iter()
            .filter_map(|o| match o {
                ValidationOutcome::Valid { row_number, codes, record } => {
                    Some((*row_number, codes, record))
                }
                ValidationOutcome::Error { .. } => None,
            })
            .collect();

        let mut summary = UploadSummary {
            total: valid.len(),
            ..Default::default()
        };
        log_info(format!(
            "Committing {} {} row(s) to {}",
            summary.total,
            self.kind,
            self.kind.resource()
        ));

        for (row, codes, record) in valid {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                log_warning(format!(
                    "Import cancelled after {} of {} rows",
                    summary.success + summary.failed,
                    summary.total
                ));
                break;
            }

            let body = request_body(self.kind, record);
            match self.backend.create(self.kind.resource(), &body).await {
                Ok(_) => summary.success += 1,
                Err(e) => {
                    log_error(format!("Row {}: {}", row, e));
                    summary.failed += 1;
                    summary.errors.push(UploadError {
                        row,
                        label: codes.label(),
                        message: e.to_string(),
                    });
                }
            }
        }

        if summary.failed == 0 && !summary.cancelled {
            log_success(format!("{} row(s) saved", summary.success));
        } else {
            log_warning(format!(
                "{} saved, {} failed",
                summary.success, summary.failed
            ));
        }
        summary
    }
}

/// JSON body for one persisted record, shaped for the resource the kind posts to.
///
/// Offerings use the backend's code-based import form (no `institutions_id`, so the
/// backend resolves the course mapping itself). Mappings send a fixed column set
/// since the backend inserts the body as-is. Registrations send resolved ids.
pub fn request_body(kind: ImportKind, record: &ResolvedRecord) -> Value {
    let mut body = Body::new(record);
    match kind {
        ImportKind::CourseOffering => {
            body.text("institution_code", Some(&record.institution_code));
            body.text("course_code", Some(&record.course_code));
            body.text("session_code", record.session_code.as_ref());
            body.text("program_code", record.program_code.as_ref());
            body.text("semester_code", record.semester_code.as_ref());
            match record.semester_number {
                Some(n) => body.set("semester", json!(n)),
                None => body.number("semester", None),
            }
            body.number("max_enrollment", None);
            body.number("enrolled_count", None);
            body.column("section");
            body.set("is_active", Value::Bool(row_is_active(&record.attributes)));
        }
        ImportKind::CourseMapping => {
            body.text("institution_code", Some(&record.institution_code));
            body.text("program_code", record.program_code.as_ref());
            body.text("regulation_code", record.regulation_code.as_ref());
            body.text("semester_code", record.semester_code.as_ref());
            body.text("course_id", Some(&record.course_id));
            body.text("course_code", Some(&record.course_code));
            body.set(
                "course_group",
                json!(record.attributes.get("course_group").map_or("General", |s| s.trim())),
            );
            body.number("course_order", Some(json!(0)));
            for key in MARK_COLUMNS {
                body.number(key, Some(json!(0)));
            }
            for key in ["annual_semester", "registration_based"] {
                body.flag(key, false);
            }
            body.set("is_active", Value::Bool(row_is_active(&record.attributes)));
        }
        ImportKind::ExamRegistration => {
            body.text("institutions_id", Some(&record.institution_id));
            body.text("student_id", record.student_id.as_ref());
            body.text("examination_session_id", record.session_id.as_ref());
            body.text("course_offering_id", Some(&record.course_id));
            body.text("stu_register_no", record.register_no.as_ref());
            body.text("institution_code", Some(&record.institution_code));
            body.text("session_code", record.session_code.as_ref());
            body.text("course_code", Some(&record.course_code));
            body.column("student_name");
            let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
            body.set(
                "registration_date",
                json!(record.attributes.get("registration_date").map_or(today, |d| d.trim().to_string())),
            );
            let status = registration_status_of(&record.attributes)
                .and_then(canonical_status)
                .unwrap_or("Pending");
            body.set("registration_status", json!(status));
            body.flag("is_regular", true);
            body.number("attempt_number", Some(json!(1)));
            body.flag("fee_paid", false);
            body.number("fee_amount", Some(Value::Null));
            for key in ["payment_date", "payment_transaction_id", "approved_date", "remarks"] {
                body.column(key);
            }
        }
    }
    body.into_value()
}

const MARK_COLUMNS: [&str; 8] = [
    "internal_max_mark",
    "internal_pass_mark",
    "internal_converted_mark",
    "external_max_mark",
    "external_pass_mark",
    "external_converted_mark",
    "total_max_mark",
    "total_pass_mark",
];

fn registration_status_of(attributes: &BTreeMap<String, String>) -> Option<&str> {
    attributes
        .get("registration_status")
        .or_else(|| attributes.get("status"))
        .map(|s| s.as_str())
}

struct Body<'a> {
    map: Map<String, Value>,
    attributes: &'a BTreeMap<String, String>,
}

impl<'a> Body<'a> {
    fn new(record: &'a ResolvedRecord) -> Self {
        Self {
            map: Map::new(),
            attributes: &record.attributes,
        }
    }

    fn set(&mut self, key: &str, value: Value) {
        self.map.insert(key.to_string(), value);
    }

    fn text(&mut self, key: &str, value: Option<&String>) {
        if let Some(v) = value {
            self.set(key, Value::String(v.clone()));
        }
    }

    /// Copy a row column as text when present.
    fn column(&mut self, key: &str) {
        if let Some(v) = self.attributes.get(key) {
            self.set(key, Value::String(v.trim().to_string()));
        }
    }

    /// Row column as a JSON number, else `default` when given.
    fn number(&mut self, key: &str, default: Option<Value>) {
        match self.attributes.get(key).and_then(|v| number(v)) {
            Some(n) => self.set(key, n),
            None => {
                if let Some(d) = default {
                    self.set(key, d);
                }
            }
        }
    }

    fn flag(&mut self, key: &str, default: bool) {
        let value = self.attributes.get(key).and_then(|v| flag(v)).unwrap_or(default);
        self.set(key, Value::Bool(value));
    }

    fn into_value(self) -> Value {
        Value::Object(self.map)
    }
}

fn number(value: &str) -> Option<Value> {
    let v = value.trim();
    if let Ok(i) = v.parse::<i64>() {
        return Some(json!(i));
    }
    v.parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}
