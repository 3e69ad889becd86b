//! In-memory fakes for the two I/O seams, shared by unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::{PersistenceError, PersistenceResult, ReferenceError, ReferenceResult};
use crate::models::{InstitutionScope, ReferenceKind};
use crate::reference::ReferenceService;
use crate::store::CrudBackend;

type RemoteKey = (ReferenceKind, String, Option<String>);

/// Remote reference service backed by a map.
#[derive(Default)]
pub struct FakeReference {
    records: HashMap<RemoteKey, Vec<Value>>,
    failing: HashSet<String>,
    calls: Mutex<Vec<RemoteKey>>,
}

impl FakeReference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: ReferenceKind, remote_id: &str, records: Vec<Value>) -> Self {
        self.records
            .entry((kind, remote_id.to_string(), None))
            .or_default()
            .extend(records);
        self
    }

    pub fn with_semesters(mut self, remote_id: &str, program_id: &str, records: Vec<Value>) -> Self {
        self.records
            .entry((
                ReferenceKind::Semester,
                remote_id.to_string(),
                Some(program_id.to_string()),
            ))
            .or_default()
            .extend(records);
        self
    }

    /// Every fetch for this remote id fails.
    pub fn failing(mut self, remote_id: &str) -> Self {
        self.failing.insert(remote_id.to_string());
        self
    }

    pub fn calls(&self) -> Vec<RemoteKey> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, kind: ReferenceKind) -> usize {
        self.calls().iter().filter(|(k, _, _)| *k == kind).count()
    }
}

#[async_trait]
impl ReferenceService for FakeReference {
    async fn fetch(
        &self,
        kind: ReferenceKind,
        remote_institution_id: &str,
        program_id: Option<&str>,
    ) -> ReferenceResult<Vec<Value>> {
        let key = (
            kind,
            remote_institution_id.to_string(),
            program_id.map(String::from),
        );
        self.calls.lock().unwrap().push(key.clone());

        if self.failing.contains(remote_institution_id) {
            return Err(ReferenceError::Status {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(self.records.get(&key).cloned().unwrap_or_default())
    }
}

/// Local CRUD backend backed by vectors.
#[derive(Default)]
pub struct FakeBackend {
    institutions: Vec<Value>,
    local: HashMap<(ReferenceKind, String), Vec<Value>>,
    reject: HashMap<String, String>,
    unreachable: HashSet<String>,
    list_calls: AtomicUsize,
    created: Mutex<Vec<(String, Value)>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_institution(mut self, record: Value) -> Self {
        self.institutions.push(record);
        self
    }

    pub fn with(mut self, kind: ReferenceKind, institution_id: &str, records: Vec<Value>) -> Self {
        self.local
            .entry((kind, institution_id.to_string()))
            .or_default()
            .extend(records);
        self
    }

    /// Creating a record for this course code answers `{ error: message }`.
    pub fn rejecting(mut self, course_code: &str, message: &str) -> Self {
        self.reject.insert(course_code.to_string(), message.to_string());
        self
    }

    /// Creating a record for this course code fails at the transport level.
    pub fn unreachable_for(mut self, course_code: &str) -> Self {
        self.unreachable.insert(course_code.to_string());
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> Vec<(String, Value)> {
        self.created.lock().unwrap().clone()
    }
}

#[async_trait]
impl CrudBackend for FakeBackend {
    async fn list_institutions(&self) -> ReferenceResult<Vec<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.institutions.clone())
    }

    async fn list(
        &self,
        kind: ReferenceKind,
        scope: &InstitutionScope,
    ) -> ReferenceResult<Vec<Value>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .local
            .get(&(kind, scope.institution_id.clone()))
            .cloned()
            .unwrap_or_default())
    }

    async fn create(&self, resource: &str, body: &Value) -> PersistenceResult<Value> {
        let course = body["course_code"].as_str().unwrap_or_default().to_string();
        if let Some(message) = self.reject.get(&course) {
            return Err(PersistenceError::Rejected {
                status: 400,
                message: message.clone(),
            });
        }
        if self.unreachable.contains(&course) {
            return Err(PersistenceError::Network("connection refused".into()));
        }
        self.created
            .lock()
            .unwrap()
            .push((resource.to_string(), body.clone()));
        Ok(body.clone())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub fn institution(id: &str, code: &str, remote_ids: &[&str]) -> Value {
    json!({
        "id": id,
        "institution_code": code,
        "name": format!("{} College", code),
        "myjkkn_institution_ids": remote_ids,
    })
}

pub fn program(id: &str, code: &str, remote_id: &str) -> Value {
    json!({
        "id": id,
        "program_id": code,
        "program_name": format!("Program {}", code),
        "institution_id": remote_id,
        "is_active": true,
    })
}

pub fn semester(id: &str, code: &str, name: &str, program_id: &str, number: u32) -> Value {
    json!({
        "id": id,
        "semester_code": code,
        "semester_name": name,
        "program_id": program_id,
        "semester_number": number,
    })
}

pub fn regulation(id: &str, code: &str, remote_id: &str) -> Value {
    json!({
        "id": id,
        "regulation_code": code,
        "name": format!("Regulation {}", code),
        "institution_id": remote_id,
    })
}

pub fn course(id: &str, code: &str, institution_id: &str) -> Value {
    json!({
        "id": id,
        "course_code": code,
        "course_title": format!("Course {}", code),
        "institutions_id": institution_id,
    })
}

pub fn session(id: &str, code: &str, institution_id: &str) -> Value {
    json!({
        "id": id,
        "session_code": code,
        "session_name": format!("Session {}", code),
        "institutions_id": institution_id,
    })
}

pub fn offering(id: &str, course_code: &str, institution_id: &str) -> Value {
    json!({
        "id": id,
        "course_code": course_code,
        "course_name": format!("Course {}", course_code),
        "institutions_id": institution_id,
    })
}

pub fn student(id: &str, register_no: &str, institution_id: &str) -> Value {
    json!({
        "id": id,
        "register_number": register_no,
        "first_name": format!("Student {}", register_no),
        "institution_id": institution_id,
    })
}
