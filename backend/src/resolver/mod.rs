//! Code Resolver - human codes to canonical reference records
//!
//! Every lookup is an exact, case-insensitive match against the cached lists of
//! one institution scope. Two or more distinct matches are treated as not found.

use std::fmt;

use crate::cache::ReferenceCache;
use crate::models::{Institution, InstitutionScope, ReferenceEntity, ReferenceKind};

/// Result of resolving one code.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    Found(T),
    NotFound(NotFound),
}

impl<T> Resolution<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Resolution::Found(v) => Some(v),
            Resolution::NotFound(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, NotFound> {
        match self {
            Resolution::Found(v) => Ok(v),
            Resolution::NotFound(nf) => Err(nf),
        }
    }
}

/// A code with no unique match.
#[derive(Debug, Clone, PartialEq)]
pub struct NotFound {
    pub kind: ReferenceKind,
    pub attempted: String,
    /// Codes that were available in scope (for logs; not shown per row).
    pub available: Vec<String>,
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            ReferenceKind::Institution => {
                write!(f, "Institution \"{}\" not found", self.attempted)
            }
            kind => write!(
                f,
                "{} \"{}\" not found in available {}",
                kind.label(),
                self.attempted,
                kind.plural()
            ),
        }
    }
}

/// Pick the single entity matching `code`. Several distinct matches count as none.
fn pick<'a, T>(items: &'a [T], matches: impl Fn(&T) -> bool) -> Option<&'a T>
where
    T: PartialEq,
{
    let mut found: Option<&T> = None;
    for item in items.iter().filter(|i| matches(i)) {
        match found {
            None => found = Some(item),
            Some(prev) if prev == item => {}
            Some(_) => return None,
        }
    }
    found
}

fn by_code(
    kind: ReferenceKind,
    entities: &[ReferenceEntity],
    code: &str,
) -> Resolution<ReferenceEntity> {
    let wanted = code.trim();
    match pick(entities, |e| e.code.eq_ignore_ascii_case(wanted)) {
        Some(e) if !wanted.is_empty() => Resolution::Found(e.clone()),
        _ => Resolution::NotFound(NotFound {
            kind,
            attempted: wanted.to_string(),
            available: entities.iter().map(|e| e.code.clone()).collect(),
        }),
    }
}

/// Looks codes up through a [`ReferenceCache`].
pub struct CodeResolver<'a> {
    cache: &'a ReferenceCache,
}

impl<'a> CodeResolver<'a> {
    pub fn new(cache: &'a ReferenceCache) -> Self {
        Self { cache }
    }

    pub async fn resolve_institution(&self, code: &str) -> Resolution<Institution> {
        let institutions = self.cache.get_institutions().await;
        let wanted = code.trim();
        match pick(institutions.as_slice(), |i| i.code.eq_ignore_ascii_case(wanted)) {
            Some(inst) if !wanted.is_empty() => Resolution::Found(inst.clone()),
            _ => Resolution::NotFound(NotFound {
                kind: ReferenceKind::Institution,
                attempted: wanted.to_string(),
                available: institutions.iter().map(|i| i.code.clone()).collect(),
            }),
        }
    }

    pub async fn resolve_program(
        &self,
        scope: &InstitutionScope,
        code: &str,
    ) -> Resolution<ReferenceEntity> {
        by_code(ReferenceKind::Program, &self.cache.get_programs(scope).await, code)
    }

    /// Match a semester by code or by display name.
    pub async fn resolve_semester(
        &self,
        scope: &InstitutionScope,
        program_id: &str,
        name_or_code: &str,
    ) -> Resolution<ReferenceEntity> {
        let semesters = self.cache.get_semesters(scope, program_id).await;
        let wanted = name_or_code.trim();
        let hit = pick(semesters.as_slice(), |s| {
            s.code.eq_ignore_ascii_case(wanted) || s.name.eq_ignore_ascii_case(wanted)
        });
        match hit {
            Some(s) if !wanted.is_empty() => Resolution::Found(s.clone()),
            _ => Resolution::NotFound(NotFound {
                kind: ReferenceKind::Semester,
                attempted: wanted.to_string(),
                available: semesters
                    .iter()
                    .map(|s| if s.name.is_empty() { s.code.clone() } else { s.name.clone() })
                    .collect(),
            }),
        }
    }

    pub async fn resolve_regulation(
        &self,
        scope: &InstitutionScope,
        code: &str,
    ) -> Resolution<ReferenceEntity> {
        by_code(ReferenceKind::Regulation, &self.cache.get_regulations(scope).await, code)
    }

    pub async fn resolve_course(
        &self,
        scope: &InstitutionScope,
        code: &str,
    ) -> Resolution<ReferenceEntity> {
        by_code(ReferenceKind::Course, &self.cache.get_courses(scope).await, code)
    }

    pub async fn resolve_session(
        &self,
        scope: &InstitutionScope,
        code: &str,
    ) -> Resolution<ReferenceEntity> {
        by_code(ReferenceKind::Session, &self.cache.get_sessions(scope).await, code)
    }

    /// Course offering by its course code.
    pub async fn resolve_offering(
        &self,
        scope: &InstitutionScope,
        course_code: &str,
    ) -> Resolution<ReferenceEntity> {
        by_code(ReferenceKind::Offering, &self.cache.get_offerings(scope).await, course_code)
    }

    /// Student by register number.
    pub async fn resolve_student(
        &self,
        scope: &InstitutionScope,
        register_no: &str,
    ) -> Resolution<ReferenceEntity> {
        by_code(ReferenceKind::Student, &self.cache.get_students(scope).await, register_no)
    }
}
