//! Row Processor - raw rows to one [`ValidationOutcome`] per row.
//!
//! Never fails as a whole: a row that cannot be resolved or validated becomes an
//! `error` outcome and the rest of the file carries on.

use futures::future::join_all;

use super::grouper::{group_rows, InstitutionGroup};
use crate::api::logs::{log_info, log_info_indent, log_warning_indent};
use crate::cache::ReferenceCache;
use crate::models::{
    ImportKind, InstitutionScope, MappingCandidate, RawRow, ReferenceEntity, ResolvedCandidate,
    ValidationOutcome,
};
use crate::resolver::{CodeResolver, NotFound, Resolution};
use crate::validation::{check_fields, missing_required, validate};

/// How many available codes to show when logging a miss.
const AVAILABLE_PREVIEW: usize = 10;

/// Classify every row. `result.len() == rows.len()` and `result[i]` is row `i`.
pub async fn process_rows(
    cache: &ReferenceCache,
    kind: ImportKind,
    rows: &[RawRow],
) -> Vec<ValidationOutcome> {
    let candidates: Vec<MappingCandidate> = rows
        .iter()
        .enumerate()
        .map(|(i, raw)| MappingCandidate::from_raw(i, raw))
        .collect();

    let mut outcomes: Vec<Option<ValidationOutcome>> = vec![None; candidates.len()];
    let mut resolvable = Vec::new();

    // Rows missing a required code are decided without any lookup.
    for (i, candidate) in candidates.iter().enumerate() {
        if missing_required(kind, candidate).is_empty() {
            resolvable.push(i);
        } else {
            outcomes[i] = Some(ValidationOutcome::error(
                candidate,
                check_fields(kind, candidate),
            ));
        }
    }

    let groups = group_rows(&candidates, &resolvable);
    log_info(format!(
        "Resolving {} rows across {} institution(s)",
        resolvable.len(),
        groups.len()
    ));

    let resolver = CodeResolver::new(cache);
    for group in &groups {
        process_institution(&resolver, cache, kind, &candidates, group, &mut outcomes).await;
    }

    outcomes
        .into_iter()
        .zip(&candidates)
        .map(|(outcome, candidate)| {
            outcome.unwrap_or_else(|| {
                ValidationOutcome::error(candidate, vec!["Row was not processed".to_string()])
            })
        })
        .collect()
}

async fn process_institution(
    resolver: &CodeResolver<'_>,
    cache: &ReferenceCache,
    kind: ImportKind,
    candidates: &[MappingCandidate],
    group: &InstitutionGroup,
    outcomes: &mut [Option<ValidationOutcome>],
) {
    let institution = match resolver.resolve_institution(&group.institution_code).await {
        Resolution::Found(inst) => inst,
        Resolution::NotFound(nf) => {
            log_miss(&nf, group.row_count());
            for i in group.rows() {
                outcomes[i] = Some(ValidationOutcome::error(&candidates[i], vec![nf.to_string()]));
            }
            return;
        }
    };

    let scope = institution.scope();
    if scope.remote_ids.is_empty() && kind.requires_program() {
        let message = format!(
            "No MyJKKN IDs configured for institution \"{}\"",
            scope.institution_code
        );
        log_warning_indent(format!("{} [{} row(s)]", message, group.row_count()), 1);
        for i in group.rows() {
            outcomes[i] = Some(ValidationOutcome::error(&candidates[i], vec![message.clone()]));
        }
        return;
    }
    log_info_indent(
        format!(
            "{}: {} row(s), {} program(s)",
            scope.institution_code,
            group.row_count(),
            group.programs.len()
        ),
        1,
    );

    if !kind.requires_program() {
        for i in group.rows() {
            let candidate = &candidates[i];
            outcomes[i] = Some(match resolve_registration(resolver, &scope, candidate).await {
                Ok(resolved) => validate(&resolved),
                Err(nf) => {
                    log_miss(&nf, 1);
                    ValidationOutcome::error(candidate, vec![nf.to_string()])
                }
            });
        }
        return;
    }

    let mut programs: Vec<(usize, ReferenceEntity)> = Vec::new();
    for (pi, program_group) in group.programs.iter().enumerate() {
        match resolver.resolve_program(&scope, &program_group.program_code).await {
            Resolution::Found(program) => programs.push((pi, program)),
            Resolution::NotFound(nf) => {
                log_miss(&nf, program_group.rows.len());
                for &i in &program_group.rows {
                    outcomes[i] =
                        Some(ValidationOutcome::error(&candidates[i], vec![nf.to_string()]));
                }
            }
        }
    }

    // One semester fetch per program, all in flight together.
    join_all(
        programs
            .iter()
            .map(|(_, program)| cache.get_semesters(&scope, &program.id)),
    )
    .await;

    for (pi, program) in &programs {
        for &i in &group.programs[*pi].rows {
            let candidate = &candidates[i];
            let outcome = match resolve_row(resolver, kind, &scope, program, candidate).await {
                Ok(resolved) => validate(&resolved),
                Err(nf) => {
                    log_miss(&nf, 1);
                    ValidationOutcome::error(candidate, vec![nf.to_string()])
                }
            };
            outcomes[i] = Some(outcome);
        }
    }
}

/// Resolve the remaining codes of one row. Stops at the first miss.
async fn resolve_row(
    resolver: &CodeResolver<'_>,
    kind: ImportKind,
    scope: &InstitutionScope,
    program: &ReferenceEntity,
    candidate: &MappingCandidate,
) -> Result<ResolvedCandidate, NotFound> {
    let codes = &candidate.codes;

    let semester = resolver
        .resolve_semester(scope, &program.id, codes.semester_key())
        .await
        .into_result()?;

    let regulation = if codes.regulation_code.is_empty() {
        None
    } else {
        Some(
            resolver
                .resolve_regulation(scope, &codes.regulation_code)
                .await
                .into_result()?,
        )
    };

    let course = resolver
        .resolve_course(scope, &codes.course_code)
        .await
        .into_result()?;

    let session = if codes.session_code.is_empty() {
        None
    } else {
        Some(
            resolver
                .resolve_session(scope, &codes.session_code)
                .await
                .into_result()?,
        )
    };

    Ok(ResolvedCandidate {
        kind,
        candidate: candidate.clone(),
        scope: scope.clone(),
        program: Some(program.clone()),
        semester: Some(semester),
        course,
        regulation,
        session,
        student: None,
    })
}

/// Exam registrations: session, then the course offering, then the student.
async fn resolve_registration(
    resolver: &CodeResolver<'_>,
    scope: &InstitutionScope,
    candidate: &MappingCandidate,
) -> Result<ResolvedCandidate, NotFound> {
    let codes = &candidate.codes;

    let session = resolver
        .resolve_session(scope, &codes.session_code)
        .await
        .into_result()?;
    let offering = resolver
        .resolve_offering(scope, &codes.course_code)
        .await
        .into_result()?;
    let student = resolver
        .resolve_student(scope, &codes.register_no)
        .await
        .into_result()?;

    Ok(ResolvedCandidate {
        kind: ImportKind::ExamRegistration,
        candidate: candidate.clone(),
        scope: scope.clone(),
        program: None,
        semester: None,
        course: offering,
        regulation: None,
        session: Some(session),
        student: Some(student),
    })
}

fn log_miss(nf: &NotFound, rows: usize) {
    let shown: Vec<&str> = nf
        .available
        .iter()
        .take(AVAILABLE_PREVIEW)
        .map(|s| s.as_str())
        .collect();
    let more = nf.available.len().saturating_sub(AVAILABLE_PREVIEW);
    let suffix = if more > 0 { format!(" (+{} more)", more) } else { String::new() };
    log_warning_indent(
        format!(
            "{} [{} row(s)]; available: {}{}",
            nf,
            rows,
            if shown.is_empty() { "none".to_string() } else { shown.join(", ") },
            suffix
        ),
        2,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReferenceKind;
    use crate::testing::*;
    use std::sync::Arc;

    fn raw(pairs: &[(&str, &str)]) -> RawRow {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn offering_row(course: &str, semester: &str) -> RawRow {
        raw(&[
            ("Institution Code *", "JKKN"),
            ("Program Code *", "BCA"),
            ("Semester Name *", semester),
            ("Course Code *", course),
            ("Session Code *", "NOV25"),
        ])
    }

    fn fixture() -> (Arc<FakeReference>, Arc<FakeBackend>) {
        let remote = FakeReference::new()
            .with(
                ReferenceKind::Program,
                "R1",
                vec![program("p1", "BCA", "R1"), program("p2", "BSC", "R1")],
            )
            .with(ReferenceKind::Regulation, "R1", vec![regulation("g1", "R2021", "R1")])
            .with_semesters(
                "R1",
                "p1",
                vec![
                    semester("s1", "SEM1", "Semester I", "p1", 1),
                    semester("s2", "SEM2", "Semester II", "p1", 2),
                ],
            )
            .with_semesters("R1", "p2", vec![semester("s9", "SEM1", "Semester I", "p2", 1)]);
        let local = FakeBackend::new()
            .with_institution(institution("L1", "JKKN", &["R1"]))
            .with_institution(institution("L2", "NEWCOL", &[]))
            .with(
                ReferenceKind::Course,
                "L1",
                vec![course("c1", "BCA101", "L1"), course("c2", "BCA102", "L1")],
            )
            .with(ReferenceKind::Session, "L1", vec![session("x1", "NOV25", "L1")])
            .with(ReferenceKind::Offering, "L1", vec![offering("o1", "BCA101", "L1")])
            .with(ReferenceKind::Student, "L1", vec![student("st1", "REG001", "L1")])
            .with(ReferenceKind::Session, "L2", vec![session("x2", "NOV25", "L2")])
            .with(ReferenceKind::Offering, "L2", vec![offering("o2", "BCA101", "L2")])
            .with(ReferenceKind::Student, "L2", vec![student("st2", "NC001", "L2")]);
        (Arc::new(remote), Arc::new(local))
    }

    fn cache(remote: &Arc<FakeReference>, local: &Arc<FakeBackend>) -> ReferenceCache {
        ReferenceCache::new(remote.clone(), local.clone())
    }

    #[tokio::test]
    async fn test_one_outcome_per_row_in_order() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let rows = vec![
            offering_row("BCA101", "Semester I"),
            raw(&[("Course Code", "BCA102")]),
            offering_row("BCA102", "SEM2"),
            offering_row("BCA999", "SEM1"),
        ];

        let outcomes = process_rows(&cache, ImportKind::CourseOffering, &rows).await;

        assert_eq!(outcomes.len(), rows.len());
        let numbers: Vec<_> = outcomes.iter().map(|o| o.row_number()).collect();
        assert_eq!(numbers, vec![2, 3, 4, 5]);
        let valid: Vec<_> = outcomes.iter().map(|o| o.is_valid()).collect();
        assert_eq!(valid, vec![true, false, true, false]);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        assert!(process_rows(&cache, ImportKind::CourseOffering, &[]).await.is_empty());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_course_reported_at_row_two() {
        let local = FakeBackend::new()
            .with_institution(institution("L1", "JKKN", &["R1"]))
            .with(ReferenceKind::Session, "L1", vec![session("x1", "NOV25", "L1")]);
        let (remote, _) = fixture();
        let cache = ReferenceCache::new(remote, Arc::new(local));

        let outcomes =
            process_rows(&cache, ImportKind::CourseOffering, &[offering_row("BCA101", "SEM1")]).await;

        assert_eq!(outcomes[0].row_number(), 2);
        assert_eq!(
            outcomes[0].errors().to_vec(),
            vec!["Course \"BCA101\" not found in available courses"]
        );
    }

    #[tokio::test]
    async fn test_semester_owned_by_other_program() {
        // The service answers the BCA semester query with a BSC semester.
        let remote = FakeReference::new()
            .with(ReferenceKind::Program, "R1", vec![program("p1", "BCA", "R1")])
            .with_semesters("R1", "p1", vec![semester("s9", "SEM1", "Semester I", "p2", 1)]);
        let (_, local) = fixture();
        let cache = ReferenceCache::new(Arc::new(remote), local);

        let outcomes =
            process_rows(&cache, ImportKind::CourseOffering, &[offering_row("BCA101", "SEM1")]).await;

        assert_eq!(
            outcomes[0].errors().to_vec(),
            vec!["Semester \"SEM1\" does not belong to program \"BCA\""]
        );
    }

    #[tokio::test]
    async fn test_semesters_fetched_once_per_program() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let mut rows: Vec<RawRow> = (0..5).map(|_| offering_row("BCA101", "SEM1")).collect();
        let mut bsc = offering_row("BCA101", "SEM1");
        bsc.insert("Program Code *".into(), "BSC".into());
        rows.push(bsc);

        process_rows(&cache, ImportKind::CourseOffering, &rows).await;

        assert_eq!(remote.call_count(ReferenceKind::Semester), 2);
        assert_eq!(remote.call_count(ReferenceKind::Program), 1);
    }

    #[tokio::test]
    async fn test_unknown_institution_and_unscoped_institution() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let mut unknown = offering_row("BCA101", "SEM1");
        unknown.insert("Institution Code *".into(), "XYZ".into());
        let mut unscoped = offering_row("BCA101", "SEM1");
        unscoped.insert("Institution Code *".into(), "NEWCOL".into());

        let outcomes =
            process_rows(&cache, ImportKind::CourseOffering, &[unknown, unscoped]).await;

        assert_eq!(outcomes[0].errors().to_vec(), vec!["Institution \"XYZ\" not found"]);
        assert_eq!(
            outcomes[1].errors().to_vec(),
            vec!["No MyJKKN IDs configured for institution \"NEWCOL\""]
        );
        assert!(remote
            .calls()
            .iter()
            .all(|(_, rid, _)| rid == "R1"));
    }

    #[tokio::test]
    async fn test_missing_required_collects_field_errors() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let row = raw(&[
            ("Institution Code", "JKKN"),
            ("Course Code", "BCA101"),
            ("Max Enrollment", "0"),
        ]);

        let outcomes = process_rows(&cache, ImportKind::CourseOffering, &[row]).await;

        assert_eq!(
            outcomes[0].errors().to_vec(),
            vec![
                "Program code is required",
                "Semester code or name is required",
                "Session code is required",
                "Max enrollment must be greater than 0",
            ]
        );
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_course_mapping_rows() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let good = raw(&[
            ("institution_code", "JKKN"),
            ("program_code", "BCA"),
            ("regulation_code", "R2021"),
            ("semester_code", "SEM1"),
            ("course_code", "BCA101"),
            ("internal_max_mark", "25"),
            ("internal_pass_mark", "10"),
        ]);
        let mut bad_reg = good.clone();
        bad_reg.insert("regulation_code".into(), "R1999".into());

        let outcomes = process_rows(&cache, ImportKind::CourseMapping, &[good, bad_reg]).await;

        assert!(outcomes[0].is_valid(), "{:?}", outcomes[0].errors());
        assert_eq!(
            outcomes[1].errors().to_vec(),
            vec!["Regulation \"R1999\" not found in available regulations"]
        );
    }

    #[tokio::test]
    async fn test_template_status_active_row() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let mut active = offering_row("BCA101", "SEM1");
        active.insert("Status".into(), "Active".into());
        let mut inactive = offering_row("BCA102", "SEM1");
        inactive.insert("Status".into(), "Inactive".into());

        let outcomes =
            process_rows(&cache, ImportKind::CourseOffering, &[active, inactive]).await;

        assert!(outcomes[0].is_valid(), "{:?}", outcomes[0].errors());
        assert!(outcomes[1].is_valid(), "{:?}", outcomes[1].errors());
    }

    fn registration_row(register_no: &str, course: &str) -> RawRow {
        raw(&[
            ("Institution Code", "JKKN"),
            ("Student Register Number", register_no),
            ("Examination Session Code", "NOV25"),
            ("Course Code", course),
            ("Registration Status", "Completed"),
        ])
    }

    #[tokio::test]
    async fn test_exam_registration_rows() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let rows = vec![
            registration_row("REG001", "BCA101"),
            registration_row("REG404", "BCA101"),
            registration_row("REG001", "BCA999"),
        ];

        let outcomes = process_rows(&cache, ImportKind::ExamRegistration, &rows).await;

        match &outcomes[0] {
            ValidationOutcome::Valid { record, .. } => {
                assert_eq!(record.course_id, "o1");
                assert_eq!(record.student_id.as_deref(), Some("st1"));
                assert_eq!(record.session_id.as_deref(), Some("x1"));
                assert!(record.program_id.is_none());
            }
            other => panic!("expected valid, got {:?}", other.errors()),
        }
        assert_eq!(
            outcomes[1].errors().to_vec(),
            vec!["Student \"REG404\" not found in available students"]
        );
        assert_eq!(
            outcomes[2].errors().to_vec(),
            vec!["Course offering \"BCA999\" not found in available course offerings"]
        );
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_registration_needs_no_remote_ids() {
        let (remote, local) = fixture();
        let cache = cache(&remote, &local);
        let mut row = registration_row("NC001", "BCA101");
        row.insert("Institution Code".into(), "NEWCOL".into());

        let outcomes = process_rows(&cache, ImportKind::ExamRegistration, &[row]).await;

        assert!(outcomes[0].is_valid(), "{:?}", outcomes[0].errors());
    }
}
