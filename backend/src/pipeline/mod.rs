//! High-level import API: file in, classified preview out, then commit.
//!
//! # Example
//!
//! ```rust,ignore
//! use coe_import::pipeline::{preview_file, Committer};
//! use coe_import::{ImportKind, ReferenceCache};
//! use std::path::Path;
//!
//! let report = preview_file(&cache, Path::new("offerings.xlsx"), ImportKind::CourseOffering).await?;
//! println!("{} valid, {} with errors", report.valid_count(), report.error_count());
//!
//! let summary = Committer::new(backend.as_ref(), report.kind).commit(&report.outcomes).await;
//! ```

pub mod commit;
pub mod export;
pub mod grouper;
pub mod processor;

use serde::Serialize;
use std::path::Path;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::cache::ReferenceCache;
use crate::error::PipelineResult;
use crate::models::{ImportKind, PreviewRow, RawRow, ValidationOutcome};
use crate::parser::{parse_bytes, parse_file, FileFormat, ParseResult};

pub use commit::{request_body, CancelHandle, Committer};
pub use export::{preview_csv_string, write_preview_csv};
pub use grouper::{group_rows, InstitutionGroup, ProgramGroup};
pub use processor::process_rows;

/// Where the rows came from.
#[derive(Debug, Clone, Serialize)]
pub struct FileInfo {
    pub format: FileFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    pub headers: Vec<String>,
    pub row_count: usize,
}

impl From<&ParseResult> for FileInfo {
    fn from(p: &ParseResult) -> Self {
        Self {
            format: p.format,
            encoding: p.encoding.clone(),
            headers: p.headers.clone(),
            row_count: p.rows.len(),
        }
    }
}

/// Classified rows of one file, ready to show or commit.
#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub kind: ImportKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
    pub outcomes: Vec<ValidationOutcome>,
}

impl PreviewReport {
    pub fn valid_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_valid()).count()
    }

    pub fn error_count(&self) -> usize {
        self.outcomes.len() - self.valid_count()
    }

    pub fn preview_rows(&self) -> Vec<PreviewRow> {
        self.outcomes.iter().map(PreviewRow::from).collect()
    }
}

/// Classify already-parsed rows.
pub async fn preview_rows(
    cache: &ReferenceCache,
    kind: ImportKind,
    rows: &[RawRow],
) -> PreviewReport {
    let outcomes = process_rows(cache, kind, rows).await;
    let report = PreviewReport {
        kind,
        file: None,
        outcomes,
    };
    if report.error_count() == 0 {
        log_success(format!("All {} rows valid", report.valid_count()));
    } else {
        log_warning(format!(
            "{} valid, {} with errors",
            report.valid_count(),
            report.error_count()
        ));
    }
    report
}

/// Parse and classify an import file.
pub async fn preview_file(
    cache: &ReferenceCache,
    path: &Path,
    kind: ImportKind,
) -> PipelineResult<PreviewReport> {
    log_info(format!("📖 Reading {}", path.display()));
    let parsed = parse_file(path)?;
    Ok(preview_parsed(cache, parsed, kind).await)
}

/// Parse and classify uploaded bytes.
pub async fn preview_bytes(
    cache: &ReferenceCache,
    bytes: &[u8],
    file_name: Option<&str>,
    kind: ImportKind,
) -> PipelineResult<PreviewReport> {
    let parsed = parse_bytes(bytes, file_name)?;
    Ok(preview_parsed(cache, parsed, kind).await)
}

async fn preview_parsed(
    cache: &ReferenceCache,
    parsed: ParseResult,
    kind: ImportKind,
) -> PreviewReport {
    let info = FileInfo::from(&parsed);
    log_success(format!(
        "Read {} rows, {} columns ({:?}{})",
        info.row_count,
        info.headers.len(),
        info.format,
        info.encoding
            .as_deref()
            .map(|e| format!(", {}", e))
            .unwrap_or_default()
    ));

    let mut report = preview_rows(cache, kind, &parsed.rows).await;
    report.file = Some(info);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FileError, PipelineError};
    use crate::models::ReferenceKind;
    use crate::testing::*;
    use std::io::Write;
    use std::sync::Arc;

    fn cache() -> (ReferenceCache, Arc<FakeBackend>) {
        let remote = FakeReference::new()
            .with(ReferenceKind::Program, "R1", vec![program("p1", "BCA", "R1")])
            .with_semesters("R1", "p1", vec![semester("s1", "SEM1", "Semester I", "p1", 1)]);
        let local = Arc::new(
            FakeBackend::new()
                .with_institution(institution("L1", "JKKN", &["R1"]))
                .with(ReferenceKind::Course, "L1", vec![course("c1", "BCA101", "L1")])
                .with(ReferenceKind::Session, "L1", vec![session("x1", "NOV25", "L1")]),
        );
        (
            ReferenceCache::new(Arc::new(remote), local.clone()),
            local,
        )
    }

    const CSV: &str = "\
Institution Code *,Program Code *,Semester Name *,Course Code *,Session Code *,Max Enrollment
JKKN,BCA,Semester I,BCA101,NOV25,60
JKKN,BCA,Semester I,BCA999,NOV25,60
";

    #[tokio::test]
    async fn test_preview_then_commit() {
        let (cache, backend) = cache();
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        file.write_all(CSV.as_bytes()).unwrap();

        let report = preview_file(&cache, file.path(), ImportKind::CourseOffering)
            .await
            .unwrap();
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.valid_count(), 1);
        assert_eq!(report.file.as_ref().unwrap().row_count, 2);

        let preview = report.preview_rows();
        assert_eq!(preview[1].row_number, 3);
        assert_eq!(preview[1].status, "error");

        let summary = Committer::new(backend.as_ref(), report.kind)
            .commit(&report.outcomes)
            .await;
        assert_eq!((summary.total, summary.success, summary.failed), (1, 1, 0));
        assert_eq!(backend.created()[0].1["max_enrollment"], 60);
    }

    #[tokio::test]
    async fn test_preview_bytes_sniffs_json() {
        let (cache, _) = cache();
        let json = br#"[{"institution_code": "JKKN", "program_code": "BCA", "semester_code": "SEM1", "course_code": "BCA101", "session_code": "NOV25"}]"#;

        let report = preview_bytes(&cache, json, None, ImportKind::CourseOffering)
            .await
            .unwrap();
        assert!(report.outcomes[0].is_valid());
    }

    #[tokio::test]
    async fn test_header_only_file_is_empty() {
        let (cache, _) = cache();
        let err = preview_bytes(
            &cache,
            b"Institution Code,Course Code\n",
            Some("x.csv"),
            ImportKind::CourseOffering,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, PipelineError::File(FileError::Empty)));
    }
}
