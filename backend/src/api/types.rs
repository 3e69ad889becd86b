//! REST API types for the import screens.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::models::{ImportKind, PreviewRow, UploadSummary};
use crate::pipeline::{FileInfo, PreviewReport};

/// Response to `POST /api/import/preview`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    /// Id to commit or discard this preview with.
    pub job_id: Uuid,
    /// "ready" (all valid), "warning" (some errors) or "error" (nothing valid)
    pub status: String,
    pub kind: ImportKind,
    pub rows: Vec<PreviewRow>,
    pub metadata: PreviewMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewMetadata {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
    pub created_at: DateTime<Utc>,
}

impl PreviewResponse {
    pub fn new(job_id: Uuid, created_at: DateTime<Utc>, report: &PreviewReport) -> Self {
        let valid = report.valid_count();
        let invalid = report.error_count();
        let status = match (valid, invalid) {
            (_, 0) => "ready",
            (0, _) => "error",
            _ => "warning",
        };
        Self {
            job_id,
            status: status.to_string(),
            kind: report.kind,
            rows: report.preview_rows(),
            metadata: PreviewMetadata {
                total: report.outcomes.len(),
                valid,
                invalid,
                file: report.file.clone(),
                created_at,
            },
        }
    }
}

/// Response to `POST /api/import/{job_id}/commit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitResponse {
    pub job_id: Uuid,
    /// "completed", "partial" or "cancelled"
    pub status: String,
    pub summary: UploadSummary,
}

impl CommitResponse {
    pub fn new(job_id: Uuid, summary: UploadSummary) -> Self {
        let status = if summary.cancelled {
            "cancelled"
        } else if summary.failed > 0 {
            "partial"
        } else {
            "completed"
        };
        Self {
            job_id,
            status: status.to_string(),
            summary,
        }
    }
}

/// Error body for every failed request.
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MappingCandidate, RawRow, ValidationOutcome};

    fn report(errors: usize) -> PreviewReport {
        let raw: RawRow = RawRow::new();
        let outcomes = (0..errors)
            .map(|i| ValidationOutcome::error(&MappingCandidate::from_raw(i, &raw), vec!["x".into()]))
            .collect();
        PreviewReport {
            kind: ImportKind::CourseOffering,
            file: None,
            outcomes,
        }
    }

    #[test]
    fn test_preview_status() {
        let empty = PreviewResponse::new(Uuid::new_v4(), Utc::now(), &report(0));
        assert_eq!(empty.status, "ready");

        let all_bad = PreviewResponse::new(Uuid::new_v4(), Utc::now(), &report(2));
        assert_eq!(all_bad.status, "error");
        assert_eq!(all_bad.metadata.invalid, 2);

        let json = serde_json::to_value(&all_bad).unwrap();
        assert_eq!(json["rows"][0]["rowNumber"], 2);
        assert_eq!(json["kind"], "course-offering");
    }

    #[test]
    fn test_commit_status() {
        let id = Uuid::new_v4();
        let partial = UploadSummary { total: 2, success: 1, failed: 1, ..Default::default() };
        assert_eq!(CommitResponse::new(id, partial).status, "partial");

        let cancelled = UploadSummary { total: 2, cancelled: true, ..Default::default() };
        assert_eq!(CommitResponse::new(id, cancelled).status, "cancelled");

        assert_eq!(CommitResponse::new(id, UploadSummary::default()).status, "completed");
    }

    #[test]
    fn test_error_response() {
        assert_eq!(error_response("boom")["error"], "boom");
    }
}
