//! Error types for the import pipeline.
//!
//! Only failures that stop a whole operation live here:
//!
//! - [`FileError`] - import file could not be turned into rows
//! - [`ReferenceError`] - a reference fetch failed (remote service or local backend)
//! - [`PersistenceError`] - the CRUD backend refused or never answered a write
//! - [`PipelineError`] - top-level orchestration errors
//! - [`ServerError`] - HTTP surface errors
//!
//! Problems with a single row are never errors: they end up as
//! [`crate::models::ValidationOutcome::Error`] values.

use thiserror::Error;

// =============================================================================
// File Parsing Errors
// =============================================================================

/// Errors while turning an uploaded file into raw rows.
#[derive(Debug, Error)]
pub enum FileError {
    /// Failed to read file.
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    /// Extension or content not recognised as JSON, CSV or a workbook.
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// JSON body was not an array of objects.
    #[error("Invalid JSON: {0}")]
    Json(String),

    /// Malformed CSV.
    #[error("Invalid CSV at line {line}: {message}")]
    Csv { line: usize, message: String },

    /// Workbook could not be opened or has no sheet.
    #[error("Invalid workbook: {0}")]
    Workbook(String),

    /// Header present but no data rows.
    #[error("File is empty")]
    Empty,

    /// Preview could not be written out.
    #[error("Failed to write preview: {0}")]
    Export(String),
}

// =============================================================================
// Reference Fetch Errors
// =============================================================================

/// Errors from a single reference fetch.
///
/// The reference cache swallows these per remote id; they only surface through logs.
#[derive(Debug, Error)]
pub enum ReferenceError {
    /// Missing API key.
    #[error("Missing MYJKKN_API_KEY environment variable")]
    MissingApiKey,

    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Non-success status from the service.
    #[error("Reference service returned {status}: {message}")]
    Status { status: u16, message: String },

    /// Body was not the expected list shape.
    #[error("Invalid reference response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ReferenceError {
    fn from(e: reqwest::Error) -> Self {
        ReferenceError::Http(e.to_string())
    }
}

// =============================================================================
// Persistence Errors
// =============================================================================

/// Errors from the CRUD backend when persisting one row.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Backend answered with an `{ error }` body.
    #[error("{message}")]
    Rejected { status: u16, message: String },

    /// No usable answer (connection refused, timeout, bad body).
    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(e: reqwest::Error) -> Self {
        PersistenceError::Network(e.to_string())
    }
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// File parsing error.
    #[error("File error: {0}")]
    File(#[from] FileError),

    /// Reference error that could not be recovered locally.
    #[error("Reference error: {0}")]
    Reference(#[from] ReferenceError),

    /// No valid rows left to commit.
    #[error("No valid rows to import")]
    NothingToCommit,

    /// Unknown import kind.
    #[error("Unknown import kind: {0}")]
    UnknownKind(String),
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Preview job is unknown or already committed.
    #[error("Import job not found: {0}")]
    JobNotFound(String),

    /// The commit task ended without a summary.
    #[error("Commit task failed: {0}")]
    CommitAborted(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for file parsing.
pub type FileResult<T> = Result<T, FileError>;

/// Result type for reference fetches.
pub type ReferenceResult<T> = Result<T, ReferenceError>;

/// Result type for persistence calls.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_conversion_chain() {
        let file_err = FileError::Empty;
        let pipeline_err: PipelineError = file_err.into();
        assert!(pipeline_err.to_string().contains("empty"));

        let server_err: ServerError = PipelineError::NothingToCommit.into();
        assert!(server_err.to_string().contains("No valid rows"));
    }

    #[test]
    fn test_rejection_shows_backend_message_only() {
        let err = PersistenceError::Rejected {
            status: 409,
            message: "Course offering already exists".into(),
        };
        assert_eq!(err.to_string(), "Course offering already exists");
    }

    #[test]
    fn test_csv_error_format() {
        let err = FileError::Csv { line: 4, message: "unterminated quote".into() };
        let msg = err.to_string();
        assert!(msg.contains("line 4"));
        assert!(msg.contains("unterminated quote"));
    }
}
