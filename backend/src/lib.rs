//! # COE Import - course offering and course mapping bulk import
//!
//! Resolves the human codes in an uploaded spreadsheet (institution, program,
//! regulation, semester, course, session) against the local COE backend and the
//! MyJKKN reference service, checks that the resolved records belong together,
//! and commits the accepted rows one at a time.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────┐   ┌────────────────────────────┐   ┌──────────┐   ┌──────────┐
//! │ XLSX/CSV/  │──▶│  Parser  │──▶│ Row Processor              │──▶│ Preview  │──▶│  Commit  │
//! │ JSON file  │   │ (RawRow) │   │  Resolver ⇄ ReferenceCache │   │ (valid / │   │ (summary)│
//! └────────────┘   └──────────┘   │  Validator                 │   │  error)  │   └──────────┘
//!                                 └────────────────────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use coe_import::{preview_file, Committer, ImportKind, ReferenceCache, Settings};
//! use coe_import::{reference::MyJkknClient, store::RestBackend};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env();
//!     let backend = Arc::new(RestBackend::from_settings(&settings));
//!     let cache = ReferenceCache::new(
//!         Arc::new(MyJkknClient::from_settings(&settings)?),
//!         backend.clone(),
//!     );
//!
//!     let report = preview_file(&cache, "offerings.xlsx".as_ref(), ImportKind::CourseOffering).await?;
//!     let summary = Committer::new(backend.as_ref(), report.kind).commit(&report.outcomes).await;
//!     println!("{} saved, {} failed", summary.success, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Rows, reference entities, outcomes, summaries
//! - [`config`] - Environment settings
//! - [`parser`] - JSON / CSV / workbook parsing
//! - [`reference`] - MyJKKN client and field alias normalization
//! - [`store`] - Local COE CRUD backend
//! - [`cache`] - Reference cache
//! - [`resolver`] - Code resolver
//! - [`validation`] - Consistency validator
//! - [`pipeline`] - Row processor, commit coordinator, preview export
//! - [`api`] - HTTP API server

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Input
pub mod parser;

// Reference data
pub mod cache;
pub mod reference;
pub mod resolver;
pub mod store;

// Validation
pub mod validation;

// Orchestration
pub mod pipeline;

// HTTP API
pub mod api;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports - Errors and config
// =============================================================================

pub use config::Settings;
pub use error::{
    FileError, PersistenceError, PipelineError, PipelineResult, ReferenceError, ServerError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    ImportKind, Institution, InstitutionScope, MappingCandidate, PreviewRow, RawRow,
    ReferenceEntity, ReferenceKind, ResolvedRecord, UploadError, UploadSummary,
    ValidationOutcome,
};

// =============================================================================
// Re-exports - Parsing
// =============================================================================

pub use parser::{parse_bytes, parse_file, FileFormat, ParseResult};

// =============================================================================
// Re-exports - Resolution and validation
// =============================================================================

pub use cache::ReferenceCache;
pub use reference::{MyJkknClient, ReferenceService};
pub use resolver::{CodeResolver, NotFound, Resolution};
pub use store::{CrudBackend, RestBackend};
pub use validation::{check_fields, check_ownership, validate};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use pipeline::{
    preview_bytes, preview_file, preview_rows, process_rows, CancelHandle, Committer,
    PreviewReport,
};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
