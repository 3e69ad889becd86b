//! HTTP server for the two-phase import.
//!
//! # API Endpoints
//!
//! | Method | Path                            | Description                            |
//! |--------|---------------------------------|----------------------------------------|
//! | GET    | `/health`                       | Health check                           |
//! | POST   | `/api/import/preview`           | Upload a file (`file`, `kind`)         |
//! | POST   | `/api/import/{job_id}/commit`   | Persist the valid rows of a preview    |
//! | DELETE | `/api/import/{job_id}`          | Discard a preview or stop its commit   |
//! | GET    | `/api/logs`                     | SSE stream for real-time logs          |

use axum::{
    extract::{Multipart, Path, State},
    http::{header, Method, StatusCode},
    response::{sse::Event, Json, Sse},
    routing::{delete, get, post},
    Router,
};
use futures::stream::Stream;
use serde_json::{json, Value};
use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt as _;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use super::jobs::{Discarded, ImportJob, JobStore};
use super::logs::{log_info, LOG_BROADCASTER};
use super::types::{error_response, CommitResponse, PreviewResponse};
use crate::cache::ReferenceCache;
use crate::config::Settings;
use crate::error::{FileError, PipelineError, ServerError};
use crate::models::{ImportKind, UploadSummary};
use crate::pipeline::{preview_bytes, Committer};
use crate::reference::{MyJkknClient, ReferenceService};
use crate::store::{CrudBackend, RestBackend};

type ApiError = (StatusCode, Json<Value>);

/// Shared by every request.
#[derive(Clone)]
pub struct AppState {
    remote: Arc<dyn ReferenceService>,
    backend: Arc<dyn CrudBackend>,
    jobs: Arc<JobStore>,
}

impl AppState {
    pub fn new(remote: Arc<dyn ReferenceService>, backend: Arc<dyn CrudBackend>) -> Self {
        Self {
            remote,
            backend,
            jobs: Arc::new(JobStore::new()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ServerError> {
        let remote = MyJkknClient::from_settings(settings)
            .map_err(|e| ServerError::Pipeline(PipelineError::Reference(e)))?;
        Ok(Self::new(
            Arc::new(remote),
            Arc::new(RestBackend::from_settings(settings)),
        ))
    }

    /// A fresh cache per preview run, so every upload sees current reference data.
    fn run_cache(&self) -> ReferenceCache {
        ReferenceCache::new(Arc::clone(&self.remote), Arc::clone(&self.backend))
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(health))
        .route("/health", get(health))
        .route("/api/import/preview", post(preview_upload))
        .route("/api/import/{job_id}/commit", post(commit_job))
        .route("/api/import/{job_id}", delete(discard_job))
        .route("/api/logs", get(sse_logs))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server
pub async fn start_server(port: u16, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let state = AppState::from_settings(settings)?;
    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    eprintln!("🚀 COE import server running on http://localhost:{}", port);
    eprintln!("   POST   /api/import/preview         - Upload and validate a file");
    eprintln!("   POST   /api/import/{{id}}/commit     - Save valid rows");
    eprintln!("   DELETE /api/import/{{id}}            - Discard or cancel");
    eprintln!("   GET    /api/logs                   - SSE log stream");
    eprintln!("   GET    /health                     - Health check");
    eprintln!();
    eprintln!("📚 References: {}", settings.myjkkn_api_url);
    eprintln!("💾 Backend:    {}", settings.coe_api_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "coe-import",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "preview": "POST /api/import/preview",
            "commit": "POST /api/import/{job_id}/commit",
            "discard": "DELETE /api/import/{job_id}",
            "logs": "GET /api/logs (SSE)"
        }
    }))
}

/// SSE endpoint for real-time log streaming
async fn sse_logs() -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = LOG_BROADCASTER.subscribe();

    // Lagged receivers skip what they missed.
    let stream = BroadcastStream::new(rx).filter_map(|result| {
        let entry = result.ok()?;
        let json = serde_json::to_string(&entry).ok()?;
        Some(Ok(Event::default().data(json)))
    });

    Sse::new(stream).keep_alive(
        axum::response::sse::KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

fn api_error(err: &ServerError) -> ApiError {
    let status = match err {
        ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
        ServerError::JobNotFound(_) => StatusCode::NOT_FOUND,
        ServerError::Pipeline(PipelineError::File(_))
        | ServerError::Pipeline(PipelineError::UnknownKind(_)) => StatusCode::UNPROCESSABLE_ENTITY,
        ServerError::Pipeline(PipelineError::NothingToCommit) => StatusCode::CONFLICT,
        ServerError::Pipeline(PipelineError::Reference(_)) => StatusCode::BAD_GATEWAY,
        ServerError::CommitAborted(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(error_response(&err.to_string())))
}

fn bad_request(message: String) -> ApiError {
    api_error(&ServerError::BadRequest(message))
}

/// Upload and classify a file
async fn preview_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<PreviewResponse>, ApiError> {
    let mut file_data: Option<Vec<u8>> = None;
    let mut file_name: Option<String> = None;
    let mut kind = ImportKind::CourseOffering;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(format!("Multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| bad_request(format!("Read error: {}", e)))?;
                file_data = Some(bytes.to_vec());
            }
            "kind" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| bad_request(format!("Read error: {}", e)))?;
                kind = text.parse().map_err(|_| {
                    api_error(&ServerError::Pipeline(PipelineError::UnknownKind(text.clone())))
                })?;
            }
            _ => {}
        }
    }

    let bytes = file_data.ok_or_else(|| bad_request("No file provided".to_string()))?;
    if bytes.is_empty() {
        return Err(api_error(&ServerError::Pipeline(PipelineError::File(FileError::Empty))));
    }

    log_info(format!(
        "📄 New {} upload: {} ({} bytes)",
        kind,
        file_name.as_deref().unwrap_or("unknown"),
        bytes.len()
    ));

    let cache = state.run_cache();
    let report = preview_bytes(&cache, &bytes, file_name.as_deref(), kind)
        .await
        .map_err(|e| api_error(&ServerError::Pipeline(e)))?;

    let job = state.jobs.insert(kind, report.outcomes.clone()).await;
    Ok(Json(PreviewResponse::new(job.id, job.created_at, &report)))
}

/// Commit the valid rows of a preview
async fn commit_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<CommitResponse>, ApiError> {
    let job = state.jobs.begin_commit(job_id).await.map_err(|e| api_error(&e))?;

    if !job.outcomes.iter().any(|o| o.is_valid()) {
        state.jobs.finish(job_id).await;
        return Err(api_error(&ServerError::Pipeline(PipelineError::NothingToCommit)));
    }

    let summary = spawn_commit(&state, job)
        .await
        .map_err(|e| api_error(&ServerError::CommitAborted(e.to_string())))?;

    Ok(Json(CommitResponse::new(job_id, summary)))
}

/// Run a commit on its own task. It finishes, and releases the job, even if the
/// client goes away and the handler future is dropped.
fn spawn_commit(state: &AppState, job: ImportJob) -> JoinHandle<UploadSummary> {
    let backend = Arc::clone(&state.backend);
    let jobs = Arc::clone(&state.jobs);
    tokio::spawn(async move {
        let summary = Committer::new(backend.as_ref(), job.kind)
            .with_cancel(job.cancel.clone())
            .commit(&job.outcomes)
            .await;
        jobs.finish(job.id).await;
        summary
    })
}

/// Discard a preview, or stop a running commit before its next row
async fn discard_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<Value>, ApiError> {
    let outcome = state.jobs.discard(job_id).await.map_err(|e| api_error(&e))?;
    let status = match outcome {
        Discarded::Removed => "discarded",
        Discarded::Cancelling => "cancelling",
    };
    Ok(Json(json!({ "jobId": job_id, "status": status })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReferenceError;
    use crate::models::{MappingCandidate, RawRow, ResolvedRecord, RowCodes, ValidationOutcome};
    use crate::testing::{FakeBackend, FakeReference};
    use futures::FutureExt;
    use std::collections::BTreeMap;

    fn valid_row() -> ValidationOutcome {
        ValidationOutcome::Valid {
            row_number: 2,
            codes: RowCodes {
                institution_code: "JKKN".into(),
                course_code: "BCA101".into(),
                ..Default::default()
            },
            record: ResolvedRecord {
                institution_id: "L1".into(),
                institution_code: "JKKN".into(),
                program_id: Some("p1".into()),
                program_code: Some("BCA".into()),
                semester_id: Some("s1".into()),
                semester_code: Some("SEM1".into()),
                semester_name: None,
                semester_number: Some(1),
                course_id: "c1".into(),
                course_code: "BCA101".into(),
                regulation_id: None,
                regulation_code: None,
                session_id: Some("x1".into()),
                session_code: Some("NOV25".into()),
                student_id: None,
                register_no: None,
                attributes: BTreeMap::new(),
            },
        }
    }

    fn state() -> (AppState, Arc<FakeBackend>) {
        let backend = Arc::new(FakeBackend::new());
        let state = AppState::new(Arc::new(FakeReference::new()), backend.clone());
        (state, backend)
    }

    async fn settle(jobs: &JobStore) {
        for _ in 0..100 {
            if jobs.count().await == 0 {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_commit_response() {
        let (state, backend) = state();
        let job = state.jobs.insert(ImportKind::CourseOffering, vec![valid_row()]).await;

        let Json(response) = commit_job(State(state.clone()), Path(job.id)).await.unwrap();

        assert_eq!(response.summary.success, 1);
        assert_eq!(backend.created().len(), 1);
        assert_eq!(state.jobs.count().await, 0);
    }

    #[tokio::test]
    async fn test_commit_survives_dropped_request() {
        let (state, backend) = state();
        let job = state.jobs.insert(ImportKind::CourseOffering, vec![valid_row()]).await;

        // Polled once, then dropped as if the client disconnected.
        let pending = commit_job(State(state.clone()), Path(job.id)).now_or_never();
        assert!(pending.is_none());

        settle(&state.jobs).await;
        assert_eq!(state.jobs.count().await, 0);
        assert_eq!(backend.created().len(), 1);
    }

    #[tokio::test]
    async fn test_nothing_to_commit_releases_job() {
        let (state, _) = state();
        let raw: RawRow = BTreeMap::new();
        let invalid = ValidationOutcome::error(&MappingCandidate::from_raw(0, &raw), vec!["x".into()]);
        let job = state.jobs.insert(ImportKind::CourseOffering, vec![invalid]).await;

        let err = commit_job(State(state.clone()), Path(job.id)).await.unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);
        assert_eq!(state.jobs.count().await, 0);
    }

    #[test]
    fn test_error_status_codes() {
        let (status, body) = api_error(&ServerError::JobNotFound("x".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.0["status"], "error");

        let (status, _) = api_error(&ServerError::Pipeline(PipelineError::File(FileError::Empty)));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _) = api_error(&ServerError::Pipeline(PipelineError::Reference(
            ReferenceError::MissingApiKey,
        )));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_state_requires_api_key() {
        let settings = Settings::default();
        assert!(AppState::from_settings(&settings).is_err());
    }
}
