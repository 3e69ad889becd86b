//! MyJKKN reference service client
//!
//! The remote service holds programs, semesters and regulations. It is only ever
//! queried one remote institution id at a time; nothing here writes to it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use coe_import::reference::{MyJkknClient, ReferenceService};
//! use coe_import::models::ReferenceKind;
//!
//! let client = MyJkknClient::from_env()?;
//! let programs = client.fetch(ReferenceKind::Program, "remote-inst-id", None).await?;
//! ```

pub mod normalize;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{ReferenceError, ReferenceResult};
use crate::models::ReferenceKind;

pub use normalize::{normalize_entity, normalize_institution, semester_ordinal};

/// Default MyJKKN API base URL.
pub const DEFAULT_BASE_URL: &str = "https://www.jkkn.ai/api";

/// Page size requested from the service.
const PAGE_LIMIT: u32 = 1000;

/// Upper bound on pages followed for one query.
const MAX_PAGES: u32 = 50;

/// Source of remote reference records.
///
/// Implementations return the raw records for one remote institution id; alias
/// normalization happens in the cache.
#[async_trait]
pub trait ReferenceService: Send + Sync {
    async fn fetch(
        &self,
        kind: ReferenceKind,
        remote_institution_id: &str,
        program_id: Option<&str>,
    ) -> ReferenceResult<Vec<Value>>;
}

/// Paginated response from the MyJKKN API.
#[derive(Debug, Deserialize)]
struct PageResponse {
    #[serde(default)]
    data: Vec<Value>,
    #[serde(default)]
    metadata: Option<PageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageMetadata {
    #[serde(default = "one")]
    total_pages: u32,
}

fn one() -> u32 {
    1
}

/// MyJKKN API error body
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// HTTP client for the MyJKKN reference API
#[derive(Clone)]
pub struct MyJkknClient {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl MyJkknClient {
    /// Create a new client with explicit base URL and API key
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http,
        }
    }

    /// Create a client from `MYJKKN_API_URL` and `MYJKKN_API_KEY`
    pub fn from_env() -> Result<Self, ReferenceError> {
        Self::from_settings(&Settings::from_env())
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, ReferenceError> {
        let api_key = settings.require_api_key()?;
        Ok(Self::new(
            settings.myjkkn_api_url.clone(),
            api_key,
            settings.request_timeout,
        ))
    }

    fn endpoint(kind: ReferenceKind) -> Option<&'static str> {
        match kind {
            ReferenceKind::Program => Some("/api-management/organizations/programs"),
            ReferenceKind::Semester => Some("/api-management/organizations/semesters"),
            ReferenceKind::Regulation => Some("/api-management/academic/regulations"),
            _ => None,
        }
    }

    /// Fetch a single page
    async fn fetch_page(
        &self,
        endpoint: &str,
        remote_institution_id: &str,
        program_id: Option<&str>,
        page: u32,
    ) -> ReferenceResult<PageResponse> {
        let url = format!("{}{}", self.base_url, endpoint);
        let mut query: Vec<(&str, String)> = vec![
            ("institution_id", remote_institution_id.to_string()),
            ("is_active", "true".to_string()),
            ("page", page.to_string()),
            ("limit", PAGE_LIMIT.to_string()),
        ];
        if let Some(pid) = program_id {
            query.push(("program_id", pid.to_string()));
        }

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|e| e.message.or(e.error))
                .unwrap_or_else(|| format!("API Error: {}", status.as_u16()));
            return Err(ReferenceError::Status { status: status.as_u16(), message });
        }

        parse_page(&body)
    }
}

/// Accept both `{ data: [...], metadata }` and a bare array.
fn parse_page(body: &str) -> ReferenceResult<PageResponse> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ReferenceError::InvalidResponse(e.to_string()))?;
    match value {
        Value::Array(items) => Ok(PageResponse { data: items, metadata: None }),
        Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| ReferenceError::InvalidResponse(e.to_string())),
        other => Err(ReferenceError::InvalidResponse(format!(
            "expected list, got {}",
            other
        ))),
    }
}

#[async_trait]
impl ReferenceService for MyJkknClient {
    async fn fetch(
        &self,
        kind: ReferenceKind,
        remote_institution_id: &str,
        program_id: Option<&str>,
    ) -> ReferenceResult<Vec<Value>> {
        let endpoint = Self::endpoint(kind).ok_or_else(|| {
            ReferenceError::InvalidResponse(format!("{} is not served by MyJKKN", kind.label()))
        })?;

        let mut records = Vec::new();
        let mut page = 1;
        loop {
            let response = self
                .fetch_page(endpoint, remote_institution_id, program_id, page)
                .await?;
            records.extend(response.data);

            let total_pages = response.metadata.map(|m| m.total_pages).unwrap_or(1);
            if page >= total_pages || page >= MAX_PAGES {
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_page_wrapped() {
        let body = r#"{"data": [{"id": "p1"}], "metadata": {"page": 1, "totalPages": 3, "total": 3}}"#;
        let page = parse_page(body).unwrap();
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.metadata.unwrap().total_pages, 3);
    }

    #[test]
    fn test_parse_page_bare_array() {
        let page = parse_page(r#"[{"id": "a"}, {"id": "b"}]"#).unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.metadata.is_none());
    }

    #[test]
    fn test_parse_page_rejects_scalar() {
        assert!(matches!(parse_page("42"), Err(ReferenceError::InvalidResponse(_))));
    }

    #[test]
    fn test_local_kinds_have_no_remote_endpoint() {
        assert!(MyJkknClient::endpoint(ReferenceKind::Course).is_none());
        assert!(MyJkknClient::endpoint(ReferenceKind::Program).is_some());
    }
}
