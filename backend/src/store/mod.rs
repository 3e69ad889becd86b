//! Local COE CRUD backend.
//!
//! Institutions, courses and examination sessions are read from here, and
//! accepted rows are written back one record per request.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

use crate::config::Settings;
use crate::error::{PersistenceError, PersistenceResult, ReferenceError, ReferenceResult};
use crate::models::{InstitutionScope, ReferenceKind};

/// Read and write access to the local relational store.
#[async_trait]
pub trait CrudBackend: Send + Sync {
    /// Every institution, with its remote id mapping.
    async fn list_institutions(&self) -> ReferenceResult<Vec<Value>>;

    /// Local reference records (courses, sessions) for one institution.
    async fn list(&self, kind: ReferenceKind, scope: &InstitutionScope)
        -> ReferenceResult<Vec<Value>>;

    /// Persist one record; returns the stored record.
    async fn create(&self, resource: &str, body: &Value) -> PersistenceResult<Value>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// [`CrudBackend`] over the COE REST API.
#[derive(Clone)]
pub struct RestBackend {
    base_url: String,
    http: reqwest::Client,
}

impl RestBackend {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.coe_api_url.clone(), settings.request_timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn get_list(&self, path: &str, query: &[(&str, &str)]) -> ReferenceResult<Vec<Value>> {
        let response = self.http.get(self.url(path)).query(query).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ReferenceError::Status {
                status: status.as_u16(),
                message: error_message(&body).unwrap_or_else(|| status.to_string()),
            });
        }

        let value: Value = serde_json::from_str(&body)
            .map_err(|e| ReferenceError::InvalidResponse(e.to_string()))?;
        list_from(value)
    }
}

/// Lists arrive either bare or wrapped in `{ data }`.
fn list_from(value: Value) -> ReferenceResult<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ReferenceError::InvalidResponse("missing data array".into())),
        },
        _ => Err(ReferenceError::InvalidResponse("expected a list".into())),
    }
}

fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.error.or(b.message))
}

#[async_trait]
impl CrudBackend for RestBackend {
    async fn list_institutions(&self) -> ReferenceResult<Vec<Value>> {
        self.get_list("master/institutions", &[]).await
    }

    async fn list(
        &self,
        kind: ReferenceKind,
        scope: &InstitutionScope,
    ) -> ReferenceResult<Vec<Value>> {
        match kind {
            ReferenceKind::Course => {
                self.get_list(
                    "master/courses",
                    &[("institution_code", scope.institution_code.as_str())],
                )
                .await
            }
            ReferenceKind::Session => {
                self.get_list(
                    "exam-management/examination-sessions",
                    &[("institutions_id", scope.institution_id.as_str())],
                )
                .await
            }
            ReferenceKind::Offering => {
                self.get_list(
                    "course-management/course-offering",
                    &[("institutions_id", scope.institution_id.as_str())],
                )
                .await
            }
            ReferenceKind::Student => {
                self.get_list(
                    "users/students",
                    &[("institution_id", scope.institution_id.as_str())],
                )
                .await
            }
            other => Err(ReferenceError::InvalidResponse(format!(
                "{} is not stored locally",
                other.plural()
            ))),
        }
    }

    async fn create(&self, resource: &str, body: &Value) -> PersistenceResult<Value> {
        let response = self.http.post(self.url(resource)).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(PersistenceError::Rejected {
                status: status.as_u16(),
                message: error_message(&text)
                    .unwrap_or_else(|| format!("Failed to create record ({})", status.as_u16())),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|e| PersistenceError::Network(e.to_string()))
    }
}
