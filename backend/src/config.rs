//! Runtime settings from the environment (and `.env`).

use std::env;
use std::time::Duration;

use crate::error::ReferenceError;
use crate::reference::DEFAULT_BASE_URL;

/// Default local CRUD backend.
pub const DEFAULT_COE_API_URL: &str = "http://localhost:3000/api";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// MyJKKN reference service base URL.
    pub myjkkn_api_url: String,
    /// Bearer key for the reference service.
    pub myjkkn_api_key: Option<String>,
    /// Local CRUD backend base URL.
    pub coe_api_url: String,
    pub request_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            myjkkn_api_url: DEFAULT_BASE_URL.to_string(),
            myjkkn_api_key: None,
            coe_api_url: DEFAULT_COE_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Settings {
    /// Read `MYJKKN_API_URL`, `MYJKKN_API_KEY`, `COE_API_URL` and
    /// `COE_REQUEST_TIMEOUT_SECS`, loading `.env` first.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            myjkkn_api_url: non_empty("MYJKKN_API_URL").unwrap_or(defaults.myjkkn_api_url),
            myjkkn_api_key: non_empty("MYJKKN_API_KEY"),
            coe_api_url: non_empty("COE_API_URL").unwrap_or(defaults.coe_api_url),
            request_timeout: non_empty("COE_REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
        }
    }

    /// The API key, or [`ReferenceError::MissingApiKey`].
    pub fn require_api_key(&self) -> Result<&str, ReferenceError> {
        self.myjkkn_api_key
            .as_deref()
            .ok_or(ReferenceError::MissingApiKey)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(pairs: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]);
        assert_eq!(s, Settings::default());
        assert!(matches!(s.require_api_key(), Err(ReferenceError::MissingApiKey)));
    }

    #[test]
    fn test_overrides() {
        let s = settings(&[
            ("MYJKKN_API_KEY", "secret"),
            ("COE_API_URL", "http://coe.internal/api"),
            ("COE_REQUEST_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(s.require_api_key().unwrap(), "secret");
        assert_eq!(s.coe_api_url, "http://coe.internal/api");
        assert_eq!(s.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_bad_timeout_keeps_default() {
        let s = settings(&[("COE_REQUEST_TIMEOUT_SECS", "soon"), ("MYJKKN_API_KEY", " ")]);
        assert_eq!(s.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert!(s.myjkkn_api_key.is_none());
    }
}
