//! HTTP transport for submitting synthetic tasks and polling their status

use std::collections::BTreeMap;

use reqwest::blocking::Client;
use serde::{Deserialize, Deserializer};
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;
use crate::error::ProbeError;

/// Identifier of a submitted task, only meaningful for polling
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reported state of a submitted task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct TaskStatus {
    #[serde(default, deserialize_with = "null_as_false")]
    pub complete: bool,
    #[serde(default, deserialize_with = "null_as_false")]
    pub failed: bool,
}

fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or_default())
}

impl TaskStatus {
    pub fn pending() -> Self {
        Self::default()
    }

    pub fn complete() -> Self {
        Self {
            complete: true,
            failed: false,
        }
    }

    pub fn failed() -> Self {
        Self {
            complete: false,
            failed: true,
        }
    }
}

/// Outbound calls against the task API
///
/// Implementations do not retry; the evaluator owns the retry budget.
pub trait ProbeClient: Send + Sync {
    /// Submits `payload` to `endpoint` and returns the created task
    fn submit(
        &self,
        endpoint: &str,
        payload: &BTreeMap<String, String>,
    ) -> Result<TaskHandle, ProbeError>;

    /// Fetches the current status of a task
    fn poll_status(&self, handle: &TaskHandle) -> Result<TaskStatus, ProbeError>;
}

#[derive(Deserialize)]
struct SubmitResponse {
    task_id: String,
}

/// Builds the API root for a host
///
/// A host that already carries a scheme (`http://...`, `https://...`) is
/// used as-is; otherwise the configured default scheme is prepended.
pub fn api_base_url(host: &str, api: &ApiConfig) -> Result<Url, ProbeError> {
    let host = host.trim_end_matches('/');
    let root = if host.contains("://") {
        host.to_string()
    } else {
        format!("{}://{}", api.default_scheme, host)
    };
    let base_path = api.base_path.trim_end_matches('/');
    Ok(Url::parse(&format!("{root}{base_path}"))?)
}

/// `ProbeClient` backed by a blocking reqwest client
pub struct ApiClient {
    client: Client,
    base: String,
}

impl ApiClient {
    /// Creates a client for `host`
    ///
    /// Certificate validation follows `api.accept_invalid_certs`.
    pub fn new(host: &str, api: &ApiConfig) -> Result<Self, ProbeError> {
        let base = api_base_url(host, api)?;
        let client = Client::builder()
            .danger_accept_invalid_certs(api.accept_invalid_certs)
            .timeout(api.request_timeout())
            .user_agent(concat!("worker-health/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ProbeError::transport(base.as_str(), e.to_string()))?;

        debug!(base = %base, insecure = api.accept_invalid_certs, "API client ready");

        Ok(Self {
            client,
            base: base.as_str().trim_end_matches('/').to_string(),
        })
    }

    /// Full URL for an endpoint below the API root
    pub fn url(&self, endpoint: &str) -> Result<Url, ProbeError> {
        Ok(Url::parse(&format!("{}{}", self.base, endpoint))?)
    }
}

impl ProbeClient for ApiClient {
    fn submit(
        &self,
        endpoint: &str,
        payload: &BTreeMap<String, String>,
    ) -> Result<TaskHandle, ProbeError> {
        let url = self.url(endpoint)?;
        let response = self
            .client
            .post(url.clone())
            .form(payload)
            .send()
            .map_err(|e| ProbeError::transport(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ProbeError::setup(
                endpoint,
                format!("HTTP {}: {}", status, body.trim()),
            ));
        }

        let body: SubmitResponse = response
            .json()
            .map_err(|e| ProbeError::setup(endpoint, format!("malformed response: {e}")))?;

        debug!(endpoint, task_id = %body.task_id, "task submitted");
        Ok(TaskHandle(body.task_id))
    }

    fn poll_status(&self, handle: &TaskHandle) -> Result<TaskStatus, ProbeError> {
        let url = self.url(&format!("/celery/task/{}/", handle.as_str()))?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .map_err(|e| ProbeError::transport(url.as_str(), e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::transport(url.as_str(), format!("HTTP {status}")));
        }

        response
            .json()
            .map_err(|e| ProbeError::transport(url.as_str(), format!("malformed status: {e}")))
    }
}
