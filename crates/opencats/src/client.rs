//! Async HTTP client for the OpenCATS REST endpoints

use crate::mappers;
use crate::models::{CandidatePush, LocalApplicationBundle, LocalJob};
use crate::{Error, Result};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info};

/// Per-request timeout for create/update operations
const WRITE_TIMEOUT: Duration = Duration::from_secs(15);

/// Fallback delay when a 429 carries no usable Retry-After header
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

/// Acknowledgement returned by OpenCATS for an accepted push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushReceipt {
    /// HTTP status of the accepted request
    pub status: u16,
    /// Identifier assigned by OpenCATS, when the response carries one
    pub remote_id: Option<String>,
}

/// OpenCATS API client
pub struct OpenCatsClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenCatsClient {
    /// Create a new client
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self {
            client,
            base_url,
            api_key,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.api_key.is_some()
    }

    /// Full URL for an OpenCATS resource path
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Push a candidate profile and its resume attachment
    pub async fn push_candidate(&self, push: &CandidatePush) -> Result<PushReceipt> {
        let body = mappers::candidate_request(push)?;
        self.post("candidate", &body).await
    }

    /// Push a job order
    pub async fn push_job(&self, job: &LocalJob) -> Result<PushReceipt> {
        let body = mappers::job_order_request(job);
        self.post("joborder", &body).await
    }

    /// Push an application (candidate to job order link)
    pub async fn push_application(&self, bundle: &LocalApplicationBundle) -> Result<PushReceipt> {
        let body = mappers::application_request(bundle)?;
        self.post("candidate_joborder", &body).await
    }

    async fn post<B: Serialize>(&self, path: &str, body: &B) -> Result<PushReceipt> {
        let url = self.endpoint(path);
        debug!(url = %url, "Posting to OpenCATS");

        let mut request = self.client.post(&url).json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.timeout(WRITE_TIMEOUT).send().await?;
        let status = response.status();

        if status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let remote_id = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .and_then(|v| match v.get("id") {
                    Some(serde_json::Value::String(s)) => Some(s.clone()),
                    Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                });
            info!(url = %url, status = status.as_u16(), "OpenCATS accepted push");
            return Ok(PushReceipt {
                status: status.as_u16(),
                remote_id,
            });
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(Error::RateLimited(retry_after));
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            Err(Error::Unavailable {
                status: status.as_u16(),
                body,
            })
        } else {
            Err(Error::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}
