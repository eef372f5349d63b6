//! Shared HTTP plumbing: client construction, URL joining and mapping of
//! transport failures and error statuses to [`CapabilityError`].

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use url::Url;

use lexlink_finalize::CapabilityError;

use crate::config::{ClientsConfig, ConfigError};
use crate::error::ClientError;
use crate::retry::retry_send;

/// Error bodies are cut to this many characters before they reach logs
/// and audit events.
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Build the authenticated client shared by every capability service.
pub(crate) fn build_client(config: &ClientsConfig) -> Result<reqwest::Client, ClientError> {
    let mut headers = HeaderMap::new();
    if !config.api_token.is_empty() {
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", config.api_token))
                .map_err(|_| ConfigError::InvalidToken)?,
        );
    }
    reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .default_headers(headers)
        .build()
        .map_err(|e| ClientError::Http {
            endpoint: "client_init".into(),
            source: e,
        })
}

/// One capability endpoint: a client, a base URL and a name for errors.
#[derive(Debug, Clone)]
pub(crate) struct Service {
    http: reqwest::Client,
    base_url: String,
    capability: &'static str,
}

impl Service {
    pub(crate) fn new(http: reqwest::Client, base_url: &Url, capability: &'static str) -> Self {
        Self {
            http,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            capability,
        }
    }

    pub(crate) fn capability(&self) -> &'static str {
        self.capability
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Send once and require a 2xx response.
    pub(crate) async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<reqwest::Response, CapabilityError> {
        let resp = request
            .send()
            .await
            .map_err(|e| self.transport(operation, &e))?;
        self.check_status(resp).await
    }

    /// GET with transport retries, requiring a 2xx response.
    pub(crate) async fn get_with_retry(
        &self,
        url: &str,
        operation: &str,
    ) -> Result<reqwest::Response, CapabilityError> {
        let resp = retry_send(operation, || self.http.get(url).send())
            .await
            .map_err(|e| self.transport(operation, &e))?;
        self.check_status(resp).await
    }

    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
        operation: &str,
    ) -> Result<T, CapabilityError> {
        resp.json().await.map_err(|e| self.invalid(format!(
            "{operation}: response deserialization failed: {e}"
        )))
    }

    pub(crate) fn invalid(&self, message: impl Into<String>) -> CapabilityError {
        CapabilityError::InvalidResponse {
            capability: self.capability,
            message: message.into(),
        }
    }

    fn transport(&self, operation: &str, e: &reqwest::Error) -> CapabilityError {
        let message = if e.is_timeout() {
            format!("{operation}: request timed out")
        } else {
            format!("{operation}: {e}")
        };
        CapabilityError::Transport {
            capability: self.capability,
            message,
        }
    }

    async fn check_status(
        &self,
        resp: reqwest::Response,
    ) -> Result<reqwest::Response, CapabilityError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(CapabilityError::Status {
            capability: self.capability,
            status: status.as_u16(),
            body: truncate(&body),
        })
    }
}

pub(crate) fn truncate(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    cut.push_str("...");
    cut
}
