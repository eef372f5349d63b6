//! Content-addressed archive storage.

use async_trait::async_trait;
use serde::Deserialize;

use lexlink_finalize::{CapabilityError, ContentStore};

use crate::http::Service;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    uri: String,
}

/// `POST /uploads?name=<file name>` with the raw bytes as body.
#[derive(Debug, Clone)]
pub struct HttpContentStore {
    service: Service,
}

impl HttpContentStore {
    pub(crate) fn new(service: Service) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    async fn upload(&self, name: &str, bytes: &[u8]) -> Result<String, CapabilityError> {
        let url = self.service.url("uploads");
        let request = self
            .service
            .http()
            .post(&url)
            .query(&[("name", name)])
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec());
        let resp = self.service.send(request, "upload").await?;
        let uploaded: UploadResponse = self.service.json(resp, "upload").await?;
        if uploaded.uri.trim().is_empty() {
            return Err(self.service.invalid("upload: empty uri"));
        }
        tracing::debug!(name, uri = %uploaded.uri, size = bytes.len(), "archive uploaded");
        Ok(uploaded.uri)
    }
}
