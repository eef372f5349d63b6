//! Licensed media download.
//!
//! Media URLs point at arbitrary hosts, so this client has its own
//! `reqwest::Client` without the capability bearer token.
//!
//! `ipfs://<cid>/<path>` URLs are fetched from the configured gateway as
//! `<gateway>/ipfs/<cid>/<path>`. Without a gateway they are rejected.

use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use lexlink_finalize::{CapabilityError, MediaFetcher};

use crate::error::ClientError;
use crate::http::truncate;
use crate::retry::retry_send;

const CAPABILITY: &str = "media";

/// Downloads larger than this are refused.
pub const DEFAULT_MAX_MEDIA_BYTES: usize = 256 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct HttpMediaFetcher {
    http: reqwest::Client,
    max_bytes: usize,
    ipfs_gateway: Option<Url>,
}

fn rejected(message: String) -> CapabilityError {
    CapabilityError::Rejected {
        capability: CAPABILITY,
        message,
    }
}

impl HttpMediaFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClientError::Http {
                endpoint: CAPABILITY.into(),
                source: e,
            })?;
        Ok(Self {
            http,
            max_bytes: DEFAULT_MAX_MEDIA_BYTES,
            ipfs_gateway: None,
        })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_ipfs_gateway(mut self, gateway: Option<Url>) -> Self {
        self.ipfs_gateway = gateway;
        self
    }

    /// The HTTP(S) URL to download `url` from.
    pub fn resolve(&self, url: &str) -> Result<Url, CapabilityError> {
        let parsed =
            Url::parse(url).map_err(|e| rejected(format!("invalid media URL '{url}': {e}")))?;
        let scheme = parsed.scheme().to_string();
        match scheme.as_str() {
            "http" | "https" => Ok(parsed),
            "ipfs" => {
                let gateway = self
                    .ipfs_gateway
                    .as_ref()
                    .ok_or_else(|| rejected(format!("no IPFS gateway configured for '{url}'")))?;
                let content_path = url
                    .split_once("://")
                    .map(|(_, rest)| rest.trim_start_matches('/'))
                    .unwrap_or_default();
                let content_path = content_path.strip_prefix("ipfs/").unwrap_or(content_path);
                if content_path.is_empty() {
                    return Err(rejected(format!("media URL '{url}' names no content")));
                }
                let base = gateway.as_str().trim_end_matches('/');
                Url::parse(&format!("{base}/ipfs/{content_path}"))
                    .map_err(|e| rejected(format!("invalid gateway URL for '{url}': {e}")))
            }
            other => Err(rejected(format!("unsupported media URL scheme '{other}'"))),
        }
    }

    fn too_large(&self, size: u64) -> CapabilityError {
        CapabilityError::Rejected {
            capability: CAPABILITY,
            message: format!("media is {size} bytes, limit is {}", self.max_bytes),
        }
    }
}

#[async_trait]
impl MediaFetcher for HttpMediaFetcher {
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, CapabilityError> {
        let parsed = self.resolve(url)?;

        let resp = retry_send("fetch_media", || self.http.get(parsed.clone()).send())
            .await
            .map_err(|e| CapabilityError::Transport {
                capability: CAPABILITY,
                message: format!("fetch_media: {e}"),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(CapabilityError::Status {
                capability: CAPABILITY,
                status: status.as_u16(),
                body: truncate(&body),
            });
        }
        if let Some(len) = resp.content_length() {
            if len > self.max_bytes as u64 {
                return Err(self.too_large(len));
            }
        }
        let bytes = resp.bytes().await.map_err(|e| CapabilityError::Transport {
            capability: CAPABILITY,
            message: format!("fetch_media: reading body: {e}"),
        })?;
        if bytes.len() > self.max_bytes {
            return Err(self.too_large(bytes.len() as u64));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetcher(gateway: Option<&str>) -> HttpMediaFetcher {
        HttpMediaFetcher::new(5)
            .unwrap()
            .with_ipfs_gateway(gateway.map(|g| Url::parse(g).unwrap()))
    }

    #[test]
    fn http_urls_pass_through() {
        let url = fetcher(None).resolve("https://media.example/a.mp3").unwrap();
        assert_eq!(url.as_str(), "https://media.example/a.mp3");
    }

    #[test]
    fn ipfs_urls_go_through_the_gateway() {
        let f = fetcher(Some("https://gw.example.org/"));
        assert_eq!(
            f.resolve("ipfs://bafybeigdyrzt/track.mp3").unwrap().as_str(),
            "https://gw.example.org/ipfs/bafybeigdyrzt/track.mp3"
        );
        assert_eq!(
            f.resolve("ipfs://ipfs/bafybeigdyrzt").unwrap().as_str(),
            "https://gw.example.org/ipfs/bafybeigdyrzt"
        );
    }

    #[test]
    fn gateway_path_prefix_is_kept() {
        let f = fetcher(Some("http://127.0.0.1:8080/content"));
        assert_eq!(
            f.resolve("ipfs://bafy/a.wav").unwrap().as_str(),
            "http://127.0.0.1:8080/content/ipfs/bafy/a.wav"
        );
    }

    #[test]
    fn ipfs_without_gateway_is_rejected() {
        let err = fetcher(None).resolve("ipfs://bafy/a.wav").unwrap_err();
        assert!(matches!(err, CapabilityError::Rejected { .. }));
        assert!(err.to_string().contains("no IPFS gateway"));
    }

    #[test]
    fn other_schemes_are_rejected() {
        assert!(fetcher(Some("https://gw.example.org")).resolve("ftp://host/a").is_err());
        assert!(fetcher(None).resolve("not a url").is_err());
    }
}
