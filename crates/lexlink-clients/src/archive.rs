//! # Evidence Archive Builder
//!
//! Packs the licensed media and the proof fields into a single
//! self-describing JSON manifest. The media travels base64-encoded next to
//! its SHA-256, so the archive can be checked offline against the content
//! hash in the license credential.
//!
//! The manifest is serialized as JCS-canonical JSON, which makes the
//! archive hash reproducible from the same inputs.

use async_trait::async_trait;
use base64::Engine;
use serde::Serialize;

use lexlink_core::{sha256_bytes_hex, CanonicalBytes, IpId, OrderId};
use lexlink_finalize::{ArchiveBuilder, ArchiveInput, BuiltArchive, CapabilityError};

pub const ARCHIVE_FORMAT: &str = "lexlink-evidence-archive/1";

const CAPABILITY: &str = "archive";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Manifest<'a> {
    format: &'static str,
    order_id: &'a OrderId,
    ip_id: &'a IpId,
    media: MediaEntry<'a>,
    proof: &'a serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaEntry<'a> {
    url: &'a str,
    sha256: String,
    size: usize,
    content_base64: String,
}

#[derive(Debug, Clone, Default)]
pub struct ManifestArchiveBuilder;

impl ManifestArchiveBuilder {
    pub fn file_name(order_id: &OrderId) -> String {
        format!("lexlink-evidence-{order_id}.json")
    }

    fn build(input: &ArchiveInput) -> Result<BuiltArchive, CapabilityError> {
        let manifest = Manifest {
            format: ARCHIVE_FORMAT,
            order_id: &input.order_id,
            ip_id: &input.ip_id,
            media: MediaEntry {
                url: &input.media_url,
                sha256: sha256_bytes_hex(&input.media),
                size: input.media.len(),
                content_base64: base64::engine::general_purpose::STANDARD.encode(&input.media),
            },
            proof: &input.proof_fields,
        };
        let bytes = CanonicalBytes::new(&manifest)
            .map_err(|e| CapabilityError::Rejected {
                capability: CAPABILITY,
                message: format!("manifest canonicalization failed: {e}"),
            })?
            .as_bytes()
            .to_vec();
        Ok(BuiltArchive {
            archive_hash: sha256_bytes_hex(&bytes),
            file_name: Self::file_name(&input.order_id),
            bytes,
        })
    }
}

#[async_trait]
impl ArchiveBuilder for ManifestArchiveBuilder {
    async fn build_archive(&self, input: &ArchiveInput) -> Result<BuiltArchive, CapabilityError> {
        Self::build(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn input(media: &[u8]) -> ArchiveInput {
        ArchiveInput {
            order_id: OrderId::new("o-1").unwrap(),
            ip_id: IpId::new("ip-1").unwrap(),
            media: media.to_vec(),
            media_url: "https://cdn.example.com/a.png".into(),
            proof_fields: json!({"tokenId": "7", "evidenceHash": "ab"}),
        }
    }

    #[tokio::test]
    async fn archive_is_reproducible() {
        let a = ManifestArchiveBuilder.build_archive(&input(b"media")).await.unwrap();
        let b = ManifestArchiveBuilder.build_archive(&input(b"media")).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.archive_hash, sha256_bytes_hex(&a.bytes));
        assert_eq!(a.file_name, "lexlink-evidence-o-1.json");
    }

    #[tokio::test]
    async fn manifest_carries_media_and_proof() {
        let built = ManifestArchiveBuilder.build_archive(&input(b"media")).await.unwrap();
        let manifest: serde_json::Value = serde_json::from_slice(&built.bytes).unwrap();
        assert_eq!(manifest["format"], ARCHIVE_FORMAT);
        assert_eq!(manifest["media"]["sha256"], sha256_bytes_hex(b"media"));
        assert_eq!(manifest["media"]["contentBase64"], "bWVkaWE=");
        assert_eq!(manifest["proof"]["tokenId"], "7");
    }

    #[tokio::test]
    async fn different_media_changes_hash() {
        let a = ManifestArchiveBuilder.build_archive(&input(b"one")).await.unwrap();
        let b = ManifestArchiveBuilder.build_archive(&input(b"two")).await.unwrap();
        assert_ne!(a.archive_hash, b.archive_hash);
    }
}
