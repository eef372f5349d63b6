//! # License Credentials
//!
//! A W3C Verifiable Credential attesting that a license token was issued
//! for an order. The credential subject carries the token id, payment
//! reference and every evidence hash the saga produced.
//!
//! ## Signing input
//!
//! The proof covers the JCS-canonical document with the `proof` field
//! removed. Verification recomputes the same bytes, so key order or
//! whitespace changes in transit never invalidate a proof.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use lexlink_core::{sha256_hex, CanonicalBytes, CanonicalizationError};

use crate::keys::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature, KeyError};

pub const CREDENTIALS_V1_CONTEXT: &str = "https://www.w3.org/2018/credentials/v1";
pub const LEXLINK_CONTEXT: &str = "https://lexlink.dev/contexts/license/v1";
pub const LICENSE_CREDENTIAL_TYPE: &str = "LexLinkLicenseCredential";
pub const PROOF_TYPE: &str = "Ed25519Signature2020";

#[derive(Error, Debug)]
pub enum VcError {
    #[error("canonicalization failed: {0}")]
    Canonicalization(#[from] CanonicalizationError),

    #[error("credential has no proof")]
    NoProof,

    #[error("unsupported proof type: {0}")]
    UnsupportedProofType(String),

    #[error("invalid proof value: {0}")]
    InvalidProofValue(String),

    #[error("verification failed: {0}")]
    VerificationFailed(#[from] KeyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    #[serde(rename = "type")]
    pub proof_type: String,
    pub created: DateTime<Utc>,
    /// `<issuer>#key-1`.
    pub verification_method: String,
    pub proof_purpose: String,
    /// Hex-encoded Ed25519 signature.
    pub proof_value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,
    pub id: String,
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,
    pub issuer: String,
    pub issuance_date: DateTime<Utc>,
    pub credential_subject: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proof: Option<Proof>,
}

impl LicenseCredential {
    /// An unsigned credential for `subject`.
    pub fn new(issuer: impl Into<String>, subject: serde_json::Value, issued_at: DateTime<Utc>) -> Self {
        Self {
            context: vec![CREDENTIALS_V1_CONTEXT.to_string(), LEXLINK_CONTEXT.to_string()],
            id: format!("urn:uuid:{}", uuid::Uuid::new_v4()),
            credential_type: vec![
                "VerifiableCredential".to_string(),
                LICENSE_CREDENTIAL_TYPE.to_string(),
            ],
            issuer: issuer.into(),
            issuance_date: issued_at,
            credential_subject: subject,
            proof: None,
        }
    }

    /// Canonical bytes of the credential without its proof.
    pub fn signing_input(&self) -> Result<CanonicalBytes, VcError> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove("proof");
        }
        Ok(CanonicalBytes::from_value(value)?)
    }

    /// Sign with `key` and attach the proof, replacing any existing one.
    pub fn sign(&mut self, key: &Ed25519KeyPair, verification_method: impl Into<String>) -> Result<(), VcError> {
        let input = self.signing_input()?;
        let signature = key.sign(&input);
        self.proof = Some(Proof {
            proof_type: PROOF_TYPE.to_string(),
            created: Utc::now(),
            verification_method: verification_method.into(),
            proof_purpose: "assertionMethod".to_string(),
            proof_value: signature.to_hex(),
        });
        Ok(())
    }

    pub fn verify(&self, public_key: &Ed25519PublicKey) -> Result<(), VcError> {
        let proof = self.proof.as_ref().ok_or(VcError::NoProof)?;
        if proof.proof_type != PROOF_TYPE {
            return Err(VcError::UnsupportedProofType(proof.proof_type.clone()));
        }
        let signature = Ed25519Signature::from_hex(&proof.proof_value)
            .map_err(|e| VcError::InvalidProofValue(e.to_string()))?;
        public_key.verify(&self.signing_input()?, &signature)?;
        Ok(())
    }

    /// SHA-256 of the canonical document, proof included.
    pub fn document_hash(&self) -> Result<String, VcError> {
        Ok(sha256_hex(&CanonicalBytes::new(self)?))
    }
}
