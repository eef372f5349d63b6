//! In-process credential issuer backed by a configured Ed25519 key.

use async_trait::async_trait;
use chrono::Utc;

use lexlink_finalize::{CapabilityError, CredentialIssuer, CredentialRequest, IssuedCredential};

use crate::credential::{LicenseCredential, VcError};
use crate::keys::{Ed25519KeyPair, Ed25519PublicKey};

const CAPABILITY: &str = "credentials";

#[derive(Debug)]
pub struct LocalCredentialIssuer {
    key: Ed25519KeyPair,
    issuer: String,
}

impl LocalCredentialIssuer {
    /// Issuer DID is `did:lexlink:<public key hex>`.
    pub fn new(key: Ed25519KeyPair) -> Self {
        let issuer = format!("did:lexlink:{}", key.public_key().to_hex());
        Self { key, issuer }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn public_key(&self) -> Ed25519PublicKey {
        self.key.public_key()
    }

    fn verification_method(&self) -> String {
        format!("{}#key-1", self.issuer)
    }

    /// Build and sign the credential for `request`.
    pub fn build(&self, request: &CredentialRequest) -> Result<LicenseCredential, VcError> {
        let mut subject = serde_json::to_value(request)?;
        if let Some(obj) = subject.as_object_mut() {
            if let Some(id) = obj.remove("subjectId") {
                obj.insert("id".to_string(), id);
            }
        }
        let mut credential = LicenseCredential::new(self.issuer.clone(), subject, Utc::now());
        credential.sign(&self.key, self.verification_method())?;
        Ok(credential)
    }
}

fn invalid(e: VcError) -> CapabilityError {
    CapabilityError::InvalidResponse {
        capability: CAPABILITY,
        message: e.to_string(),
    }
}

#[async_trait]
impl CredentialIssuer for LocalCredentialIssuer {
    async fn issue_credential(
        &self,
        request: &CredentialRequest,
    ) -> Result<IssuedCredential, CapabilityError> {
        let credential = self.build(request).map_err(invalid)?;
        let hash = credential.document_hash().map_err(invalid)?;
        let document = serde_json::to_value(&credential).map_err(|e| invalid(e.into()))?;
        tracing::debug!(order_id = %request.order_id, credential_hash = %hash, "license credential issued");
        Ok(IssuedCredential { document, hash })
    }
}
