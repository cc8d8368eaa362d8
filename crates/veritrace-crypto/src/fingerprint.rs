/// HMAC-SHA256 content binding.
///
/// A plain digest lets an attacker who alters both payload and digest forge
/// a matching pair; the MAC binds authenticity to the gateway secret, so a
/// tag that verifies can only have been produced by a key holder.

use crate::canonical::canonical_record_json;
use hmac::{Hmac, Mac};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::fmt;
use thiserror::Error;
use veritrace_core::types::GenerationRecord;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("HMAC secret key is not configured")]
    MissingSecret,
    #[error("record serialization failed: {0}")]
    Serialize(String),
    #[error("invalid fingerprint encoding: {0}")]
    Encoding(String),
}

/// 32-byte HMAC-SHA256 tag over the canonical record serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// 64 lowercase hex characters, the rendering committed on chain.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, FingerprintError> {
        let bytes = hex::decode(s.trim()).map_err(|e| FingerprintError::Encoding(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| FingerprintError::Encoding("expected 32 bytes".to_string()))?;
        Ok(Fingerprint(bytes))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Signs and verifies generation records under the gateway secret.
/// Read-only after construction; safe to share across requests.
#[derive(Clone)]
pub struct Fingerprinter {
    secret: Vec<u8>,
}

impl Fingerprinter {
    /// An empty secret is a configuration error, never a weaker MAC.
    pub fn new(secret: &str) -> Result<Self, FingerprintError> {
        if secret.is_empty() {
            return Err(FingerprintError::MissingSecret);
        }
        Ok(Self {
            secret: secret.as_bytes().to_vec(),
        })
    }

    pub fn sign(&self, record: &GenerationRecord) -> Result<Fingerprint, FingerprintError> {
        self.sign_parts(
            &record.llm_provider,
            &record.model_name,
            &record.prompt,
            &record.response,
            &record.parameters,
            &record.timestamp_string(),
            &record.consensus_votes,
        )
    }

    /// Fingerprint from raw field strings; the verification pipeline uses
    /// this to recompute from ABI-decoded call data.
    pub fn sign_parts(
        &self,
        llm_provider: &str,
        model_name: &str,
        prompt: &str,
        response: &str,
        parameters: &Map<String, Value>,
        timestamp: &str,
        consensus_votes: &str,
    ) -> Result<Fingerprint, FingerprintError> {
        let canonical = canonical_record_json(
            llm_provider,
            model_name,
            prompt,
            response,
            parameters,
            timestamp,
            consensus_votes,
        )?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| FingerprintError::Serialize(e.to_string()))?;
        mac.update(canonical.as_bytes());
        let tag = mac.finalize().into_bytes();
        Ok(Fingerprint(tag.into()))
    }

    /// Constant-time tag check.
    pub fn verify(
        &self,
        record: &GenerationRecord,
        fingerprint: &Fingerprint,
    ) -> Result<bool, FingerprintError> {
        let canonical = canonical_record_json(
            &record.llm_provider,
            &record.model_name,
            &record.prompt,
            &record.response,
            &record.parameters,
            &record.timestamp_string(),
            &record.consensus_votes,
        )?;
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| FingerprintError::Serialize(e.to_string()))?;
        mac.update(canonical.as_bytes());
        Ok(mac.verify_slice(fingerprint.as_bytes()).is_ok())
    }
}
