//! Dead Simple Signing Envelope.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use serde::{Deserialize, Serialize};

use super::signer::{key_fingerprint, Signer};
use super::statement::InTotoStatement;
use super::AttestationError;

/// Payload type for in-toto statements.
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// DSSE pre-authentication encoding:
/// `"DSSEv1" SP LEN(type) SP type SP LEN(body) SP body`.
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + payload_type.len() + 32);
    out.extend_from_slice(b"DSSEv1 ");
    out.extend_from_slice(payload_type.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload_type.as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload.len().to_string().as_bytes());
    out.push(b' ');
    out.extend_from_slice(payload);
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseSignature {
    pub keyid: String,
    /// Base64 signature over the PAE
    pub sig: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsseEnvelope {
    pub payload_type: String,
    /// Base64 payload
    pub payload: String,
    pub signatures: Vec<DsseSignature>,
}

impl DsseEnvelope {
    /// Sign the JCS form of `statement`.
    pub fn sign(statement: &InTotoStatement, signer: &dyn Signer) -> Result<Self, AttestationError> {
        let payload = serde_json_canonicalizer::to_vec(statement)
            .map_err(|e| AttestationError::Canonicalization(e.to_string()))?;
        let sig = signer.sign(&pae(IN_TOTO_PAYLOAD_TYPE, &payload))?;
        Ok(Self {
            payload_type: IN_TOTO_PAYLOAD_TYPE.to_string(),
            payload: BASE64.encode(&payload),
            signatures: vec![DsseSignature {
                keyid: signer.key_id()?,
                sig: BASE64.encode(sig),
            }],
        })
    }

    pub fn payload_bytes(&self) -> Result<Vec<u8>, AttestationError> {
        Ok(BASE64.decode(&self.payload)?)
    }

    /// Decode the wrapped statement.
    pub fn statement(&self) -> Result<InTotoStatement, AttestationError> {
        if self.payload_type != IN_TOTO_PAYLOAD_TYPE {
            return Err(AttestationError::PayloadType(self.payload_type.clone()));
        }
        Ok(serde_json::from_slice(&self.payload_bytes()?)?)
    }

    /// Check the signature made by `key`.
    ///
    /// Returns `Ok(false)` when no signature carries the key's id or the
    /// signature does not verify.
    pub fn verify(&self, key: &VerifyingKey) -> Result<bool, AttestationError> {
        let keyid = key_fingerprint(key);
        let message = pae(&self.payload_type, &self.payload_bytes()?);
        for signature in self.signatures.iter().filter(|s| s.keyid == keyid) {
            let bytes = BASE64.decode(&signature.sig)?;
            let sig = Signature::from_slice(&bytes)
                .map_err(|e| AttestationError::InvalidSignature(e.to_string()))?;
            if key.verify(&message, &sig).is_ok() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
