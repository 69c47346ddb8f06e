//! Signing seam and the Ed25519 adapter.

use ed25519_dalek::{Signer as _, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use super::AttestationError;

/// Produces signatures for envelope payloads. Key management is external.
pub trait Signer: Send + Sync {
    /// Stable identifier of the signing key.
    fn key_id(&self) -> Result<String, AttestationError>;

    /// Sign `data` (the DSSE pre-authentication encoding).
    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, AttestationError>;
}

/// Hex SHA-256 of the raw public key bytes.
pub fn key_fingerprint(key: &VerifyingKey) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Ed25519 signer over an injected key.
pub struct Ed25519Signer {
    key: SigningKey,
}

impl Ed25519Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    /// Load from the 32-byte secret seed.
    pub fn from_seed(seed: &[u8]) -> Result<Self, AttestationError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| AttestationError::InvalidKey(format!("expected 32-byte seed, got {}", seed.len())))?;
        Ok(Self::new(SigningKey::from_bytes(&seed)))
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }
}

impl Signer for Ed25519Signer {
    fn key_id(&self) -> Result<String, AttestationError> {
        Ok(key_fingerprint(&self.key.verifying_key()))
    }

    fn sign(&self, data: &[u8]) -> Result<Vec<u8>, AttestationError> {
        Ok(self.key.sign(data).to_bytes().to_vec())
    }
}
