//! Signed rebuild evidence
//!
//! Every completed rebuild attempt produces two in-toto statements, build
//! provenance and the verdict, each wrapped in a DSSE envelope and written
//! together as a JSONL bundle.

mod bundle;
mod dsse;
mod signer;
mod statement;

pub use bundle::{load_bundle, read_bundle, BundleWriter};
pub use dsse::{pae, DsseEnvelope, DsseSignature, IN_TOTO_PAYLOAD_TYPE};
pub use signer::{key_fingerprint, Ed25519Signer, Signer};
pub use statement::{
    build_provenance_statement, compute_sha256, verdict_statement, ArtifactDigest, InTotoStatement,
    InTotoSubject, IN_TOTO_STATEMENT_TYPE, SLSA_PROVENANCE_PREDICATE_TYPE, VERDICT_PREDICATE_TYPE,
};

use thiserror::Error;

use crate::assets::AssetError;

/// Attestation errors
#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("attestation bundle already exists for {0}")]
    BundleExists(String),

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("unexpected payload type {0:?}")]
    PayloadType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("canonicalization error: {0}")]
    Canonicalization(String),

    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Asset(#[from] AssetError),
}
