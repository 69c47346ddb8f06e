//! JSONL attestation bundles.

use std::io::Write;

use tracing::debug;

use super::dsse::DsseEnvelope;
use super::AttestationError;
use crate::assets::{read_asset, Asset, AssetError, AssetStore, AssetType};
use crate::rebuild::Target;

/// Writes the signed envelopes of one rebuild attempt.
pub struct BundleWriter;

impl BundleWriter {
    /// Write `envelopes` as one JSON object per line.
    ///
    /// Without `overwrite`, an existing bundle is an error and is left as is,
    /// including one published by a concurrent writer after the first check.
    pub fn write(
        store: &dyn AssetStore,
        target: &Target,
        envelopes: &[DsseEnvelope],
        overwrite: bool,
    ) -> Result<(), AttestationError> {
        let asset = Asset::new(AssetType::AttestationBundle, target);
        if !overwrite && store.exists(&asset)? {
            return Err(AttestationError::BundleExists(asset.key()?));
        }

        let mut body = Vec::new();
        for envelope in envelopes {
            serde_json::to_writer(&mut body, envelope)?;
            body.push(b'\n');
        }

        let key = asset.key()?;
        let mut writer = store.writer(&asset)?;
        writer.write_all(&body).map_err(|e| AssetError::io(&key, e))?;
        if overwrite {
            writer.close()?;
        } else {
            writer.close_new().map_err(|e| match e {
                AssetError::AlreadyExists(key) => AttestationError::BundleExists(key),
                other => other.into(),
            })?;
        }
        debug!(key = %key, envelopes = envelopes.len(), "Wrote attestation bundle");
        Ok(())
    }
}

/// Parse a JSONL bundle. Blank lines are skipped.
pub fn read_bundle(bytes: &[u8]) -> Result<Vec<DsseEnvelope>, AttestationError> {
    bytes
        .split(|b| *b == b'\n')
        .filter(|line| !line.iter().all(u8::is_ascii_whitespace))
        .map(|line| serde_json::from_slice(line).map_err(AttestationError::from))
        .collect()
}

/// Read the bundle stored for `target`.
pub fn load_bundle(store: &dyn AssetStore, target: &Target) -> Result<Vec<DsseEnvelope>, AttestationError> {
    let bytes = read_asset(store, &Asset::new(AssetType::AttestationBundle, target))?;
    read_bundle(&bytes)
}
