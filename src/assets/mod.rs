//! Keyed artifact and metadata storage
//!
//! Every file the lane produces or consumes for a target is an [`Asset`]:
//! a typed slot under the key
//! `<ecosystem>/<package>/<version>/<artifact>/<file name>`.
//! Stores hand out streaming writers that only publish on
//! [`AssetWriter::close`]; a writer dropped without closing leaves no trace.

mod fs;
mod memory;

pub use fs::FilesystemAssetStore;
pub use memory::MemoryAssetStore;

use std::io::{self, Read, Write};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::rebuild::Target;

/// Asset store errors
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("I/O error on {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: io::Error,
    },

    #[error("asset not found: {0}")]
    NotFound(String),

    #[error("asset already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid asset key component: {0:?}")]
    InvalidKey(String),

    #[error("target {0} has no resolved artifact")]
    UnresolvedArtifact(String),
}

impl AssetError {
    pub(crate) fn io(key: &str, source: io::Error) -> Self {
        AssetError::Io {
            key: key.to_string(),
            source,
        }
    }
}

/// Kinds of file stored per target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    /// The artifact produced by the rebuild
    RebuildArtifact,
    /// The artifact published upstream
    UpstreamArtifact,
    /// Container build description for the rebuild
    Dockerfile,
    /// Build record (`BuildInfo`)
    BuildInfo,
    /// Signed attestation bundle (JSONL)
    AttestationBundle,
    /// Captured build output
    BuildLog,
    /// Remote job handle kept for resumption
    RemoteJobHandle,
}

impl AssetType {
    /// File name of this asset type for `target`.
    pub fn file_name(&self, target: &Target) -> String {
        match self {
            AssetType::RebuildArtifact => target.artifact().to_string(),
            AssetType::UpstreamArtifact => format!("upstream/{}", target.artifact()),
            AssetType::Dockerfile => "Dockerfile".to_string(),
            AssetType::BuildInfo => "build.json".to_string(),
            AssetType::AttestationBundle => "rebuild.intoto.jsonl".to_string(),
            AssetType::BuildLog => "build.log".to_string(),
            AssetType::RemoteJobHandle => "remote_job.json".to_string(),
        }
    }
}

/// A typed file slot for one target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Asset {
    pub asset_type: AssetType,
    pub target: Target,
}

impl Asset {
    pub fn new(asset_type: AssetType, target: &Target) -> Self {
        Self {
            asset_type,
            target: target.clone(),
        }
    }

    /// Logical key, `<ecosystem>/<package>/<version>/<artifact>/<file name>`.
    pub fn key(&self) -> Result<String, AssetError> {
        let t = &self.target;
        if !t.has_artifact() {
            return Err(AssetError::UnresolvedArtifact(t.to_string()));
        }
        // Package names may nest: `@scope/name`, `main/xz-utils`.
        for segment in t.package().split('/') {
            check_component(segment, t.package())?;
        }
        for component in [t.version(), t.artifact()] {
            check_component(component, component)?;
        }
        Ok(format!(
            "{}/{}/{}/{}/{}",
            t.ecosystem(),
            t.package(),
            t.version(),
            t.artifact(),
            self.asset_type.file_name(t)
        ))
    }
}

fn check_component(component: &str, reported: &str) -> Result<(), AssetError> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('/')
        || component.contains('\\')
    {
        return Err(AssetError::InvalidKey(reported.to_string()));
    }
    Ok(())
}

/// Streaming writer for one asset.
pub trait AssetWriter: Write + Send {
    /// Publish the written bytes. Without this call nothing is stored.
    fn close(self: Box<Self>) -> Result<(), AssetError>;

    /// Publish only if no asset exists under the key yet.
    ///
    /// The check and the publish are one atomic step; a lost race yields
    /// [`AssetError::AlreadyExists`] and leaves the existing asset untouched.
    fn close_new(self: Box<Self>) -> Result<(), AssetError>;
}

/// Keyed storage for assets.
pub trait AssetStore: Send + Sync {
    fn writer(&self, asset: &Asset) -> Result<Box<dyn AssetWriter>, AssetError>;

    /// Reader for an existing asset; [`AssetError::NotFound`] otherwise.
    fn reader(&self, asset: &Asset) -> Result<Box<dyn Read + Send>, AssetError>;

    fn exists(&self, asset: &Asset) -> Result<bool, AssetError>;
}

/// A store whose assets are addressable by URL, e.g. from a remote build.
pub trait LocatableAssetStore: AssetStore {
    fn url(&self, asset: &Asset) -> Result<String, AssetError>;
}

/// Write `bytes` as `asset` in one call.
pub fn write_asset(
    store: &(impl AssetStore + ?Sized),
    asset: &Asset,
    bytes: &[u8],
) -> Result<(), AssetError> {
    let key = asset.key()?;
    let mut writer = store.writer(asset)?;
    writer.write_all(bytes).map_err(|e| AssetError::io(&key, e))?;
    writer.close()
}

/// Read `asset` fully.
pub fn read_asset(store: &(impl AssetStore + ?Sized), asset: &Asset) -> Result<Vec<u8>, AssetError> {
    let key = asset.key()?;
    let mut reader = store.reader(asset)?;
    let mut bytes = Vec::new();
    reader
        .read_to_end(&mut bytes)
        .map_err(|e| AssetError::io(&key, e))?;
    Ok(bytes)
}

/// Stream `asset` from one store into another.
pub fn copy_asset(
    from: &(impl AssetStore + ?Sized),
    to: &(impl AssetStore + ?Sized),
    asset: &Asset,
) -> Result<u64, AssetError> {
    let key = asset.key()?;
    let mut reader = from.reader(asset)?;
    let mut writer = to.writer(asset)?;
    let copied = io::copy(&mut reader, &mut writer).map_err(|e| AssetError::io(&key, e))?;
    writer.close()?;
    Ok(copied)
}
