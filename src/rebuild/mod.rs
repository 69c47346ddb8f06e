//! Rebuild inputs, ecosystem rebuilders and the build executor
//!
//! Each supported ecosystem provides a [`Rebuilder`] that knows which
//! release file is the rebuild target, how to run the build, and how to
//! compare a rebuilt artifact with the upstream one. [`RebuilderRegistry`]
//! dispatches by [`Ecosystem`].

pub mod cratesio;
pub mod debian;
pub mod executor;
mod manifest;
pub mod npm;
pub mod pypi;
mod target;

pub use executor::{
    execute_instructions, BuildError, BuildPhase, ExecError, ScriptExecutor, ScriptOutput,
    ShellExecutor,
};
pub use manifest::{Manifest, ManifestError, ManifestRegistry, Release};
pub use target::{Ecosystem, Instructions, Location, RebuildInput, ReleaseFile, Strategy, Target};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rebuild_verdict::{classify, ArchiveKind, ClassifierConfig, ContentSummary, SummaryError, VerdictKind};
use thiserror::Error;
use tracing::debug;

use crate::assets::{read_asset, Asset, AssetError, AssetStore};
use crate::http::HttpError;

/// Registry lookup errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no release {version} of {ecosystem} package {package}")]
    UnknownRelease {
        ecosystem: Ecosystem,
        package: String,
        version: String,
    },

    #[error("registry request failed: {0}")]
    Http(#[from] HttpError),
}

/// Source of release file listings.
pub trait Registry: Send + Sync {
    fn release_files(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: &str,
    ) -> Result<Vec<ReleaseFile>, RegistryError>;
}

/// Rebuild errors
#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("no artifact matching {convention} for {ecosystem} {package} {version}")]
    NoMatchingArtifact {
        ecosystem: Ecosystem,
        package: String,
        version: String,
        convention: String,
    },

    #[error("unsupported ecosystem: {0}")]
    UnsupportedEcosystem(Ecosystem),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("build did not produce {}", .0.display())]
    MissingOutput(PathBuf),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Comparison errors
#[derive(Debug, Error)]
pub enum CompareError {
    #[error("reading artifact: {0}")]
    Asset(#[from] AssetError),

    #[error("summarizing artifact: {0}")]
    Summary(#[from] SummaryError),
}

/// Ecosystem-specific rebuild behavior.
pub trait Rebuilder: Send + Sync {
    fn ecosystem(&self) -> Ecosystem;

    /// Container format of this ecosystem's artifacts.
    fn archive_kind(&self) -> ArchiveKind;

    /// Classifier knobs, notably the metadata path markers.
    fn classifier_config(&self) -> ClassifierConfig;

    /// Human-readable artifact naming convention, e.g. `*-none-any.whl`.
    fn artifact_convention(&self) -> &'static str;

    /// Whether `filename` is a rebuildable artifact for `target`.
    fn is_candidate(&self, target: &Target, filename: &str) -> bool;

    /// Pick the release file to rebuild.
    ///
    /// A target that already names its artifact only matches that file.
    fn select_artifact(
        &self,
        target: &Target,
        files: &[ReleaseFile],
    ) -> Result<ReleaseFile, RebuildError> {
        files
            .iter()
            .find(|f| {
                if target.has_artifact() {
                    f.filename == target.artifact()
                } else {
                    self.is_candidate(target, &f.filename)
                }
            })
            .cloned()
            .ok_or_else(|| RebuildError::NoMatchingArtifact {
                ecosystem: target.ecosystem(),
                package: target.package().to_string(),
                version: target.version().to_string(),
                convention: if target.has_artifact() {
                    target.artifact().to_string()
                } else {
                    self.artifact_convention().to_string()
                },
            })
    }

    /// Run the build in `root` and return the path of the produced artifact.
    fn rebuild(
        &self,
        executor: &dyn ScriptExecutor,
        root: &Path,
        instructions: &Instructions,
    ) -> Result<PathBuf, RebuildError> {
        execute_instructions(executor, root, instructions)?;
        let output = root.join(&instructions.output_path);
        if !output.is_file() {
            return Err(RebuildError::MissingOutput(output));
        }
        Ok(output)
    }

    /// Classify the rebuilt artifact against upstream.
    fn compare(
        &self,
        target: &Target,
        rebuilt: &Asset,
        upstream: &Asset,
        store: &dyn AssetStore,
    ) -> Result<Option<VerdictKind>, CompareError> {
        let kind = self.archive_kind();
        let rebuilt = ContentSummary::from_bytes(kind, target.artifact(), &read_asset(store, rebuilt)?)?;
        let upstream =
            ContentSummary::from_bytes(kind, target.artifact(), &read_asset(store, upstream)?)?;
        debug!(
            target = %target,
            rebuilt_files = rebuilt.len(),
            upstream_files = upstream.len(),
            "comparing summaries"
        );
        Ok(classify(&rebuilt, &upstream, &self.classifier_config()))
    }
}

/// Rebuilders keyed by ecosystem.
#[derive(Clone, Default)]
pub struct RebuilderRegistry {
    rebuilders: HashMap<Ecosystem, Arc<dyn Rebuilder>>,
}

impl RebuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in ecosystem.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(pypi::PypiRebuilder));
        registry.register(Arc::new(npm::NpmRebuilder));
        registry.register(Arc::new(cratesio::CratesIoRebuilder));
        registry.register(Arc::new(debian::DebianRebuilder));
        registry
    }

    /// Add or replace the rebuilder for its ecosystem.
    pub fn register(&mut self, rebuilder: Arc<dyn Rebuilder>) {
        self.rebuilders.insert(rebuilder.ecosystem(), rebuilder);
    }

    pub fn get(&self, ecosystem: Ecosystem) -> Result<Arc<dyn Rebuilder>, RebuildError> {
        self.rebuilders
            .get(&ecosystem)
            .cloned()
            .ok_or(RebuildError::UnsupportedEcosystem(ecosystem))
    }
}
