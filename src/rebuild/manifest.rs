//! Batch manifests: rebuild inputs plus the release listings they resolve against.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{Ecosystem, RebuildInput, Registry, RegistryError, ReleaseFile};

/// Manifest loading errors
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
}

/// Files published for one version of one package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub ecosystem: Ecosystem,
    pub package: String,
    pub version: String,
    pub files: Vec<ReleaseFile>,
}

/// JSON document driving `rebuild` and `rebuild-many`.
///
/// ```json
/// {
///   "inputs": [{"target": {...}, "instructions": {...}, "location": {...}}],
///   "releases": [{"ecosystem": "pypi", "package": "...", "version": "...", "files": [...]}]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub inputs: Vec<RebuildInput>,
    #[serde(default)]
    pub releases: Vec<Release>,
}

impl Manifest {
    pub fn read(path: &Path) -> Result<Self, ManifestError> {
        let display = path.display().to_string();
        let bytes = fs::read(path).map_err(|source| ManifestError::Io {
            path: display.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|source| ManifestError::Parse {
            path: display,
            source,
        })
    }

    /// Registry answering from `releases`. A release listed twice keeps its last entry.
    pub fn registry(&self) -> ManifestRegistry {
        let releases = self
            .releases
            .iter()
            .map(|r| {
                (
                    (r.ecosystem, r.package.clone(), r.version.clone()),
                    r.files.clone(),
                )
            })
            .collect();
        ManifestRegistry { releases }
    }
}

/// [`Registry`] over a manifest's release listings.
#[derive(Debug, Clone, Default)]
pub struct ManifestRegistry {
    releases: HashMap<(Ecosystem, String, String), Vec<ReleaseFile>>,
}

impl Registry for ManifestRegistry {
    fn release_files(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: &str,
    ) -> Result<Vec<ReleaseFile>, RegistryError> {
        self.releases
            .get(&(ecosystem, package.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownRelease {
                ecosystem,
                package: package.to_string(),
                version: version.to_string(),
            })
    }
}
