//! Rebuild targets and their inputs.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Package ecosystem a target belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ecosystem {
    #[serde(rename = "pypi")]
    PyPI,
    Npm,
    #[serde(rename = "cratesio")]
    CratesIo,
    Debian,
}

impl Ecosystem {
    pub const ALL: [Ecosystem; 4] = [
        Ecosystem::PyPI,
        Ecosystem::Npm,
        Ecosystem::CratesIo,
        Ecosystem::Debian,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ecosystem::PyPI => "pypi",
            Ecosystem::Npm => "npm",
            Ecosystem::CratesIo => "cratesio",
            Ecosystem::Debian => "debian",
        }
    }
}

impl fmt::Display for Ecosystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Ecosystem {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ecosystem::ALL
            .iter()
            .copied()
            .find(|e| e.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown ecosystem: {}", s))
    }
}

/// One artifact of one version of one package.
///
/// Immutable once built; use [`Target::with_artifact`] to derive a variant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    ecosystem: Ecosystem,
    package: String,
    version: String,
    #[serde(default)]
    artifact: String,
}

impl Target {
    pub fn new(
        ecosystem: Ecosystem,
        package: impl Into<String>,
        version: impl Into<String>,
        artifact: impl Into<String>,
    ) -> Self {
        Self {
            ecosystem,
            package: package.into(),
            version: version.into(),
            artifact: artifact.into(),
        }
    }

    pub fn ecosystem(&self) -> Ecosystem {
        self.ecosystem
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Artifact filename; empty until resolved against a registry.
    pub fn artifact(&self) -> &str {
        &self.artifact
    }

    /// Whether the artifact filename has been resolved.
    pub fn has_artifact(&self) -> bool {
        !self.artifact.is_empty()
    }

    /// Copy of this target naming a different artifact.
    pub fn with_artifact(&self, artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            ..self.clone()
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.ecosystem, self.package, self.version)?;
        if self.has_artifact() {
            write!(f, " ({})", self.artifact)?;
        }
        Ok(())
    }
}

/// Build scripts for the three phases, plus where the build leaves its output.
///
/// Scripts are opaque; an empty script is a no-op phase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instructions {
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub deps: String,
    #[serde(default)]
    pub build: String,
    /// Path of the produced artifact, relative to the build root.
    pub output_path: String,
}

/// Build strategy, carried verbatim into provenance.
pub type Strategy = serde_json::Value;

/// Source location of a rebuild.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub repo: String,
    #[serde(rename = "ref")]
    pub git_ref: String,
    #[serde(default)]
    pub dir: String,
}

/// A downloadable file of a release, as listed by a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseFile {
    pub filename: String,
    pub url: String,
}

impl ReleaseFile {
    pub fn new(filename: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            url: url.into(),
        }
    }
}

/// Everything needed to rebuild one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebuildInput {
    pub target: Target,
    pub instructions: Instructions,
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub location: Location,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ecosystem_names_round_trip() {
        for eco in Ecosystem::ALL {
            assert_eq!(eco.as_str().parse::<Ecosystem>().unwrap(), eco);
            let json = serde_json::to_string(&eco).unwrap();
            assert_eq!(json, format!("\"{}\"", eco.as_str()));
        }
        assert!("maven".parse::<Ecosystem>().is_err());
    }

    #[test]
    fn test_with_artifact_leaves_original() {
        let target = Target::new(Ecosystem::PyPI, "absl-py", "2.0.0", "");
        let resolved = target.with_artifact("absl_py-2.0.0-py3-none-any.whl");
        assert!(!target.has_artifact());
        assert_eq!(resolved.artifact(), "absl_py-2.0.0-py3-none-any.whl");
        assert_eq!(resolved.package(), "absl-py");
        assert_eq!(
            resolved.to_string(),
            "pypi/absl-py@2.0.0 (absl_py-2.0.0-py3-none-any.whl)"
        );
    }

    #[test]
    fn test_location_serializes_ref() {
        let loc = Location {
            repo: "https://github.com/abseil/abseil-py".to_string(),
            git_ref: "v2.0.0".to_string(),
            dir: String::new(),
        };
        let json = serde_json::to_value(&loc).unwrap();
        assert_eq!(json["ref"], "v2.0.0");
    }
}
