//! Classifier configuration types.

use serde::{Deserialize, Serialize};

/// Per-ecosystem knobs for the verdict classifier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassifierConfig {
    /// Path fragments that mark package-metadata files (e.g. `.dist-info/`).
    ///
    /// A diff is metadata-only when every differing path contains at least one
    /// marker. Empty means no path is treated as metadata.
    #[serde(default)]
    pub metadata_markers: Vec<String>,
}

impl ClassifierConfig {
    /// Config with the given metadata markers.
    pub fn with_metadata_markers<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata_markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether `path` lies under a package-metadata location.
    pub fn is_metadata_path(&self, path: &str) -> bool {
        self.metadata_markers.iter().any(|m| path.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_path_matching() {
        let config = ClassifierConfig::with_metadata_markers([".dist-info/"]);
        assert!(config.is_metadata_path("absl_py-2.0.0.dist-info/RECORD"));
        assert!(!config.is_metadata_path("absl/__init__.py"));
    }

    #[test]
    fn test_no_markers_matches_nothing() {
        let config = ClassifierConfig::default();
        assert!(!config.is_metadata_path("pkg.dist-info/METADATA"));
    }
}
