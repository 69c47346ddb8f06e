//! Python wheels.

use rebuild_verdict::{ArchiveKind, ClassifierConfig};

use super::{Ecosystem, Rebuilder, Target};

/// Wheel metadata directory marker.
pub const DIST_INFO_MARKER: &str = ".dist-info/";

/// Rebuilds pure-Python wheels (`*-none-any.whl`).
#[derive(Debug, Clone, Copy, Default)]
pub struct PypiRebuilder;

impl Rebuilder for PypiRebuilder {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::PyPI
    }

    fn archive_kind(&self) -> ArchiveKind {
        ArchiveKind::Zip
    }

    fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::with_metadata_markers([DIST_INFO_MARKER])
    }

    fn artifact_convention(&self) -> &'static str {
        "*-none-any.whl"
    }

    fn is_candidate(&self, _target: &Target, filename: &str) -> bool {
        filename.ends_with("-none-any.whl")
    }
}
