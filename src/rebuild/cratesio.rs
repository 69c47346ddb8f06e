//! crates.io packages.

use rebuild_verdict::{ArchiveKind, ClassifierConfig};

use super::{Ecosystem, Rebuilder, Target};

/// Written by `cargo package`; records the packaging commit.
pub const VCS_INFO_MARKER: &str = ".cargo_vcs_info.json";

#[derive(Debug, Clone, Copy, Default)]
pub struct CratesIoRebuilder;

impl Rebuilder for CratesIoRebuilder {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::CratesIo
    }

    fn archive_kind(&self) -> ArchiveKind {
        ArchiveKind::TarGz
    }

    fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::with_metadata_markers([VCS_INFO_MARKER])
    }

    fn artifact_convention(&self) -> &'static str {
        "<name>-<version>.crate"
    }

    fn is_candidate(&self, target: &Target, filename: &str) -> bool {
        filename == format!("{}-{}.crate", target.package(), target.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_filename() {
        let target = Target::new(Ecosystem::CratesIo, "serde", "1.0.200", "");
        assert!(CratesIoRebuilder.is_candidate(&target, "serde-1.0.200.crate"));
        assert!(!CratesIoRebuilder.is_candidate(&target, "serde_json-1.0.200.crate"));
    }

    #[test]
    fn test_vcs_info_is_metadata() {
        let config = CratesIoRebuilder.classifier_config();
        assert!(config.is_metadata_path("serde-1.0.200/.cargo_vcs_info.json"));
        assert!(!config.is_metadata_path("serde-1.0.200/src/lib.rs"));
    }
}
