//! Debian binary packages.
//!
//! `.deb` files are compared as opaque blobs.

use rebuild_verdict::{ArchiveKind, ClassifierConfig};

use super::{Ecosystem, Rebuilder, Target};

#[derive(Debug, Clone, Copy, Default)]
pub struct DebianRebuilder;

impl Rebuilder for DebianRebuilder {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Debian
    }

    fn archive_kind(&self) -> ArchiveKind {
        ArchiveKind::Raw
    }

    fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::default()
    }

    fn artifact_convention(&self) -> &'static str {
        "<name>_<version>_<arch>.deb"
    }

    fn is_candidate(&self, target: &Target, filename: &str) -> bool {
        // File names drop the epoch: `1:5.4.1-1` ships as `_5.4.1-1_`.
        let version = target
            .version()
            .split_once(':')
            .map(|(_, v)| v)
            .unwrap_or(target.version());
        // Archive components prefix the name: `main/xz-utils`.
        let name = target
            .package()
            .rsplit('/')
            .next()
            .unwrap_or(target.package());
        filename.starts_with(&format!("{}_{}_", name, version))
            && filename.ends_with(".deb")
    }
}
