//! npm package tarballs.

use rebuild_verdict::{ArchiveKind, ClassifierConfig};

use super::{Ecosystem, Rebuilder, Target};

#[derive(Debug, Clone, Copy, Default)]
pub struct NpmRebuilder;

impl Rebuilder for NpmRebuilder {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Npm
    }

    fn archive_kind(&self) -> ArchiveKind {
        ArchiveKind::TarGz
    }

    fn classifier_config(&self) -> ClassifierConfig {
        ClassifierConfig::default()
    }

    fn artifact_convention(&self) -> &'static str {
        "<name>-<version>.tgz"
    }

    fn is_candidate(&self, target: &Target, filename: &str) -> bool {
        // Scoped packages publish `@scope/name` as `name-<version>.tgz`.
        let name = target
            .package()
            .rsplit('/')
            .next()
            .unwrap_or(target.package());
        filename == format!("{}-{}.tgz", name, target.version())
    }
}
