//! Fixed release listings.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::rebuild::{Ecosystem, Registry, RegistryError, ReleaseFile};

type ReleaseKey = (Ecosystem, String, String);

/// Registry serving release files added with [`MockRegistry::add_release`].
#[derive(Debug, Clone, Default)]
pub struct MockRegistry {
    releases: Arc<Mutex<HashMap<ReleaseKey, Vec<ReleaseFile>>>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_release(&self, ecosystem: Ecosystem, package: &str, version: &str, files: Vec<ReleaseFile>) {
        self.releases
            .lock()
            .unwrap()
            .insert((ecosystem, package.to_string(), version.to_string()), files);
    }
}

impl Registry for MockRegistry {
    fn release_files(
        &self,
        ecosystem: Ecosystem,
        package: &str,
        version: &str,
    ) -> Result<Vec<ReleaseFile>, RegistryError> {
        self.releases
            .lock()
            .unwrap()
            .get(&(ecosystem, package.to_string(), version.to_string()))
            .cloned()
            .ok_or_else(|| RegistryError::UnknownRelease {
                ecosystem,
                package: package.to_string(),
                version: version.to_string(),
            })
    }
}
