//! Record of a completed (or failed) remote build.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rebuild_protocol::{Build, BuildStep};
use serde::{Deserialize, Serialize};

use crate::rebuild::Target;

/// Build record persisted as `build.json` and referenced from provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Lane run id
    pub id: String,
    pub target: Target,
    /// Identity of the orchestrating builder
    pub builder: String,
    /// Service-assigned build id
    pub build_id: String,
    /// Step name to image digest; a repeated name gets a `#<index>` suffix
    pub build_images: BTreeMap<String, String>,
    pub steps: Vec<BuildStep>,
    pub build_start: DateTime<Utc>,
    pub build_end: DateTime<Utc>,
}

impl BuildInfo {
    /// Assemble from the service's view of `build`.
    ///
    /// Step names are paired with `results.build_step_images` by position
    /// and made unique with the step index when repeated;
    /// a failed build may report fewer images than steps. Service timestamps
    /// win over the local ones when present.
    pub fn from_build(
        run_id: &str,
        target: &Target,
        builder: &str,
        build: &Build,
        local_start: DateTime<Utc>,
        local_end: DateTime<Utc>,
    ) -> Self {
        let mut build_images = BTreeMap::new();
        for (index, (step, image)) in build.steps.iter().zip(build.step_images()).enumerate() {
            let mut name = step.display_name().to_string();
            if build_images.contains_key(&name) {
                name = format!("{}#{}", name, index);
            }
            build_images.insert(name, image.clone());
        }
        Self {
            id: run_id.to_string(),
            target: target.clone(),
            builder: builder.to_string(),
            build_id: build.id.clone(),
            build_images,
            steps: build.steps.clone(),
            build_start: build.start_time.unwrap_or(local_start),
            build_end: build.finish_time.unwrap_or(local_end),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
