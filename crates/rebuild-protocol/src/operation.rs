//! Long-running operation handles.

use serde::{Deserialize, Serialize};

use crate::build::Build;
use crate::error::ServiceError;

/// Metadata attached to a build operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Snapshot of the build at the time of the last poll.
    pub build: Build,
}

/// Handle for an in-flight or finished remote build.
///
/// `done` is set once the build reached a terminal status. A finished
/// operation carries either the final build in `metadata` or an `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Service-assigned operation name, stable across polls.
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<OperationMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ServiceError>,
}

impl Operation {
    /// Pending operation for `build`.
    pub fn pending(name: impl Into<String>, build: Build) -> Self {
        Self {
            name: name.into(),
            done: false,
            metadata: Some(OperationMetadata { build }),
            error: None,
        }
    }

    /// Build snapshot, if the service reported one.
    pub fn build(&self) -> Option<&Build> {
        self.metadata.as_ref().map(|m| &m.build)
    }

    /// Build id, if known.
    pub fn build_id(&self) -> Option<&str> {
        self.build().map(|b| b.id.as_str())
    }
}
