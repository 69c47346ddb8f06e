//! Build job and build status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status reported by the service for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// Status not reported yet.
    StatusUnknown,
    /// Accepted but waiting on resources.
    Pending,
    /// Waiting in the queue.
    Queued,
    /// Steps are executing.
    Working,
    /// All steps finished successfully.
    Success,
    /// A step failed.
    Failure,
    /// The service itself failed.
    InternalError,
    /// The build exceeded its timeout.
    Timeout,
    /// Cancelled by a user or the orchestrator.
    Cancelled,
    /// Expired in the queue before starting.
    Expired,
}

impl BuildStatus {
    /// Whether the build can no longer change state.
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::StatusUnknown | Self::Pending | Self::Queued | Self::Working
        )
    }

    /// Whether the build finished successfully.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Wire name, e.g. `"INTERNAL_ERROR"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognised status string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown build status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for BuildStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "STATUS_UNKNOWN" => Self::StatusUnknown,
            "PENDING" => Self::Pending,
            "QUEUED" => Self::Queued,
            "WORKING" => Self::Working,
            "SUCCESS" => Self::Success,
            "FAILURE" => Self::Failure,
            "INTERNAL_ERROR" => Self::InternalError,
            "TIMEOUT" => Self::Timeout,
            "CANCELLED" => Self::Cancelled,
            "EXPIRED" => Self::Expired,
            other => return Err(UnknownStatus(other.to_string())),
        };
        Ok(status)
    }
}

/// One container step of a build job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStep {
    /// Container image the step runs in.
    pub name: String,
    /// Step identifier, used to name the step's image digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Entrypoint override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<String>,
    /// Arguments passed to the entrypoint.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Inline script, mutually exclusive with `args`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    /// `KEY=VALUE` environment entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

impl BuildStep {
    /// Step running `script` inside `image`.
    pub fn script(image: impl Into<String>, script: impl Into<String>) -> Self {
        Self {
            name: image.into(),
            id: None,
            entrypoint: None,
            args: Vec::new(),
            script: Some(script.into()),
            env: Vec::new(),
        }
    }

    /// Set the step id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Name used when reporting this step: the id if set, else the image.
    pub fn display_name(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }
}

/// Job description submitted to the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildJob {
    /// Steps executed in order.
    pub steps: Vec<BuildStep>,
    /// Overall build timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Service account the build runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account: Option<String>,
    /// Location for service-side logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_bucket: Option<String>,
    /// Worker machine type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    /// Free-form tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Results reported for a finished build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResults {
    /// Image digest per step, positionally aligned with the job's steps.
    #[serde(default)]
    pub build_step_images: Vec<String>,
}

/// A build as reported by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Build {
    /// Service-assigned build id.
    pub id: String,
    /// Project the build runs in.
    #[serde(default)]
    pub project_id: String,
    /// Current status.
    pub status: BuildStatus,
    /// Human-readable status detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_detail: Option<String>,
    /// Steps as submitted.
    #[serde(default)]
    pub steps: Vec<BuildStep>,
    /// Results; may be partial for failed builds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<BuildResults>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<DateTime<Utc>>,
    /// Where the service exposes build logs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_url: Option<String>,
}

impl Build {
    /// Step images reported so far, empty if none.
    pub fn step_images(&self) -> &[String] {
        self.results
            .as_ref()
            .map(|r| r.build_step_images.as_slice())
            .unwrap_or(&[])
    }
}
