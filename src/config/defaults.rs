//! Built-in defaults (layer 1) and the typed configuration they seed.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::remote::{PollPolicy, RecoveryMode, RemoteOptions};

/// HTTP fetch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Global request timeout in seconds
    pub timeout_secs: u64,
    /// Keep successful GET/HEAD responses in an in-memory cache
    pub cache: bool,
    /// Key cached responses to this instant instead of the bare URI
    pub time_warp: Option<DateTime<Utc>>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agent: crate::http::DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 60,
            cache: true,
            time_warp: None,
        }
    }
}

/// Remote build service settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the build service API
    pub service_url: String,
    #[serde(flatten)]
    pub job: RemoteOptions,
    pub recovery: RecoveryMode,
    pub cancel_on_abort: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            service_url: "https://cloudbuild.googleapis.com/v1".to_string(),
            job: RemoteOptions::default(),
            recovery: RecoveryMode::default(),
            cancel_on_abort: true,
        }
    }
}

/// Attestation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttestationConfig {
    /// File holding the 32-byte Ed25519 seed, raw or base64
    pub signing_key_path: Option<PathBuf>,
    /// Replace existing bundles instead of refusing
    pub overwrite: bool,
}

/// Asset store locations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub local_metadata: PathBuf,
    pub attestations: PathBuf,
    /// Root of the per-run remote metadata stores
    pub remote_metadata: PathBuf,
    /// Parent of local build roots
    pub work_dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let base = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rebuild");
        Self {
            local_metadata: base.join("metadata"),
            attestations: base.join("attestations"),
            remote_metadata: base.join("remote"),
            work_dir: std::env::temp_dir().join("rebuild-work"),
        }
    }
}

/// Complete typed configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    pub http: HttpConfig,
    pub remote: RemoteConfig,
    pub poll: PollPolicy,
    pub attestation: AttestationConfig,
    pub stores: StoreConfig,
}

impl LaneConfig {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> Result<serde_json::Value, ConfigError> {
        serde_json::to_value(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.http.timeout_secs == 0 || self.http.timeout_secs > 600 {
            return Err(ConfigError::ValidationError(
                "http.timeout_secs must be in (0, 600]".to_string(),
            ));
        }
        if self.remote.job.timeout_secs == 0 || self.remote.job.timeout_secs > 86400 {
            return Err(ConfigError::ValidationError(
                "remote.timeout_secs must be in (0, 86400]".to_string(),
            ));
        }
        if self.poll.initial_delay.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll.initial_delay must be positive".to_string(),
            ));
        }
        if self.poll.max_delay < self.poll.initial_delay {
            return Err(ConfigError::ValidationError(
                "poll.max_delay must be at least poll.initial_delay".to_string(),
            ));
        }
        if self.poll.timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "poll.timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
