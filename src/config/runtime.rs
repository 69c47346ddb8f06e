//! Turning settings into components.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::debug;

use super::defaults::{AttestationConfig, HttpConfig, LaneConfig, RemoteConfig};
use super::ConfigError;
use crate::attestation::Ed25519Signer;
use crate::cache::CoalescingCache;
use crate::http::{BasicClient, CachedClient, UreqClient, WithUserAgent};
use crate::remote::{HttpBuildService, OrchestratorConfig, RemoteBuildService};

impl HttpConfig {
    /// ureq transport stamped with the user agent, never cached.
    pub fn transport(&self) -> Result<WithUserAgent<UreqClient>, ConfigError> {
        let transport = UreqClient::new(Some(Duration::from_secs(self.timeout_secs)));
        WithUserAgent::new(transport, &self.user_agent)
            .map_err(|e| ConfigError::ValidationError(format!("http.user_agent: {}", e)))
    }

    /// [`transport`](Self::transport), then the response cache when enabled.
    pub fn client(&self) -> Result<Arc<dyn BasicClient>, ConfigError> {
        let stamped = self.transport()?;
        if !self.cache {
            return Ok(Arc::new(stamped));
        }
        let mut cached = CachedClient::new(stamped, CoalescingCache::<Vec<u8>>::new());
        if let Some(at) = self.time_warp {
            cached = cached.with_time_warp(at);
        }
        Ok(Arc::new(cached))
    }
}

impl AttestationConfig {
    /// Load the signer from `signing_key_path`.
    ///
    /// The file holds the 32-byte seed either raw or as base64 text.
    pub fn signer(&self) -> Result<Ed25519Signer, ConfigError> {
        let path = self.signing_key_path.as_ref().ok_or_else(|| {
            ConfigError::ValidationError("attestation.signing_key_path is not set".to_string())
        })?;
        let bytes = fs::read(path)
            .map_err(|e| ConfigError::IoError(format!("{}: {}", path.display(), e)))?;
        let seed = if bytes.len() == 32 {
            bytes
        } else {
            let text = String::from_utf8_lossy(&bytes);
            BASE64
                .decode(text.trim())
                .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))?
        };
        debug!(path = %path.display(), "Loaded signing key");
        Ed25519Signer::from_seed(&seed)
            .map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }
}

impl RemoteConfig {
    /// Build service client on the uncached transport; operation polls must
    /// observe progress, so `http.cache` does not apply here.
    pub fn service(&self, http: &HttpConfig) -> Result<Arc<dyn RemoteBuildService>, ConfigError> {
        let transport = http.transport()?;
        Ok(Arc::new(HttpBuildService::new(
            transport,
            self.service_url.as_str(),
        )))
    }
}

impl LaneConfig {
    pub fn orchestrator(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            project: self.remote.job.project.clone(),
            poll: self.poll,
            cancel_on_abort: self.remote.cancel_on_abort,
            recovery: self.remote.recovery,
            ..OrchestratorConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::Signer;
    use crate::remote::RecoveryMode;

    #[test]
    fn test_orchestrator_settings_follow_config() {
        let mut config = LaneConfig::default();
        config.remote.job.project = "proj".to_string();
        config.remote.recovery = RecoveryMode::ResumeByHandle;
        config.remote.cancel_on_abort = false;
        config.poll.timeout = Duration::from_secs(5);

        let orchestrator = config.orchestrator();
        assert_eq!(orchestrator.project, "proj");
        assert_eq!(orchestrator.recovery, RecoveryMode::ResumeByHandle);
        assert!(!orchestrator.cancel_on_abort);
        assert_eq!(orchestrator.poll.timeout, Duration::from_secs(5));
        assert!(orchestrator.builder.starts_with("rebuild-lane/"));
    }

    #[test]
    fn test_signer_from_raw_and_base64_seed() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.key");
        let b64 = dir.path().join("b64.key");
        fs::write(&raw, [9u8; 32]).unwrap();
        fs::write(&b64, format!("{}\n", BASE64.encode([9u8; 32]))).unwrap();

        let from_raw = AttestationConfig {
            signing_key_path: Some(raw),
            overwrite: false,
        }
        .signer()
        .unwrap();
        let from_b64 = AttestationConfig {
            signing_key_path: Some(b64),
            overwrite: false,
        }
        .signer()
        .unwrap();
        assert_eq!(from_raw.key_id().unwrap(), from_b64.key_id().unwrap());
    }

    #[test]
    fn test_signer_requires_path() {
        let Err(err) = AttestationConfig::default().signer() else {
            panic!("signer built without a key path");
        };
        assert!(err.to_string().contains("signing_key_path"));
    }

    #[test]
    fn test_invalid_user_agent_rejected() {
        let config = HttpConfig {
            user_agent: "bad\nagent".to_string(),
            ..HttpConfig::default()
        };
        assert!(config.client().is_err());
        assert!(config.transport().is_err());
    }

    #[test]
    fn test_service_ignores_response_cache() {
        let config = LaneConfig {
            http: HttpConfig {
                cache: true,
                user_agent: "bad\nagent".to_string(),
                ..HttpConfig::default()
            },
            ..LaneConfig::default()
        };
        // The service is built on the transport, so it fails the same way.
        assert!(config.remote.service(&config.http).is_err());
        let config = LaneConfig {
            http: HttpConfig {
                cache: true,
                ..HttpConfig::default()
            },
            ..LaneConfig::default()
        };
        assert!(config.remote.service(&config.http).is_ok());
    }
}
