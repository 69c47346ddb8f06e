//! Submit, poll and record one remote build.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rebuild_protocol::{BuildJob, ErrorCode, Operation};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::build_info::BuildInfo;
use super::poll::{wait_for_operation, CancelToken, PollOutcome, PollPolicy};
use super::service::RemoteBuildService;
use super::state::RemoteJobTracker;
use super::RemoteError;
use crate::assets::{read_asset, write_asset, Asset, AssetError, AssetStore, AssetType};
use crate::rebuild::Target;

/// What to do when a target already has a remote job handle on record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryMode {
    /// Always submit a fresh job.
    #[default]
    Resubmit,
    /// Poll the recorded operation instead of submitting, if it still exists.
    ResumeByHandle,
}

/// Persisted pointer to a submitted remote job.
///
/// A handle is resumable until `finished_at` is set, which happens once the
/// build reaches a terminal status or is cancelled after an abort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteJobHandle {
    /// Lane run that submitted the job; its outputs live under this run
    pub run_id: String,
    pub operation_name: String,
    pub build_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    /// An aborted wait left the build running remotely
    #[serde(default)]
    pub orphaned: bool,
}

impl RemoteJobHandle {
    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub project: String,
    /// Identity recorded as `BuildInfo::builder`
    pub builder: String,
    pub poll: PollPolicy,
    /// Cancel the remote build when the wait is aborted
    pub cancel_on_abort: bool,
    pub recovery: RecoveryMode,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            project: String::new(),
            builder: concat!("rebuild-lane/", env!("CARGO_PKG_VERSION")).to_string(),
            poll: PollPolicy::default(),
            cancel_on_abort: true,
            recovery: RecoveryMode::default(),
        }
    }
}

/// Drives remote builds through the service.
pub struct Orchestrator {
    service: Arc<dyn RemoteBuildService>,
    config: OrchestratorConfig,
    cancel: CancelToken,
    handles: Option<Arc<dyn AssetStore>>,
}

impl Orchestrator {
    pub fn new(service: Arc<dyn RemoteBuildService>, config: OrchestratorConfig) -> Self {
        Self {
            service,
            config,
            cancel: CancelToken::new(),
            handles: None,
        }
    }

    /// Use `cancel` to abort waits from another thread.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Persist job handles to `store` after submission.
    pub fn with_handle_store(mut self, store: Arc<dyn AssetStore>) -> Self {
        self.handles = Some(store);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The unfinished handle a run for `target` would resume, if any.
    ///
    /// Always `None` unless recovery is [`RecoveryMode::ResumeByHandle`].
    /// Callers reuse its `run_id` so the resumed job's outputs are found.
    pub fn resumable(&self, target: &Target) -> Result<Option<RemoteJobHandle>, RemoteError> {
        if self.config.recovery != RecoveryMode::ResumeByHandle {
            return Ok(None);
        }
        Ok(self.load_handle(target)?.filter(|h| !h.is_finished()))
    }

    /// Run `job` for `target` to completion.
    ///
    /// Success yields the [`BuildInfo`]. A failed build yields
    /// [`RemoteError::BuildFailed`] with whatever the service reported. An
    /// aborted wait yields [`RemoteError::Aborted`]; it is never retried here.
    /// A build left running by an abort is recorded as orphaned in its handle.
    pub fn run(&self, run_id: &str, target: &Target, job: &BuildJob) -> Result<BuildInfo, RemoteError> {
        if job.steps.is_empty() {
            return Err(RemoteError::InvalidJob("job has no steps".to_string()));
        }
        let local_start = Utc::now();
        let (op, mut handle) = self.submit_or_resume(run_id, target, job)?;
        let mut tracker = RemoteJobTracker::new();
        if let Some(build) = op.build() {
            tracker.observe(build.status)?;
        }

        let outcome = wait_for_operation(
            self.service.as_ref(),
            op,
            &self.config.poll,
            &self.cancel,
        )?;

        let op = match outcome {
            PollOutcome::Done(op) => op,
            PollOutcome::Aborted { reason, last } => {
                tracker.abort()?;
                let build_id = last.build_id().map(str::to_string).or(handle.build_id.clone());
                if self.handle_abort(build_id.as_deref()) {
                    handle.finished_at = Some(Utc::now());
                } else {
                    handle.orphaned = build_id.is_some();
                }
                handle.build_id = build_id.clone();
                self.store_handle(target, &handle)?;
                return Err(RemoteError::Aborted { reason, build_id });
            }
        };

        handle.finished_at = Some(Utc::now());
        handle.orphaned = false;
        self.store_handle(target, &handle)?;

        let Some(build) = op.build() else {
            return Err(match &op.error {
                Some(err) => RemoteError::Service(err.clone()),
                None => RemoteError::MissingBuild(op.name.clone()),
            });
        };
        tracker.observe(build.status)?;

        let info = BuildInfo::from_build(
            run_id,
            target,
            &self.config.builder,
            build,
            local_start,
            Utc::now(),
        );
        if !build.status.is_success() {
            warn!(build_id = %info.build_id, status = %build.status, "remote build failed");
            return Err(RemoteError::BuildFailed {
                status: build.status,
                info: Box::new(info),
            });
        }
        info!(build_id = %info.build_id, target = %target, "remote build succeeded");
        Ok(info)
    }

    fn submit_or_resume(
        &self,
        run_id: &str,
        target: &Target,
        job: &BuildJob,
    ) -> Result<(Operation, RemoteJobHandle), RemoteError> {
        if let Some(handle) = self.resumable(target)?.filter(|h| h.run_id == run_id) {
            let pending = Operation {
                name: handle.operation_name.clone(),
                done: false,
                metadata: None,
                error: None,
            };
            match self.service.get_operation(&pending) {
                Ok(op) => {
                    info!(operation = %op.name, run_id = %run_id, target = %target, "resuming remote build");
                    return Ok((op, handle));
                }
                Err(e) if e.code == ErrorCode::NotFound => {
                    warn!(operation = %handle.operation_name, "recorded operation gone; resubmitting");
                }
                Err(e) => return Err(e.into()),
            }
        }

        let op = self.service.create_build(&self.config.project, job)?;
        info!(operation = %op.name, build_id = ?op.build_id(), target = %target, "submitted remote build");
        let handle = RemoteJobHandle {
            run_id: run_id.to_string(),
            operation_name: op.name.clone(),
            build_id: op.build_id().map(str::to_string),
            submitted_at: Utc::now(),
            finished_at: None,
            orphaned: false,
        };
        self.store_handle(target, &handle)?;
        Ok((op, handle))
    }

    /// Returns whether the remote build is known to be stopped.
    fn handle_abort(&self, build_id: Option<&str>) -> bool {
        match (build_id, self.config.cancel_on_abort) {
            (Some(id), true) => match self.service.cancel_build(&self.config.project, id) {
                Ok(()) => true,
                Err(e) => {
                    warn!(build_id = %id, error = %e, "failed to cancel aborted remote build; recorded as orphaned");
                    false
                }
            },
            (Some(id), false) => {
                warn!(build_id = %id, "remote build left running after abort; recorded as orphaned");
                false
            }
            (None, _) => {
                warn!("aborted before the service assigned a build id");
                false
            }
        }
    }

    fn store_handle(&self, target: &Target, handle: &RemoteJobHandle) -> Result<(), RemoteError> {
        let Some(store) = &self.handles else {
            return Ok(());
        };
        let asset = Asset::new(AssetType::RemoteJobHandle, target);
        write_asset(store.as_ref(), &asset, &serde_json::to_vec_pretty(handle)?)?;
        Ok(())
    }

    /// The handle recorded for `target`, finished or not.
    pub fn load_handle(&self, target: &Target) -> Result<Option<RemoteJobHandle>, RemoteError> {
        let Some(store) = &self.handles else {
            return Ok(None);
        };
        let asset = Asset::new(AssetType::RemoteJobHandle, target);
        match read_asset(store.as_ref(), &asset) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(AssetError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
