//! Rebuild pipelines
//!
//! Two flows share the same verdict semantics:
//! - `rebuild_package`: one target built on the remote build service, compared
//!   against upstream, and attested with a signed two-statement bundle
//! - `rebuild_many`: a batch of targets built locally, one after another
//!
//! A mismatch is a successful outcome carried in the [`VerdictRecord`]; only
//! failures to produce a verdict surface as [`PipelineError`].

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rebuild_verdict::VerdictKind;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;
use uuid::Uuid;

use crate::assets::{
    copy_asset, read_asset, write_asset, Asset, AssetError, AssetStore, AssetType,
    LocatableAssetStore,
};
use crate::attestation::{
    build_provenance_statement, verdict_statement, ArtifactDigest, AttestationError, BundleWriter,
    DsseEnvelope, Signer,
};
use crate::http::{fetch_bytes, BasicClient, HttpError};
use crate::rebuild::{
    CompareError, RebuildError, RebuildInput, Rebuilder, RebuilderRegistry, Registry, ReleaseFile,
    ScriptExecutor, Target,
};
use crate::remote::{
    make_build_job, BuildInfo, CancelToken, Orchestrator, OrchestratorConfig, RemoteBuildService,
    RemoteError, RemoteOptions, UploadUrls,
};

/// Prefix of every mismatch message.
pub const MISMATCH_PREFIX: &str = "rebuild content mismatch: ";

/// Outcome of one rebuild attempt.
///
/// An empty message means the target reproduced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub target: Target,
    pub message: String,
    pub kind: Option<VerdictKind>,
}

impl VerdictRecord {
    pub fn reproduced(target: Target) -> Self {
        Self {
            target,
            message: String::new(),
            kind: None,
        }
    }

    pub fn mismatch(target: Target, kind: VerdictKind) -> Self {
        Self {
            target,
            message: format!("{}{}", MISMATCH_PREFIX, kind.message()),
            kind: Some(kind),
        }
    }

    /// A batch item that never reached a verdict.
    pub fn failed(target: Target, message: impl Into<String>) -> Self {
        Self {
            target,
            message: message.into(),
            kind: None,
        }
    }

    pub fn from_verdict(target: Target, kind: Option<VerdictKind>) -> Self {
        match kind {
            Some(kind) => Self::mismatch(target, kind),
            None => Self::reproduced(target),
        }
    }

    pub fn is_reproduced(&self) -> bool {
        self.message.is_empty()
    }
}

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no rebuild inputs given")]
    EmptyBatch,

    #[error(transparent)]
    Rebuild(#[from] RebuildError),

    #[error("fetching upstream: {0}")]
    Fetch(#[from] HttpError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("storing assets: {0}")]
    Assets(#[from] AssetError),

    #[error("summarizing assets: {0}")]
    Summarizing(#[from] CompareError),

    #[error("attestation: {0}")]
    Attestation(#[from] AttestationError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) | PipelineError::EmptyBatch => 1,
            PipelineError::Rebuild(RebuildError::UnsupportedEcosystem(_)) => 1,
            PipelineError::Rebuild(RebuildError::Build(_))
            | PipelineError::Rebuild(RebuildError::MissingOutput(_)) => 40,
            PipelineError::Rebuild(_) => 20,
            PipelineError::Fetch(_) => 20,
            PipelineError::Remote(RemoteError::Aborted { .. }) => 80,
            PipelineError::Remote(RemoteError::InvalidJob(_)) => 1,
            PipelineError::Remote(_) => 50,
            PipelineError::Assets(_)
            | PipelineError::Summarizing(_)
            | PipelineError::Serialization(_)
            | PipelineError::Io(_) => 70,
            PipelineError::Attestation(_) => 93,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Opens the remote metadata store for a run id.
pub type RemoteStoreFactory =
    Box<dyn Fn(&str) -> Result<Arc<dyn LocatableAssetStore>, AssetError> + Send + Sync>;

/// One remote rebuild.
#[derive(Debug, Clone)]
pub struct RebuildRequest {
    pub input: RebuildInput,
    /// Replace an existing attestation bundle instead of refusing
    pub overwrite_attestations: bool,
}

/// Collaborators of the remote flow.
pub struct RebuildDeps {
    pub http: Arc<dyn BasicClient>,
    pub registry: Arc<dyn Registry>,
    pub rebuilders: RebuilderRegistry,
    pub service: Arc<dyn RemoteBuildService>,
    pub signer: Arc<dyn Signer>,
    /// Dockerfile, BuildInfo, job handles, rebuilt and upstream artifacts
    pub local_metadata: Arc<dyn AssetStore>,
    pub attestations: Arc<dyn AssetStore>,
    /// Called once per run with a fresh run id
    pub remote_metadata: RemoteStoreFactory,
    pub remote: RemoteOptions,
    pub orchestrator: OrchestratorConfig,
    pub cancel: CancelToken,
}

fn resolve_artifact(
    registry: &dyn Registry,
    rebuilder: &dyn Rebuilder,
    target: &Target,
) -> Result<(Target, ReleaseFile), RebuildError> {
    let files = registry.release_files(target.ecosystem(), target.package(), target.version())?;
    let file = rebuilder.select_artifact(target, &files)?;
    Ok((target.with_artifact(file.filename.clone()), file))
}

/// Fetch the upstream artifact into `store`.
fn store_upstream(
    http: &dyn BasicClient,
    store: &dyn AssetStore,
    target: &Target,
    file: &ReleaseFile,
) -> PipelineResult<Asset> {
    let asset = Asset::new(AssetType::UpstreamArtifact, target);
    let bytes = fetch_bytes(http, &file.url)?;
    write_asset(store, &asset, &bytes)?;
    debug!(target = %target, url = %file.url, bytes = bytes.len(), "Stored upstream artifact");
    Ok(asset)
}

/// Rebuild one package remotely and attest the verdict.
pub fn rebuild_package(request: &RebuildRequest, deps: &RebuildDeps) -> PipelineResult<VerdictRecord> {
    let requested = &request.input.target;
    let rebuilder = deps.rebuilders.get(requested.ecosystem())?;
    let (target, release) = resolve_artifact(deps.registry.as_ref(), rebuilder.as_ref(), requested)?;
    let input = RebuildInput {
        target: target.clone(),
        ..request.input.clone()
    };

    let bundle = Asset::new(AssetType::AttestationBundle, &target);
    if !request.overwrite_attestations && deps.attestations.exists(&bundle)? {
        return Err(AttestationError::BundleExists(bundle.key()?).into());
    }

    let orchestrator = Orchestrator::new(deps.service.clone(), deps.orchestrator.clone())
        .with_cancel_token(deps.cancel.clone())
        .with_handle_store(deps.local_metadata.clone());
    // A resumed job wrote its outputs under its own run's remote store.
    let run_id = match orchestrator.resumable(&target)? {
        Some(handle) => handle.run_id,
        None => Ulid::new().to_string(),
    };
    let remote = (deps.remote_metadata)(&run_id)?;
    let rebuilt = Asset::new(AssetType::RebuildArtifact, &target);
    let build_log = Asset::new(AssetType::BuildLog, &target);
    let urls = UploadUrls {
        rebuild: remote.url(&rebuilt)?,
        build_log: remote.url(&build_log)?,
    };
    info!(target = %target, run_id = %run_id, "Starting remote rebuild");

    let definition = make_build_job(&input, &deps.remote, &urls)?;
    write_asset(
        deps.local_metadata.as_ref(),
        &Asset::new(AssetType::Dockerfile, &target),
        definition.dockerfile.as_bytes(),
    )?;

    let info = match orchestrator.run(&run_id, &target, &definition.job) {
        Ok(info) => info,
        Err(RemoteError::BuildFailed { status, info }) => {
            if let Err(e) = write_build_info(deps.local_metadata.as_ref(), &info) {
                warn!(target = %target, error = %e, "Failed to record BuildInfo of failed build");
            }
            return Err(RemoteError::BuildFailed { status, info }.into());
        }
        Err(e) => return Err(e.into()),
    };
    write_build_info(deps.local_metadata.as_ref(), &info)?;

    copy_asset(remote.as_ref(), deps.local_metadata.as_ref(), &rebuilt)?;
    match copy_asset(remote.as_ref(), deps.local_metadata.as_ref(), &build_log) {
        Ok(bytes) => debug!(target = %target, bytes, "Copied build log"),
        Err(e) => warn!(target = %target, error = %e, "Build log unavailable"),
    }

    let upstream = store_upstream(
        deps.http.as_ref(),
        deps.local_metadata.as_ref(),
        &target,
        &release,
    )?;
    let kind = rebuilder.compare(&target, &rebuilt, &upstream, deps.local_metadata.as_ref())?;
    let record = VerdictRecord::from_verdict(target.clone(), kind);

    let rebuilt_digest = ArtifactDigest::of(
        target.artifact(),
        &read_asset(deps.local_metadata.as_ref(), &rebuilt)?,
    );
    let upstream_digest = ArtifactDigest::of(
        target.artifact(),
        &read_asset(deps.local_metadata.as_ref(), &upstream)?,
    );
    let envelopes = [
        DsseEnvelope::sign(
            &build_provenance_statement(&info, &input, &rebuilt_digest),
            deps.signer.as_ref(),
        )?,
        DsseEnvelope::sign(
            &verdict_statement(&record, &rebuilt_digest, &upstream_digest),
            deps.signer.as_ref(),
        )?,
    ];
    BundleWriter::write(
        deps.attestations.as_ref(),
        &target,
        &envelopes,
        request.overwrite_attestations,
    )?;

    info!(
        target = %target,
        build_id = %info.build_id,
        reproduced = record.is_reproduced(),
        verdict = record.kind.map(|k| k.code()).unwrap_or("NONE"),
        "Rebuild attested"
    );
    Ok(record)
}

fn write_build_info(store: &dyn AssetStore, info: &BuildInfo) -> PipelineResult<()> {
    let asset = Asset::new(AssetType::BuildInfo, &info.target);
    write_asset(store, &asset, info.to_json()?.as_bytes())?;
    Ok(())
}

/// Collaborators of the local flow.
pub struct LocalDeps {
    pub http: Arc<dyn BasicClient>,
    pub registry: Arc<dyn Registry>,
    pub rebuilders: RebuilderRegistry,
    pub executor: Arc<dyn ScriptExecutor>,
    pub store: Arc<dyn AssetStore>,
    /// Parent of the per-target build roots
    pub work_dir: PathBuf,
}

/// Rebuild `inputs` locally, in order.
///
/// Output is positional. A target that fails before reaching a verdict gets
/// the error text as its message; the batch itself only fails when empty.
pub fn rebuild_many(inputs: &[RebuildInput], deps: &LocalDeps) -> PipelineResult<Vec<VerdictRecord>> {
    if inputs.is_empty() {
        return Err(PipelineError::EmptyBatch);
    }
    fs::create_dir_all(&deps.work_dir)?;

    let mut records = Vec::with_capacity(inputs.len());
    for input in inputs {
        let record = match rebuild_local(input, deps) {
            Ok(record) => record,
            Err(e) => {
                warn!(target = %input.target, error = %e, "Local rebuild failed");
                VerdictRecord::failed(input.target.clone(), e.to_string())
            }
        };
        records.push(record);
    }
    let reproduced = records.iter().filter(|r| r.is_reproduced()).count();
    info!(total = records.len(), reproduced, "Batch complete");
    Ok(records)
}

fn rebuild_local(input: &RebuildInput, deps: &LocalDeps) -> PipelineResult<VerdictRecord> {
    let rebuilder = deps.rebuilders.get(input.target.ecosystem())?;
    let (target, release) =
        resolve_artifact(deps.registry.as_ref(), rebuilder.as_ref(), &input.target)?;

    let root = deps.work_dir.join(Uuid::new_v4().to_string());
    fs::create_dir_all(&root)?;
    let result = build_and_compare(rebuilder.as_ref(), &target, &release, input, &root, deps);
    if let Err(e) = fs::remove_dir_all(&root) {
        debug!(root = %root.display(), error = %e, "Failed to remove build root");
    }
    result
}

fn build_and_compare(
    rebuilder: &dyn Rebuilder,
    target: &Target,
    release: &ReleaseFile,
    input: &RebuildInput,
    root: &Path,
    deps: &LocalDeps,
) -> PipelineResult<VerdictRecord> {
    info!(target = %target, root = %root.display(), "Starting local rebuild");
    let output = rebuilder.rebuild(deps.executor.as_ref(), root, &input.instructions)?;

    let rebuilt = Asset::new(AssetType::RebuildArtifact, target);
    write_asset(deps.store.as_ref(), &rebuilt, &fs::read(&output)?)?;
    let upstream = store_upstream(deps.http.as_ref(), deps.store.as_ref(), target, release)?;

    let kind = rebuilder.compare(target, &rebuilt, &upstream, deps.store.as_ref())?;
    Ok(VerdictRecord::from_verdict(target.clone(), kind))
}
