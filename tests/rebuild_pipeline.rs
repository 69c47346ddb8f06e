//! End-to-end rebuild pipeline tests
//!
//! The remote flow runs against the in-process build service: the job's
//! upload step is faked by writing the rebuilt artifact straight into the
//! remote metadata store when the build is submitted.

use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ed25519_dalek::SigningKey;
use tempfile::TempDir;

use rebuild_lane::assets::{
    read_asset, write_asset, Asset, AssetError, AssetStore, AssetType, LocatableAssetStore, MemoryAssetStore,
};
use rebuild_lane::attestation::{
    load_bundle, AttestationError, Ed25519Signer, SLSA_PROVENANCE_PREDICATE_TYPE,
    VERDICT_PREDICATE_TYPE,
};
use rebuild_lane::mock::{MockBuildService, MockHttpClient, MockRegistry};
use rebuild_lane::protocol::BuildStatus;
use rebuild_lane::rebuild::{
    Ecosystem, Instructions, Location, RebuildError, RebuildInput, RebuilderRegistry, ReleaseFile,
    ShellExecutor, Target,
};
use rebuild_lane::remote::{
    BuildInfo, CancelToken, OrchestratorConfig, PollPolicy, RecoveryMode, RemoteError, RemoteOptions,
};
use rebuild_lane::verdict::VerdictKind;
use rebuild_lane::{
    rebuild_many, rebuild_package, LocalDeps, PipelineError, RebuildDeps, RebuildRequest,
};

const WHEEL: &str = "foo-1.0-py3-none-any.whl";
const WHEEL_URL: &str = "https://files.example/foo-1.0-py3-none-any.whl";

fn wheel(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::SimpleFileOptions::default();
    for (path, contents) in entries {
        writer.start_file(*path, options).unwrap();
        writer.write_all(contents.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn requested() -> Target {
    Target::new(Ecosystem::PyPI, "foo", "1.0", "")
}

fn resolved() -> Target {
    requested().with_artifact(WHEEL)
}

fn input() -> RebuildInput {
    RebuildInput {
        target: requested(),
        instructions: Instructions {
            source: "git clone https://github.com/example/foo . && git checkout v1.0".to_string(),
            deps: "pip install build".to_string(),
            build: "python -m build --wheel".to_string(),
            output_path: format!("dist/{}", WHEEL),
        },
        strategy: serde_json::json!({"kind": "pep517"}),
        location: Location {
            repo: "https://github.com/example/foo".to_string(),
            git_ref: "v1.0".to_string(),
            dir: String::new(),
        },
    }
}

struct Harness {
    deps: RebuildDeps,
    service: MockBuildService,
    http: MockHttpClient,
    local: MemoryAssetStore,
    attestations: MemoryAssetStore,
    signer: Arc<Ed25519Signer>,
}

fn harness(rebuilt: Vec<u8>, upstream: Vec<u8>, service: MockBuildService) -> Harness {
    let remote = MemoryAssetStore::new();
    let hook_store = remote.clone();
    let service = service.with_build_id("build-id").on_create(move |_job| {
        write_asset(&hook_store, &Asset::new(AssetType::RebuildArtifact, &resolved()), &rebuilt)
            .unwrap();
        write_asset(&hook_store, &Asset::new(AssetType::BuildLog, &resolved()), b"built\n").unwrap();
    });

    let registry = MockRegistry::new();
    registry.add_release(
        Ecosystem::PyPI,
        "foo",
        "1.0",
        vec![
            ReleaseFile::new("foo-1.0.tar.gz", "https://files.example/foo-1.0.tar.gz"),
            ReleaseFile::new(WHEEL, WHEEL_URL),
        ],
    );
    let http = MockHttpClient::new();
    http.respond(WHEEL_URL, 200, &upstream);

    let local = MemoryAssetStore::new();
    let attestations = MemoryAssetStore::new();
    let signer = Arc::new(Ed25519Signer::new(SigningKey::generate(&mut rand::thread_rng())));

    let deps = RebuildDeps {
        http: Arc::new(http.clone()),
        registry: Arc::new(registry),
        rebuilders: RebuilderRegistry::standard(),
        service: Arc::new(service.clone()),
        signer: signer.clone(),
        local_metadata: Arc::new(local.clone()),
        attestations: Arc::new(attestations.clone()),
        remote_metadata: Box::new(move |_run_id| {
            Ok(Arc::new(remote.clone()) as Arc<dyn LocatableAssetStore>)
        }),
        remote: RemoteOptions {
            project: "test-project".to_string(),
            ..RemoteOptions::default()
        },
        orchestrator: OrchestratorConfig {
            project: "test-project".to_string(),
            poll: PollPolicy {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(5),
                timeout: Duration::from_secs(10),
            },
            ..OrchestratorConfig::default()
        },
        cancel: CancelToken::new(),
    };

    Harness {
        deps,
        service,
        http,
        local,
        attestations,
        signer,
    }
}

fn request(overwrite: bool) -> RebuildRequest {
    RebuildRequest {
        input: input(),
        overwrite_attestations: overwrite,
    }
}

// =============================================================================
// Remote flow
// =============================================================================

#[test]
fn test_matching_rebuild_is_attested() {
    let h = harness(wheel(&[("foo", "foo")]), wheel(&[("foo", "foo")]), MockBuildService::new());

    let record = rebuild_package(&request(false), &h.deps).unwrap();

    assert!(record.is_reproduced(), "unexpected message: {}", record.message);
    assert_eq!(record.kind, None);
    assert_eq!(record.target, resolved());

    let envelopes = load_bundle(&h.attestations, &resolved()).unwrap();
    assert_eq!(envelopes.len(), 2);
    for envelope in &envelopes {
        assert!(envelope.verify(&h.signer.verifying_key()).unwrap());
    }
    let types: Vec<_> = envelopes
        .iter()
        .map(|e| e.statement().unwrap().predicate_type)
        .collect();
    assert_eq!(types, vec![SLSA_PROVENANCE_PREDICATE_TYPE, VERDICT_PREDICATE_TYPE]);

    assert!(h.local.exists(&Asset::new(AssetType::Dockerfile, &resolved())).unwrap());
    let info = read_asset(&h.local, &Asset::new(AssetType::BuildInfo, &resolved())).unwrap();
    let info = BuildInfo::from_json(std::str::from_utf8(&info).unwrap()).unwrap();
    assert_eq!(info.build_id, "build-id");
    assert_eq!(info.build_images.len(), h.service.submitted()[0].steps.len());

    assert!(h.local.exists(&Asset::new(AssetType::UpstreamArtifact, &resolved())).unwrap());
    assert!(h.local.exists(&Asset::new(AssetType::BuildLog, &resolved())).unwrap());
    assert_eq!(h.http.request_count(), 1);
}

#[test]
fn test_mismatched_rebuild_is_attested() {
    let h = harness(
        wheel(&[("totally-not-foo", "not-in-the-least-foo")]),
        wheel(&[("foo", "foo")]),
        MockBuildService::new(),
    );

    let record = rebuild_package(&request(false), &h.deps).unwrap();

    assert!(record.message.contains("mismatch"), "message: {}", record.message);
    assert_eq!(record.kind, Some(VerdictKind::MismatchedFiles));

    let envelopes = load_bundle(&h.attestations, &resolved()).unwrap();
    assert_eq!(envelopes.len(), 2);
    let verdict = envelopes[1].statement().unwrap();
    assert_eq!(verdict.predicate["verdict"], "MISMATCHED_FILES");
    assert_eq!(verdict.predicate["reproduced"], false);
}

#[test]
fn test_existing_bundle_blocks_resubmission() {
    let h = harness(wheel(&[("foo", "foo")]), wheel(&[("foo", "foo")]), MockBuildService::new());
    rebuild_package(&request(false), &h.deps).unwrap();
    let first = load_bundle(&h.attestations, &resolved()).unwrap();

    let err = rebuild_package(&request(false), &h.deps).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Attestation(AttestationError::BundleExists(_))
    ));
    assert_eq!(err.exit_code(), 93);
    assert_eq!(h.service.submitted().len(), 1, "conflict must be caught before submission");
    assert_eq!(load_bundle(&h.attestations, &resolved()).unwrap(), first);

    rebuild_package(&request(true), &h.deps).unwrap();
    assert_eq!(h.service.submitted().len(), 2);
}

#[test]
fn test_failed_remote_build_records_build_info() {
    let service =
        MockBuildService::new().with_progression(vec![BuildStatus::Queued, BuildStatus::Failure]);
    let h = harness(wheel(&[("foo", "foo")]), wheel(&[("foo", "foo")]), service);

    let err = rebuild_package(&request(false), &h.deps).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Remote(RemoteError::BuildFailed {
            status: BuildStatus::Failure,
            ..
        })
    ));
    assert_eq!(err.exit_code(), 50);
    assert!(h.local.exists(&Asset::new(AssetType::BuildInfo, &resolved())).unwrap());
    assert!(!h.attestations.exists(&Asset::new(AssetType::AttestationBundle, &resolved())).unwrap());
    assert_eq!(h.http.request_count(), 0);
}

#[test]
fn test_missing_upstream_is_fetch_error() {
    let h = harness(wheel(&[("foo", "foo")]), wheel(&[("foo", "foo")]), MockBuildService::new());
    h.http.respond(WHEEL_URL, 404, b"");

    let err = rebuild_package(&request(false), &h.deps).unwrap_err();
    assert!(matches!(err, PipelineError::Fetch(_)));
    assert_eq!(err.exit_code(), 20);
}

#[test]
fn test_unmatched_release_is_distinct_error() {
    let mut h = harness(wheel(&[("foo", "foo")]), wheel(&[("foo", "foo")]), MockBuildService::new());
    let registry = MockRegistry::new();
    registry.add_release(
        Ecosystem::PyPI,
        "foo",
        "1.0",
        vec![ReleaseFile::new("foo-1.0.tar.gz", "https://files.example/foo-1.0.tar.gz")],
    );
    h.deps.registry = Arc::new(registry);

    let err = rebuild_package(&request(false), &h.deps).unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Rebuild(RebuildError::NoMatchingArtifact { .. })
    ));
    assert!(h.service.submitted().is_empty());
}

/// Give every run id its own remote store, as production does. The build
/// hook uploads into the store opened most recently. Returns the run ids the
/// pipeline opened stores for, in order.
fn use_per_run_stores(h: &mut Harness, rebuilt: Vec<u8>, service: MockBuildService) -> Arc<Mutex<Vec<String>>> {
    let stores: Arc<Mutex<HashMap<String, MemoryAssetStore>>> = Arc::default();
    let latest: Arc<Mutex<Option<MemoryAssetStore>>> = Arc::default();
    let opened: Arc<Mutex<Vec<String>>> = Arc::default();

    let (factory_latest, factory_opened) = (latest.clone(), opened.clone());
    h.deps.remote_metadata = Box::new(move |run_id: &str| -> Result<Arc<dyn LocatableAssetStore>, AssetError> {
        factory_opened.lock().unwrap().push(run_id.to_string());
        let store = stores
            .lock()
            .unwrap()
            .entry(run_id.to_string())
            .or_insert_with(MemoryAssetStore::new)
            .clone();
        *factory_latest.lock().unwrap() = Some(store.clone());
        Ok(Arc::new(store))
    });

    h.service = service.with_build_id("build-id").on_create(move |_job| {
        let store = latest.lock().unwrap().clone().unwrap();
        write_asset(&store, &Asset::new(AssetType::RebuildArtifact, &resolved()), &rebuilt).unwrap();
    });
    h.deps.service = Arc::new(h.service.clone());
    opened
}

#[test]
fn test_finished_job_is_not_resumed_by_next_run() {
    let foo = wheel(&[("foo", "foo")]);
    let mut h = harness(foo.clone(), foo.clone(), MockBuildService::new());
    let opened = use_per_run_stores(&mut h, foo, MockBuildService::new());
    h.deps.orchestrator.recovery = RecoveryMode::ResumeByHandle;

    assert!(rebuild_package(&request(true), &h.deps).unwrap().is_reproduced());
    assert!(rebuild_package(&request(true), &h.deps).unwrap().is_reproduced());

    assert_eq!(h.service.submitted().len(), 2);
    let opened = opened.lock().unwrap();
    assert_eq!(opened.len(), 2);
    assert_ne!(opened[0], opened[1]);
}

#[test]
fn test_orphaned_job_resumes_in_its_own_run() {
    let foo = wheel(&[("foo", "foo")]);
    let mut h = harness(foo.clone(), foo.clone(), MockBuildService::new());
    let service = MockBuildService::new().with_progression(vec![
        BuildStatus::Working,
        BuildStatus::Working,
        BuildStatus::Success,
    ]);
    let opened = use_per_run_stores(&mut h, foo, service);
    h.deps.orchestrator.recovery = RecoveryMode::ResumeByHandle;
    h.deps.orchestrator.cancel_on_abort = false;

    h.deps.cancel.cancel();
    let err = rebuild_package(&request(false), &h.deps).unwrap_err();
    assert!(matches!(err, PipelineError::Remote(RemoteError::Aborted { .. })));
    assert_eq!(err.exit_code(), 80);
    assert!(h.service.cancelled().is_empty());

    h.deps.cancel = CancelToken::new();
    let record = rebuild_package(&request(false), &h.deps).unwrap();
    assert!(record.is_reproduced(), "message: {}", record.message);
    assert_eq!(h.service.submitted().len(), 1);

    let opened = opened.lock().unwrap();
    assert_eq!(opened.len(), 2);
    assert_eq!(opened[0], opened[1]);
    let info = read_asset(&h.local, &Asset::new(AssetType::BuildInfo, &resolved())).unwrap();
    let info = BuildInfo::from_json(std::str::from_utf8(&info).unwrap()).unwrap();
    assert_eq!(info.id, opened[0]);
}

// =============================================================================
// Local flow
// =============================================================================

fn deb_input(package: &str, script: &str) -> RebuildInput {
    RebuildInput {
        target: Target::new(Ecosystem::Debian, package, "1:1.0-1", ""),
        instructions: Instructions {
            build: script.to_string(),
            output_path: "out.deb".to_string(),
            ..Instructions::default()
        },
        strategy: serde_json::Value::Null,
        location: Location::default(),
    }
}

#[test]
fn test_rebuild_many_is_positional() {
    let work = TempDir::new().unwrap();
    let registry = MockRegistry::new();
    let http = MockHttpClient::new();
    for package in ["same", "drift"] {
        let filename = format!("{}_1.0-1_amd64.deb", package);
        let url = format!("https://deb.example/{}", filename);
        registry.add_release(
            Ecosystem::Debian,
            package,
            "1:1.0-1",
            vec![ReleaseFile::new(filename, url.clone())],
        );
        http.respond(&url, 200, b"deb-bytes");
    }
    registry.add_release(Ecosystem::Debian, "sourceless", "1:1.0-1", vec![]);

    let store = MemoryAssetStore::new();
    let deps = LocalDeps {
        http: Arc::new(http),
        registry: Arc::new(registry),
        rebuilders: RebuilderRegistry::standard(),
        executor: Arc::new(ShellExecutor::new()),
        store: Arc::new(store.clone()),
        work_dir: work.path().join("builds"),
    };

    let inputs = vec![
        deb_input("same", "printf deb-bytes > out.deb"),
        deb_input("drift", "printf other-bytes > out.deb"),
        deb_input("sourceless", "true"),
    ];
    let records = rebuild_many(&inputs, &deps).unwrap();

    assert_eq!(records.len(), 3);
    assert!(records[0].is_reproduced(), "message: {}", records[0].message);
    assert_eq!(records[0].target.package(), "same");

    assert_eq!(records[1].target.package(), "drift");
    assert!(records[1].message.contains("mismatch"));
    assert_eq!(records[1].kind, Some(VerdictKind::ContentDiff));

    assert_eq!(records[2].target.package(), "sourceless");
    assert!(records[2].message.contains("no artifact matching"));
    assert_eq!(records[2].kind, None);

    let rebuilt = Target::new(Ecosystem::Debian, "same", "1:1.0-1", "same_1.0-1_amd64.deb");
    assert_eq!(
        read_asset(&store, &Asset::new(AssetType::RebuildArtifact, &rebuilt)).unwrap(),
        b"deb-bytes"
    );
    assert_eq!(
        std::fs::read_dir(work.path().join("builds")).unwrap().count(),
        0,
        "build roots are removed"
    );
}

#[test]
fn test_rebuild_many_failed_build_is_item_message() {
    let work = TempDir::new().unwrap();
    let registry = MockRegistry::new();
    registry.add_release(
        Ecosystem::Debian,
        "broken",
        "1:1.0-1",
        vec![ReleaseFile::new("broken_1.0-1_amd64.deb", "https://deb.example/broken")],
    );
    let deps = LocalDeps {
        http: Arc::new(MockHttpClient::new()),
        registry: Arc::new(registry),
        rebuilders: RebuilderRegistry::standard(),
        executor: Arc::new(ShellExecutor::new()),
        store: Arc::new(MemoryAssetStore::new()),
        work_dir: work.path().to_path_buf(),
    };

    let records = rebuild_many(&[deb_input("broken", "exit 3")], &deps).unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].message.starts_with("executing build"), "message: {}", records[0].message);
}
