//! Rebuild Lane CLI
//!
//! Entry point for the `rebuild` command-line tool.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use clap::{Parser, Subcommand};
use ed25519_dalek::VerifyingKey;
use rebuild_lane::assets::{AssetError, FilesystemAssetStore, LocatableAssetStore};
use rebuild_lane::attestation::{read_bundle, AttestationError};
use rebuild_lane::config::{default_user_config_path, ConfigError, EffectiveConfig, LaneConfig};
use rebuild_lane::rebuild::{
    CompareError, Ecosystem, Manifest, ManifestError, RebuildInput, RebuilderRegistry, ShellExecutor,
    Target,
};
use rebuild_lane::remote::CancelToken;
use rebuild_lane::verdict::{classify, ContentSummary};
use rebuild_lane::{
    rebuild_many, rebuild_package, LocalDeps, PipelineError, RebuildDeps, RebuildRequest, VerdictRecord,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rebuild")]
#[command(about = "Reproducibility verification for published packages", version)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Explicit config file, layered over the user config
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a rebuilt artifact against its upstream original
    Compare {
        /// Ecosystem of both artifacts (pypi, npm, cratesio, debian)
        #[arg(long, short = 'e')]
        ecosystem: Ecosystem,

        /// Path to the rebuilt artifact
        #[arg(long)]
        rebuild: PathBuf,

        /// Path to the upstream artifact
        #[arg(long)]
        upstream: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Verify every envelope of an attestation bundle
    VerifyBundle {
        /// Path to the JSONL bundle
        #[arg(long)]
        bundle: PathBuf,

        /// Base64 Ed25519 public key
        #[arg(long)]
        pubkey: String,
    },

    /// Rebuild one manifest input on the remote build service and attest the verdict
    Rebuild {
        /// JSON manifest of inputs and release listings
        #[arg(long, short = 'm')]
        manifest: PathBuf,

        /// Package to rebuild when the manifest holds several inputs
        #[arg(long, short = 'p')]
        package: Option<String>,

        /// Replace an existing attestation bundle
        #[arg(long)]
        overwrite: bool,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rebuild every manifest input locally, in order
    RebuildMany {
        /// JSON manifest of inputs and release listings
        #[arg(long, short = 'm')]
        manifest: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1))
        }
    }
}

fn init_logging(verbose: u8) {
    // RUST_LOG wins when set: 0 = warn, 1 = info, 2+ = debug
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("rebuild_lane=warn,rebuild=warn"),
        1 => EnvFilter::new("rebuild_lane=info,rebuild=info"),
        _ => EnvFilter::new("rebuild_lane=debug,rebuild=debug"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    match cli.command {
        Commands::Compare {
            ecosystem,
            rebuild,
            upstream,
            json,
        } => run_compare(ecosystem, &rebuild, &upstream, json),
        Commands::VerifyBundle { bundle, pubkey } => run_verify_bundle(&bundle, &pubkey),
        Commands::Rebuild {
            manifest,
            package,
            overwrite,
            json,
        } => run_rebuild(cli.config.as_deref(), &manifest, package.as_deref(), overwrite, json),
        Commands::RebuildMany { manifest, json } => {
            run_rebuild_many(cli.config.as_deref(), &manifest, json)
        }
        Commands::Config => run_config(cli.config.as_deref()),
    }
}

fn config_error(e: ConfigError) -> PipelineError {
    PipelineError::Config(e.to_string())
}

fn manifest_error(e: ManifestError) -> PipelineError {
    PipelineError::Config(e.to_string())
}

fn load_settings(config_path: Option<&Path>) -> Result<LaneConfig, PipelineError> {
    let user = default_user_config_path();
    let effective = EffectiveConfig::build(user.as_deref(), config_path, None).map_err(config_error)?;
    Ok(effective.settings().clone())
}

fn select_input(manifest: &Manifest, package: Option<&str>) -> Result<RebuildInput, PipelineError> {
    let mut matching = manifest
        .inputs
        .iter()
        .filter(|input| package.map_or(true, |p| input.target.package() == p));
    match (matching.next(), matching.next()) {
        (Some(input), None) => Ok(input.clone()),
        (None, _) => Err(PipelineError::Config(match package {
            Some(p) => format!("manifest has no input for package {}", p),
            None => "manifest has no inputs".to_string(),
        })),
        (Some(_), Some(_)) => Err(PipelineError::Config(
            "manifest holds several inputs; pick one with --package".to_string(),
        )),
    }
}

fn print_records(records: &[VerdictRecord], json: bool) -> Result<(), PipelineError> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    for record in records {
        if record.is_reproduced() {
            println!("OK      {}", record.target);
        } else {
            println!("FAILED  {}: {}", record.target, record.message);
        }
    }
    Ok(())
}

fn run_rebuild(
    config_path: Option<&Path>,
    manifest_path: &Path,
    package: Option<&str>,
    overwrite: bool,
    json: bool,
) -> Result<(), PipelineError> {
    let settings = load_settings(config_path)?;
    let manifest = Manifest::read(manifest_path).map_err(manifest_error)?;
    let input = select_input(&manifest, package)?;

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal, aborting remote build...");
        on_signal.cancel();
    }) {
        warn!(error = %e, "Interrupt handler not installed");
    }

    let remote_root = settings.stores.remote_metadata.clone();
    let deps = RebuildDeps {
        http: settings.http.client().map_err(config_error)?,
        registry: Arc::new(manifest.registry()),
        rebuilders: RebuilderRegistry::standard(),
        service: settings.remote.service(&settings.http).map_err(config_error)?,
        signer: Arc::new(settings.attestation.signer().map_err(config_error)?),
        local_metadata: Arc::new(FilesystemAssetStore::new(settings.stores.local_metadata.clone())),
        attestations: Arc::new(FilesystemAssetStore::new(settings.stores.attestations.clone())),
        remote_metadata: Box::new(
            move |run_id: &str| -> Result<Arc<dyn LocatableAssetStore>, AssetError> {
                Ok(Arc::new(FilesystemAssetStore::new(remote_root.join(run_id))))
            },
        ),
        remote: settings.remote.job.clone(),
        orchestrator: settings.orchestrator(),
        cancel,
    };
    info!(target = %input.target, service = %settings.remote.service_url, "Starting remote rebuild");

    let request = RebuildRequest {
        input,
        overwrite_attestations: overwrite || settings.attestation.overwrite,
    };
    let record = rebuild_package(&request, &deps)?;
    print_records(std::slice::from_ref(&record), json)
}

fn run_rebuild_many(config_path: Option<&Path>, manifest_path: &Path, json: bool) -> Result<(), PipelineError> {
    let settings = load_settings(config_path)?;
    let manifest = Manifest::read(manifest_path).map_err(manifest_error)?;

    let deps = LocalDeps {
        http: settings.http.client().map_err(config_error)?,
        registry: Arc::new(manifest.registry()),
        rebuilders: RebuilderRegistry::standard(),
        executor: Arc::new(ShellExecutor::new()),
        store: Arc::new(FilesystemAssetStore::new(settings.stores.local_metadata.clone())),
        work_dir: settings.stores.work_dir.clone(),
    };
    info!(inputs = manifest.inputs.len(), work_dir = %deps.work_dir.display(), "Starting local batch");

    let records = rebuild_many(&manifest.inputs, &deps)?;
    print_records(&records, json)
}

fn run_compare(ecosystem: Ecosystem, rebuild: &Path, upstream: &Path, json: bool) -> Result<(), PipelineError> {
    let rebuilder = RebuilderRegistry::standard().get(ecosystem)?;
    let kind = rebuilder.archive_kind();
    let summarize = |path: &Path| -> Result<ContentSummary, PipelineError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let summary = ContentSummary::from_reader(kind, &name, File::open(path)?)
            .map_err(CompareError::Summary)?;
        debug!(path = %path.display(), files = summary.len(), "Summarized artifact");
        Ok(summary)
    };
    let rebuilt = summarize(rebuild)?;
    let original = summarize(upstream)?;

    let artifact = upstream
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let target = Target::new(ecosystem, "", "", artifact);
    let record = VerdictRecord::from_verdict(
        target,
        classify(&rebuilt, &original, &rebuilder.classifier_config()),
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else if record.is_reproduced() {
        println!("reproduced");
    } else {
        println!("{}", record.message);
    }
    Ok(())
}

fn run_verify_bundle(bundle: &Path, pubkey: &str) -> Result<(), PipelineError> {
    let key_bytes: [u8; 32] = BASE64
        .decode(pubkey.trim())
        .map_err(AttestationError::from)?
        .try_into()
        .map_err(|_| AttestationError::InvalidKey("public key must be 32 bytes".to_string()))?;
    let key = VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| AttestationError::InvalidKey(e.to_string()))?;

    let envelopes = read_bundle(&fs::read(bundle)?)?;
    info!(bundle = %bundle.display(), envelopes = envelopes.len(), "Verifying bundle");

    let mut failed = 0;
    for (i, envelope) in envelopes.iter().enumerate() {
        if envelope.verify(&key)? {
            println!("OK      {}", envelope.statement()?.predicate_type);
        } else {
            println!("FAILED  envelope {}", i);
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(AttestationError::InvalidSignature(format!(
            "{} of {} envelopes failed verification",
            failed,
            envelopes.len()
        ))
        .into());
    }
    Ok(())
}

fn run_config(config_path: Option<&Path>) -> Result<(), PipelineError> {
    let user = default_user_config_path();
    let effective = EffectiveConfig::build(user.as_deref(), config_path, None).map_err(config_error)?;
    println!("{}", effective.to_json()?);
    Ok(())
}
