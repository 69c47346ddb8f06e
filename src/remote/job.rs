//! Remote job construction
//!
//! A remote rebuild is three container steps: the builder image builds an
//! image from the rendered Dockerfile, that image runs the build and the
//! artifact is copied out, and the uploader pushes artifact and log to the
//! remote metadata store.

use rebuild_protocol::{BuildJob, BuildStep, DEFAULT_BUILD_TIMEOUT_SECS};
use serde::{Deserialize, Serialize};

use super::RemoteError;
use crate::rebuild::{Instructions, RebuildInput};

/// Image tag used for the per-rebuild image inside the remote build.
const REBUILD_IMAGE: &str = "rebuild-img";

/// Directory the build service shares between steps.
const WORKSPACE: &str = "/workspace";

/// Directory the build runs in inside the rebuild image.
const BUILD_ROOT: &str = "/src";

/// Knobs for remote job construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteOptions {
    /// Project the builds run in
    pub project: String,
    /// Base image of the rendered Dockerfile
    pub base_image: String,
    /// Image with a container engine, used for steps one and two
    pub builder_image: String,
    /// Image with the store upload tool, used for step three
    pub uploader_image: String,
    /// Upload command, invoked as `<cmd> <file> <url>`
    pub upload_command: String,
    pub service_account: Option<String>,
    pub logs_bucket: Option<String>,
    pub machine_type: Option<String>,
    pub timeout_secs: u64,
}

impl Default for RemoteOptions {
    fn default() -> Self {
        Self {
            project: String::new(),
            base_image: "docker.io/library/debian:bookworm-slim".to_string(),
            builder_image: "gcr.io/cloud-builders/docker".to_string(),
            uploader_image: "gcr.io/cloud-builders/gsutil".to_string(),
            upload_command: "gsutil cp".to_string(),
            service_account: None,
            logs_bucket: None,
            machine_type: None,
            timeout_secs: DEFAULT_BUILD_TIMEOUT_SECS,
        }
    }
}

/// Remote store destinations for the build outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadUrls {
    pub rebuild: String,
    pub build_log: String,
}

/// A ready-to-submit job and the Dockerfile it builds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildDefinition {
    pub job: BuildJob,
    pub dockerfile: String,
}

/// Render the Dockerfile-equivalent build description.
///
/// Source and Deps become `RUN` layers; Build is the entrypoint so it runs
/// in step two, where its output can be copied out.
pub fn render_dockerfile(base_image: &str, instructions: &Instructions) -> Result<String, RemoteError> {
    let mut out = String::new();
    out.push_str(&format!("FROM {}\n", base_image));
    out.push_str(&format!("WORKDIR {}\n", BUILD_ROOT));
    for script in [&instructions.source, &instructions.deps] {
        if !script.trim().is_empty() {
            out.push_str(&format!("RUN {}\n", exec_form(script)?));
        }
    }
    let build = if instructions.build.trim().is_empty() {
        "true"
    } else {
        instructions.build.as_str()
    };
    out.push_str(&format!("ENTRYPOINT {}\n", exec_form(build)?));
    Ok(out)
}

fn exec_form(script: &str) -> Result<String, RemoteError> {
    serde_json::to_string(&["/bin/sh", "-euc", script])
        .map_err(|e| RemoteError::InvalidJob(e.to_string()))
}

/// Single-quote `s` for POSIX shells.
fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Build the three-step job for `input`.
pub fn make_build_job(
    input: &RebuildInput,
    options: &RemoteOptions,
    urls: &UploadUrls,
) -> Result<BuildDefinition, RemoteError> {
    let target = &input.target;
    if !target.has_artifact() {
        return Err(RemoteError::InvalidJob(format!(
            "target {} has no resolved artifact",
            target
        )));
    }
    if input.instructions.output_path.trim().is_empty() {
        return Err(RemoteError::InvalidJob("instructions have no output path".to_string()));
    }

    let dockerfile = render_dockerfile(&options.base_image, &input.instructions)?;
    let artifact_out = format!("{}/{}", WORKSPACE, target.artifact());
    let log_out = format!("{}/build.log", WORKSPACE);

    let build_image = BuildStep::script(
        &options.builder_image,
        format!(
            "cat > Dockerfile <<'REBUILD_DOCKERFILE_EOF'\n{}REBUILD_DOCKERFILE_EOF\ndocker build --tag {} .\n",
            dockerfile, REBUILD_IMAGE
        ),
    )
    .with_id("build-image");

    let run_build = BuildStep::script(
        &options.builder_image,
        format!(
            "docker run --name=container {img} > {log} 2>&1\ndocker cp {src} {dst}\n",
            img = REBUILD_IMAGE,
            log = shell_quote(&log_out),
            src = shell_quote(&format!(
                "container:{}/{}",
                BUILD_ROOT, input.instructions.output_path
            )),
            dst = shell_quote(&artifact_out),
        ),
    )
    .with_id("rebuild");

    let upload = BuildStep::script(
        &options.uploader_image,
        format!(
            "{cmd} {a} {a_url}\n{cmd} {l} {l_url}\n",
            cmd = options.upload_command,
            a = shell_quote(&artifact_out),
            a_url = shell_quote(&urls.rebuild),
            l = shell_quote(&log_out),
            l_url = shell_quote(&urls.build_log),
        ),
    )
    .with_id("upload");

    Ok(BuildDefinition {
        job: BuildJob {
            steps: vec![build_image, run_build, upload],
            timeout_secs: Some(options.timeout_secs),
            service_account: options.service_account.clone(),
            logs_bucket: options.logs_bucket.clone(),
            machine_type: options.machine_type.clone(),
            tags: vec![
                format!("ecosystem-{}", target.ecosystem()),
                format!("package-{}", target.package()),
            ],
        },
        dockerfile,
    })
}
