//! Three-phase build executor
//!
//! A rebuild runs its [`Instructions`] as Source, then Deps, then Build,
//! each in the same build root. The first failing phase stops the run and
//! is reported through its own [`BuildError`] variant.

use std::fmt;
use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

use thiserror::Error;
use tracing::{debug, info};

use super::Instructions;

/// Captured output of one script run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Script execution errors
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to spawn shell: {0}")]
    Spawn(#[from] io::Error),

    #[error("script exited with {}: {stderr}", exit_label(.code))]
    NonZeroExit { code: Option<i32>, stderr: String },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

/// Runs a script inside a build root.
pub trait ScriptExecutor: Send + Sync {
    fn execute(&self, root: &Path, script: &str) -> Result<ScriptOutput, ExecError>;
}

/// Runs scripts with `sh -euc` in the build root.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    shell: String,
}

impl ShellExecutor {
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Use a different POSIX shell binary.
    pub fn with_shell(shell: impl Into<String>) -> Self {
        Self {
            shell: shell.into(),
        }
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptExecutor for ShellExecutor {
    fn execute(&self, root: &Path, script: &str) -> Result<ScriptOutput, ExecError> {
        let output = Command::new(&self.shell)
            .arg("-euc")
            .arg(script)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()?;

        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if !output.status.success() {
            return Err(ExecError::NonZeroExit {
                code: output.status.code(),
                stderr,
            });
        }
        Ok(ScriptOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr,
        })
    }
}

/// Build phases, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Source,
    Deps,
    Build,
}

impl fmt::Display for BuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BuildPhase::Source => "source",
            BuildPhase::Deps => "deps",
            BuildPhase::Build => "build",
        })
    }
}

/// A failed build phase.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("fetching source: {0}")]
    FetchingSource(#[source] ExecError),

    #[error("configuring build deps: {0}")]
    ConfiguringDeps(#[source] ExecError),

    #[error("executing build: {0}")]
    ExecutingBuild(#[source] ExecError),
}

impl BuildError {
    fn in_phase(phase: BuildPhase, err: ExecError) -> Self {
        match phase {
            BuildPhase::Source => BuildError::FetchingSource(err),
            BuildPhase::Deps => BuildError::ConfiguringDeps(err),
            BuildPhase::Build => BuildError::ExecutingBuild(err),
        }
    }

    /// The phase that failed.
    pub fn phase(&self) -> BuildPhase {
        match self {
            BuildError::FetchingSource(_) => BuildPhase::Source,
            BuildError::ConfiguringDeps(_) => BuildPhase::Deps,
            BuildError::ExecutingBuild(_) => BuildPhase::Build,
        }
    }
}

/// Run Source, Deps and Build in `root`, stopping at the first failure.
pub fn execute_instructions(
    executor: &dyn ScriptExecutor,
    root: &Path,
    instructions: &Instructions,
) -> Result<(), BuildError> {
    let phases = [
        (BuildPhase::Source, &instructions.source),
        (BuildPhase::Deps, &instructions.deps),
        (BuildPhase::Build, &instructions.build),
    ];
    for (phase, script) in phases {
        if script.trim().is_empty() {
            debug!(%phase, "empty phase skipped");
            continue;
        }
        info!(%phase, root = %root.display(), "running build phase");
        executor
            .execute(root, script)
            .map_err(|e| BuildError::in_phase(phase, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records scripts and fails any script containing `fail`.
    #[derive(Default)]
    struct RecordingExecutor {
        seen: Mutex<Vec<String>>,
    }

    impl ScriptExecutor for RecordingExecutor {
        fn execute(&self, _root: &Path, script: &str) -> Result<ScriptOutput, ExecError> {
            self.seen.lock().unwrap().push(script.to_string());
            if script.contains("fail") {
                return Err(ExecError::NonZeroExit {
                    code: Some(1),
                    stderr: "boom".to_string(),
                });
            }
            Ok(ScriptOutput::default())
        }
    }

    fn instructions(source: &str, deps: &str, build: &str) -> Instructions {
        Instructions {
            source: source.to_string(),
            deps: deps.to_string(),
            build: build.to_string(),
            output_path: "dist/out".to_string(),
        }
    }

    #[test]
    fn test_phases_run_in_order() {
        let exec = RecordingExecutor::default();
        let root = TempDir::new().unwrap();
        execute_instructions(&exec, root.path(), &instructions("src", "deps", "build")).unwrap();
        assert_eq!(*exec.seen.lock().unwrap(), vec!["src", "deps", "build"]);
    }

    #[test]
    fn test_deps_failure_stops_before_build() {
        let exec = RecordingExecutor::default();
        let root = TempDir::new().unwrap();
        let err = execute_instructions(&exec, root.path(), &instructions("src", "fail", "build"))
            .unwrap_err();
        assert!(matches!(err, BuildError::ConfiguringDeps(_)));
        assert_eq!(err.phase(), BuildPhase::Deps);
        assert!(err.to_string().starts_with("configuring build deps"));
        assert_eq!(*exec.seen.lock().unwrap(), vec!["src", "fail"]);
    }

    #[test]
    fn test_empty_phase_is_noop() {
        let exec = RecordingExecutor::default();
        let root = TempDir::new().unwrap();
        execute_instructions(&exec, root.path(), &instructions("", "  ", "build")).unwrap();
        assert_eq!(*exec.seen.lock().unwrap(), vec!["build"]);
    }

    #[test]
    fn test_shell_executor_runs_in_root() {
        let root = TempDir::new().unwrap();
        let exec = ShellExecutor::new();
        exec.execute(root.path(), "mkdir -p dist && printf built > dist/out")
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(root.path().join("dist/out")).unwrap(),
            "built"
        );
    }

    #[test]
    fn test_shell_executor_reports_exit_code() {
        let root = TempDir::new().unwrap();
        let err = ShellExecutor::new()
            .execute(root.path(), "echo nope >&2; exit 3")
            .unwrap_err();
        match err {
            ExecError::NonZeroExit { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr.trim(), "nope");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_source_failure_message() {
        let exec = RecordingExecutor::default();
        let root = TempDir::new().unwrap();
        let err = execute_instructions(&exec, root.path(), &instructions("fail", "", ""))
            .unwrap_err();
        assert!(err.to_string().starts_with("fetching source"));
    }
}
