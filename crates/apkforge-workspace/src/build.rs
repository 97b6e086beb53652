//! External build invocation.
//!
//! # Design
//! - `BuildRunner` is the seam between the pipeline and the build tool; tests supply fakes.
//! - The child is awaited on the async runtime and is not killed when the caller goes away.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use apkforge_config::{BuildCommand, TemplateLayout};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{WorkspaceError, WorkspaceResult};

/// Captured result of one external build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutput {
    /// Exit code, `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    /// Whether the tool reported success.
    pub success: bool,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl BuildOutput {
    /// Combined stdout and stderr for diagnostics.
    #[must_use]
    pub fn diagnostics(&self) -> String {
        match (self.stdout.trim().is_empty(), self.stderr.trim().is_empty()) {
            (true, true) => String::new(),
            (false, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Runs the build tool inside a prepared workspace.
#[async_trait]
pub trait BuildRunner: Send + Sync {
    /// Run the build with `workspace` as the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::Build`] when the tool cannot be started.
    async fn run(&self, workspace: &Path) -> WorkspaceResult<BuildOutput>;
}

/// Spawns the configured command as a child process.
#[derive(Debug, Clone)]
pub struct ProcessBuildRunner {
    command: BuildCommand,
}

impl ProcessBuildRunner {
    /// Runner for `command`.
    #[must_use]
    pub const fn new(command: BuildCommand) -> Self {
        Self { command }
    }

    fn program_path(&self, workspace: &Path) -> PathBuf {
        let program = Path::new(&self.command.program);
        if program.is_relative() && program.components().count() > 1 {
            workspace.join(program)
        } else {
            program.to_path_buf()
        }
    }
}

#[async_trait]
impl BuildRunner for ProcessBuildRunner {
    async fn run(&self, workspace: &Path) -> WorkspaceResult<BuildOutput> {
        let program = self.program_path(workspace);
        debug!(
            program = %program.display(),
            args = ?self.command.args,
            workspace = %workspace.display(),
            "spawning build command"
        );
        let output = Command::new(&program)
            .args(&self.command.args)
            .current_dir(workspace)
            .stdin(Stdio::null())
            .kill_on_drop(false)
            .output()
            .await
            .map_err(|err| WorkspaceError::Build {
                exit_code: None,
                output: format!("failed to start {}: {err}", program.display()),
            })?;

        Ok(BuildOutput {
            exit_code: output.status.code(),
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Run the build and confirm it produced the artifact.
///
/// Returns the absolute artifact path.
///
/// # Errors
///
/// Returns [`WorkspaceError::Build`] on spawn failure or non-zero exit, and
/// [`WorkspaceError::ArtifactMissing`] when a successful build left no artifact.
pub async fn invoke_build(
    runner: &dyn BuildRunner,
    workspace: &Path,
    layout: &TemplateLayout,
) -> WorkspaceResult<PathBuf> {
    let output = runner.run(workspace).await?;
    if !output.success {
        return Err(WorkspaceError::Build {
            exit_code: output.exit_code,
            output: output.diagnostics(),
        });
    }

    let artifact = workspace.join(&layout.artifact_path);
    match tokio::fs::metadata(&artifact).await {
        Ok(metadata) if metadata.is_file() => {
            info!(artifact = %artifact.display(), bytes = metadata.len(), "build produced artifact");
            Ok(artifact)
        }
        _ => Err(WorkspaceError::ArtifactMissing { path: artifact }),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use anyhow::Result;
    use apkforge_test_support::fixtures::write_build_script;

    fn script_runner() -> ProcessBuildRunner {
        ProcessBuildRunner::new(BuildCommand {
            program: "./build.sh".to_string(),
            args: vec!["assembleDebug".to_string()],
        })
    }

    fn layout() -> TemplateLayout {
        TemplateLayout::with_artifact("out/app.apk")
    }

    #[tokio::test]
    async fn successful_build_returns_artifact_path() -> Result<()> {
        let temp = tempfile::tempdir()?;
        write_build_script(
            &temp.path().join("build.sh"),
            "test \"$1\" = assembleDebug\nmkdir -p out\nprintf apk > out/app.apk",
        )?;

        let artifact = invoke_build(&script_runner(), temp.path(), &layout()).await?;
        assert_eq!(artifact, temp.path().join("out/app.apk"));
        assert_eq!(tokio::fs::read(&artifact).await?, b"apk");
        Ok(())
    }

    #[tokio::test]
    async fn non_zero_exit_carries_code_and_output() -> Result<()> {
        let temp = tempfile::tempdir()?;
        write_build_script(
            &temp.path().join("build.sh"),
            "echo compiling\necho 'FAILURE: Build failed' >&2\nexit 3",
        )?;

        let err = invoke_build(&script_runner(), temp.path(), &layout())
            .await
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected build failure"))?;
        match err {
            WorkspaceError::Build { exit_code, output } => {
                assert_eq!(exit_code, Some(3));
                assert!(output.contains("compiling"));
                assert!(output.contains("FAILURE: Build failed"));
            }
            other => anyhow::bail!("unexpected error: {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn success_without_artifact_is_reported() -> Result<()> {
        let temp = tempfile::tempdir()?;
        write_build_script(&temp.path().join("build.sh"), "echo done")?;

        let err = invoke_build(&script_runner(), temp.path(), &layout()).await.err();
        assert!(matches!(
            err,
            Some(WorkspaceError::ArtifactMissing { path }) if path == temp.path().join("out/app.apk")
        ));
        Ok(())
    }

    #[tokio::test]
    async fn missing_program_is_a_build_error_without_exit_code() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = invoke_build(&script_runner(), temp.path(), &layout()).await.err();
        assert!(matches!(
            err,
            Some(WorkspaceError::Build { exit_code: None, .. })
        ));
        Ok(())
    }

    #[test]
    fn bare_program_names_are_left_for_path_lookup() {
        let runner = ProcessBuildRunner::new(BuildCommand {
            program: "gradle".to_string(),
            args: Vec::new(),
        });
        assert_eq!(runner.program_path(Path::new("/ws")), PathBuf::from("gradle"));
        assert_eq!(
            script_runner().program_path(Path::new("/ws")),
            PathBuf::from("/ws/./build.sh")
        );
    }

    #[test]
    fn diagnostics_join_both_streams() {
        let output = BuildOutput {
            exit_code: Some(1),
            success: false,
            stdout: "out".to_string(),
            stderr: "err".to_string(),
        };
        assert_eq!(output.diagnostics(), "out\nerr");
    }
}
