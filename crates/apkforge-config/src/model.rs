//! Typed configuration models.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::defaults::{ICON_PATH, SUBSTITUTED_FILES, WEB_DIR, WEB_ENTRY_POINT};

/// Fully parsed service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,
    /// Workspace lifecycle settings consumed by the build pipeline.
    pub workspace: WorkspaceSettings,
    /// Maximum accepted request body for uploads, in bytes.
    pub max_upload_bytes: usize,
    /// Optional expiry sweep; `None` keeps workspaces until downloaded.
    pub sweep: Option<SweepPolicy>,
    /// Logging preferences.
    pub logging: LoggingSettings,
}

/// Address the HTTP API binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub bind_addr: IpAddr,
    /// TCP port, never zero.
    pub http_port: u16,
}

/// Settings shared by every stage of the workspace lifecycle.
#[derive(Debug, Clone)]
pub struct WorkspaceSettings {
    /// Read-only template project copied into every workspace.
    pub template_dir: PathBuf,
    /// Parent directory of all workspaces.
    pub workspace_root: PathBuf,
    /// Parent directory of upload staging directories.
    pub upload_root: PathBuf,
    /// External command that turns a workspace into an artifact.
    pub build_command: BuildCommand,
    /// Fixed locations inside the template.
    pub layout: TemplateLayout,
    /// Placeholder replacement semantics.
    pub substitution: SubstitutionMode,
    /// Filename presented to download clients.
    pub download_filename: String,
}

impl WorkspaceSettings {
    /// Directory for a given build identifier.
    #[must_use]
    pub fn workspace_dir(&self, build_id: &str) -> PathBuf {
        self.workspace_root.join(build_id)
    }
}

/// Program and arguments of the external build tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    /// Executable, resolved relative to the workspace when it contains a separator.
    pub program: String,
    /// Arguments passed verbatim.
    pub args: Vec<String>,
}

impl BuildCommand {
    /// Split a whitespace-separated command line.
    ///
    /// Returns `None` for a blank command.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }
}

/// Relative paths inside a workspace that the pipeline reads or writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLayout {
    /// Files rewritten by the parameter substitutor.
    pub substituted_files: Vec<PathBuf>,
    /// Launcher icon overwritten by an uploaded icon.
    pub icon_path: PathBuf,
    /// Directory receiving uploaded web content.
    pub web_dir: PathBuf,
    /// Filename given to single-file web content.
    pub web_entry_point: String,
    /// Artifact produced by a successful build.
    pub artifact_path: PathBuf,
}

impl TemplateLayout {
    /// Standard Android template layout with the given artifact path.
    #[must_use]
    pub fn with_artifact(artifact_path: impl AsRef<Path>) -> Self {
        Self {
            substituted_files: SUBSTITUTED_FILES.iter().map(PathBuf::from).collect(),
            icon_path: PathBuf::from(ICON_PATH),
            web_dir: PathBuf::from(WEB_DIR),
            web_entry_point: WEB_ENTRY_POINT.to_string(),
            artifact_path: artifact_path.as_ref().to_path_buf(),
        }
    }
}

/// How placeholder tokens are replaced inside each template file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SubstitutionMode {
    /// Replace only the first occurrence of each token per file.
    #[default]
    FirstOccurrence,
    /// Replace every occurrence of each token.
    Global,
}

/// Expiry sweep for workspaces that were never downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepPolicy {
    /// Age after which terminal workspaces are removed.
    pub ttl: Duration,
    /// Time between sweeps.
    pub interval: Duration,
}

/// Logging preferences resolved from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingSettings {
    /// Default filter used when `RUST_LOG` is unset.
    pub level: String,
    /// `json` or `pretty`; `None` lets telemetry infer from the build profile.
    pub format: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_command_splits_program_and_args() {
        let command = BuildCommand::parse("  ./gradlew   assembleDebug --offline ");
        assert_eq!(
            command,
            Some(BuildCommand {
                program: "./gradlew".to_string(),
                args: vec!["assembleDebug".to_string(), "--offline".to_string()],
            })
        );
        assert_eq!(BuildCommand::parse("   "), None);
    }

    #[test]
    fn template_layout_lists_placeholder_files() {
        let layout = TemplateLayout::with_artifact("out/app.apk");
        assert_eq!(layout.substituted_files.len(), SUBSTITUTED_FILES.len());
        assert_eq!(layout.web_entry_point, "index.html");
        assert_eq!(layout.artifact_path, PathBuf::from("out/app.apk"));
    }
}
