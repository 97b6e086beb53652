//! Build pipeline façade used by the HTTP layer.
//!
//! # Design
//! - Filesystem steps and state transitions run on the blocking pool; the build runs on the runtime.
//! - Each request's pipeline runs on its own task and reaches a terminal state even if the caller goes away.
//! - Every terminal transition is persisted before the result is returned.
//! - Staged uploads are released once the pipeline ends, whatever the outcome.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use apkforge_config::WorkspaceSettings;
use apkforge_telemetry::{BuildOutcome, DownloadOutcome, Metrics};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::artifact::{self, ClaimedArtifact};
use crate::assets::{inject_icon, inject_web_content};
use crate::build::{BuildRunner, ProcessBuildRunner, invoke_build};
use crate::error::{WorkspaceError, WorkspaceResult};
use crate::model::{BuildFields, BuildId, Workspace, WorkspaceState};
use crate::provision::provision;
use crate::staging::{StagedAsset, StagedUpload, release_all};
use crate::substitute::substitute;
use crate::sweep::{self, SweepReport};

const MAX_LOGGED_OUTPUT: usize = 4_096;

/// Inputs of one `generate` call.
#[derive(Debug)]
pub struct BuildRequest {
    /// Placeholder values.
    pub fields: BuildFields,
    /// Optional launcher icon.
    pub icon: Option<StagedUpload>,
    /// Optional web page or archive.
    pub web_content: Option<StagedUpload>,
}

/// Result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReceipt {
    /// Identifier used for the download.
    pub build_id: BuildId,
    /// Artifact location inside the workspace.
    pub artifact_path: PathBuf,
}

impl BuildReceipt {
    /// Relative URL the artifact can be fetched from once.
    #[must_use]
    pub fn download_url(&self) -> String {
        format!("/download/{}", self.build_id)
    }
}

/// Sequences the workspace lifecycle for each request.
#[derive(Clone)]
pub struct WorkspaceService {
    settings: Arc<WorkspaceSettings>,
    runner: Arc<dyn BuildRunner>,
    metrics: Metrics,
}

impl WorkspaceService {
    /// Service driven by an explicit build runner.
    #[must_use]
    pub fn new(settings: WorkspaceSettings, runner: Arc<dyn BuildRunner>, metrics: Metrics) -> Self {
        Self {
            settings: Arc::new(settings),
            runner,
            metrics,
        }
    }

    /// Service that spawns the configured build command.
    #[must_use]
    pub fn with_process_runner(settings: WorkspaceSettings, metrics: Metrics) -> Self {
        let runner = Arc::new(ProcessBuildRunner::new(settings.build_command.clone()));
        Self::new(settings, runner, metrics)
    }

    /// Settings the service was built with.
    #[must_use]
    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    /// Allocate a staging location for an incoming upload.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the staging directory cannot be created.
    pub async fn stage_upload(&self, original_name: Option<&str>) -> WorkspaceResult<StagedUpload> {
        StagedUpload::stage(&self.settings.upload_root, original_name).await
    }

    /// Provision, parameterise, inject and build a new workspace.
    ///
    /// The pipeline runs on its own task: dropping the returned future does
    /// not stop it, and the workspace still reaches a terminal state.
    ///
    /// # Errors
    ///
    /// Returns the first failing step's error; the workspace keeps its failure state.
    pub async fn generate(&self, request: BuildRequest) -> WorkspaceResult<BuildReceipt> {
        let service = self.clone();
        tokio::spawn(async move { service.run_request(request).await })
            .await
            .map_err(|source| WorkspaceError::Join {
                operation: "generate.pipeline",
                source,
            })?
    }

    async fn run_request(&self, request: BuildRequest) -> WorkspaceResult<BuildReceipt> {
        let BuildRequest {
            fields,
            icon,
            web_content,
        } = request;
        let icon_asset = icon.as_ref().map(StagedUpload::asset);
        let web_asset = web_content.as_ref().map(StagedUpload::asset);

        let result = self.run_pipeline(fields, icon_asset, web_asset).await;
        release_all(icon.into_iter().chain(web_content)).await;

        self.metrics.inc_build(outcome_of(&result));
        match &result {
            Ok(receipt) => info!(
                build_id = %receipt.build_id,
                artifact = %receipt.artifact_path.display(),
                "build ready for download"
            ),
            Err(err) => log_failure(err),
        }
        result
    }

    async fn run_pipeline(
        &self,
        fields: BuildFields,
        icon: Option<StagedAsset>,
        web_content: Option<StagedAsset>,
    ) -> WorkspaceResult<BuildReceipt> {
        let settings = Arc::clone(&self.settings);
        let mut workspace = blocking("generate.prepare", move || {
            let mut workspace = provision(&settings)?;
            if let Err(err) = prepare(&mut workspace, &settings, &fields, icon.as_ref(), web_content.as_ref()) {
                record_failure(&mut workspace, WorkspaceState::Failed, &err);
                return Err(err);
            }
            workspace.advance(WorkspaceState::Building)?;
            Ok(workspace)
        })
        .await?;

        let build_id = workspace.build_id();
        info!(build_id = %build_id, "external build started");

        let started = Instant::now();
        let built = {
            let _active = self.metrics.track_active_build();
            invoke_build(self.runner.as_ref(), workspace.path(), &self.settings.layout).await
        };
        let elapsed = started.elapsed();
        self.metrics.observe_build_duration(elapsed);

        match built {
            Ok(artifact_path) => {
                blocking("generate.built", move || workspace.advance(WorkspaceState::Built)).await?;
                info!(build_id = %build_id, elapsed_ms = millis(elapsed), "external build finished");
                Ok(BuildReceipt {
                    build_id,
                    artifact_path,
                })
            }
            Err(err) => {
                let detail = failure_detail(&err);
                let recorded =
                    blocking("generate.build_failed", move || workspace.fail(WorkspaceState::BuildFailed, detail)).await;
                if let Err(meta_err) = recorded {
                    warn!(build_id = %build_id, error = ?meta_err, "failed to record workspace failure");
                }
                warn!(build_id = %build_id, elapsed_ms = millis(elapsed), "external build did not produce an artifact");
                Err(err)
            }
        }
    }

    /// Hand out the artifact of a built workspace and remove the workspace.
    ///
    /// # Errors
    ///
    /// Returns [`WorkspaceError::NotFound`] unless the build finished successfully
    /// and has not been downloaded yet.
    pub async fn claim_artifact(&self, raw_id: &str) -> WorkspaceResult<ClaimedArtifact> {
        let settings = Arc::clone(&self.settings);
        let raw = raw_id.to_string();
        let result = blocking("download.claim", move || artifact::claim_artifact(&settings, &raw)).await;
        match &result {
            Ok(claimed) => {
                self.metrics.inc_download(DownloadOutcome::Served);
                info!(build_id = %claimed.build_id, bytes = claimed.len, "artifact claimed for download");
            }
            Err(err) if err.is_not_found() => {
                self.metrics.inc_download(DownloadOutcome::NotFound);
                info!(build_id = raw_id, "no downloadable artifact");
            }
            Err(err) => error!(build_id = raw_id, error = ?err, "artifact download failed"),
        }
        result
    }

    /// Remove workspaces and staging directories older than `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an IO error when a root directory cannot be listed.
    pub async fn sweep_expired(&self, ttl: Duration) -> WorkspaceResult<SweepReport> {
        let settings = Arc::clone(&self.settings);
        let report = blocking("sweep", move || sweep::sweep_expired(&settings, ttl, Utc::now())).await?;
        self.metrics.add_swept(report.removed());
        if report.removed() > 0 || report.failures > 0 {
            info!(
                workspaces = report.workspaces,
                claimed = report.claimed,
                staging = report.staging,
                failures = report.failures,
                "expiry sweep finished"
            );
        }
        Ok(report)
    }
}

fn prepare(
    workspace: &mut Workspace,
    settings: &WorkspaceSettings,
    fields: &BuildFields,
    icon: Option<&StagedAsset>,
    web_content: Option<&StagedAsset>,
) -> WorkspaceResult<()> {
    substitute(workspace, &settings.layout, fields, settings.substitution)?;
    workspace.advance(WorkspaceState::Parameterized)?;
    if let Some(icon) = icon {
        inject_icon(workspace, &settings.layout, icon)?;
    }
    if let Some(web_content) = web_content {
        inject_web_content(workspace, &settings.layout, web_content)?;
    }
    workspace.advance(WorkspaceState::AssetInjected)
}

async fn blocking<T, F>(operation: &'static str, task: F) -> WorkspaceResult<T>
where
    F: FnOnce() -> WorkspaceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|source| WorkspaceError::Join { operation, source })?
}

fn record_failure(workspace: &mut Workspace, state: WorkspaceState, err: &WorkspaceError) {
    if let Err(meta_err) = workspace.fail(state, failure_detail(err)) {
        warn!(
            build_id = %workspace.build_id(),
            error = ?meta_err,
            "failed to record workspace failure"
        );
    }
}

fn failure_detail(err: &WorkspaceError) -> String {
    match err {
        WorkspaceError::Build {
            exit_code: Some(code),
            ..
        } => format!("build exited with code {code}"),
        WorkspaceError::Build { exit_code: None, .. } => "build did not complete".to_string(),
        WorkspaceError::Io { operation, .. }
        | WorkspaceError::Json { operation, .. }
        | WorkspaceError::Walkdir { operation, .. }
        | WorkspaceError::Zip { operation, .. }
        | WorkspaceError::Join { operation, .. } => format!("{err} during {operation}"),
        WorkspaceError::InvalidInput { field, reason, .. } => format!("invalid {field}: {reason}"),
        WorkspaceError::ArtifactMissing { .. } | WorkspaceError::NotFound { .. } => err.to_string(),
    }
}

const fn outcome_of(result: &WorkspaceResult<BuildReceipt>) -> BuildOutcome {
    match result {
        Ok(_) => BuildOutcome::Built,
        Err(WorkspaceError::Build { .. }) => BuildOutcome::BuildFailed,
        Err(WorkspaceError::ArtifactMissing { .. }) => BuildOutcome::ArtifactMissing,
        Err(_) => BuildOutcome::Failed,
    }
}

fn log_failure(err: &WorkspaceError) {
    match err {
        WorkspaceError::Build { exit_code, output } => error!(
            exit_code = ?exit_code,
            output = tail(output, MAX_LOGGED_OUTPUT),
            "external build failed"
        ),
        other => error!(error = ?other, "build pipeline failed"),
    }
}

fn tail(output: &str, max: usize) -> &str {
    if output.len() <= max {
        return output;
    }
    let mut start = output.len() - max;
    while !output.is_char_boundary(start) {
        start += 1;
    }
    &output[start..]
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
