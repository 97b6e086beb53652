//! Periodic expiry sweep of abandoned workspaces.

use apkforge_config::SweepPolicy;
use apkforge_workspace::WorkspaceService;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{info, warn};

/// Run `service.sweep_expired` every `policy.interval` until the task is aborted.
///
/// The first sweep happens one interval after startup.
#[must_use]
pub fn spawn_sweeper(service: WorkspaceService, policy: SweepPolicy) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!(
            ttl_secs = policy.ttl.as_secs(),
            interval_secs = policy.interval.as_secs(),
            "workspace expiry sweep enabled"
        );
        let mut ticker = time::interval_at(Instant::now() + policy.interval, policy.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = service.sweep_expired(policy.ttl).await {
                warn!(error = ?err, "workspace expiry sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use apkforge_config::{BuildCommand, SubstitutionMode, TemplateLayout, WorkspaceSettings};
    use apkforge_telemetry::Metrics;
    use apkforge_test_support::fixtures::write_template;
    use apkforge_workspace::{WorkspaceState, provision};
    use std::time::Duration;

    #[tokio::test]
    async fn sweeper_removes_finished_workspaces_only() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = WorkspaceSettings {
            template_dir: temp.path().join("template"),
            workspace_root: temp.path().join("builds"),
            upload_root: temp.path().join("uploads"),
            build_command: BuildCommand {
                program: "true".to_string(),
                args: Vec::new(),
            },
            layout: TemplateLayout::with_artifact("out/app.apk"),
            substitution: SubstitutionMode::FirstOccurrence,
            download_filename: "app.apk".to_string(),
        };
        write_template(&settings.template_dir)?;
        let mut finished = provision(&settings)?;
        finished.advance(WorkspaceState::Built)?;
        let mut running = provision(&settings)?;
        running.advance(WorkspaceState::Building)?;

        let metrics = Metrics::new()?;
        let service = WorkspaceService::with_process_runner(settings, metrics.clone());
        let handle = spawn_sweeper(
            service,
            SweepPolicy {
                ttl: Duration::ZERO,
                interval: Duration::from_millis(20),
            },
        );

        let deadline = Instant::now() + Duration::from_secs(5);
        while finished.path().exists() && Instant::now() < deadline {
            time::sleep(Duration::from_millis(10)).await;
        }
        handle.abort();

        assert!(!finished.path().exists());
        assert!(running.path().exists());
        assert!(metrics.snapshot().workspaces_swept_total >= 1);
        Ok(())
    }
}
