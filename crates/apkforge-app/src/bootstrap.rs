//! Configuration loading, logging, service wiring and shutdown.

use std::future::Future;
use std::net::SocketAddr;

use apkforge_api::{ApiServer, ApiState};
use apkforge_config::ServiceConfig;
use apkforge_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use apkforge_workspace::WorkspaceService;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::sweeper::spawn_sweeper;

/// Entry point for the apkforge boot sequence.
///
/// # Errors
///
/// Returns an error if configuration is invalid, logging cannot be installed,
/// or the listener fails.
pub async fn run_app() -> AppResult<()> {
    let config =
        ServiceConfig::from_env().map_err(|err| AppError::config("config.from_env", err))?;
    let logging = LoggingConfig {
        level: &config.logging.level,
        format: LogFormat::from_setting(config.logging.format.as_deref()),
        ..LoggingConfig::default()
    };
    init_logging(&logging).map_err(|err| AppError::telemetry("telemetry.init", err))?;
    run_app_with(config, shutdown_signal()).await
}

/// Boot sequence driven by an explicit configuration and shutdown trigger.
pub(crate) async fn run_app_with<F>(config: ServiceConfig, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    config
        .ensure_template_dir()
        .map_err(|err| AppError::config("config.template_dir", err))?;
    info!(
        template = %config.workspace.template_dir.display(),
        workspaces = %config.workspace.workspace_root.display(),
        uploads = %config.workspace.upload_root.display(),
        "apkforge bootstrap starting"
    );

    let telemetry = Metrics::new().map_err(|err| AppError::telemetry("telemetry.metrics", err))?;
    let service = WorkspaceService::with_process_runner(config.workspace.clone(), telemetry.clone());
    let sweeper = config
        .sweep
        .map(|policy| spawn_sweeper(service.clone(), policy));

    let api = ApiServer::new(ApiState::new(service, telemetry), config.max_upload_bytes);
    let addr = SocketAddr::new(config.listener.bind_addr, config.listener.http_port);
    let served = api.serve(addr, shutdown).await;

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    served.map_err(|err| AppError::api_server("api_server.serve", err))?;
    info!("apkforge stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received; shutting down"),
        () = terminate => info!("SIGTERM received; shutting down"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use apkforge_test_support::fixtures::write_template;
    use std::collections::HashMap;
    use std::path::Path;

    fn config(root: &Path, extra: &[(&str, &str)]) -> Result<ServiceConfig> {
        let mut vars: HashMap<String, String> = HashMap::from([
            ("APKFORGE_TEMPLATE_DIR".to_string(), root.join("template").display().to_string()),
            ("APKFORGE_WORKSPACE_ROOT".to_string(), root.join("builds").display().to_string()),
            ("APKFORGE_UPLOAD_ROOT".to_string(), root.join("uploads").display().to_string()),
            ("APKFORGE_BIND_ADDR".to_string(), "127.0.0.1".to_string()),
        ]);
        for (key, value) in extra {
            vars.insert((*key).to_string(), (*value).to_string());
        }
        let mut config = ServiceConfig::from_lookup(|key| vars.get(key).cloned())?;
        // Ephemeral port so tests never collide.
        config.listener.http_port = 0;
        Ok(config)
    }

    #[tokio::test]
    async fn missing_template_aborts_startup() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let err = run_app_with(config(temp.path(), &[])?, async {})
            .await
            .err();
        assert!(matches!(
            err,
            Some(AppError::Config {
                operation: "config.template_dir",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn server_stops_on_shutdown_signal() -> Result<()> {
        let temp = tempfile::tempdir()?;
        write_template(&temp.path().join("template"))?;
        let config = config(temp.path(), &[("APKFORGE_WORKSPACE_TTL_SECS", "60")])?;
        assert!(config.sweep.is_some());

        run_app_with(config, async {}).await?;
        Ok(())
    }
}
