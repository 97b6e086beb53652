//! Shared application state handed to every handler.

use apkforge_telemetry::Metrics;
use apkforge_workspace::WorkspaceService;

/// Dependencies shared by the HTTP handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Build pipeline.
    pub service: WorkspaceService,
    /// Metrics registry.
    pub telemetry: Metrics,
}

impl ApiState {
    /// Bundle the pipeline and metrics handles.
    #[must_use]
    pub const fn new(service: WorkspaceService, telemetry: Metrics) -> Self {
        Self { service, telemetry }
    }
}
