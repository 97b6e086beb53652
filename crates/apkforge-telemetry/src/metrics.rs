//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Outcome labels come from closed enums so label cardinality stays fixed.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

use crate::error::{Result, TelemetryError};

/// Terminal outcome of a `POST /generate-app` pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    /// Build succeeded and the artifact is ready for download.
    Built,
    /// The build tool failed to start or exited non-zero.
    BuildFailed,
    /// The build tool reported success without producing the artifact.
    ArtifactMissing,
    /// Provisioning, substitution or injection failed before the build ran.
    Failed,
}

impl BuildOutcome {
    /// Label value recorded for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Built => "built",
            Self::BuildFailed => "build_failed",
            Self::ArtifactMissing => "artifact_missing",
            Self::Failed => "failed",
        }
    }
}

/// Outcome of a `GET /download/{buildId}` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Artifact bytes were returned and the workspace removed.
    Served,
    /// No downloadable artifact existed for the identifier.
    NotFound,
}

impl DownloadOutcome {
    /// Label value recorded for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Served => "served",
            Self::NotFound => "not_found",
        }
    }
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    builds_total: IntCounterVec,
    downloads_total: IntCounterVec,
    build_duration_ms: IntGauge,
    active_builds: IntGauge,
    workspaces_swept_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Builds currently waiting on the external tool.
    pub active_builds: i64,
    /// Duration of the most recent build, in milliseconds.
    pub last_build_duration_ms: i64,
    /// Workspaces removed by the expiry sweep.
    pub workspaces_swept_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let http_requests_total = counter_vec(
            "http_requests_total",
            "Total HTTP requests received",
            &["route", "code"],
        )?;
        let builds_total = counter_vec(
            "builds_total",
            "Build pipelines finished by outcome",
            &["outcome"],
        )?;
        let downloads_total = counter_vec(
            "downloads_total",
            "Artifact download attempts by outcome",
            &["outcome"],
        )?;
        let build_duration_ms = gauge(
            "build_duration_ms",
            "Wall-clock time of the most recent external build (ms)",
        )?;
        let active_builds = gauge("active_builds", "External builds currently running")?;
        let workspaces_swept_total = IntCounter::with_opts(Opts::new(
            "workspaces_swept_total",
            "Workspaces and staging directories removed by the expiry sweep",
        ))
        .map_err(|source| TelemetryError::MetricsCollector {
            name: "workspaces_swept_total",
            source,
        })?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "builds_total", &builds_total)?;
        register(&registry, "downloads_total", &downloads_total)?;
        register(&registry, "build_duration_ms", &build_duration_ms)?;
        register(&registry, "active_builds", &active_builds)?;
        register(&registry, "workspaces_swept_total", &workspaces_swept_total)?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                builds_total,
                downloads_total,
                build_duration_ms,
                active_builds,
                workspaces_swept_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        self.inner
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Record a finished build pipeline.
    pub fn inc_build(&self, outcome: BuildOutcome) {
        self.inner
            .builds_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Record a download attempt.
    pub fn inc_download(&self, outcome: DownloadOutcome) {
        self.inner
            .downloads_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    /// Record the duration of the most recent external build.
    pub fn observe_build_duration(&self, duration: Duration) {
        self.inner
            .build_duration_ms
            .set(i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
    }

    /// Count removals performed by the expiry sweep.
    pub fn add_swept(&self, count: usize) {
        self.inner
            .workspaces_swept_total
            .inc_by(u64::try_from(count).unwrap_or(u64::MAX));
    }

    /// Mark a build as running until the returned guard is dropped.
    #[must_use]
    pub fn track_active_build(&self) -> ActiveBuildGuard {
        self.inner.active_builds.inc();
        ActiveBuildGuard {
            gauge: self.inner.active_builds.clone(),
        }
    }

    /// Read the counter value for a build outcome.
    #[must_use]
    pub fn build_count(&self, outcome: BuildOutcome) -> u64 {
        self.inner
            .builds_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Read the counter value for a download outcome.
    #[must_use]
    pub fn download_count(&self, outcome: DownloadOutcome) -> u64 {
        self.inner
            .downloads_total
            .with_label_values(&[outcome.as_str()])
            .get()
    }

    /// Capture the gauges reported by the health endpoint.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            active_builds: self.inner.active_builds.get(),
            last_build_duration_ms: self.inner.build_duration_ms.get(),
            workspaces_swept_total: self.inner.workspaces_swept_total.get(),
        }
    }

    /// Render all registered collectors in the Prometheus text format.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding fails or the output is not UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }
}

/// Decrements the active build gauge on drop.
pub struct ActiveBuildGuard {
    gauge: IntGauge,
}

impl Drop for ActiveBuildGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

fn counter_vec(name: &'static str, help: &str, labels: &[&str]) -> Result<IntCounterVec> {
    IntCounterVec::new(Opts::new(name, help), labels)
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn gauge(name: &'static str, help: &str) -> Result<IntGauge> {
    IntGauge::with_opts(Opts::new(name, help))
        .map_err(|source| TelemetryError::MetricsCollector { name, source })
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> Result<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_are_rendered_with_outcome_labels() -> Result<()> {
        let metrics = Metrics::new()?;
        metrics.inc_build(BuildOutcome::Built);
        metrics.inc_build(BuildOutcome::BuildFailed);
        metrics.inc_download(DownloadOutcome::NotFound);
        metrics.inc_http_request("/generate-app", 200);

        let rendered = metrics.render()?;
        assert!(rendered.contains("builds_total{outcome=\"built\"} 1"));
        assert!(rendered.contains("builds_total{outcome=\"build_failed\"} 1"));
        assert!(rendered.contains("downloads_total{outcome=\"not_found\"} 1"));
        assert!(rendered.contains("http_requests_total{code=\"200\",route=\"/generate-app\"} 1"));
        assert_eq!(metrics.build_count(BuildOutcome::Built), 1);
        assert_eq!(metrics.download_count(DownloadOutcome::Served), 0);
        Ok(())
    }

    #[test]
    fn active_build_guard_restores_gauge() -> Result<()> {
        let metrics = Metrics::new()?;
        {
            let _first = metrics.track_active_build();
            let _second = metrics.track_active_build();
            assert_eq!(metrics.snapshot().active_builds, 2);
        }
        assert_eq!(metrics.snapshot().active_builds, 0);
        Ok(())
    }

    #[test]
    fn snapshot_reports_durations_and_sweeps() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let metrics = Metrics::new()?;
        metrics.observe_build_duration(Duration::from_millis(1_250));
        metrics.add_swept(3);
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.last_build_duration_ms, 1_250);
        assert_eq!(snapshot.workspaces_swept_total, 3);
        let json = serde_json::to_value(&snapshot)?;
        assert_eq!(json["active_builds"], 0);
        Ok(())
    }
}
