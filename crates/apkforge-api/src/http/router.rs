//! Router construction and server host for the API.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{get, post},
};
use apkforge_telemetry::build_sha;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{Span, info};

use crate::error::{ApiServerError, ApiServerResult};
use crate::http::constants::HEADER_REQUEST_ID;
use crate::http::download::download_artifact;
use crate::http::generate::generate_app;
use crate::http::health::{health, metrics};
use crate::http::telemetry::HttpMetricsLayer;
use crate::state::ApiState;

/// Axum router wrapper that hosts the apkforge API.
pub struct ApiServer {
    router: Router,
}

impl ApiServer {
    /// Wire the handlers, tracing, request ids and metrics around `state`.
    ///
    /// `max_upload_bytes` bounds the body of `POST /generate-app`.
    #[must_use]
    pub fn new(state: ApiState, max_upload_bytes: usize) -> Self {
        let telemetry = state.telemetry.clone();
        let state = Arc::new(state);

        let trace_layer = TraceLayer::new_for_http()
            .make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(HEADER_REQUEST_ID)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("")
                    .to_string();

                tracing::info_span!(
                    "http.request",
                    method = %request.method(),
                    route = %request.uri().path(),
                    request_id = %request_id,
                    build_sha = %build_sha(),
                    status_code = tracing::field::Empty,
                    latency_ms = tracing::field::Empty
                )
            })
            .on_request(|_request: &Request<_>, _span: &Span| {})
            .on_response(
                |response: &axum::response::Response, latency: Duration, span: &Span| {
                    span.record("status_code", response.status().as_u16());
                    let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                    span.record("latency_ms", latency_ms);
                },
            );
        let observed = ServiceBuilder::new()
            .layer(trace_layer)
            .layer(HttpMetricsLayer::new(telemetry));
        let request_ids = ServiceBuilder::new()
            .layer(apkforge_telemetry::propagate_request_id_layer())
            .layer(apkforge_telemetry::set_request_id_layer());

        let router = Router::new()
            .route(
                "/generate-app",
                post(generate_app).layer(DefaultBodyLimit::max(max_upload_bytes)),
            )
            .route("/download/{build_id}", get(download_artifact))
            .route("/health", get(health))
            .route("/metrics", get(metrics))
            .route_layer(observed)
            .layer(request_ids)
            .with_state(state);

        Self { router }
    }

    /// Serve until `shutdown` resolves, then drain in-flight requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener fails to bind or the server terminates unexpectedly.
    pub async fn serve<F>(self, addr: SocketAddr, shutdown: F) -> ApiServerResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ApiServerError::Bind { addr, source })?;
        info!(%addr, "apkforge api listening");
        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|source| ApiServerError::Serve { source })
    }

    #[cfg(test)]
    pub(crate) fn into_router(self) -> Router {
        self.router
    }
}
