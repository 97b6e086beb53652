//! Health and diagnostics endpoints.

use std::sync::Arc;

use apkforge_telemetry::build_sha;
use axum::{Json, body::Body, extract::State, http::StatusCode, response::Response};
use tracing::error;

use crate::http::constants::PROMETHEUS_CONTENT_TYPE;
use crate::http::errors::ApiError;
use crate::models::HealthResponse;
use crate::state::ApiState;

pub(crate) async fn health(State(state): State<Arc<ApiState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        build: build_sha().to_string(),
        active_builds: state.telemetry.snapshot().active_builds,
    })
}

pub(crate) async fn metrics(State(state): State<Arc<ApiState>>) -> Result<Response, ApiError> {
    match state.telemetry.render() {
        Ok(body) => Response::builder()
            .status(StatusCode::OK)
            .header(axum::http::header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)
            .body(Body::from(body))
            .map_err(|err| {
                error!(error = %err, "failed to build metrics response");
                ApiError::internal()
            }),
        Err(err) => {
            error!(error = %err, "failed to render metrics");
            Err(ApiError::internal())
        }
    }
}
