//! `GET /download/{buildId}`: one-shot artifact download.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{
        HeaderValue, StatusCode,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::Response,
};
use tracing::error;

use crate::http::errors::ApiError;
use crate::state::ApiState;

pub(crate) async fn download_artifact(
    State(state): State<Arc<ApiState>>,
    Path(build_id): Path<String>,
) -> Result<Response, ApiError> {
    let claimed = state
        .service
        .claim_artifact(&build_id)
        .await
        .map_err(|err| {
            if err.is_not_found() {
                ApiError::not_found()
            } else {
                ApiError::internal()
            }
        })?;

    let disposition = format!("attachment; filename=\"{}\"", claimed.file_name);
    let disposition = HeaderValue::from_str(&disposition).map_err(|err| {
        error!(error = %err, file_name = %claimed.file_name, "invalid download filename");
        ApiError::internal()
    })?;
    let length = claimed.len;
    let content_type = claimed.content_type.clone();
    Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, content_type)
        .header(CONTENT_LENGTH, length)
        .header(CONTENT_DISPOSITION, disposition)
        .body(Body::from_stream(claimed.into_stream()))
        .map_err(|err| {
            error!(error = %err, "failed to build download response");
            ApiError::internal()
        })
}
