//! JSON error wrapper returned by every handler.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::http::constants::{
    MESSAGE_DUPLICATE_FILE, MESSAGE_GENERATE_FAILED, MESSAGE_INTERNAL, MESSAGE_INVALID_MULTIPART,
    MESSAGE_MISSING_FIELDS, MESSAGE_NOT_FOUND, MESSAGE_UPLOAD_TOO_LARGE,
};
use crate::models::ErrorBody;

/// Status code plus a constant, client-safe message.
///
/// Detail stays in the logs; the body is always `{"error": message}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ApiError {
    pub(crate) status: StatusCode,
    pub(crate) message: &'static str,
}

impl ApiError {
    const fn new(status: StatusCode, message: &'static str) -> Self {
        Self { status, message }
    }

    pub(crate) const fn missing_fields() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MESSAGE_MISSING_FIELDS)
    }

    pub(crate) const fn invalid_multipart() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MESSAGE_INVALID_MULTIPART)
    }

    pub(crate) const fn duplicate_file() -> Self {
        Self::new(StatusCode::BAD_REQUEST, MESSAGE_DUPLICATE_FILE)
    }

    pub(crate) const fn upload_too_large() -> Self {
        Self::new(StatusCode::PAYLOAD_TOO_LARGE, MESSAGE_UPLOAD_TOO_LARGE)
    }

    pub(crate) const fn generate_failed() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, MESSAGE_GENERATE_FAILED)
    }

    pub(crate) const fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, MESSAGE_NOT_FOUND)
    }

    pub(crate) const fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, MESSAGE_INTERNAL)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message.to_string(),
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_pick_status_codes() {
        assert_eq!(ApiError::missing_fields().status, StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::not_found().status, StatusCode::NOT_FOUND);
        assert_eq!(ApiError::generate_failed().message, "Failed to generate APK");
        assert_eq!(
            ApiError::upload_too_large().into_response().status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
