//! HTTP surface modules (router, handlers, middleware).

/// Shared constants: header names, form fields, error messages.
pub mod constants;
/// Artifact download handler.
pub mod download;
/// JSON error responses.
pub mod errors;
/// Multipart build handler.
pub mod generate;
/// Health and metrics endpoints.
pub mod health;
/// Router construction and server host.
pub mod router;
/// Metrics middleware for HTTP requests.
pub mod telemetry;
