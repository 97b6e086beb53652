//! Shared HTTP constants (headers, form fields, client-facing messages).

pub(crate) const HEADER_REQUEST_ID: &str = "x-request-id";

pub(crate) const FIELD_APP_NAME: &str = "appName";
pub(crate) const FIELD_PACKAGE_NAME: &str = "packageName";
pub(crate) const FIELD_VERSION: &str = "version";
pub(crate) const FIELD_URL: &str = "url";
pub(crate) const FIELD_ICON: &str = "icon";
pub(crate) const FIELD_HTML_FILE: &str = "htmlFile";

pub(crate) const MESSAGE_MISSING_FIELDS: &str = "Missing required fields";
pub(crate) const MESSAGE_INVALID_MULTIPART: &str = "Invalid multipart request";
pub(crate) const MESSAGE_DUPLICATE_FILE: &str = "Only one file allowed per field";
pub(crate) const MESSAGE_UPLOAD_TOO_LARGE: &str = "Upload too large";
pub(crate) const MESSAGE_GENERATE_FAILED: &str = "Failed to generate APK";
pub(crate) const MESSAGE_NOT_FOUND: &str = "APK not found";
pub(crate) const MESSAGE_INTERNAL: &str = "Internal server error";

pub(crate) const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";
