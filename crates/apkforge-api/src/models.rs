//! Wire models for the HTTP API.

use serde::{Deserialize, Serialize};

/// Successful `POST /generate-app` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateAppResponse {
    /// Always `true`.
    pub success: bool,
    /// Artifact location on the server.
    pub apk_path: String,
    /// One-shot download link.
    pub download_url: String,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Generic, client-safe message.
    pub error: String,
}

/// `GET /health` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` while the process is serving.
    pub status: String,
    /// Build revision of the running binary.
    pub build: String,
    /// Builds waiting on the external tool.
    pub active_builds: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn generate_response_uses_camel_case() -> serde_json::Result<()> {
        let response = GenerateAppResponse {
            success: true,
            apk_path: "/tmp/builds/id/app.apk".to_string(),
            download_url: "/download/id".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&response)?,
            json!({
                "success": true,
                "apkPath": "/tmp/builds/id/app.apk",
                "downloadUrl": "/download/id"
            })
        );
        Ok(())
    }
}
