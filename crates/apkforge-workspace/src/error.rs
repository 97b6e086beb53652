//! # Design
//!
//! - Provide structured, constant-message errors for the workspace lifecycle.
//! - Capture operation context (paths, fields, inputs) so failures are reproducible in tests.
//! - Build diagnostics travel in the error; callers decide what reaches the client.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for workspace operations.
pub type WorkspaceResult<T> = Result<T, WorkspaceError>;

/// Errors produced while provisioning, building or serving a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// IO failures while interacting with the filesystem.
    #[error("workspace io failure")]
    Io {
        /// Operation that triggered the IO failure.
        operation: &'static str,
        /// Path involved in the IO failure.
        path: PathBuf,
        /// Underlying IO error.
        source: io::Error,
    },
    /// Workspace metadata could not be encoded or decoded.
    #[error("workspace metadata failure")]
    Json {
        /// Operation that triggered the JSON failure.
        operation: &'static str,
        /// Metadata file involved.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
    /// Template traversal failures.
    #[error("workspace walkdir failure")]
    Walkdir {
        /// Operation that triggered the walkdir failure.
        operation: &'static str,
        /// Root of the traversal.
        path: PathBuf,
        /// Underlying walkdir error.
        source: walkdir::Error,
    },
    /// Zip archive failures.
    #[error("workspace zip failure")]
    Zip {
        /// Operation that triggered the archive failure.
        operation: &'static str,
        /// Archive involved in the failure.
        path: PathBuf,
        /// Underlying zip error.
        source: zip::result::ZipError,
    },
    /// Input validation failures.
    #[error("workspace invalid input")]
    InvalidInput {
        /// Field that failed validation.
        field: &'static str,
        /// Static reason for the failure.
        reason: &'static str,
        /// Offending value when available.
        value: Option<String>,
    },
    /// The external build tool could not be started or exited non-zero.
    #[error("external build failed")]
    Build {
        /// Exit code, absent when the process never started or was killed by a signal.
        exit_code: Option<i32>,
        /// Captured diagnostic output.
        output: String,
    },
    /// The build tool exited successfully without producing the artifact.
    #[error("build artifact missing")]
    ArtifactMissing {
        /// Expected artifact location.
        path: PathBuf,
    },
    /// No downloadable artifact exists for the identifier.
    #[error("artifact not found")]
    NotFound {
        /// Identifier requested by the caller.
        build_id: String,
    },
    /// A blocking filesystem task panicked or was cancelled.
    #[error("workspace task failed")]
    Join {
        /// Operation executed on the blocking pool.
        operation: &'static str,
        /// Underlying join error.
        source: tokio::task::JoinError,
    },
}

impl WorkspaceError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn walkdir(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: walkdir::Error,
    ) -> Self {
        Self::Walkdir {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn zip(
        operation: &'static str,
        path: impl Into<PathBuf>,
        source: zip::result::ZipError,
    ) -> Self {
        Self::Zip {
            operation,
            path: path.into(),
            source,
        }
    }

    pub(crate) fn not_found(build_id: impl Into<String>) -> Self {
        Self::NotFound {
            build_id: build_id.into(),
        }
    }

    /// Whether the error means the requested artifact does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn helpers_preserve_sources_and_context() {
        let err = WorkspaceError::io(
            "provision.copy",
            "/tmp/ws",
            io::Error::new(io::ErrorKind::StorageFull, "disk full"),
        );
        assert_eq!(err.to_string(), "workspace io failure");
        assert!(err.source().is_some());
        assert!(matches!(
            err,
            WorkspaceError::Io {
                operation: "provision.copy",
                ..
            }
        ));

        let missing = WorkspaceError::not_found("abc");
        assert!(missing.is_not_found());
        assert_eq!(missing.to_string(), "artifact not found");

        let build = WorkspaceError::Build {
            exit_code: Some(1),
            output: "FAILURE: Build failed".to_string(),
        };
        assert!(!build.is_not_found());
        assert!(build.source().is_none());
    }
}
