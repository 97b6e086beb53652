//! Upload staging handles.
//!
//! # Design
//! - Each uploaded file lives alone in `<upload_root>/<uuid>/`.
//! - The handle owns the directory; `release` is the only way it is deleted by the pipeline.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{WorkspaceError, WorkspaceResult};

const FALLBACK_FILE_NAME: &str = "upload";

/// An uploaded file staged on disk before the pipeline consumes it.
#[derive(Debug)]
pub struct StagedUpload {
    dir: PathBuf,
    file: PathBuf,
    original_name: String,
}

/// Read-only view of a staged upload handed to blocking pipeline steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    /// Staged file on disk.
    pub path: PathBuf,
    /// Filename supplied by the client, used for archive detection.
    pub original_name: String,
}

impl StagedUpload {
    /// Create a fresh staging directory for a file called `original_name`.
    ///
    /// The returned path does not exist yet; the caller writes the upload to it.
    ///
    /// # Errors
    ///
    /// Returns an IO error when the staging directory cannot be created.
    pub async fn stage(upload_root: &Path, original_name: Option<&str>) -> WorkspaceResult<Self> {
        let dir = upload_root.join(Uuid::new_v4().to_string());
        fs::create_dir_all(&dir)
            .await
            .map_err(|source| WorkspaceError::io("staging.create_dir", &dir, source))?;
        let original_name = sanitize_file_name(original_name);
        let file = dir.join(&original_name);
        Ok(Self {
            dir,
            file,
            original_name,
        })
    }

    /// Location the upload is (or will be) written to.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.file
    }

    /// Directory owned by this handle.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.dir
    }

    /// Client filename after sanitisation.
    #[must_use]
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// Borrowable description for pipeline steps.
    #[must_use]
    pub fn asset(&self) -> StagedAsset {
        StagedAsset {
            path: self.file.clone(),
            original_name: self.original_name.clone(),
        }
    }

    /// Delete the staging directory.
    ///
    /// Failures are logged and swallowed; the sweep reclaims anything left behind.
    pub async fn release(self) {
        match fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(dir = %self.dir.display(), "released upload staging directory"),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                dir = %self.dir.display(),
                error = %err,
                "failed to release upload staging directory"
            ),
        }
    }
}

/// Release every staged upload in `uploads`.
pub async fn release_all(uploads: impl IntoIterator<Item = StagedUpload>) {
    for upload in uploads {
        upload.release().await;
    }
}

fn sanitize_file_name(raw: Option<&str>) -> String {
    raw.and_then(|name| {
        // Clients may send Windows paths.
        let name = name.rsplit(['/', '\\']).next().unwrap_or(name);
        let trimmed = name.trim();
        (!trimmed.is_empty() && trimmed != "." && trimmed != "..").then(|| trimmed.to_string())
    })
    .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}
