//! One-shot artifact download and workspace removal.
//!
//! # Design
//! - Claiming renames the workspace, so exactly one downloader wins.
//! - The artifact is streamed from the claimed directory in fixed-size chunks.
//! - The claimed directory is removed once the stream ends or its consumer goes away.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use apkforge_config::WorkspaceSettings;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::model::{BuildId, WorkspaceState, load_meta};

/// Suffix given to a workspace that a download has claimed.
pub const CLAIMED_SUFFIX: &str = ".claimed";

const CHUNK_SIZE: usize = 64 * 1024;
const CHUNK_BUFFER: usize = 4;

/// Artifact of a claimed workspace, ready to be streamed out.
#[derive(Debug)]
pub struct ClaimedArtifact {
    /// Build the artifact belonged to.
    pub build_id: BuildId,
    /// Artifact size in bytes.
    pub len: u64,
    /// Filename presented to the client.
    pub file_name: String,
    /// Content type guessed from `file_name`.
    pub content_type: String,
    file: File,
    claim: ClaimedDir,
}

impl ClaimedArtifact {
    /// Stream the artifact in chunks, removing the claimed workspace afterwards.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn into_stream(self) -> ReceiverStream<io::Result<Vec<u8>>> {
        let (sender, receiver) = mpsc::channel(CHUNK_BUFFER);
        let Self {
            build_id,
            mut file,
            claim,
            ..
        } = self;
        tokio::task::spawn_blocking(move || {
            loop {
                let mut chunk = vec![0; CHUNK_SIZE];
                let item = match file.read(&mut chunk) {
                    Ok(0) => break,
                    Ok(read) => {
                        chunk.truncate(read);
                        Ok(chunk)
                    }
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => Err(err),
                };
                let failed = item.is_err();
                if sender.blocking_send(item).is_err() {
                    debug!(build_id = %build_id, "download abandoned by client");
                    break;
                }
                if failed {
                    break;
                }
            }
            drop(file);
            drop(claim);
        });
        ReceiverStream::new(receiver)
    }
}

/// Claimed workspace directory, removed on drop.
#[derive(Debug)]
struct ClaimedDir(PathBuf);

impl Drop for ClaimedDir {
    fn drop(&mut self) {
        remove_claimed(&self.0);
    }
}

/// Claim the artifact of a built workspace for a single download.
///
/// Unknown, unfinished, failed and already downloaded builds all yield
/// [`WorkspaceError::NotFound`].
///
/// # Errors
///
/// Returns `NotFound` as described above, or an IO error when the claimed
/// artifact cannot be opened.
pub fn claim_artifact(settings: &WorkspaceSettings, raw_id: &str) -> WorkspaceResult<ClaimedArtifact> {
    let build_id: BuildId = raw_id.parse()?;
    let workspace = settings.workspace_dir(&build_id.to_string());

    let downloadable = load_meta(&workspace).is_ok_and(|meta| meta.state == WorkspaceState::Built)
        && workspace.join(&settings.layout.artifact_path).is_file();
    if !downloadable {
        return Err(WorkspaceError::not_found(raw_id));
    }

    // Exactly one concurrent claimant wins the rename.
    let claimed = claimed_dir(&workspace);
    fs::rename(&workspace, &claimed).map_err(|_| WorkspaceError::not_found(raw_id))?;
    let claim = ClaimedDir(claimed);
    debug!(build_id = %build_id, "workspace claimed for download");

    let artifact = claim.0.join(&settings.layout.artifact_path);
    let file = File::open(&artifact).map_err(|source| WorkspaceError::io("artifact.open", &artifact, source))?;
    let len = file
        .metadata()
        .map_err(|source| WorkspaceError::io("artifact.metadata", &artifact, source))?
        .len();

    let file_name = settings.download_filename.clone();
    let content_type = mime_guess::from_path(&file_name)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(ClaimedArtifact {
        build_id,
        len,
        file_name,
        content_type,
        file,
        claim,
    })
}

fn claimed_dir(workspace: &Path) -> PathBuf {
    let mut name = workspace.as_os_str().to_owned();
    name.push(CLAIMED_SUFFIX);
    PathBuf::from(name)
}

fn remove_claimed(claimed: &Path) {
    match fs::remove_dir_all(claimed) {
        Ok(()) => debug!(dir = %claimed.display(), "claimed workspace removed"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            dir = %claimed.display(),
            error = %err,
            "failed to remove claimed workspace; sweep will retry"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Workspace;
    use anyhow::Result;
    use apkforge_config::{BuildCommand, SubstitutionMode, TemplateLayout};
    use std::time::Duration;
    use tokio_stream::StreamExt;

    fn settings(root: &Path) -> WorkspaceSettings {
        WorkspaceSettings {
            template_dir: root.join("template"),
            workspace_root: root.join("builds"),
            upload_root: root.join("uploads"),
            build_command: BuildCommand {
                program: "true".to_string(),
                args: Vec::new(),
            },
            layout: TemplateLayout::with_artifact("out/app.apk"),
            substitution: SubstitutionMode::FirstOccurrence,
            download_filename: "app-debug.apk".to_string(),
        }
    }

    fn seed(settings: &WorkspaceSettings, state: WorkspaceState, with_artifact: bool) -> Result<BuildId> {
        let build_id = BuildId::new();
        let root = settings.workspace_dir(&build_id.to_string());
        fs::create_dir_all(&root)?;
        let mut workspace = Workspace::create(build_id, root.clone())?;
        workspace.advance(state)?;
        if with_artifact {
            let artifact = root.join(&settings.layout.artifact_path);
            if let Some(parent) = artifact.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(artifact, b"PK apk bytes")?;
        }
        Ok(build_id)
    }

    async fn collect(artifact: ClaimedArtifact) -> Result<Vec<u8>> {
        let mut stream = artifact.into_stream();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend(chunk?);
        }
        Ok(bytes)
    }

    async fn wait_until_removed(dir: &Path) -> bool {
        for _ in 0..200 {
            if !dir.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn built_artifact_is_served_once() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        let build_id = seed(&settings, WorkspaceState::Built, true)?;
        let workspace = settings.workspace_dir(&build_id.to_string());

        let claimed = claim_artifact(&settings, &build_id.to_string())?;
        assert_eq!(claimed.build_id, build_id);
        assert_eq!(claimed.len, 12);
        assert_eq!(claimed.file_name, "app-debug.apk");
        assert_eq!(claimed.content_type, "application/vnd.android.package-archive");
        assert!(!workspace.exists());

        let second = claim_artifact(&settings, &build_id.to_string()).err();
        assert!(second.is_some_and(|err| err.is_not_found()));

        assert_eq!(collect(claimed).await?, b"PK apk bytes");
        assert!(wait_until_removed(&claimed_dir(&workspace)).await);
        Ok(())
    }

    #[tokio::test]
    async fn large_artifact_streams_in_chunks() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        let build_id = seed(&settings, WorkspaceState::Built, false)?;
        let workspace = settings.workspace_dir(&build_id.to_string());
        let payload: Vec<u8> = (0..=u8::MAX).cycle().take(CHUNK_SIZE * 3 + 17).collect();
        let artifact = workspace.join(&settings.layout.artifact_path);
        if let Some(parent) = artifact.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(artifact, &payload)?;

        let claimed = claim_artifact(&settings, &build_id.to_string())?;
        assert_eq!(claimed.len, u64::try_from(payload.len())?);
        let mut stream = claimed.into_stream();
        let mut chunks = 0;
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            assert!(chunk.len() <= CHUNK_SIZE);
            bytes.extend(chunk);
            chunks += 1;
        }
        assert!(chunks >= 4);
        assert_eq!(bytes, payload);
        Ok(())
    }

    #[tokio::test]
    async fn abandoned_stream_still_removes_the_workspace() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        let build_id = seed(&settings, WorkspaceState::Built, true)?;
        let workspace = settings.workspace_dir(&build_id.to_string());

        let claimed = claim_artifact(&settings, &build_id.to_string())?;
        drop(claimed.into_stream());
        assert!(wait_until_removed(&claimed_dir(&workspace)).await);

        let again = claim_artifact(&settings, &build_id.to_string()).err();
        assert!(again.is_some_and(|err| err.is_not_found()));
        Ok(())
    }

    #[test]
    fn unstreamed_claim_removes_the_workspace_on_drop() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        let build_id = seed(&settings, WorkspaceState::Built, true)?;
        let workspace = settings.workspace_dir(&build_id.to_string());

        drop(claim_artifact(&settings, &build_id.to_string())?);
        assert!(!workspace.exists());
        assert!(!claimed_dir(&workspace).exists());
        Ok(())
    }

    #[test]
    fn failed_and_unfinished_builds_are_not_downloadable() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        for state in [
            WorkspaceState::BuildFailed,
            WorkspaceState::Building,
            WorkspaceState::Failed,
        ] {
            let build_id = seed(&settings, state, true)?;
            let err = claim_artifact(&settings, &build_id.to_string()).err();
            assert!(err.is_some_and(|err| err.is_not_found()), "{state:?}");
            assert!(settings.workspace_dir(&build_id.to_string()).exists());
        }
        Ok(())
    }

    #[test]
    fn built_state_without_artifact_is_not_found() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        let build_id = seed(&settings, WorkspaceState::Built, false)?;
        let err = claim_artifact(&settings, &build_id.to_string()).err();
        assert!(err.is_some_and(|err| err.is_not_found()));
        Ok(())
    }

    #[test]
    fn unknown_and_malformed_ids_are_not_found() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        for raw in [BuildId::new().to_string(), "../../etc".to_string(), String::new()] {
            let err = claim_artifact(&settings, &raw).err();
            assert!(err.is_some_and(|err| err.is_not_found()), "{raw}");
        }
        Ok(())
    }
}
