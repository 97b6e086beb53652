//! Build identifiers, request fields and the on-disk workspace state machine.

use std::fmt::{self, Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{WorkspaceError, WorkspaceResult};

/// Directory inside each workspace holding lifecycle metadata.
pub const META_DIR_NAME: &str = ".apkforge";
/// Metadata filename inside [`META_DIR_NAME`].
pub const META_FILE_NAME: &str = "workspace.meta.json";

/// Unique identifier of one build attempt and its workspace directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(Uuid);

impl BuildId {
    /// Draw a fresh random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BuildId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BuildId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, formatter)
    }
}

impl FromStr for BuildId {
    type Err = WorkspaceError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| WorkspaceError::not_found(raw))
    }
}

/// Placeholder tokens recognised in template files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    /// Dotted application/package identifier.
    PackageName,
    /// Human-readable application label.
    AppName,
    /// Version name.
    Version,
    /// Runtime endpoint loaded by the shell.
    Url,
}

impl Placeholder {
    /// Every placeholder in replacement order.
    pub const ALL: [Self; 4] = [Self::PackageName, Self::AppName, Self::Version, Self::Url];

    /// Literal marker string found in template files.
    #[must_use]
    pub const fn token(self) -> &'static str {
        match self {
            Self::PackageName => "{{PACKAGE_NAME}}",
            Self::AppName => "{{APP_NAME}}",
            Self::Version => "{{VERSION}}",
            Self::Url => "{{URL}}",
        }
    }
}

/// Caller-supplied values substituted into the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildFields {
    /// Value for `{{PACKAGE_NAME}}`.
    pub package_name: String,
    /// Value for `{{APP_NAME}}`.
    pub app_name: String,
    /// Value for `{{VERSION}}`.
    pub version: String,
    /// Value for `{{URL}}`.
    pub url: String,
}

impl BuildFields {
    /// Value bound to a placeholder.
    #[must_use]
    pub fn value(&self, placeholder: Placeholder) -> &str {
        match placeholder {
            Placeholder::PackageName => &self.package_name,
            Placeholder::AppName => &self.app_name,
            Placeholder::Version => &self.version,
            Placeholder::Url => &self.url,
        }
    }
}

/// Lifecycle state recorded in the workspace metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceState {
    /// Template copied.
    Created,
    /// Placeholders substituted.
    Parameterized,
    /// Optional icon and web content placed.
    AssetInjected,
    /// External build running.
    Building,
    /// Artifact present and downloadable.
    Built,
    /// External build failed or produced no artifact.
    BuildFailed,
    /// Substitution or injection failed before the build ran.
    Failed,
}

impl WorkspaceState {
    /// Whether no further transition will happen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Built | Self::BuildFailed | Self::Failed)
    }

    /// Label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Parameterized => "parameterized",
            Self::AssetInjected => "asset_injected",
            Self::Building => "building",
            Self::Built => "built",
            Self::BuildFailed => "build_failed",
            Self::Failed => "failed",
        }
    }
}

/// Persisted lifecycle record of one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    /// Owning build.
    pub build_id: BuildId,
    /// Current state.
    pub state: WorkspaceState,
    /// When the workspace was provisioned.
    pub created_at: DateTime<Utc>,
    /// Last transition time.
    pub updated_at: DateTime<Utc>,
    /// Failure summary for terminal failure states.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WorkspaceMeta {
    fn new(build_id: BuildId) -> Self {
        let now = Utc::now();
        Self {
            build_id,
            state: WorkspaceState::Created,
            created_at: now,
            updated_at: now,
            detail: None,
        }
    }
}

/// Location of the metadata file for a workspace directory.
#[must_use]
pub fn meta_path(workspace: &Path) -> PathBuf {
    workspace.join(META_DIR_NAME).join(META_FILE_NAME)
}

/// Read the metadata file of a workspace directory.
///
/// # Errors
///
/// Returns an IO error when the file is missing and a JSON error when it is corrupt.
pub fn load_meta(workspace: &Path) -> WorkspaceResult<WorkspaceMeta> {
    let path = meta_path(workspace);
    let raw = fs::read(&path).map_err(|source| WorkspaceError::io("meta.read", &path, source))?;
    serde_json::from_slice(&raw).map_err(|source| WorkspaceError::json("meta.decode", &path, source))
}

fn persist_meta(workspace: &Path, meta: &WorkspaceMeta) -> WorkspaceResult<()> {
    let path = meta_path(workspace);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| WorkspaceError::io("meta.create_dir", parent, source))?;
    }
    let encoded = serde_json::to_vec_pretty(meta)
        .map_err(|source| WorkspaceError::json("meta.encode", &path, source))?;
    fs::write(&path, encoded).map_err(|source| WorkspaceError::io("meta.write", &path, source))
}

/// A provisioned workspace directory and its lifecycle record.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    meta: WorkspaceMeta,
}

impl Workspace {
    pub(crate) fn create(build_id: BuildId, root: PathBuf) -> WorkspaceResult<Self> {
        let meta = WorkspaceMeta::new(build_id);
        persist_meta(&root, &meta)?;
        Ok(Self { root, meta })
    }

    /// Re-open an existing workspace from its metadata file.
    ///
    /// # Errors
    ///
    /// Returns an error when the metadata cannot be read.
    pub fn open(root: impl Into<PathBuf>) -> WorkspaceResult<Self> {
        let root = root.into();
        let meta = load_meta(&root)?;
        Ok(Self { root, meta })
    }

    /// Identifier of the owning build.
    #[must_use]
    pub const fn build_id(&self) -> BuildId {
        self.meta.build_id
    }

    /// Workspace directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> WorkspaceState {
        self.meta.state
    }

    /// Lifecycle record as last persisted.
    #[must_use]
    pub const fn meta(&self) -> &WorkspaceMeta {
        &self.meta
    }

    /// Record a transition and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error when the metadata cannot be written.
    pub fn advance(&mut self, state: WorkspaceState) -> WorkspaceResult<()> {
        self.transition(state, None)
    }

    /// Record a terminal failure with a short summary.
    ///
    /// # Errors
    ///
    /// Returns an error when the metadata cannot be written.
    pub fn fail(&mut self, state: WorkspaceState, detail: impl Into<String>) -> WorkspaceResult<()> {
        self.transition(state, Some(detail.into()))
    }

    fn transition(&mut self, state: WorkspaceState, detail: Option<String>) -> WorkspaceResult<()> {
        self.meta.state = state;
        self.meta.updated_at = Utc::now();
        self.meta.detail = detail;
        persist_meta(&self.root, &self.meta)
    }
}
