#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Per-request build workspaces for the apkforge service.
//!
//! A workspace is a private copy of the template project. The pipeline
//! provisions it, substitutes placeholders, injects uploaded assets, runs the
//! external build, and finally hands the artifact out exactly once.
//!
//! Layout: `provision.rs`, `substitute.rs`, `assets.rs`, `build.rs`,
//! `artifact.rs` and `sweep.rs` hold the individual steps; `service.rs`
//! sequences them; `staging.rs` owns upload staging; `model.rs` holds the
//! persisted state machine.

pub mod artifact;
pub mod assets;
pub mod build;
pub mod error;
pub mod model;
pub mod provision;
pub mod service;
pub mod staging;
pub mod substitute;
pub mod sweep;

pub use artifact::{CLAIMED_SUFFIX, ClaimedArtifact, claim_artifact};
pub use assets::{ArchiveKind, inject_icon, inject_web_content};
pub use build::{BuildOutput, BuildRunner, ProcessBuildRunner, invoke_build};
pub use error::{WorkspaceError, WorkspaceResult};
pub use model::{
    BuildFields, BuildId, META_DIR_NAME, META_FILE_NAME, Placeholder, Workspace, WorkspaceMeta,
    WorkspaceState, load_meta, meta_path,
};
pub use provision::provision;
pub use service::{BuildReceipt, BuildRequest, WorkspaceService};
pub use staging::{StagedAsset, StagedUpload, release_all};
pub use substitute::{replace_tokens, substitute};
pub use sweep::{SweepReport, sweep_expired};
