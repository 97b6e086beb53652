//! Expiry sweep for workspaces that were never downloaded.
//!
//! # Design
//! - Workspaces in a non-terminal state are never removed, however old.
//! - Directories without readable metadata age by their modification time.
//! - Removal failures are logged and counted; one bad entry never stops the sweep.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use apkforge_config::WorkspaceSettings;
use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::artifact::CLAIMED_SUFFIX;
use crate::error::{WorkspaceError, WorkspaceResult};
use crate::model::load_meta;

/// Counts of directories removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Expired terminal or metadata-less workspaces.
    pub workspaces: usize,
    /// Leftover claimed workspaces.
    pub claimed: usize,
    /// Expired upload staging directories.
    pub staging: usize,
    /// Entries that could not be removed.
    pub failures: usize,
}

impl SweepReport {
    /// Total directories removed.
    #[must_use]
    pub const fn removed(&self) -> usize {
        self.workspaces + self.claimed + self.staging
    }
}

/// Remove every workspace and staging directory older than `ttl` at `now`.
///
/// # Errors
///
/// Returns an IO error when a root directory exists but cannot be listed.
pub fn sweep_expired(
    settings: &WorkspaceSettings,
    ttl: Duration,
    now: DateTime<Utc>,
) -> WorkspaceResult<SweepReport> {
    let mut report = SweepReport::default();
    let Some(cutoff) = TimeDelta::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_sub_signed(ttl))
    else {
        return Ok(report);
    };

    for_each_dir(&settings.workspace_root, |dir, name| {
        if name.ends_with(CLAIMED_SUFFIX) {
            if modified_before(dir, cutoff) {
                tally(remove(dir), &mut report.claimed, &mut report.failures);
            }
            return;
        }
        let expired = match load_meta(dir) {
            Ok(meta) => meta.state.is_terminal() && meta.updated_at < cutoff,
            Err(_) => modified_before(dir, cutoff),
        };
        if expired {
            tally(remove(dir), &mut report.workspaces, &mut report.failures);
        }
    })?;

    for_each_dir(&settings.upload_root, |dir, _| {
        if modified_before(dir, cutoff) {
            tally(remove(dir), &mut report.staging, &mut report.failures);
        }
    })?;

    Ok(report)
}

fn for_each_dir(root: &Path, mut visit: impl FnMut(&Path, &str)) -> WorkspaceResult<()> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(source) if source.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => return Err(WorkspaceError::io("sweep.read_dir", root, source)),
    };
    for entry in entries {
        let entry = entry.map_err(|source| WorkspaceError::io("sweep.read_entry", root, source))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        visit(&path, &name);
    }
    Ok(())
}

fn modified_before(dir: &Path, cutoff: DateTime<Utc>) -> bool {
    fs::metadata(dir)
        .and_then(|metadata| metadata.modified())
        .is_ok_and(|modified| DateTime::<Utc>::from(modified) < cutoff)
}

fn remove(dir: &Path) -> bool {
    match fs::remove_dir_all(dir) {
        Ok(()) => {
            debug!(dir = %dir.display(), "expired directory removed");
            true
        }
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "failed to remove expired directory");
            false
        }
    }
}

const fn tally(removed: bool, bucket: &mut usize, failures: &mut usize) {
    if removed {
        *bucket += 1;
    } else {
        *failures += 1;
    }
}
