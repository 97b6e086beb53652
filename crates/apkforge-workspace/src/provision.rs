//! Workspace provisioning: a fresh directory holding a copy of the template project.

use std::fs;
use std::io;
use std::path::Path;

use apkforge_config::WorkspaceSettings;
use tracing::debug;
use walkdir::WalkDir;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::model::{BuildId, META_DIR_NAME, Workspace};

/// Create a uniquely named workspace and copy the template project into it.
///
/// # Errors
///
/// Returns an IO error when the template is missing or the copy cannot complete.
pub fn provision(settings: &WorkspaceSettings) -> WorkspaceResult<Workspace> {
    if !settings.template_dir.is_dir() {
        return Err(WorkspaceError::io(
            "provision.template",
            &settings.template_dir,
            io::Error::new(io::ErrorKind::NotFound, "template directory missing"),
        ));
    }
    fs::create_dir_all(&settings.workspace_root).map_err(|source| {
        WorkspaceError::io("provision.create_root", &settings.workspace_root, source)
    })?;

    let build_id = BuildId::new();
    let root = settings.workspace_dir(&build_id.to_string());
    // `create_dir` fails on an existing directory, so an identifier collision never shares a tree.
    fs::create_dir(&root).map_err(|source| WorkspaceError::io("provision.create_dir", &root, source))?;

    let copied = copy_tree(&settings.template_dir, &root)?;
    debug!(build_id = %build_id, files = copied, "template copied into workspace");
    Workspace::create(build_id, root)
}

/// Recursively copy `source` into the existing directory `destination`.
///
/// Template-level metadata directories are skipped. Returns the number of files copied.
pub(crate) fn copy_tree(source: &Path, destination: &Path) -> WorkspaceResult<usize> {
    let mut copied = 0;
    let walker = WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_entry(|entry| entry.depth() != 1 || entry.file_name() != META_DIR_NAME);

    for entry in walker {
        let entry = entry.map_err(|source_err| WorkspaceError::walkdir("copy_tree.walk", source, source_err))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(|_| WorkspaceError::InvalidInput {
                field: "template_path",
                reason: "strip_prefix",
                value: Some(entry.path().to_string_lossy().into_owned()),
            })?;
        let target_path = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target_path).map_err(|source_err| {
                WorkspaceError::io("copy_tree.create_dir", &target_path, source_err)
            })?;
        } else {
            if let Some(parent) = target_path.parent() {
                fs::create_dir_all(parent).map_err(|source_err| {
                    WorkspaceError::io("copy_tree.create_parent", parent, source_err)
                })?;
            }
            // `fs::copy` carries permission bits, keeping wrapper scripts executable.
            fs::copy(entry.path(), &target_path).map_err(|source_err| {
                WorkspaceError::io("copy_tree.copy_entry", &target_path, source_err)
            })?;
            copied += 1;
        }
    }

    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{WorkspaceState, load_meta};
    use anyhow::Result;
    use apkforge_config::{BuildCommand, SubstitutionMode, TemplateLayout};
    use apkforge_test_support::fixtures::{TEMPLATE_FILES, write_template};

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
            download_filename: "app.apk".to_string(),
        }
    }

    #[test]
    fn provision_copies_template_into_unique_directory() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        write_template(&settings.template_dir)?;

        let first = provision(&settings)?;
        let second = provision(&settings)?;
        assert_ne!(first.path(), second.path());
        assert_eq!(
            first.path(),
            settings.workspace_root.join(first.build_id().to_string())
        );

        for (relative, contents) in TEMPLATE_FILES {
            assert_eq!(fs::read_to_string(first.path().join(relative))?, *contents);
        }
        assert_eq!(load_meta(first.path())?.state, WorkspaceState::Created);
        assert!(!settings.template_dir.join(META_DIR_NAME).exists());
        Ok(())
    }

    #[test]
    fn provision_fails_without_template() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let settings = settings(temp.path());
        let err = provision(&settings)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected missing template error"))?;
        assert!(matches!(
            err,
            WorkspaceError::Io {
                operation: "provision.template",
                ..
            }
        ));
        assert!(!settings.workspace_root.exists());
        Ok(())
    }

    #[test]
    fn copy_tree_skips_template_metadata() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(source.join(META_DIR_NAME))?;
        fs::write(source.join(META_DIR_NAME).join("stale.json"), b"{}")?;
        fs::create_dir_all(source.join("nested/deeper"))?;
        fs::write(source.join("nested/deeper/file.txt"), b"deep")?;
        let destination = temp.path().join("dst");
        fs::create_dir_all(&destination)?;

        let copied = copy_tree(&source, &destination)?;
        assert_eq!(copied, 1);
        assert_eq!(fs::read(destination.join("nested/deeper/file.txt"))?, b"deep");
        assert!(!destination.join(META_DIR_NAME).exists());
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn copy_tree_preserves_executable_bits() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        let source = temp.path().join("src");
        fs::create_dir_all(&source)?;
        let script = source.join("gradlew");
        fs::write(&script, b"#!/bin/sh\n")?;
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755))?;
        let destination = temp.path().join("dst");
        fs::create_dir_all(&destination)?;

        copy_tree(&source, &destination)?;
        let mode = fs::metadata(destination.join("gradlew"))?.permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        Ok(())
    }
}
