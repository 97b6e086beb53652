//! Asset injection: launcher icon and web content.
//!
//! # Design
//! - Both injections are optional and never validate file contents.
//! - Web content replaces the template's web directory wholesale.
//! - Archive entries are confined to the web directory; unsafe names abort the request.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Component, Path, PathBuf};

use apkforge_config::TemplateLayout;
use flate2::read::GzDecoder;
use tracing::debug;
use zip::ZipArchive;

use crate::error::{WorkspaceError, WorkspaceResult};
use crate::model::Workspace;
use crate::staging::StagedAsset;

/// Upload formats recognised as web content archives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    /// `.zip`
    Zip,
    /// `.tar.gz` or `.tgz`
    TarGz,
    /// `.tar`
    Tar,
}

impl ArchiveKind {
    /// Detect an archive from the client-supplied filename, case-insensitively.
    #[must_use]
    pub fn detect(file_name: &str) -> Option<Self> {
        let lower = file_name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

/// Overwrite the template launcher icon with the uploaded file.
///
/// # Errors
///
/// Returns an IO error when the icon cannot be copied into place.
pub fn inject_icon(workspace: &Workspace, layout: &TemplateLayout, icon: &StagedAsset) -> WorkspaceResult<()> {
    let destination = workspace.path().join(&layout.icon_path);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|source| WorkspaceError::io("inject_icon.create_parent", parent, source))?;
    }
    fs::copy(&icon.path, &destination)
        .map_err(|source| WorkspaceError::io("inject_icon.copy", &destination, source))?;
    debug!(icon = %destination.display(), "launcher icon replaced");
    Ok(())
}

/// Replace the web directory with the uploaded file or archive.
///
/// Returns the number of files written.
///
/// # Errors
///
/// Returns an error when the web directory cannot be reset, the archive is
/// unreadable, or an entry escapes the web directory.
pub fn inject_web_content(
    workspace: &Workspace,
    layout: &TemplateLayout,
    asset: &StagedAsset,
) -> WorkspaceResult<usize> {
    let web_dir = workspace.path().join(&layout.web_dir);
    reset_dir(&web_dir)?;

    let written = match ArchiveKind::detect(&asset.original_name) {
        Some(ArchiveKind::Zip) => extract_zip(&asset.path, &web_dir)?,
        Some(ArchiveKind::TarGz) => {
            let file = open(&asset.path, "extract_tar.open")?;
            extract_tar(GzDecoder::new(BufReader::new(file)), &asset.path, &web_dir)?
        }
        Some(ArchiveKind::Tar) => {
            let file = open(&asset.path, "extract_tar.open")?;
            extract_tar(BufReader::new(file), &asset.path, &web_dir)?
        }
        None => {
            let destination = web_dir.join(&layout.web_entry_point);
            fs::copy(&asset.path, &destination)
                .map_err(|source| WorkspaceError::io("inject_web.copy", &destination, source))?;
            1
        }
    };
    debug!(
        web_dir = %web_dir.display(),
        upload = %asset.original_name,
        files = written,
        "web content injected"
    );
    Ok(written)
}

fn reset_dir(dir: &Path) -> WorkspaceResult<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(source) if source.kind() == io::ErrorKind::NotFound => {}
        Err(source) => return Err(WorkspaceError::io("inject_web.clear", dir, source)),
    }
    fs::create_dir_all(dir).map_err(|source| WorkspaceError::io("inject_web.create_dir", dir, source))
}

fn open(path: &Path, operation: &'static str) -> WorkspaceResult<File> {
    File::open(path).map_err(|source| WorkspaceError::io(operation, path, source))
}

fn extract_zip(source: &Path, target: &Path) -> WorkspaceResult<usize> {
    let file = open(source, "extract_zip.open")?;
    let mut archive = ZipArchive::new(BufReader::new(file))
        .map_err(|source_err| WorkspaceError::zip("extract_zip.decode", source, source_err))?;

    let mut written = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|source_err| WorkspaceError::zip("extract_zip.read_entry", source, source_err))?;
        let entry_path = sanitize_archive_path(entry.name())?;
        if entry_path.as_os_str().is_empty() {
            continue;
        }
        let destination = target.join(&entry_path);

        if entry.is_dir() {
            fs::create_dir_all(&destination).map_err(|source_err| {
                WorkspaceError::io("extract_zip.create_dir", &destination, source_err)
            })?;
            continue;
        }

        write_entry(&mut entry, &destination, "extract_zip")?;
        written += 1;
    }

    Ok(written)
}

fn extract_tar<R: Read>(reader: R, source: &Path, target: &Path) -> WorkspaceResult<usize> {
    let mut archive = tar::Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|source_err| WorkspaceError::io("extract_tar.entries", source, source_err))?;

    let mut written = 0;
    for entry in entries {
        let mut entry =
            entry.map_err(|source_err| WorkspaceError::io("extract_tar.read_entry", source, source_err))?;
        let entry_type = entry.header().entry_type();
        if entry_type.is_symlink() || entry_type.is_hard_link() {
            debug!(archive = %source.display(), "skipping link entry");
            continue;
        }
        let raw_path = entry
            .path()
            .map_err(|source_err| WorkspaceError::io("extract_tar.entry_path", source, source_err))?
            .to_string_lossy()
            .into_owned();
        let entry_path = sanitize_archive_path(&raw_path)?;
        if entry_path.as_os_str().is_empty() {
            continue;
        }
        let destination = target.join(&entry_path);

        if entry_type.is_dir() {
            fs::create_dir_all(&destination).map_err(|source_err| {
                WorkspaceError::io("extract_tar.create_dir", &destination, source_err)
            })?;
        } else if entry_type.is_file() {
            write_entry(&mut entry, &destination, "extract_tar")?;
            written += 1;
        }
    }

    Ok(written)
}

fn write_entry(entry: &mut impl Read, destination: &Path, operation: &'static str) -> WorkspaceResult<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)
            .map_err(|source_err| WorkspaceError::io(operation, parent, source_err))?;
    }
    let mut output = File::create(destination)
        .map_err(|source_err| WorkspaceError::io(operation, destination, source_err))?;
    io::copy(entry, &mut output)
        .map_err(|source_err| WorkspaceError::io(operation, destination, source_err))?;
    Ok(())
}

/// Normalise an archive entry name to a path relative to the extraction root.
///
/// # Errors
///
/// Rejects absolute names and any `..` or prefix segment.
pub(crate) fn sanitize_archive_path(entry: &str) -> WorkspaceResult<PathBuf> {
    let path = Path::new(entry);
    if path.is_absolute() || entry.starts_with('/') || entry.starts_with('\\') {
        return Err(WorkspaceError::InvalidInput {
            field: "archive_entry",
            reason: "absolute_path",
            value: Some(entry.to_string()),
        });
    }

    let mut sanitized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => sanitized.push(segment),
            Component::CurDir => {}
            _ => {
                return Err(WorkspaceError::InvalidInput {
                    field: "archive_entry",
                    reason: "invalid_segment",
                    value: Some(entry.to_string()),
                });
            }
        }
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BuildId;
    use anyhow::Result;
    use apkforge_test_support::fixtures::{DEFAULT_ICON, write_tar_gz, write_template, write_zip};

    struct Fixture {
        _temp: tempfile::TempDir,
        uploads: PathBuf,
        workspace: Workspace,
        layout: TemplateLayout,
    }

    fn fixture() -> Result<Fixture> {
        let temp = tempfile::tempdir()?;
        let root = temp.path().join("ws");
        write_template(&root)?;
        let uploads = temp.path().join("uploads");
        fs::create_dir_all(&uploads)?;
        Ok(Fixture {
            workspace: Workspace::create(BuildId::new(), root)?,
            layout: TemplateLayout::with_artifact("out/app.apk"),
            uploads,
            _temp: temp,
        })
    }

    fn asset(dir: &Path, name: &str) -> StagedAsset {
        StagedAsset {
            path: dir.join(name),
            original_name: name.to_string(),
        }
    }

    #[test]
    fn archive_kind_follows_file_suffix() {
        assert_eq!(ArchiveKind::detect("site.ZIP"), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::detect("site.tar.gz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("site.tgz"), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::detect("site.tar"), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::detect("index.html"), None);
        assert_eq!(ArchiveKind::detect("zip"), None);
    }

    #[test]
    fn sanitize_archive_path_rejects_unsafe_inputs() -> Result<()> {
        assert!(sanitize_archive_path("/abs/path").is_err());
        assert!(sanitize_archive_path("../escape").is_err());
        assert!(sanitize_archive_path("nested/../../escape").is_err());
        assert_eq!(
            sanitize_archive_path("nested/./file.txt")?,
            PathBuf::from("nested/file.txt")
        );
        assert_eq!(sanitize_archive_path("./")?, PathBuf::new());
        Ok(())
    }

    #[test]
    fn icon_overwrites_template_default() -> Result<()> {
        let fx = fixture()?;
        let icon = asset(&fx.uploads, "logo.png");
        fs::write(&icon.path, b"custom-icon")?;

        inject_icon(&fx.workspace, &fx.layout, &icon)?;
        let installed = fs::read(fx.workspace.path().join(&fx.layout.icon_path))?;
        assert_eq!(installed, b"custom-icon");
        assert_ne!(installed, DEFAULT_ICON);
        Ok(())
    }

    #[test]
    fn plain_file_becomes_the_only_entry_point() -> Result<()> {
        let fx = fixture()?;
        let page = asset(&fx.uploads, "landing.htm");
        fs::write(&page.path, b"<h1>hello</h1>")?;

        assert_eq!(inject_web_content(&fx.workspace, &fx.layout, &page)?, 1);
        let web_dir = fx.workspace.path().join(&fx.layout.web_dir);
        assert_eq!(fs::read(web_dir.join("index.html"))?, b"<h1>hello</h1>");
        assert!(!web_dir.join("app.css").exists());
        assert!(!web_dir.join("landing.htm").exists());
        Ok(())
    }

    #[test]
    fn zip_entries_keep_relative_paths() -> Result<()> {
        let fx = fixture()?;
        let bundle = asset(&fx.uploads, "site.zip");
        write_zip(
            &bundle.path,
            &[
                ("index.html", b"<main/>"),
                ("css/site.css", b"main {}"),
                ("js/lib/vendor/deep.js", b"void 0;"),
            ],
        )?;

        assert_eq!(inject_web_content(&fx.workspace, &fx.layout, &bundle)?, 3);
        let web_dir = fx.workspace.path().join(&fx.layout.web_dir);
        assert_eq!(fs::read(web_dir.join("index.html"))?, b"<main/>");
        assert_eq!(fs::read(web_dir.join("css/site.css"))?, b"main {}");
        assert_eq!(fs::read(web_dir.join("js/lib/vendor/deep.js"))?, b"void 0;");
        assert!(!web_dir.join("app.css").exists());
        Ok(())
    }

    #[test]
    fn tarball_entries_keep_relative_paths() -> Result<()> {
        let fx = fixture()?;
        let bundle = asset(&fx.uploads, "site.tgz");
        write_tar_gz(
            &bundle.path,
            &[("index.html", b"<p>tar</p>"), ("assets/img/a.txt", b"a")],
        )?;

        assert_eq!(inject_web_content(&fx.workspace, &fx.layout, &bundle)?, 2);
        let web_dir = fx.workspace.path().join(&fx.layout.web_dir);
        assert_eq!(fs::read(web_dir.join("index.html"))?, b"<p>tar</p>");
        assert_eq!(fs::read(web_dir.join("assets/img/a.txt"))?, b"a");
        Ok(())
    }

    #[test]
    fn traversal_entries_abort_injection() -> Result<()> {
        let fx = fixture()?;
        let bundle = asset(&fx.uploads, "evil.zip");
        write_zip(&bundle.path, &[("../../outside.txt", b"x")])?;

        let err = inject_web_content(&fx.workspace, &fx.layout, &bundle)
            .err()
            .ok_or_else(|| anyhow::anyhow!("expected traversal rejection"))?;
        assert!(matches!(
            err,
            WorkspaceError::InvalidInput {
                field: "archive_entry",
                ..
            }
        ));
        assert!(!fx.workspace.path().join("../outside.txt").exists());
        Ok(())
    }

    #[test]
    fn corrupt_zip_is_reported() -> Result<()> {
        let fx = fixture()?;
        let bundle = asset(&fx.uploads, "broken.zip");
        fs::write(&bundle.path, b"not a zip")?;

        let err = inject_web_content(&fx.workspace, &fx.layout, &bundle).err();
        assert!(matches!(err, Some(WorkspaceError::Zip { .. })));
        Ok(())
    }
}
