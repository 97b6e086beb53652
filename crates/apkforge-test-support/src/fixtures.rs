//! Template-project, archive and build-script fixtures.

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use apkforge_config::defaults::{ICON_PATH, SUBSTITUTED_FILES, WEB_DIR, WEB_ENTRY_POINT};
use flate2::Compression;
use flate2::write::GzEncoder;

/// Contents of each placeholder-bearing template file, keyed by relative path.
pub const TEMPLATE_FILES: &[(&str, &str)] = &[
    (
        SUBSTITUTED_FILES[0],
        "<manifest xmlns:android=\"http://schemas.android.com/apk/res/android\"\n    package=\"{{PACKAGE_NAME}}\">\n    <application android:label=\"@string/app_name\" android:icon=\"@mipmap/ic_launcher\" />\n</manifest>\n",
    ),
    (
        SUBSTITUTED_FILES[1],
        "android {\n    defaultConfig {\n        applicationId \"{{PACKAGE_NAME}}\"\n        versionName \"{{VERSION}}\"\n    }\n}\n",
    ),
    (
        SUBSTITUTED_FILES[2],
        "<resources>\n    <string name=\"app_name\">{{APP_NAME}}</string>\n</resources>\n",
    ),
    (
        SUBSTITUTED_FILES[3],
        "package com.apkforge.shell;\n\npublic class MainActivity {\n    static final String START_URL = \"{{URL}}\";\n}\n",
    ),
];

/// Bytes of the launcher icon shipped with the fixture template.
pub const DEFAULT_ICON: &[u8] = b"\x89PNG default-icon";

/// Default web entry point shipped with the fixture template.
pub const DEFAULT_INDEX_HTML: &str = "<html><body>template</body></html>\n";

/// Materialise a template project under `root`.
///
/// # Errors
///
/// Returns an error if any fixture file cannot be written.
pub fn write_template(root: &Path) -> Result<()> {
    for (relative, contents) in TEMPLATE_FILES {
        write_file(&root.join(relative), contents.as_bytes())?;
    }
    write_file(&root.join(ICON_PATH), DEFAULT_ICON)?;
    write_file(
        &root.join(WEB_DIR).join(WEB_ENTRY_POINT),
        DEFAULT_INDEX_HTML.as_bytes(),
    )?;
    write_file(&root.join(WEB_DIR).join("app.css"), b"body {}\n")?;
    write_file(&root.join("settings.gradle"), b"include ':app'\n")?;
    Ok(())
}

/// Write a zip archive containing the given `(path, bytes)` entries.
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub fn write_zip(archive: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let file = File::create(archive).with_context(|| format!("create {}", archive.display()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (path, contents) in entries {
        writer.start_file(*path, options)?;
        writer.write_all(contents)?;
    }
    writer.finish()?;
    Ok(())
}

/// Write a gzip-compressed tarball containing the given `(path, bytes)` entries.
///
/// # Errors
///
/// Returns an error if the archive cannot be written.
pub fn write_tar_gz(archive: &Path, entries: &[(&str, &[u8])]) -> Result<()> {
    let file = File::create(archive).with_context(|| format!("create {}", archive.display()))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(u64::try_from(contents.len())?);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents)?;
    }
    builder.into_inner()?.finish()?;
    Ok(())
}

/// Write an executable `/bin/sh` script with the given body.
///
/// # Errors
///
/// Returns an error if the script cannot be written or made executable.
#[cfg(unix)]
pub fn write_build_script(path: &Path, body: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    write_file(path, format!("#!/bin/sh\nset -e\n{body}\n").as_bytes())?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("chmod {}", path.display()))?;
    Ok(())
}

fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_fixture_places_every_placeholder_once() -> Result<()> {
        let root = std::env::temp_dir().join(format!("apkforge-fixture-{}", std::process::id()));
        write_template(&root)?;
        let mut combined = String::new();
        for relative in SUBSTITUTED_FILES {
            combined.push_str(&fs::read_to_string(root.join(relative))?);
        }
        for token in ["{{APP_NAME}}", "{{VERSION}}", "{{URL}}"] {
            assert_eq!(combined.matches(token).count(), 1, "{token}");
        }
        assert_eq!(combined.matches("{{PACKAGE_NAME}}").count(), 2);
        assert_eq!(fs::read(root.join(ICON_PATH))?, DEFAULT_ICON);
        fs::remove_dir_all(&root)?;
        Ok(())
    }
}
