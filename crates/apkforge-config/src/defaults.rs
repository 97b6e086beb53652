//! Default values and the fixed template layout.
//!
//! # Design
//! - Paths inside the template are relative to the workspace root.
//! - Every placeholder-bearing file is listed in `SUBSTITUTED_FILES`.

/// Default listener address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0";
/// Default listener port.
pub const DEFAULT_HTTP_PORT: u16 = 3000;
/// Default template project directory, relative to the process working directory.
pub const DEFAULT_TEMPLATE_DIR: &str = "template";
/// Directory under the system temp dir that holds workspaces and uploads.
pub const DEFAULT_TEMP_NAMESPACE: &str = "apkforge";
/// Default external build command.
pub const DEFAULT_BUILD_COMMAND: &str = "./gradlew assembleDebug";
/// Default artifact location produced by the build command.
pub const DEFAULT_ARTIFACT_PATH: &str = "app/build/outputs/apk/debug/app-debug.apk";
/// Filename presented to download clients.
pub const DEFAULT_DOWNLOAD_FILENAME: &str = "app-debug.apk";
/// Request body limit for `POST /generate-app` (100 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;
/// Period between expiry sweeps when the sweep is enabled.
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
/// Default log level when `RUST_LOG` is not provided.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Template files that carry placeholder tokens.
pub const SUBSTITUTED_FILES: &[&str] = &[
    "app/src/main/AndroidManifest.xml",
    "app/build.gradle",
    "app/src/main/res/values/strings.xml",
    "app/src/main/java/com/apkforge/shell/MainActivity.java",
];
/// Launcher icon overwritten by an uploaded icon.
pub const ICON_PATH: &str = "app/src/main/res/mipmap/ic_launcher.png";
/// Directory receiving uploaded web content.
pub const WEB_DIR: &str = "app/src/main/assets/www";
/// Entry-point filename for single-file web content.
pub const WEB_ENTRY_POINT: &str = "index.html";
