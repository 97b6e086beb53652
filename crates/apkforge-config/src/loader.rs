//! `APKFORGE_*` environment parsing.
//!
//! # Design
//! - `from_lookup` takes the variable source as a closure; `from_env` wires it to the process.
//! - Every parse failure names the variable and the offending value.

use std::net::IpAddr;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use crate::defaults::{
    DEFAULT_ARTIFACT_PATH, DEFAULT_BIND_ADDR, DEFAULT_BUILD_COMMAND, DEFAULT_DOWNLOAD_FILENAME,
    DEFAULT_HTTP_PORT, DEFAULT_LOG_LEVEL, DEFAULT_MAX_UPLOAD_BYTES, DEFAULT_SWEEP_INTERVAL_SECS,
    DEFAULT_TEMP_NAMESPACE, DEFAULT_TEMPLATE_DIR,
};
use crate::error::{ConfigError, ConfigResult};
use crate::model::{
    BuildCommand, ListenerConfig, LoggingSettings, ServiceConfig, SubstitutionMode, SweepPolicy,
    TemplateLayout, WorkspaceSettings,
};

const ENV_BIND_ADDR: &str = "APKFORGE_BIND_ADDR";
const ENV_HTTP_PORT: &str = "APKFORGE_HTTP_PORT";
const ENV_TEMPLATE_DIR: &str = "APKFORGE_TEMPLATE_DIR";
const ENV_WORKSPACE_ROOT: &str = "APKFORGE_WORKSPACE_ROOT";
const ENV_UPLOAD_ROOT: &str = "APKFORGE_UPLOAD_ROOT";
const ENV_BUILD_COMMAND: &str = "APKFORGE_BUILD_COMMAND";
const ENV_ARTIFACT_PATH: &str = "APKFORGE_ARTIFACT_PATH";
const ENV_DOWNLOAD_FILENAME: &str = "APKFORGE_DOWNLOAD_FILENAME";
const ENV_SUBSTITUTION: &str = "APKFORGE_SUBSTITUTION";
const ENV_MAX_UPLOAD_BYTES: &str = "APKFORGE_MAX_UPLOAD_BYTES";
const ENV_WORKSPACE_TTL_SECS: &str = "APKFORGE_WORKSPACE_TTL_SECS";
const ENV_SWEEP_INTERVAL_SECS: &str = "APKFORGE_SWEEP_INTERVAL_SECS";
const ENV_LOG_LEVEL: &str = "APKFORGE_LOG_LEVEL";
const ENV_LOG_FORMAT: &str = "APKFORGE_LOG_FORMAT";

impl ServiceConfig {
    /// Load configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a variable is present but malformed.
    pub fn from_env() -> ConfigResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source.
    ///
    /// Blank values are treated as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] when a variable is present but malformed.
    pub fn from_lookup<F>(lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let listener = ListenerConfig {
            bind_addr: parse_bind_addr(
                get(ENV_BIND_ADDR)
                    .as_deref()
                    .unwrap_or(DEFAULT_BIND_ADDR),
            )?,
            http_port: get(ENV_HTTP_PORT)
                .as_deref()
                .map_or(Ok(DEFAULT_HTTP_PORT), parse_port)?,
        };

        let temp_root = std::env::temp_dir().join(DEFAULT_TEMP_NAMESPACE);
        let build_command_raw =
            get(ENV_BUILD_COMMAND).unwrap_or_else(|| DEFAULT_BUILD_COMMAND.to_string());
        let build_command = BuildCommand::parse(&build_command_raw)
            .ok_or_else(|| ConfigError::invalid(ENV_BUILD_COMMAND, "empty", &build_command_raw))?;
        let artifact_path = parse_relative_path(
            ENV_ARTIFACT_PATH,
            get(ENV_ARTIFACT_PATH)
                .as_deref()
                .unwrap_or(DEFAULT_ARTIFACT_PATH),
        )?;
        let download_filename = parse_download_filename(
            get(ENV_DOWNLOAD_FILENAME)
                .as_deref()
                .unwrap_or(DEFAULT_DOWNLOAD_FILENAME),
        )?;

        let workspace = WorkspaceSettings {
            template_dir: get(ENV_TEMPLATE_DIR)
                .map_or_else(|| PathBuf::from(DEFAULT_TEMPLATE_DIR), PathBuf::from),
            workspace_root: get(ENV_WORKSPACE_ROOT)
                .map_or_else(|| temp_root.join("builds"), PathBuf::from),
            upload_root: get(ENV_UPLOAD_ROOT)
                .map_or_else(|| temp_root.join("uploads"), PathBuf::from),
            build_command,
            layout: TemplateLayout::with_artifact(artifact_path),
            substitution: get(ENV_SUBSTITUTION)
                .as_deref()
                .map_or(Ok(SubstitutionMode::default()), parse_substitution)?,
            download_filename,
        };

        let max_upload_bytes = match get(ENV_MAX_UPLOAD_BYTES) {
            Some(raw) => {
                let bytes = parse_positive(ENV_MAX_UPLOAD_BYTES, &raw)?;
                usize::try_from(bytes)
                    .map_err(|_| ConfigError::invalid(ENV_MAX_UPLOAD_BYTES, "out_of_range", &raw))?
            }
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let sweep = match get(ENV_WORKSPACE_TTL_SECS) {
            Some(raw) => {
                let ttl = parse_positive(ENV_WORKSPACE_TTL_SECS, &raw)?;
                let interval = get(ENV_SWEEP_INTERVAL_SECS)
                    .as_deref()
                    .map_or(Ok(DEFAULT_SWEEP_INTERVAL_SECS), |value| {
                        parse_positive(ENV_SWEEP_INTERVAL_SECS, value)
                    })?;
                Some(SweepPolicy {
                    ttl: Duration::from_secs(ttl),
                    interval: Duration::from_secs(interval),
                })
            }
            None => None,
        };

        let logging = LoggingSettings {
            level: get(ENV_LOG_LEVEL).unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string()),
            format: get(ENV_LOG_FORMAT)
                .map(|value| parse_log_format(&value))
                .transpose()?,
        };

        Ok(Self {
            listener,
            workspace,
            max_upload_bytes,
            sweep,
            logging,
        })
    }

    /// Confirm the template project exists before serving requests.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::TemplateUnavailable`] when the directory is missing.
    pub fn ensure_template_dir(&self) -> ConfigResult<()> {
        if self.workspace.template_dir.is_dir() {
            Ok(())
        } else {
            Err(ConfigError::TemplateUnavailable {
                path: self.workspace.template_dir.clone(),
            })
        }
    }
}

fn parse_bind_addr(raw: &str) -> ConfigResult<IpAddr> {
    raw.parse()
        .map_err(|_| ConfigError::invalid(ENV_BIND_ADDR, "not_an_ip_address", raw))
}

fn parse_port(raw: &str) -> ConfigResult<u16> {
    let port: u16 = raw
        .parse()
        .map_err(|_| ConfigError::invalid(ENV_HTTP_PORT, "out_of_range", raw))?;
    if port == 0 {
        return Err(ConfigError::invalid(ENV_HTTP_PORT, "zero", raw));
    }
    Ok(port)
}

fn parse_positive(field: &'static str, raw: &str) -> ConfigResult<u64> {
    let value: u64 = raw
        .parse()
        .map_err(|_| ConfigError::invalid(field, "not_an_integer", raw))?;
    if value == 0 {
        return Err(ConfigError::invalid(field, "zero", raw));
    }
    Ok(value)
}

fn parse_substitution(raw: &str) -> ConfigResult<SubstitutionMode> {
    match raw.to_ascii_lowercase().as_str() {
        "first" | "first_occurrence" => Ok(SubstitutionMode::FirstOccurrence),
        "global" | "all" => Ok(SubstitutionMode::Global),
        _ => Err(ConfigError::invalid(
            ENV_SUBSTITUTION,
            "unknown_mode",
            raw,
        )),
    }
}

fn parse_log_format(raw: &str) -> ConfigResult<String> {
    let normalised = raw.to_ascii_lowercase();
    match normalised.as_str() {
        "json" | "pretty" => Ok(normalised),
        _ => Err(ConfigError::invalid(ENV_LOG_FORMAT, "unknown_format", raw)),
    }
}

fn parse_relative_path(field: &'static str, raw: &str) -> ConfigResult<PathBuf> {
    let path = Path::new(raw);
    if path.is_absolute() {
        return Err(ConfigError::invalid(field, "absolute_path", raw));
    }
    let mut normalised = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(segment) => normalised.push(segment),
            Component::CurDir => {}
            _ => return Err(ConfigError::invalid(field, "invalid_segment", raw)),
        }
    }
    if normalised.as_os_str().is_empty() {
        return Err(ConfigError::invalid(field, "empty", raw));
    }
    Ok(normalised)
}

fn parse_download_filename(raw: &str) -> ConfigResult<String> {
    if raw.contains(['/', '\\', '"']) {
        return Err(ConfigError::invalid(
            ENV_DOWNLOAD_FILENAME,
            "invalid_character",
            raw,
        ));
    }
    Ok(raw.to_string())
}
