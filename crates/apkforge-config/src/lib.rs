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

//! Environment-backed configuration for the apkforge build service.
//!
//! Layout: `model.rs` (typed settings), `loader.rs` (`APKFORGE_*` parsing),
//! `defaults.rs` (template layout and fallback values), `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    BuildCommand, ListenerConfig, LoggingSettings, ServiceConfig, SubstitutionMode, SweepPolicy,
    TemplateLayout, WorkspaceSettings,
};
