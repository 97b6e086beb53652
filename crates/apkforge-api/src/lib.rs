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

//! HTTP API for the apkforge build service.
//!
//! Layout: `http/router.rs` (router and server host), `http/generate.rs` and
//! `http/download.rs` (build endpoints), `http/health.rs`, `http/errors.rs`
//! (JSON error bodies), `http/telemetry.rs` (request metrics layer),
//! `state.rs`, `models.rs`, `error.rs`.

pub mod error;
pub mod http;
pub mod models;
pub mod state;

pub use error::{ApiServerError, ApiServerResult};
pub use http::router::ApiServer;
pub use state::ApiState;
