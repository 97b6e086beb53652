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

//! apkforge application bootstrap wiring.
//!
//! Layout: `bootstrap.rs` (service wiring and shutdown), `sweeper.rs`
//! (periodic expiry sweep), `error.rs`.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application-level errors.
pub mod error;
/// Background expiry sweep.
pub mod sweeper;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
