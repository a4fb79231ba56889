#![forbid(unsafe_code)]

//! `dgrid` command-line front end.
//!
//! Reads layout snapshots from disk and runs the layout engine's
//! whole-layout tools over them: validation, overlap repair, placement and
//! free-space queries. Diagnostics go to stderr, filtered by `DGRID_LOG`.

pub mod cli;
pub mod error;

pub use cli::{Cli, Commands, execute, run, run_from_env};
pub use error::{CliError, Result};

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directive.
pub const LOG_ENV: &str = "DGRID_LOG";

/// Install a stderr `fmt` subscriber filtered by [`LOG_ENV`] (default `warn`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
