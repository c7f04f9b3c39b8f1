//! Log file setup.
//!
//! The terminal belongs to the UI, so logs go to `quill.log` in the config directory.

use anyhow::{Context, anyhow};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE: &str = "quill.log";

/// Environment variable with `tracing` filter directives, e.g. `QUILL_LOG=quill_lsp=debug`.
pub const LOG_ENV: &str = "QUILL_LOG";

/// Install the global subscriber. Returns the log file path.
pub fn init(config_dir: &Path) -> anyhow::Result<PathBuf> {
    let path = config_dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_thread_names(true)
        .try_init()
        .map_err(|err| anyhow!("installing the log subscriber failed: {err}"))?;
    Ok(path)
}
