//! Error type shared by the `quill-core` modules.

use crate::position::Position;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias for `quill-core` operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Debug, Error)]
/// Errors produced by the buffer model and the configuration loaders.
pub enum CoreError {
    #[error("I/O error on {path}: {source}")]
    /// Reading or writing a file failed.
    Io {
        /// The file involved.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    #[error("invalid settings JSON in {path}: {source}")]
    /// `settings.json` could not be parsed or written.
    Settings {
        /// The settings file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid filetypes file: {0}")]
    /// `filetypes.toml` is not valid TOML or does not have the expected shape.
    Filetypes(#[from] toml::de::Error),

    #[error("filetype '{filetype}' has an invalid value for '{option}': {message}")]
    /// A filetype option failed validation.
    FiletypeOption {
        /// Section name.
        filetype: String,
        /// Key name.
        option: &'static str,
        /// Human readable reason.
        message: String,
    },

    #[error("position {0} is outside the buffer")]
    /// A position does not exist in the buffer.
    InvalidPosition(Position),

    #[error("no configuration directory could be determined")]
    /// Neither `QUILL_CONFIG_DIR` nor a home directory is available.
    NoConfigDir,
}

impl CoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
