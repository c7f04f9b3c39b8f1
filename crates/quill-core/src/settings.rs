//! User settings and the configuration directory.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// File name of the settings file inside the config directory.
pub const SETTINGS_FILE: &str = "settings.json";

/// Persisted editor settings (`settings.json`).
///
/// Missing keys take their defaults and unknown keys are ignored, so one settings file can be
/// shared between editor versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Color theme name.
    pub theme: String,
    /// Indent width used when a filetype does not say otherwise.
    pub indent_size: usize,
    /// Draw a line number gutter.
    pub show_line_numbers: bool,
    /// Interval between language server polls.
    pub lsp_poll_interval_ms: u64,
    /// Polls a closed language server gets to exit before it is killed.
    pub lsp_shutdown_grace_ticks: u32,
    /// Rescan multiline strings when a single-line edit touches a triple quote.
    pub highlight_multiline_on_quote: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: "default".to_string(),
            indent_size: 4,
            show_line_numbers: true,
            lsp_poll_interval_ms: 50,
            lsp_shutdown_grace_ticks: 10,
            highlight_multiline_on_quote: true,
        }
    }
}

impl Settings {
    /// Read settings from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "no settings file, using defaults");
                return Ok(Self::default());
            }
            Err(err) => return Err(CoreError::io(path, err)),
        };

        serde_json::from_str(&text).map_err(|source| CoreError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write settings to `path` as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self).map_err(|source| CoreError::Settings {
            path: path.to_path_buf(),
            source,
        })?;
        json.push('\n');
        fs::write(path, json).map_err(|err| CoreError::io(path, err))
    }
}

/// Locate the configuration directory without creating it.
///
/// `$QUILL_CONFIG_DIR` wins, then `$XDG_CONFIG_HOME/quill`, then `$HOME/.config/quill`
/// (`%APPDATA%\quill` on Windows).
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("QUILL_CONFIG_DIR").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }

    if cfg!(windows) {
        return env::var_os("APPDATA")
            .map(|appdata| PathBuf::from(appdata).join("quill"))
            .ok_or(CoreError::NoConfigDir);
    }

    if let Some(xdg) = env::var_os("XDG_CONFIG_HOME").filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(xdg).join("quill"));
    }

    env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".config").join("quill"))
        .ok_or(CoreError::NoConfigDir)
}

/// Locate the configuration directory and create it if needed.
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir()?;
    fs::create_dir_all(&dir).map_err(|err| CoreError::io(&dir, err))?;
    Ok(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_and_missing_keys() {
        let settings: Settings =
            serde_json::from_str(r#"{"indent_size": 2, "font": "Courier 12"}"#).unwrap();
        assert_eq!(settings.indent_size, 2);
        assert_eq!(settings.lsp_poll_interval_ms, 50);
        assert_eq!(settings.theme, "default");
    }
}
