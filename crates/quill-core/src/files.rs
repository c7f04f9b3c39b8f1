//! Loading and saving buffer contents.

use crate::error::{CoreError, Result};
use crate::line_ending::LineEnding;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::debug;

/// Text read from disk, LF-normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedText {
    /// Normalized content.
    pub text: String,
    /// Line ending found in the file.
    pub line_ending: LineEnding,
}

/// Read `path`. A missing file loads as empty text.
///
/// Invalid UTF-8 is decoded with replacement characters.
pub fn load_text(path: &Path) -> Result<LoadedText> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "file does not exist yet, opening empty");
            Vec::new()
        }
        Err(err) => return Err(CoreError::io(path, err)),
    };

    let raw = String::from_utf8_lossy(&bytes);
    Ok(LoadedText {
        line_ending: LineEnding::detect_in_text(&raw),
        text: LineEnding::normalize(&raw),
    })
}

/// Write LF text to `path` using `line_ending`.
pub fn save_text(path: &Path, text: &str, line_ending: LineEnding) -> Result<()> {
    fs::write(path, line_ending.apply_to_text(text)).map_err(|err| CoreError::io(path, err))?;
    debug!(path = %path.display(), "saved");
    Ok(())
}
