//! Project root discovery.

use std::path::{Path, PathBuf};

const README_STEMS: [&str; 4] = ["README", "readme", "Readme", "ReadMe"];
const README_EXTENSIONS: [&str; 4] = ["", ".txt", ".md", ".rst"];

fn has_likely_root_marker(dir: &Path) -> bool {
    if dir.join(".editorconfig").exists() {
        return true;
    }
    README_STEMS.iter().any(|stem| {
        README_EXTENSIONS
            .iter()
            .any(|ext| dir.join(format!("{stem}{ext}")).exists())
    })
}

/// Pick the project directory for the file at `file_path`.
///
/// Walking up from the file's directory:
/// 1. the first directory containing `.git` wins, however far up it is;
/// 2. otherwise the nearest directory with `.editorconfig` or a readme file
///    (`README`, `readme.md`, `ReadMe.txt`, ...);
/// 3. otherwise the file's own directory.
///
/// A relative `file_path` is taken relative to the current directory, which is searched too.
pub fn find_project_root(file_path: &Path) -> PathBuf {
    let file_path = std::path::absolute(file_path).unwrap_or_else(|_| file_path.to_path_buf());
    let mut likely_root: Option<&Path> = None;

    for dir in file_path.ancestors().skip(1) {
        if dir.join(".git").exists() {
            return dir.to_path_buf();
        }
        if likely_root.is_none() && has_likely_root_marker(dir) {
            likely_root = Some(dir);
        }
    }

    likely_root
        .or_else(|| file_path.parent())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
