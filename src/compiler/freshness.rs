//! Mtime-based freshness of page artifacts.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use jwalk::WalkDir;

/// Get the modification time of a file
///
/// Returns `None` if the file doesn't exist or mtime cannot be read
pub fn get_mtime(path: &Path) -> Option<SystemTime> {
    path.metadata().and_then(|m| m.modified()).ok()
}

/// Output exists and is at least as new as its source.
pub fn is_fresh(output: &Path, source: &Path) -> bool {
    let (Some(output_time), Some(source_time)) = (get_mtime(output), get_mtime(source)) else {
        return false;
    };
    output_time >= source_time
}

/// Newest mtime of any file under `dirs`.
pub fn newest_mtime(dirs: &[PathBuf]) -> Option<SystemTime> {
    dirs.iter()
        .flat_map(|dir| WalkDir::new(dir).skip_hidden(true))
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| get_mtime(&e.path()))
        .max()
}

/// Like [`is_fresh`], but shared dependencies must be older too.
pub fn is_fresh_with_deps(output: &Path, source: &Path, deps: &[PathBuf]) -> bool {
    if !is_fresh(output, source) {
        return false;
    }
    match (newest_mtime(deps), get_mtime(output)) {
        (Some(dep_time), Some(output_time)) => output_time >= dep_time,
        _ => true,
    }
}
