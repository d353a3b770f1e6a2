//! Page source lookup: single-page probing and full directory scans.

mod find;
mod scan;

pub use find::find_page_file;
pub use scan::scan_pages;

use std::path::{Path, PathBuf};

use crate::core::{PagePath, normalize_page_path};

/// Resolve a requested page to its canonical path and source file.
///
/// The source path is relative to `pages_dir`. `None` when the request is
/// not a valid page path or no file backs it.
pub fn locate_page(pages_dir: &Path, raw: &str, extensions: &[String]) -> Option<(PagePath, PathBuf)> {
    let lookup = normalize_page_path(raw)?;
    let relative = find_page_file(pages_dir, &lookup, extensions)?;
    let page = PagePath::from_source_file(&relative, extensions)?;
    Some((page, relative))
}
