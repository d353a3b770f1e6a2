//! Scan the pages directory for every routable page.

use std::path::Path;

use jwalk::WalkDir;

use crate::core::PagePath;

const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Collect every page under `pages_dir`, sorted and de-duplicated.
///
/// Dot-files and files with other extensions are skipped.
pub fn scan_pages(pages_dir: &Path, extensions: &[String]) -> Vec<PagePath> {
    let mut pages: Vec<PagePath> = WalkDir::new(pages_dir)
        .skip_hidden(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            let name = e.file_name().to_str().unwrap_or_default();
            !IGNORED_FILES.contains(&name)
        })
        .filter_map(|e| {
            let path = e.path();
            let relative = path.strip_prefix(pages_dir).ok()?;
            PagePath::from_source_file(relative, extensions)
        })
        .collect();

    pages.sort();
    pages.dedup();
    pages
}
