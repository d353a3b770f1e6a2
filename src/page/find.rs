//! Locate the source file backing a page.

use std::path::{Path, PathBuf};

use crate::log;

/// Find the source file for a page in lookup form (`/index`, `/blog/post`).
///
/// For every extension in priority order, checks `<page>.<ext>` and
/// `<page>/index.<ext>`. Returns the path relative to `pages_dir`, or `None`
/// when nothing matches. Several matches log a duplicate warning and the
/// first one wins.
pub fn find_page_file(pages_dir: &Path, lookup: &str, extensions: &[String]) -> Option<PathBuf> {
    let base = lookup.trim_start_matches('/');
    let mut found = Vec::new();

    for ext in extensions {
        let direct = PathBuf::from(format!("{base}.{ext}"));
        if pages_dir.join(&direct).is_file() {
            found.push(direct);
        }

        let index = Path::new(base).join(format!("index.{ext}"));
        if pages_dir.join(&index).is_file() {
            found.push(index);
        }
    }

    if found.len() > 1 {
        log!(
            "warning";
            "duplicate page detected: pages/{} and pages/{} both resolve to {}",
            found[0].display(),
            found[1].display(),
            lookup
        );
    }

    found.into_iter().next()
}
