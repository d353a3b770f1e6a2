//! `[pages]` section configuration.
//!
//! ```toml
//! [pages]
//! dir = "pages"                 # Page source root
//! extensions = ["html", "md"]   # Lookup priority order
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PagesConfig {
    /// Page source root, relative to the project root until loaded.
    pub dir: PathBuf,

    /// Page file extensions without the dot. Earlier entries win when a page
    /// resolves to several files.
    pub extensions: Vec<String>,
}

impl Default for PagesConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("pages"),
            extensions: vec!["html".into(), "md".into()],
        }
    }
}

impl PagesConfig {
    const EXTENSIONS: FieldPath = FieldPath::new("pages.extensions");
    const DIR: FieldPath = FieldPath::new("pages.dir");

    /// `require_dir` is set for commands that read pages from disk.
    pub fn validate(&self, require_dir: bool, diag: &mut ConfigDiagnostics) {
        if self.extensions.is_empty() {
            diag.error(Self::EXTENSIONS, "at least one page extension is required");
        }

        for ext in &self.extensions {
            if ext.is_empty() || ext.starts_with('.') || ext.contains(['/', '\\']) {
                diag.error_with_hint(
                    Self::EXTENSIONS,
                    format!("invalid extension `{ext}`"),
                    "write extensions without a leading dot, e.g. \"md\"",
                );
            }
        }

        if require_dir && !self.dir.is_dir() {
            diag.error_with_hint(
                Self::DIR,
                format!("pages directory `{}` not found", self.dir.display()),
                "create it or point `pages.dir` at an existing directory",
            );
        }
    }
}
