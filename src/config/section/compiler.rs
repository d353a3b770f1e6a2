//! `[compiler]` section configuration.
//!
//! ```toml
//! [compiler]
//! output = ".hotpage"                      # Artifact directory
//! output_extension = "html"                # Artifact extension
//! command = ["pandoc", "{source}", "-o", "{output}"]
//! deps = ["templates"]                     # Extra watched directories
//! ```
//!
//! An empty `command` copies page sources verbatim.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigDiagnostics, FieldPath};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub output: PathBuf,
    pub output_extension: String,
    /// Program and arguments; `{source}`, `{output}` and `{page}` are expanded.
    pub command: Vec<String>,
    pub deps: Vec<PathBuf>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(".hotpage"),
            output_extension: "html".into(),
            command: Vec::new(),
            deps: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.output_extension.is_empty() || self.output_extension.starts_with('.') {
            diag.error(
                FieldPath::new("compiler.output_extension"),
                format!("invalid extension `{}`", self.output_extension),
            );
        }

        if let Some(program) = self.command.first()
            && which::which(program).is_err()
        {
            diag.error_with_hint(
                FieldPath::new("compiler.command"),
                format!("compiler `{program}` not found"),
                "install it, or leave `compiler.command` empty to copy pages as-is",
            );
        }
    }

    /// Watched dependency directories that exist on disk.
    pub fn existing_deps(&self) -> Vec<PathBuf> {
        self.deps.iter().filter(|p| p.exists()).cloned().collect()
    }
}
