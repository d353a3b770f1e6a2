//! Project configuration from `hotpage.toml`.
//!
//! ```text
//! config/
//! ├── section/   # [pages] [on_demand] [compiler] [serve]
//! ├── types/     # ConfigError, diagnostics, field paths
//! ├── util       # config discovery, path normalization
//! └── mod.rs     # HotpageConfig (this file)
//! ```
//!
//! A missing config file is not an error: every section has defaults.

pub mod section;
pub mod types;
pub(crate) mod util;

pub use section::{CompilerConfig, OnDemandConfig, PagesConfig, ServeConfig};
pub use types::{ConfigDiagnostic, ConfigDiagnostics, ConfigError, FieldPath};

use util::{find_config_file, normalize_path};

use crate::cli::{Cli, Commands};
use crate::{debug, log};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
};

/// Root configuration structure representing `hotpage.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HotpageConfig {
    /// Absolute path to the config file (may not exist)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root, the config file's directory
    #[serde(skip)]
    pub root: PathBuf,

    #[serde(default)]
    pub pages: PagesConfig,

    #[serde(default)]
    pub on_demand: OnDemandConfig,

    #[serde(default)]
    pub compiler: CompilerConfig,

    #[serde(default)]
    pub serve: ServeConfig,
}

impl HotpageConfig {
    /// Load, normalize and validate configuration for a CLI invocation.
    pub fn load(cli: &Cli) -> Result<Self> {
        let cwd = std::env::current_dir().context("Failed to get current working directory")?;

        let mut config = match find_config_file(&cli.config, &cwd) {
            Some(path) => {
                let mut config = Self::from_path(&path)?;
                config.config_path = path;
                config
            }
            None => {
                debug!("config"; "no {} found, using defaults", cli.config.display());
                Self {
                    config_path: cwd.join(&cli.config),
                    ..Self::default()
                }
            }
        };

        config.finalize(cli);
        config.validate(cli.is_serve())?;
        Ok(config)
    }

    /// Load configuration from a file, warning about unknown fields.
    fn from_path(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;

        let (config, ignored) = Self::parse_with_ignored(&content)?;
        if !ignored.is_empty() {
            Self::print_unknown_fields_warning(&ignored, path);
        }
        Ok(config)
    }

    /// Parse TOML content, collecting any unknown fields.
    fn parse_with_ignored(content: &str) -> Result<(Self, Vec<String>), ConfigError> {
        let mut ignored = Vec::new();
        let deserializer = toml::Deserializer::new(content);
        let config = serde_ignored::deserialize(deserializer, |path: serde_ignored::Path| {
            ignored.push(path.to_string());
        })?;
        Ok((config, ignored))
    }

    fn print_unknown_fields_warning(fields: &[String], path: &Path) {
        let display_path = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_else(|| path.to_string_lossy());
        log!("warning"; "unknown fields in {}, ignoring:", display_path);
        for field in fields {
            eprintln!("- {field}");
        }
    }

    // ========================================================================
    // cli overrides and paths
    // ========================================================================

    fn finalize(&mut self, cli: &Cli) {
        crate::logger::set_verbose(cli.verbose);

        Self::update_option(&mut self.pages.dir, cli.pages.as_ref());
        Self::update_option(&mut self.compiler.output, cli.output.as_ref());

        if let Commands::Serve {
            interface,
            port,
            watch,
        } = &cli.command
        {
            self.apply_serve_options(*interface, *port, *watch);
        }

        let root = self
            .config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        self.normalize_paths(&root);
    }

    fn apply_serve_options(
        &mut self,
        interface: Option<IpAddr>,
        port: Option<u16>,
        watch: Option<bool>,
    ) {
        Self::update_option(&mut self.serve.interface, interface.as_ref());
        Self::update_option(&mut self.serve.port, port.as_ref());
        Self::update_option(&mut self.serve.watch, watch.as_ref());
    }

    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Make every configured path absolute against the project root.
    fn normalize_paths(&mut self, root: &Path) {
        let root = normalize_path(root);
        self.config_path = normalize_path(&self.config_path);
        self.pages.dir = normalize_path(&root.join(&self.pages.dir));
        self.compiler.output = normalize_path(&root.join(&self.compiler.output));
        self.compiler.deps = self
            .compiler
            .deps
            .iter()
            .map(|p| normalize_path(&root.join(p)))
            .collect();
        self.root = root;
    }

    // ========================================================================
    // validation
    // ========================================================================

    /// Collect every problem before failing.
    pub fn validate(&self, require_pages_dir: bool) -> Result<(), ConfigError> {
        let mut diag = ConfigDiagnostics::new();

        self.pages.validate(require_pages_dir, &mut diag);
        self.on_demand.validate(&mut diag);
        self.compiler.validate(&mut diag);

        diag.into_result().map_err(ConfigError::Diagnostics)
    }

    /// Path relative to the project root, for display.
    pub fn root_relative(&self, path: impl AsRef<Path>) -> PathBuf {
        path.as_ref()
            .strip_prefix(&self.root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.as_ref().to_path_buf())
    }
}

// ============================================================================
// Test Helpers (available to all modules via `use crate::config::test_*`)
// ============================================================================

/// Parse config from a TOML snippet. Panics on unknown fields to catch typos.
#[cfg(test)]
pub fn test_parse_config(content: &str) -> HotpageConfig {
    let (parsed, ignored) = HotpageConfig::parse_with_ignored(content).unwrap();
    assert!(
        ignored.is_empty(),
        "test config has unknown fields: {:?}",
        ignored
    );
    parsed
}
