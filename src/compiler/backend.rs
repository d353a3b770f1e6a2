//! Compiler backends: how one entry point becomes an artifact.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;

use parking_lot::Mutex;
use rustc_hash::FxHashSet;

use super::actor::BackendFactory;
use super::error::{CompileError, ErrorKind};
use super::freshness::{is_fresh, is_fresh_with_deps};
use super::EntryPoint;

/// Compiles a single entry point into `output`.
///
/// Errors are data: a page with soft errors is still considered produced.
pub trait Backend: Send + Sync {
    fn compile(&self, entry: &EntryPoint, output: &Path) -> Result<(), Vec<CompileError>>;
}

/// Build the factory the actor uses at startup and on every full reload.
///
/// An empty `command` selects [`PassthroughBackend`]. `deps` are the shared
/// directories whose changes make every command output stale.
pub fn backend_factory(command: Vec<String>, root: PathBuf, deps: Vec<PathBuf>) -> BackendFactory {
    Box::new(move || -> anyhow::Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = if command.is_empty() {
            Arc::new(PassthroughBackend)
        } else {
            Arc::new(CommandBackend::new(command.clone(), root.clone())?.with_deps(deps.clone()))
        };
        Ok(backend)
    })
}

fn missing_source(entry: &EntryPoint) -> Vec<CompileError> {
    vec![
        CompileError::new(
            ErrorKind::ModuleNotFound,
            entry.source.display().to_string(),
            "module not found: page source no longer exists",
        )
        .in_entry(entry.page.clone()),
    ]
}

fn io_error(entry: &EntryPoint, context: &str, err: &std::io::Error) -> Vec<CompileError> {
    vec![
        CompileError::new(
            ErrorKind::Other,
            entry.source.display().to_string(),
            format!("{context}: {err}"),
        )
        .in_entry(entry.page.clone()),
    ]
}

fn ensure_parent(entry: &EntryPoint, output: &Path) -> Result<(), Vec<CompileError>> {
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| io_error(entry, "failed to create output directory", &e))?;
    }
    Ok(())
}

/// Artifacts are written next to their final name, then renamed over it, so
/// a reader sees either the old file or the new one.
fn staging_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".partial-{name}"))
}

fn publish(entry: &EntryPoint, staging: &Path, output: &Path) -> Result<(), Vec<CompileError>> {
    fs::rename(staging, output).map_err(|e| {
        let _ = fs::remove_file(staging);
        io_error(entry, "failed to publish artifact", &e)
    })
}

// ============================================================================
// Passthrough
// ============================================================================

/// Copies the page source verbatim. Skips artifacts newer than their source.
#[derive(Debug, Default)]
pub struct PassthroughBackend;

impl Backend for PassthroughBackend {
    fn compile(&self, entry: &EntryPoint, output: &Path) -> Result<(), Vec<CompileError>> {
        if !entry.source.is_file() {
            return Err(missing_source(entry));
        }
        if is_fresh(output, &entry.source) {
            return Ok(());
        }

        ensure_parent(entry, output)?;
        let staging = staging_path(output);
        fs::copy(&entry.source, &staging)
            .map_err(|e| io_error(entry, "failed to write artifact", &e))?;
        publish(entry, &staging, output)
    }
}

// ============================================================================
// External command
// ============================================================================

/// Runs an external compiler once per entry point.
///
/// Arguments may use `{source}`, `{output}` and `{page}` placeholders.
/// Outputs newer than their source and `deps` are not rebuilt, unless the
/// last run for them failed.
#[derive(Debug)]
pub struct CommandBackend {
    program: String,
    args: Vec<String>,
    root: PathBuf,
    deps: Vec<PathBuf>,
    failed: Mutex<FxHashSet<PathBuf>>,
}

impl CommandBackend {
    pub fn new(command: Vec<String>, root: PathBuf) -> anyhow::Result<Self> {
        let mut parts = command.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("compiler command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            root,
            deps: Vec::new(),
            failed: Mutex::new(FxHashSet::default()),
        })
    }

    pub fn with_deps(mut self, deps: Vec<PathBuf>) -> Self {
        self.deps = deps;
        self
    }

    fn is_up_to_date(&self, entry: &EntryPoint, output: &Path) -> bool {
        !self.failed.lock().contains(output)
            && is_fresh_with_deps(output, &entry.source, &self.deps)
    }

    fn expand(&self, entry: &EntryPoint, output: &Path) -> Vec<String> {
        let source = entry.source.display().to_string();
        let output = output.display().to_string();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{source}", &source)
                    .replace("{output}", &output)
                    .replace("{page}", entry.page.as_str())
            })
            .collect()
    }
}

impl Backend for CommandBackend {
    fn compile(&self, entry: &EntryPoint, output: &Path) -> Result<(), Vec<CompileError>> {
        if !entry.source.is_file() {
            return Err(missing_source(entry));
        }
        if self.is_up_to_date(entry, output) {
            return Ok(());
        }
        ensure_parent(entry, output)?;

        let staging = staging_path(output);
        let _ = fs::remove_file(&staging);
        let result = Command::new(&self.program)
            .args(self.expand(entry, &staging))
            .current_dir(&self.root)
            .output()
            .map_err(|e| io_error(entry, &format!("failed to run `{}`", self.program), &e))?;

        // A failing command may still leave output for the error page
        if staging.is_file() {
            publish(entry, &staging, output)?;
        }

        if result.status.success() {
            self.failed.lock().remove(output);
            return Ok(());
        }
        self.failed.lock().insert(output.to_path_buf());

        let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
        let message = if stderr.is_empty() {
            format!("`{}` exited with {}", self.program, result.status)
        } else {
            stderr
        };

        Err(vec![
            CompileError::new(ErrorKind::Build, entry.source.display().to_string(), message)
                .in_entry(entry.page.clone()),
        ])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PagePath;
    use tempfile::TempDir;

    fn entry(dir: &Path, page: &str, file: &str) -> EntryPoint {
        let page = PagePath::new(page);
        EntryPoint {
            name: page.bundle_name("html"),
            page,
            source: dir.join(file),
        }
    }

    #[test]
    fn test_passthrough_copies_source() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("about.html"), "<h1>About</h1>").unwrap();
        let entry = entry(dir.path(), "/about", "about.html");
        let output = dir.path().join("out").join(&entry.name);

        PassthroughBackend.compile(&entry, &output).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "<h1>About</h1>");
    }

    #[test]
    fn test_passthrough_missing_source_is_hard() {
        let dir = TempDir::new().unwrap();
        let entry = entry(dir.path(), "/gone", "gone.html");
        let output = dir.path().join("out").join(&entry.name);

        let errors = PassthroughBackend.compile(&entry, &output).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].is_hard_failure());
        assert_eq!(errors[0].entry.as_ref(), Some(&entry.page));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_failure_is_soft() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), "a").unwrap();
        let entry = entry(dir.path(), "/a", "a.html");
        let output = dir.path().join("out").join(&entry.name);

        let backend = CommandBackend::new(
            vec!["sh".into(), "-c".into(), "echo broken >&2; exit 3".into()],
            dir.path().to_path_buf(),
        )
        .unwrap();

        let errors = backend.compile(&entry, &output).unwrap_err();
        assert_eq!(errors[0].kind, ErrorKind::Build);
        assert_eq!(errors[0].message, "broken");
        assert!(!errors[0].is_hard_failure());
        assert!(errors[0].is_page_error());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_placeholders() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), "body").unwrap();
        let entry = entry(dir.path(), "/a", "a.html");
        let output = dir.path().join("out").join(&entry.name);

        let backend = CommandBackend::new(
            vec!["cp".into(), "{source}".into(), "{output}".into()],
            dir.path().to_path_buf(),
        )
        .unwrap();

        backend.compile(&entry, &output).unwrap();
        assert_eq!(fs::read_to_string(&output).unwrap(), "body");
    }

    #[test]
    fn test_empty_command_rejected() {
        assert!(CommandBackend::new(vec![], PathBuf::from(".")).is_err());
    }

    fn set_mtime(path: &Path, offset_secs: i64) {
        let now = std::time::SystemTime::now();
        let delta = std::time::Duration::from_secs(offset_secs.unsigned_abs());
        let time = if offset_secs < 0 { now - delta } else { now + delta };
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(time)
            .unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_passthrough_replaces_artifact_whole() {
        use std::io::Read;

        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.html");
        fs::write(&source, "old body").unwrap();
        let entry = entry(dir.path(), "/a", "a.html");
        let output = dir.path().join("out").join(&entry.name);
        PassthroughBackend.compile(&entry, &output).unwrap();

        // A reader that opened the artifact before the rebuild keeps the old file
        let mut reader = fs::File::open(&output).unwrap();
        fs::write(&source, "new").unwrap();
        set_mtime(&output, -3600);
        PassthroughBackend.compile(&entry, &output).unwrap();

        let mut seen = String::new();
        reader.read_to_string(&mut seen).unwrap();
        assert_eq!(seen, "old body");
        assert_eq!(fs::read_to_string(&output).unwrap(), "new");
        assert!(!staging_path(&output).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_writes_through_staging() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), "body").unwrap();
        let entry = entry(dir.path(), "/a", "a.html");
        let output = dir.path().join("out").join(&entry.name);

        let backend = CommandBackend::new(
            vec!["sh".into(), "-c".into(), "echo \"$0\" > target.log".into(), "{output}".into()],
            dir.path().to_path_buf(),
        )
        .unwrap();

        backend.compile(&entry, &output).unwrap();
        let target = fs::read_to_string(dir.path().join("target.log")).unwrap();
        assert_eq!(target.trim(), staging_path(&output).display().to_string());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_skips_fresh_output() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("a.html");
        let deps = dir.path().join("templates");
        fs::create_dir_all(&deps).unwrap();
        fs::write(&source, "body").unwrap();
        set_mtime(&source, -3600);
        let entry = entry(dir.path(), "/a", "a.html");
        let output = dir.path().join("out").join(&entry.name);

        let backend = CommandBackend::new(
            vec![
                "sh".into(),
                "-c".into(),
                "echo run >> runs.log && cp \"$0\" \"$1\"".into(),
                "{source}".into(),
                "{output}".into(),
            ],
            dir.path().to_path_buf(),
        )
        .unwrap()
        .with_deps(vec![deps.clone()]);
        let runs = || fs::read_to_string(dir.path().join("runs.log")).unwrap().lines().count();

        backend.compile(&entry, &output).unwrap();
        backend.compile(&entry, &output).unwrap();
        assert_eq!(runs(), 1);

        // source newer than output
        set_mtime(&output, -7200);
        backend.compile(&entry, &output).unwrap();
        assert_eq!(runs(), 2);
        backend.compile(&entry, &output).unwrap();
        assert_eq!(runs(), 2);

        let layout = deps.join("layout.html");
        fs::write(&layout, "layout").unwrap();
        set_mtime(&layout, 3600);
        backend.compile(&entry, &output).unwrap();
        assert_eq!(runs(), 3);
    }

    #[cfg(unix)]
    #[test]
    fn test_command_reruns_after_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), "a").unwrap();
        let entry = entry(dir.path(), "/a", "a.html");
        let output = dir.path().join("out").join(&entry.name);

        let backend = CommandBackend::new(
            vec![
                "sh".into(),
                "-c".into(),
                "echo run >> runs.log; echo partial > \"$0\"; exit 1".into(),
                "{output}".into(),
            ],
            dir.path().to_path_buf(),
        )
        .unwrap();

        assert!(backend.compile(&entry, &output).is_err());
        assert_eq!(fs::read_to_string(&output).unwrap().trim(), "partial");
        assert!(backend.compile(&entry, &output).is_err());

        let runs = fs::read_to_string(dir.path().join("runs.log")).unwrap();
        assert_eq!(runs.lines().count(), 2);
    }
}
