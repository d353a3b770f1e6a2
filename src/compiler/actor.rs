//! Compiler actor: runs passes for the scheduler on a blocking pool.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use rayon::prelude::*;
use tokio::sync::mpsc;

use super::backend::Backend;
use super::error::{CompileError, ErrorKind};
use super::{CompilerMsg, EntryPoint, PassReport};
use crate::core::PagePath;
use crate::logger::{status_error, status_success};
use crate::scheduler::Scheduler;
use crate::utils::plural::plural_s;
use crate::{debug, log};

/// Builds a fresh backend, at startup and after every full reload.
pub type BackendFactory = Box<dyn Fn() -> Result<Arc<dyn Backend>> + Send + Sync>;

pub struct CompilerActor {
    rx: mpsc::UnboundedReceiver<CompilerMsg>,
    scheduler: Scheduler,
    output_dir: PathBuf,
    factory: BackendFactory,
    backend: Arc<dyn Backend>,
}

impl CompilerActor {
    pub fn new(
        rx: mpsc::UnboundedReceiver<CompilerMsg>,
        scheduler: Scheduler,
        factory: BackendFactory,
    ) -> Result<Self> {
        let backend = factory().context("failed to start compiler")?;
        let output_dir = scheduler.options().output_dir.clone();
        Ok(Self {
            rx,
            scheduler,
            output_dir,
            factory,
            backend,
        })
    }

    pub async fn run(mut self) {
        let cancel = self.scheduler.cancel_token();
        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,

                msg = self.rx.recv() => {
                    let Some(msg) = msg else { break };
                    match msg {
                        CompilerMsg::Invalidate => self.run_pass().await,
                        CompilerMsg::Dispose(entries) => self.dispose(&entries),
                        CompilerMsg::Rebuild(reply) => {
                            let _ = reply.send(self.rebuild());
                        }
                        CompilerMsg::Shutdown => break,
                    }
                }
            }
        }
        debug!("compile"; "compiler actor stopped");
    }

    async fn run_pass(&self) {
        let Some(entries) = self.scheduler.begin_pass() else {
            return;
        };
        if entries.is_empty() {
            self.scheduler.finish_pass(PassReport::default());
            return;
        }

        let pages: Vec<PagePath> = entries.iter().map(|e| e.page.clone()).collect();
        let backend = Arc::clone(&self.backend);
        let output_dir = self.output_dir.clone();

        let report =
            tokio::task::spawn_blocking(move || compile_all(backend.as_ref(), &entries, &output_dir))
                .await
                .unwrap_or_else(|e| crashed_pass(pages, &e.to_string()));

        report_status(&report);
        self.scheduler.finish_pass(report);
    }

    fn dispose(&self, entries: &[EntryPoint]) {
        for entry in entries {
            let artifact = self.output_dir.join(&entry.name);
            match fs::remove_file(&artifact) {
                Ok(()) => debug!("dispose"; "removed {}", artifact.display()),
                Err(e) if e.kind() == IoErrorKind::NotFound => {}
                Err(e) => log!("dispose"; "failed to remove {}: {}", artifact.display(), e),
            }
        }
    }

    /// Drop every artifact and start over with a new backend.
    fn rebuild(&mut self) -> Result<()> {
        clean_output(&self.output_dir)?;
        self.backend = (self.factory)().context("failed to restart compiler")?;
        Ok(())
    }
}

/// Compile every entry point in parallel.
///
/// A page counts as produced unless one of its errors is a hard failure.
fn compile_all(backend: &dyn Backend, entries: &[EntryPoint], output_dir: &Path) -> PassReport {
    let results: Vec<(PagePath, Result<(), Vec<CompileError>>)> = entries
        .par_iter()
        .map(|entry| {
            let output = output_dir.join(&entry.name);
            (entry.page.clone(), backend.compile(entry, &output))
        })
        .collect();

    let mut report = PassReport::default();
    for (page, result) in results {
        match result {
            Ok(()) => report.produced.push(page),
            Err(errors) => {
                if !errors.iter().any(CompileError::is_hard_failure) {
                    report.produced.push(page);
                }
                report.errors.extend(errors);
            }
        }
    }
    report
}

/// Report for a pass whose worker panicked: every page gets a soft error.
fn crashed_pass(pages: Vec<PagePath>, reason: &str) -> PassReport {
    let errors = pages
        .iter()
        .map(|page| {
            CompileError::new(ErrorKind::Other, page.as_str(), format!("compiler crashed: {reason}"))
                .in_entry(page.clone())
        })
        .collect();
    PassReport {
        produced: pages,
        errors,
    }
}

fn report_status(report: &PassReport) {
    if report.errors.is_empty() {
        let n = report.produced.len();
        status_success(&format!("built {} page{}", n, plural_s(n)));
        return;
    }

    let detail = report
        .errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n");
    let n = report.errors.len();
    status_error(&format!("{} compile error{}", n, plural_s(n)), &detail);
}

fn clean_output(output_dir: &Path) -> Result<()> {
    match fs::remove_dir_all(output_dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to clean {}", output_dir.display())),
    }
}
