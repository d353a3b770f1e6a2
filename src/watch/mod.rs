//! File watcher.
//!
//! ```text
//! notify -> Debouncer -> scheduler.invalidate()
//!                     \-> rescan pages -> RouteIndex swap (pages added, removed or renamed)
//! ```

mod debouncer;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use arc_swap::ArcSwap;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;

use crate::logger::status_warning;
use crate::page::scan_pages;
use crate::route::RouteIndex;
use crate::scheduler::Scheduler;
use crate::utils::plural::plural_count;
use crate::{debug, log};
use debouncer::{ChangeKind, Changes, Debouncer};

/// Watches page sources and compiler dependencies.
pub struct FsActor {
    notify_rx: std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    watcher: RecommendedWatcher,
    roots: WatchRoots,
    scheduler: Scheduler,
    routes: Arc<ArcSwap<RouteIndex>>,
}

impl FsActor {
    /// Start watching right away; events buffer until [`run`](Self::run).
    pub fn new(
        dirs: Vec<PathBuf>,
        scheduler: Scheduler,
        routes: Arc<ArcSwap<RouteIndex>>,
    ) -> Result<Self> {
        let (notify_tx, notify_rx) = std::sync::mpsc::channel();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = notify_tx.send(res);
        })
        .context("Failed to create file watcher")?;

        let mut roots = WatchRoots::new(dirs);
        roots.attach_existing(&mut watcher)?;

        Ok(Self {
            notify_rx,
            watcher,
            roots,
            scheduler,
            routes,
        })
    }

    pub async fn run(self) {
        let Self {
            notify_rx,
            mut watcher,
            mut roots,
            scheduler,
            routes,
        } = self;

        let (tx, mut rx) = mpsc::channel::<notify::Event>(64);

        // notify delivers on a sync channel
        std::thread::spawn(move || {
            while let Ok(result) = notify_rx.recv() {
                match result {
                    Ok(event) => {
                        if tx.blocking_send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => log!("watch"; "notify error: {}", e),
                }
            }
        });

        let cancel = scheduler.cancel_token();
        let mut debouncer = Debouncer::new();

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => debouncer.add_event(&event),
                    None => break,
                },
                _ = tokio::time::sleep(debouncer.sleep_duration()) => {
                    roots.maintain(&mut watcher);
                    if let Some(changes) = debouncer.take_if_ready() {
                        apply_changes(&changes, &scheduler, &routes);
                    }
                }
            }
        }

        debug!("watch"; "stopped");
    }
}

fn apply_changes(changes: &Changes, scheduler: &Scheduler, routes: &ArcSwap<RouteIndex>) {
    if changes.is_empty() {
        return;
    }

    log_changes(changes);

    let options = scheduler.options();
    if pages_tree_changed(changes, &options.pages_dir) {
        reindex_routes(&options.pages_dir, &options.extensions, routes);
    }

    scheduler.invalidate();
}

fn log_changes(changes: &Changes) {
    if let [(path, kind)] = changes.iter().collect::<Vec<_>>().as_slice() {
        log!("watch"; "{} {}", kind.label(), path.display());
    } else {
        log!("watch"; "{} changed", plural_count(changes.len(), "file"));
    }
}

/// A file or directory under the pages root appeared or went away.
fn pages_tree_changed(changes: &Changes, pages_dir: &Path) -> bool {
    changes
        .iter()
        .any(|(path, kind)| kind.alters_tree() && path.starts_with(pages_dir))
}

/// Swap in a fresh route index. On conflict the previous index stays live.
fn reindex_routes(pages_dir: &Path, extensions: &[String], routes: &ArcSwap<RouteIndex>) {
    let pages = scan_pages(pages_dir, extensions);
    match RouteIndex::build(&pages) {
        Ok(index) => {
            debug!("watch"; "re-indexed {}", plural_count(index.len(), "route"));
            routes.store(Arc::new(index));
        }
        Err(e) => {
            log!("watch"; "route conflict, keeping previous routes: {}", e);
            status_warning(&e.to_string());
        }
    }
}

/// Directories to watch, re-attached when removed and recreated.
struct WatchRoots {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    fn new(desired: Vec<PathBuf>) -> Self {
        Self {
            desired,
            attached: FxHashSet::default(),
        }
    }

    fn attach_existing(&mut self, watcher: &mut RecommendedWatcher) -> Result<()> {
        for path in self.desired.iter().filter(|p| p.exists()) {
            watcher
                .watch(path, RecursiveMode::Recursive)
                .with_context(|| format!("Failed to watch {}", path.display()))?;
            self.attached.insert(path.clone());
        }
        Ok(())
    }

    fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        self.attached.retain(|path| path.exists());

        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }
            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                debug!("watch"; "re-attached {}", path.display());
                self.attached.insert(path.clone());
            }
        }
    }
}
