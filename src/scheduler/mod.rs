//! On-demand entry scheduler.
//!
//! Decides, for every page request, whether the page's artifact exists, adds
//! unseen pages as compile entries, coalesces rebuild requests into single
//! passes and releases waiters when a pass completes.
//!
//! ```text
//! ensure_page ──► Entry(Added) ──► invalidate ──► DriverHandle
//!                                                     │
//!        waiters ◄── finish_pass(Built) ◄── begin_pass(Building)
//! ```
//!
//! All mutable state (entries, waiters, coalescer flags, liveness) lives in a
//! single mutex-guarded block. Waiters for a page are released together while
//! that lock is held, so no request can observe a stale status after the flip.

mod entry;
mod error;
mod invalidator;
mod liveness;

pub use entry::{Entry, EntryStatus};
pub use error::PageError;
pub use invalidator::Invalidator;
pub use liveness::PingResponse;

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::compiler::{CompileError, DriverHandle, EntryPoint, PassReport};
use crate::config::HotpageConfig;
use crate::core::{ERROR_PAGE, PagePath};
use crate::page::locate_page;
use crate::utils::plural::plural_s;
use crate::{debug, log};
use liveness::{Liveness, select_inactive};

type Waiter = oneshot::Sender<Result<(), PageError>>;

/// Scheduler settings, resolved from config.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    pub pages_dir: PathBuf,
    pub extensions: Vec<String>,
    pub output_dir: PathBuf,
    pub output_extension: String,
    pub max_inactive_age: Duration,
    pub pages_buffer_length: NonZeroUsize,
    pub dispose_interval: Duration,
}

impl SchedulerOptions {
    pub fn from_config(config: &HotpageConfig) -> Self {
        Self {
            pages_dir: config.pages.dir.clone(),
            extensions: config.pages.extensions.clone(),
            output_dir: config.compiler.output.clone(),
            output_extension: config.compiler.output_extension.clone(),
            max_inactive_age: Duration::from_millis(config.on_demand.max_inactive_age_ms),
            pages_buffer_length: NonZeroUsize::new(config.on_demand.pages_buffer_length)
                .unwrap_or(NonZeroUsize::MIN),
            dispose_interval: Duration::from_millis(config.on_demand.dispose_interval_ms),
        }
    }
}

/// Shared handle to the scheduler. Cheap to clone.
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Inner>,
}

struct Inner {
    state: Mutex<State>,
    driver: DriverHandle,
    options: SchedulerOptions,
    /// `true` while the compiler is being torn down and rebuilt
    reloading: watch::Sender<bool>,
    /// Cancels periodic tasks tied to this scheduler
    cancel: CancellationToken,
}

struct State {
    entries: FxHashMap<PagePath, Entry>,
    waiters: FxHashMap<PagePath, Vec<Waiter>>,
    /// Page-scoped soft errors from the latest pass
    errors: FxHashMap<PagePath, Vec<CompileError>>,
    invalidator: Invalidator,
    liveness: Liveness,
    stopped: bool,
}

impl State {
    fn release(&mut self, page: &PagePath, result: Result<(), PageError>) {
        for tx in self.waiters.remove(page).unwrap_or_default() {
            let _ = tx.send(result.clone());
        }
    }
}

// =============================================================================
// Request side
// =============================================================================

impl Scheduler {
    pub fn new(options: SchedulerOptions, driver: DriverHandle) -> Self {
        let (reloading, _) = watch::channel(false);
        let state = State {
            entries: FxHashMap::default(),
            waiters: FxHashMap::default(),
            errors: FxHashMap::default(),
            invalidator: Invalidator::default(),
            liveness: Liveness::new(options.pages_buffer_length),
            stopped: false,
        };

        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(state),
                driver,
                options,
                reloading,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.inner.options
    }

    /// Make sure a page's artifact is built, waiting for a pass if needed.
    ///
    /// Returns the canonical page path on success.
    pub async fn ensure_page(&self, page: &str) -> Result<PagePath, PageError> {
        self.wait_until_reloaded().await;

        let options = &self.inner.options;
        let not_found = || PageError::NotFound(page.to_string());

        let (canonical, relative) =
            locate_page(&options.pages_dir, page, &options.extensions).ok_or_else(not_found)?;

        let rx = {
            let mut state = self.inner.state.lock();
            if state.stopped {
                return Err(PageError::Stopped(canonical));
            }

            match state.entries.get(&canonical).map(|e| e.status) {
                Some(EntryStatus::Built) => return Ok(canonical),
                Some(EntryStatus::Building) => {}
                Some(EntryStatus::Added) => self.request_pass(&mut state),
                None => {
                    log!("build"; "building page {}", canonical);
                    let entry = Entry::new(
                        canonical.bundle_name(&options.output_extension),
                        options.pages_dir.join(&relative),
                    );
                    state.entries.insert(canonical.clone(), entry);
                    self.request_pass(&mut state);
                }
            }

            let (tx, rx) = oneshot::channel();
            state.waiters.entry(canonical.clone()).or_default().push(tx);
            rx
        };

        match rx.await {
            Ok(result) => result.map(|()| canonical),
            Err(_) => Err(PageError::Stopped(canonical)),
        }
    }

    /// Request a compile pass, coalescing with any pass in flight.
    pub fn invalidate(&self) {
        let mut state = self.inner.state.lock();
        self.request_pass(&mut state);
    }

    /// Deferred while reloading: reload completion requests its own pass.
    fn request_pass(&self, state: &mut State) {
        if self.is_reloading() {
            return;
        }
        if state.invalidator.invalidate() {
            self.inner.driver.invalidate();
        }
    }

    /// Soft errors retained for a page by the latest pass.
    pub fn compilation_errors(&self, page: &PagePath) -> Vec<CompileError> {
        self.inner
            .state
            .lock()
            .errors
            .get(page)
            .cloned()
            .unwrap_or_default()
    }

    /// Absolute artifact path of a known page.
    pub fn artifact(&self, page: &PagePath) -> Option<PathBuf> {
        let state = self.inner.state.lock();
        let entry = state.entries.get(page)?;
        Some(self.inner.options.output_dir.join(&entry.bundle_name))
    }

    #[cfg(test)]
    fn status(&self, page: &PagePath) -> Option<EntryStatus> {
        self.inner.state.lock().entries.get(page).map(|e| e.status)
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.inner.state.lock().entries.len()
    }

    /// Recently pinged pages, most recent first.
    #[cfg(test)]
    fn recent_pages(&self) -> Vec<PagePath> {
        self.inner.state.lock().liveness.recent()
    }

    #[cfg(test)]
    fn waiter_count(&self, page: &str) -> usize {
        let state = self.inner.state.lock();
        state.waiters.get(page).map_or(0, Vec::len)
    }
}

// =============================================================================
// Driver side
// =============================================================================

impl Scheduler {
    /// A pass is starting: hand out every live entry point.
    ///
    /// Entries whose source vanished are dropped and their waiters get
    /// `NotFound`. Returns `None` while reloading; the fresh compiler asks
    /// again once it is up.
    pub fn begin_pass(&self) -> Option<Vec<EntryPoint>> {
        if self.is_reloading() {
            return None;
        }

        let mut state = self.inner.state.lock();
        state.invalidator.start_building();

        let removed: Vec<PagePath> = state
            .entries
            .iter()
            .filter(|(_, entry)| !entry.source.is_file())
            .map(|(page, _)| page.clone())
            .collect();

        for page in removed {
            log!("build"; "page removed: {}", page);
            state.entries.remove(&page);
            state.errors.remove(&page);
            state.release(&page, Err(PageError::NotFound(page.to_string())));
        }

        let mut entry_points: Vec<EntryPoint> = state
            .entries
            .iter_mut()
            .map(|(page, entry)| {
                entry.status = EntryStatus::Building;
                EntryPoint {
                    page: page.clone(),
                    name: entry.bundle_name.clone(),
                    source: entry.source.clone(),
                }
            })
            .collect();
        entry_points.sort_by(|a, b| a.page.cmp(&b.page));

        debug!("build"; "pass started with {} page{}", entry_points.len(), plural_s(entry_points.len()));
        Some(entry_points)
    }

    /// A pass completed.
    ///
    /// Produced `Building` entries flip to `Built` and their waiters are
    /// released. A hard failure starts a full reload instead. Must be called
    /// from within a tokio runtime.
    pub fn finish_pass(&self, report: PassReport) {
        if self.is_reloading() {
            debug!("build"; "ignoring pass results while reloading");
            return;
        }

        let mut state = self.inner.state.lock();

        if let Some(hard) = report.errors.iter().find(|e| e.is_hard_failure()) {
            log!("reload"; "{} ({}), reloading compiler", hard.message, hard.module);
            self.begin_reload(&mut state);
            return;
        }

        for error in report.errors.iter().filter(|e| !e.is_page_error()) {
            debug!("build"; "dependency error: {}", error);
        }

        let mut page_errors: FxHashMap<PagePath, Vec<CompileError>> = FxHashMap::default();
        for error in report.errors {
            if let Some(page) = error.entry.clone().filter(|_| error.is_page_error()) {
                page_errors.entry(page).or_default().push(error);
            }
        }

        let now = Instant::now();
        for page in report.produced {
            let Some(entry) = state.entries.get_mut(&page) else {
                continue;
            };
            if entry.status != EntryStatus::Building {
                continue;
            }

            entry.status = EntryStatus::Built;
            entry.last_active = now;
            match page_errors.remove(&page) {
                Some(errors) => {
                    state.errors.insert(page.clone(), errors);
                }
                None => {
                    state.errors.remove(&page);
                }
            }
            state.release(&page, Ok(()));
        }

        if state.invalidator.done_building() {
            self.inner.driver.invalidate();
        }
    }

    /// Mark every entry stale, reset the coalescer and rebuild the compiler.
    fn begin_reload(&self, state: &mut State) {
        self.inner.reloading.send_replace(true);
        state.invalidator.reset();
        state.errors.clear();
        for entry in state.entries.values_mut() {
            entry.status = EntryStatus::Added;
        }

        let scheduler = self.clone();
        tokio::spawn(async move { scheduler.run_reload().await });
    }

    async fn run_reload(self) {
        log!("reload"; "tearing down compiler");
        match self.inner.driver.rebuild().await {
            Ok(()) => {
                self.inner.reloading.send_replace(false);
                log!("reload"; "compiler rebuilt");
                let mut state = self.inner.state.lock();
                if !state.entries.is_empty() {
                    self.request_pass(&mut state);
                }
            }
            Err(e) if self.inner.cancel.is_cancelled() => {
                debug!("reload"; "abandoned on shutdown: {:#}", e);
            }
            Err(e) => {
                log!("error"; "failed to reload compiler: {:#}", e);
                std::process::exit(1);
            }
        }
    }

    pub fn is_reloading(&self) -> bool {
        *self.inner.reloading.borrow()
    }

    /// Resolve once no full reload is in progress, or on [`Scheduler::stop`].
    pub async fn wait_until_reloaded(&self) {
        let mut rx = self.inner.reloading.subscribe();
        tokio::select! {
            _ = rx.wait_for(|reloading| !*reloading) => {}
            _ = self.inner.cancel.cancelled() => {}
        }
    }
}

// =============================================================================
// Liveness
// =============================================================================

impl Scheduler {
    /// Keep-alive from a client viewing `page`.
    ///
    /// `None` means "nothing to say yet" (entry still building).
    pub fn handle_ping(&self, page: &str) -> Option<PingResponse> {
        let page = PagePath::new(page);
        let mut state = self.inner.state.lock();

        let Some(entry) = state.entries.get_mut(&page) else {
            if state.liveness.note_miss(&page) {
                log!("ping"; "client pings, but there's no entry for page: {}", page);
            }
            return Some(PingResponse::Invalid);
        };

        if entry.status != EntryStatus::Built {
            return None;
        }

        entry.last_active = Instant::now();
        let response = if page.as_str() == ERROR_PAGE {
            PingResponse::Invalid
        } else {
            PingResponse::Success
        };
        state.liveness.touch(page);
        Some(response)
    }

    /// Dispose built entries idle beyond the threshold and not recently used.
    ///
    /// Returns the disposed pages.
    pub fn dispose_inactive(&self, now: Instant) -> Vec<PagePath> {
        let mut state = self.inner.state.lock();
        let inactive = select_inactive(
            &state.entries,
            &state.liveness,
            now,
            self.inner.options.max_inactive_age,
        );
        if inactive.is_empty() {
            return inactive;
        }

        let mut dropped = Vec::with_capacity(inactive.len());
        for page in &inactive {
            state.errors.remove(page);
            if let Some(entry) = state.entries.remove(page) {
                dropped.push(EntryPoint {
                    page: page.clone(),
                    name: entry.bundle_name,
                    source: entry.source,
                });
            }
        }

        let names: Vec<&str> = inactive.iter().map(PagePath::as_str).collect();
        log!("dispose"; "disposing inactive page{}: {}", plural_s(inactive.len()), names.join(", "));

        self.inner.driver.dispose(dropped);
        self.request_pass(&mut state);
        inactive
    }

    /// Run disposal on a fixed interval until [`Scheduler::stop`].
    pub fn spawn_disposal(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        let cancel = self.inner.cancel.clone();
        let period = self.inner.options.dispose_interval;

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        scheduler.dispose_inactive(Instant::now());
                    }
                }
            }
        })
    }

    /// Cancellation token shared by every task tied to this scheduler.
    pub fn cancel_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Stop periodic tasks and release every waiter with `Stopped`.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.driver.shutdown();

        let mut state = self.inner.state.lock();
        state.stopped = true;
        for (page, waiters) in state.waiters.drain() {
            for tx in waiters {
                let _ = tx.send(Err(PageError::Stopped(page.clone())));
            }
        }
    }
}

#[cfg(test)]
mod tests;
