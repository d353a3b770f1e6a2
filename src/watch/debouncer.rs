use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::config::util::normalize_path;
use crate::debug;

pub(super) const DEBOUNCE_MS: u64 = 300;
pub(super) const FLUSH_COOLDOWN_MS: u64 = 800;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub(super) fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }

    /// Whether the set of files on disk changed, not just their contents.
    pub(super) fn alters_tree(self) -> bool {
        !matches!(self, Self::Modified)
    }
}

pub(super) type Changes = FxHashMap<PathBuf, ChangeKind>;

/// Collects raw notify events into one batch per quiet period.
pub(super) struct Debouncer {
    pub(super) changes: Changes,
    last_event: Option<Instant>,
    last_flush: Option<Instant>,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self {
            changes: FxHashMap::default(),
            last_event: None,
            last_flush: None,
        }
    }

    /// Record a notify event. Later events on a path already in the batch:
    /// - removed, then created/modified: restored, keep the new kind
    /// - modified, then removed: removed
    /// - created, then removed: never existed, drop it
    /// - anything else: first event wins
    ///
    /// Renames count as a removal of the old name and a creation of the new.
    pub(super) fn add_event(&mut self, event: &notify::Event) {
        use notify::EventKind;
        use notify::event::ModifyKind;

        let kind = match event.kind {
            EventKind::Create(_) => ChangeKind::Created,
            EventKind::Remove(_) => ChangeKind::Removed,
            // mtime/chmod noise
            EventKind::Modify(ModifyKind::Metadata(_)) => return,
            EventKind::Modify(ModifyKind::Name(_)) => {
                for path in event.paths.iter().filter(|p| !is_temp_file(p)) {
                    self.record(path, renamed(path));
                }
                return;
            }
            EventKind::Modify(_) => ChangeKind::Modified,
            _ => return,
        };

        for path in event.paths.iter().filter(|p| !is_temp_file(p)) {
            self.record(path, kind);
        }
    }

    fn record(&mut self, path: &Path, kind: ChangeKind) {
        let path = normalize_path(path);

        match self.changes.get(&path).copied() {
            None => {
                debug!("watch"; "{}: {}", kind.label(), path.display());
                self.changes.insert(path, kind);
            }
            Some(ChangeKind::Removed) if kind != ChangeKind::Removed => {
                self.changes.insert(path, kind);
            }
            Some(ChangeKind::Modified) if kind == ChangeKind::Removed => {
                self.changes.insert(path, ChangeKind::Removed);
            }
            Some(ChangeKind::Created) if kind == ChangeKind::Removed => {
                self.changes.remove(&path);
            }
            Some(_) => return,
        }
        self.last_event = Some(Instant::now());
    }

    /// Hand out the batch once the debounce window and flush cooldown have passed.
    pub(super) fn take_if_ready(&mut self) -> Option<Changes> {
        if !self.is_ready() {
            return None;
        }

        self.last_event = None;
        self.last_flush = Some(Instant::now());
        Some(std::mem::take(&mut self.changes))
    }

    pub(super) fn is_ready(&self) -> bool {
        let Some(last_event) = self.last_event else {
            return false;
        };

        if last_event.elapsed() < Duration::from_millis(DEBOUNCE_MS) {
            return false;
        }

        if let Some(last_flush) = self.last_flush
            && last_flush.elapsed() < Duration::from_millis(FLUSH_COOLDOWN_MS)
        {
            return false;
        }

        !self.changes.is_empty()
    }

    /// How long the event loop may sleep before the batch could be ready.
    pub(super) fn sleep_duration(&self) -> Duration {
        let Some(last_event) = self.last_event else {
            return Duration::from_secs(3600);
        };

        let debounce = Duration::from_millis(DEBOUNCE_MS).saturating_sub(last_event.elapsed());
        let cooldown = self.last_flush.map_or(Duration::ZERO, |t| {
            Duration::from_millis(FLUSH_COOLDOWN_MS).saturating_sub(t.elapsed())
        });

        debounce.max(cooldown).max(Duration::from_millis(1))
    }
}

/// Rename events name both ends, one at a time or together. The side that
/// still exists was created, the other removed.
fn renamed(path: &Path) -> ChangeKind {
    if path.exists() {
        ChangeKind::Created
    } else {
        ChangeKind::Removed
    }
}

/// Editor swap and backup files, plus dotfiles.
fn is_temp_file(path: &Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bak" | "swp" | "swo" | "swx" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
        || name.starts_with('#')
}
