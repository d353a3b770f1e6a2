//! Liveness tracking: recently pinged pages and inactivity disposal.

use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use lru::LruCache;
use rustc_hash::FxHashMap;

use super::entry::{Entry, EntryStatus};
use crate::core::PagePath;

/// Answer sent on the liveness channel for one keep-alive tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PingResponse {
    /// Page is built and kept alive
    Success,
    /// Page has no entry (or is the error page), the client should reload
    Invalid,
}

impl PingResponse {
    pub fn to_json(self) -> String {
        let value = match self {
            Self::Success => serde_json::json!({ "success": true }),
            Self::Invalid => serde_json::json!({ "invalid": true }),
        };
        value.to_string()
    }
}

/// Bounded most-recently-used page list plus ping bookkeeping.
pub(super) struct Liveness {
    recent: LruCache<PagePath, ()>,
    /// Last page pinged without an entry, to avoid repeating the log line
    last_miss: Option<PagePath>,
}

impl Liveness {
    pub(super) fn new(capacity: NonZeroUsize) -> Self {
        Self {
            recent: LruCache::new(capacity),
            last_miss: None,
        }
    }

    /// Mark a page as just used. Evicts the least recently used page when full.
    pub(super) fn touch(&mut self, page: PagePath) {
        self.recent.put(page, ());
    }

    pub(super) fn contains(&self, page: &PagePath) -> bool {
        self.recent.contains(page)
    }

    /// Record a ping for a page without an entry. Returns `true` the first
    /// time in a row a page misses.
    pub(super) fn note_miss(&mut self, page: &PagePath) -> bool {
        if self.last_miss.as_ref() == Some(page) {
            return false;
        }
        self.last_miss = Some(page.clone());
        true
    }

    /// Recently used pages, most recent first.
    pub(super) fn recent(&self) -> Vec<PagePath> {
        self.recent.iter().map(|(page, _)| page.clone()).collect()
    }
}

/// Built entries outside the recent list and idle longer than `max_age`.
///
/// `Added` and `Building` entries are never selected.
pub(super) fn select_inactive(
    entries: &FxHashMap<PagePath, Entry>,
    liveness: &Liveness,
    now: Instant,
    max_age: Duration,
) -> Vec<PagePath> {
    let mut inactive: Vec<PagePath> = entries
        .iter()
        .filter(|(page, entry)| {
            entry.status == EntryStatus::Built
                && !liveness.contains(page)
                && now.saturating_duration_since(entry.last_active) > max_age
        })
        .map(|(page, _)| page.clone())
        .collect();
    inactive.sort();
    inactive
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(status: EntryStatus, last_active: Instant) -> Entry {
        Entry {
            bundle_name: String::new(),
            source: PathBuf::new(),
            status,
            last_active,
        }
    }

    fn capacity(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_ping_json() {
        assert_eq!(PingResponse::Success.to_json(), r#"{"success":true}"#);
        assert_eq!(PingResponse::Invalid.to_json(), r#"{"invalid":true}"#);
    }

    #[test]
    fn test_recent_is_bounded_mru() {
        let mut live = Liveness::new(capacity(2));
        live.touch(PagePath::new("/a"));
        live.touch(PagePath::new("/b"));
        live.touch(PagePath::new("/a"));
        live.touch(PagePath::new("/c"));

        assert_eq!(live.recent(), vec![PagePath::new("/c"), PagePath::new("/a")]);
        assert!(!live.contains(&PagePath::new("/b")));
    }

    #[test]
    fn test_note_miss_dedupes_consecutive() {
        let mut live = Liveness::new(capacity(2));
        let a = PagePath::new("/a");
        let b = PagePath::new("/b");
        assert!(live.note_miss(&a));
        assert!(!live.note_miss(&a));
        assert!(live.note_miss(&b));
        assert!(live.note_miss(&a));
    }

    #[test]
    fn test_select_inactive() {
        let start = Instant::now();
        let max_age = Duration::from_secs(60);
        let later = start + Duration::from_secs(120);

        let mut entries = FxHashMap::default();
        entries.insert(PagePath::new("/old"), entry(EntryStatus::Built, start));
        entries.insert(PagePath::new("/pinged"), entry(EntryStatus::Built, start));
        entries.insert(PagePath::new("/fresh"), entry(EntryStatus::Built, later));
        entries.insert(PagePath::new("/building"), entry(EntryStatus::Building, start));
        entries.insert(PagePath::new("/added"), entry(EntryStatus::Added, start));

        let mut live = Liveness::new(capacity(2));
        live.touch(PagePath::new("/pinged"));

        let inactive = select_inactive(&entries, &live, later, max_age);
        assert_eq!(inactive, vec![PagePath::new("/old")]);
    }

    #[test]
    fn test_select_inactive_threshold_is_exclusive() {
        let start = Instant::now();
        let max_age = Duration::from_secs(60);
        let mut entries = FxHashMap::default();
        entries.insert(PagePath::new("/a"), entry(EntryStatus::Built, start));
        let live = Liveness::new(capacity(1));

        assert!(select_inactive(&entries, &live, start + max_age, max_age).is_empty());
    }
}
