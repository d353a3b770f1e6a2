//! Per-page scheduler records.

use std::path::PathBuf;
use std::time::Instant;

/// Compilation status of an entry.
///
/// `Added -> Building -> Built`, and `Built -> Building` again on the next
/// pass after an invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Requested, not yet consumed by a pass
    Added,
    /// Part of the pass in flight
    Building,
    /// Artifact produced by a completed pass
    Built,
}

impl EntryStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Building => "building",
            Self::Built => "built",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub bundle_name: String,
    pub source: PathBuf,
    pub status: EntryStatus,
    pub last_active: Instant,
}

impl Entry {
    pub fn new(bundle_name: String, source: PathBuf) -> Self {
        Self {
            bundle_name,
            source,
            status: EntryStatus::Added,
            last_active: Instant::now(),
        }
    }
}
