//! Build state and progress primitives.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

/// Lifecycle state of an index session.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum BuildState {
    Idle = 0,
    Crawling = 1,
    Indexing = 2,
    Persisting = 3,
    Ready = 4,
    Error = 5,
}

impl BuildState {
    /// Loads the state from an atomic.
    pub fn load(atomic: &AtomicU8) -> Self {
        match atomic.load(Ordering::Relaxed) {
            1 => Self::Crawling,
            2 => Self::Indexing,
            3 => Self::Persisting,
            4 => Self::Ready,
            5 => Self::Error,
            _ => Self::Idle,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Crawling => "crawling",
            Self::Indexing => "indexing",
            Self::Persisting => "persisting",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

/// Progress counters for an index build.
///
/// Written only by the crawler/indexer during the build phase; readers take
/// relaxed snapshots.
#[derive(Debug, Default)]
pub struct BuildProgress {
    pub indexed: AtomicUsize,
    pub total: AtomicUsize,
    pub crawl_errors: AtomicUsize,
}

impl BuildProgress {
    /// Resets the counters for a fresh build over `total` entries.
    pub fn reset(&self, total: usize) {
        self.indexed.store(0, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// Marks the build complete with `total` entries, as after a cache load.
    pub fn complete(&self, total: usize) {
        self.total.store(total, Ordering::Relaxed);
        self.indexed.store(total, Ordering::Relaxed);
    }

    /// Snapshot of (entries indexed so far, total).
    pub fn snapshot(&self) -> (usize, usize) {
        (
            self.indexed.load(Ordering::Relaxed),
            self.total.load(Ordering::Relaxed),
        )
    }

    /// Unreadable subtrees skipped during the crawl. Stays 0 after a cache
    /// load, which performs no crawl.
    pub fn crawl_errors(&self) -> usize {
        self.crawl_errors.load(Ordering::Relaxed)
    }
}
