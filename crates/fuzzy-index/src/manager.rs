//! Index lifecycle manager.
//!
//! Owns the tree plus the shared build state, and the single long-lived
//! background worker that drives a session: load the cache if one exists,
//! otherwise crawl and index, then persist, then flip to ready. Queries are
//! gated on readiness so they never observe a tree that is still being
//! mutated; the phases themselves are internally parallel but strictly
//! sequential relative to one another.

use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::build::{BuildProgress, BuildState};
use crate::cache::{read_cache, write_cache, CACHE_FILE_NAME};
use crate::crawl::crawl;
use crate::error::{IndexError, Result};
use crate::indexer::index_paths;
use crate::tree::{Match, MetricTree};

/// Configuration for one index session.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Directory whose contents get indexed.
    pub root: PathBuf,
    /// Directory holding the cache file; created at startup.
    pub cache_dir: PathBuf,
}

/// State shared between the manager handle and the build worker.
///
/// The worker is the only writer of `tree`, `state`, and `last_error`
/// during a build; readers take snapshots.
struct SharedIndex {
    root: PathBuf,
    cache_path: PathBuf,
    state: AtomicU8,
    progress: BuildProgress,
    last_error: Mutex<Option<String>>,
    tree: RwLock<MetricTree>,
    done: Mutex<bool>,
    done_cond: Condvar,
}

/// Handle to an index session.
///
/// Dropping the manager joins the background worker.
pub struct IndexManager {
    shared: Arc<SharedIndex>,
    worker: Option<JoinHandle<()>>,
}

impl IndexManager {
    /// Validates the root, creates the cache directory, and spawns the
    /// background worker that loads or builds the index.
    ///
    /// A cache directory that cannot be created is the one fatal startup
    /// error. Later failures either recover in place (bad cache triggers a
    /// rebuild, unreadable subtrees are skipped) or, when the root itself
    /// becomes unreadable before the crawl, surface through the error
    /// state and `last_error`.
    pub fn start(config: IndexConfig) -> Result<Self> {
        let metadata = fs::symlink_metadata(&config.root)
            .map_err(|_| IndexError::RootNotFound(config.root.clone()))?;
        if !metadata.is_dir() {
            return Err(IndexError::InvalidInput(format!(
                "root path {} is not a directory",
                config.root.display()
            )));
        }

        fs::create_dir_all(&config.cache_dir).map_err(|error| {
            IndexError::Internal(format!(
                "failed to create cache directory {}: {error}",
                config.cache_dir.display()
            ))
        })?;

        let shared = Arc::new(SharedIndex {
            root: config.root,
            cache_path: config.cache_dir.join(CACHE_FILE_NAME),
            state: AtomicU8::new(BuildState::Idle as u8),
            progress: BuildProgress::default(),
            last_error: Mutex::new(None),
            tree: RwLock::new(MetricTree::new()),
            done: Mutex::new(false),
            done_cond: Condvar::new(),
        });

        let worker = thread::spawn({
            let shared = shared.clone();
            move || run_session(&shared)
        });

        Ok(Self {
            shared,
            worker: Some(worker),
        })
    }

    /// True once the tree is fully built (or loaded) and queryable.
    pub fn is_ready(&self) -> bool {
        self.state() == BuildState::Ready
    }

    pub fn state(&self) -> BuildState {
        BuildState::load(&self.shared.state)
    }

    /// (entries indexed so far, total discovered).
    pub fn progress(&self) -> (usize, usize) {
        self.shared.progress.snapshot()
    }

    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().clone()
    }

    /// Unreadable subtrees skipped during the crawl, if one ran.
    pub fn crawl_errors(&self) -> usize {
        self.shared.progress.crawl_errors()
    }

    /// Blocks until the session reaches ready or error.
    pub fn wait_ready(&self) -> BuildState {
        let mut done = self.shared.done.lock();
        while !*done {
            self.shared.done_cond.wait(&mut done);
        }
        self.state()
    }

    /// Collects every entry within `threshold` of `target`.
    ///
    /// Returns an empty set while the index is still building.
    pub fn query(&self, target: &str, threshold: u32) -> Vec<Match> {
        if !self.is_ready() {
            return Vec::new();
        }
        self.shared.tree.read().query(target, threshold)
    }

    /// Finds the single closest entry to `target`.
    pub fn best_match(&self, target: &str) -> Option<Match> {
        if !self.is_ready() {
            return None;
        }
        self.shared.tree.read().best_match(target)
    }

    /// Inserts a single entry. Safe at any time thanks to per-node locking,
    /// though late additions are not persisted until the next session
    /// rebuilds.
    pub fn add(&self, entry: &str) {
        self.shared.tree.read().add(entry);
    }
}

impl Drop for IndexManager {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl std::fmt::Debug for IndexManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexManager")
            .field("root", &self.shared.root)
            .field("state", &self.state().as_str())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Background worker
// ---------------------------------------------------------------------------

fn run_session(shared: &SharedIndex) {
    if let Err(error) = build_index(shared) {
        log::error!(
            "index session failed for {}: {}",
            shared.root.display(),
            error
        );
        *shared.last_error.lock() = Some(error.to_string());
        shared
            .state
            .store(BuildState::Error as u8, Ordering::Relaxed);
    }

    let mut done = shared.done.lock();
    *done = true;
    shared.done_cond.notify_all();
}

fn build_index(shared: &SharedIndex) -> Result<()> {
    let started = Instant::now();

    if !load_cached_tree(shared) {
        crawl_and_index(shared)?;
    }

    shared
        .state
        .store(BuildState::Persisting as u8, Ordering::Relaxed);
    {
        let tree = shared.tree.read();
        // A failed cache write costs the next session a re-crawl but never
        // this one its index.
        if let Err(error) = write_cache(&tree, &shared.cache_path) {
            log::warn!(
                "cache write failed for {}: {}",
                shared.cache_path.display(),
                error
            );
        }
    }

    shared
        .state
        .store(BuildState::Ready as u8, Ordering::Relaxed);
    let (done, total) = shared.progress.snapshot();
    log::info!(
        "index ready for {}: {done}/{total} entries in {:?}",
        shared.root.display(),
        started.elapsed()
    );
    Ok(())
}

/// Attempts to restore the tree from the cache file. Any failure, from a
/// missing file to a malformed document, falls back to a rebuild.
fn load_cached_tree(shared: &SharedIndex) -> bool {
    if !shared.cache_path.exists() {
        return false;
    }
    match read_cache(&shared.cache_path) {
        Ok(tree) => {
            let entries = tree.len();
            *shared.tree.write() = tree;
            shared.progress.complete(entries);
            log::info!(
                "loaded {entries} entries from cache {}",
                shared.cache_path.display()
            );
            true
        }
        Err(error) => {
            log::warn!(
                "discarding cache {}: {}",
                shared.cache_path.display(),
                error
            );
            false
        }
    }
}

fn crawl_and_index(shared: &SharedIndex) -> Result<()> {
    shared
        .state
        .store(BuildState::Crawling as u8, Ordering::Relaxed);
    let (paths, errors) = crawl(&shared.root)?;
    shared
        .progress
        .crawl_errors
        .store(errors, Ordering::Relaxed);
    log::info!(
        "crawl of {} found {} entries ({errors} unreadable subtrees)",
        shared.root.display(),
        paths.len()
    );

    shared
        .state
        .store(BuildState::Indexing as u8, Ordering::Relaxed);
    // Start from a fresh tree in case a corrupt cache load left partial
    // state behind.
    *shared.tree.write() = MetricTree::new();
    let tree = shared.tree.read();
    index_paths(&tree, &paths, &shared.progress);
    Ok(())
}
