//! Feeds crawled paths into the metric tree.
//!
//! Inserts are dispatched in fixed-size chunks over the shared rayon pool,
//! which bounds in-flight insert work to the pool width instead of fanning
//! out one task per path. The tree's per-node locking makes the concurrent
//! inserts safe; this module only adds the dispatch bound and progress
//! accounting.

use std::sync::atomic::Ordering;

use rayon::prelude::*;

use crate::build::BuildProgress;
use crate::tree::MetricTree;

/// Paths per dispatched unit of insert work.
pub const INSERT_CHUNK: usize = 256;

/// Progress is logged every this many indexed entries.
const PROGRESS_LOG_EVERY: usize = 16_384;

/// Inserts every path into the tree, updating `progress` as it goes.
///
/// Returns once every insert has completed (rayon joins the chunk tasks;
/// there is no completion polling).
pub fn index_paths(tree: &MetricTree, paths: &[String], progress: &BuildProgress) {
    progress.reset(paths.len());

    paths.par_chunks(INSERT_CHUNK).for_each(|chunk| {
        for path in chunk {
            tree.add(path);
        }
        let done = progress.indexed.fetch_add(chunk.len(), Ordering::Relaxed) + chunk.len();
        if done % PROGRESS_LOG_EVERY < INSERT_CHUNK {
            log::debug!("indexing progress: {done}/{}", paths.len());
        }
    });
}
