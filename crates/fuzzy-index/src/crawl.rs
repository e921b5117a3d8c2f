//! Parallel directory crawling.
//!
//! Produces the flat list of entries to index: every file and every
//! directory under the root (directories are both indexed and recursed
//! into). Subdirectory walks fan out as rayon tasks near the top of the
//! tree; past the depth budget the walk continues inline on the current
//! worker so very deep or very wide trees cannot spawn one task per
//! directory.
//!
//! Unreadable directories (permissions, vanished paths, broken mounts) are
//! counted and skipped; a bad subtree never aborts the crawl.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::error::Result;

/// How many directory levels fan out as independently scheduled tasks
/// before the walk continues inline.
pub const FANOUT_DEPTH_BUDGET: usize = 6;

/// Crawls `root`, returning every file and directory path beneath it plus
/// the number of unreadable subtrees that were skipped.
///
/// The root itself is not an entry; its contents are. Symlinks become
/// entries but are never followed. A root that cannot be read at all is an
/// error; unreadable directories below it are skipped and counted.
pub fn crawl(root: &Path) -> Result<(Vec<String>, usize)> {
    let errors = AtomicUsize::new(0);
    let mut entries = Vec::new();
    let read_dir = fs::read_dir(root)?;
    walk_entries(read_dir, FANOUT_DEPTH_BUDGET, &errors, &mut entries);
    Ok((entries, errors.load(Ordering::Relaxed)))
}

fn walk_dir(dir: &Path, budget: usize, errors: &AtomicUsize, out: &mut Vec<String>) {
    match fs::read_dir(dir) {
        Ok(read_dir) => walk_entries(read_dir, budget, errors, out),
        Err(error) => {
            errors.fetch_add(1, Ordering::Relaxed);
            log::debug!("skipping unreadable directory {}: {}", dir.display(), error);
        }
    }
}

fn walk_entries(read_dir: fs::ReadDir, budget: usize, errors: &AtomicUsize, out: &mut Vec<String>) {
    let mut subdirs = Vec::new();
    for entry in read_dir.filter_map(std::result::Result::ok) {
        let path = entry.path();
        // file_type() does not follow symlinks, so a symlinked directory is
        // indexed as an entry but not recursed into.
        let Ok(file_type) = entry.file_type() else {
            errors.fetch_add(1, Ordering::Relaxed);
            continue;
        };
        out.push(path.to_string_lossy().into_owned());
        if file_type.is_dir() {
            subdirs.push(path);
        }
    }

    if budget == 0 {
        for sub in subdirs {
            walk_dir(&sub, 0, errors, out);
        }
    } else {
        let nested: Vec<Vec<String>> = subdirs
            .into_par_iter()
            .map(|sub| {
                let mut collected = Vec::new();
                walk_dir(&sub, budget - 1, errors, &mut collected);
                collected
            })
            .collect();
        for mut chunk in nested {
            out.append(&mut chunk);
        }
    }
}
