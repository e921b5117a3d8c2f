//! Fuzzy filesystem path index.
//!
//! This crate builds a Burkhard-Keller metric tree over every file and
//! directory path beneath a root, scored by a partial-substring-containment
//! metric, and answers approximate-match queries fast enough for
//! search-as-you-type:
//! - Parallel crawling with a bounded fan-out depth
//! - Concurrent tree population behind per-node insert-or-descend locks
//! - Threshold and best-match queries with distance-window pruning
//! - A recursive JSON cache so later sessions skip the crawl

pub mod build;
pub mod cache;
pub mod crawl;
pub mod error;
pub mod indexer;
pub mod manager;
pub mod metric;
pub mod tree;

// Re-export main types
pub use build::{BuildProgress, BuildState};
pub use cache::{decode, encode, read_cache, write_cache, CacheChild, CacheDoc, MAX_CACHE_DEPTH};
pub use crawl::{crawl, FANOUT_DEPTH_BUDGET};
pub use error::{IndexError, Result};
pub use indexer::{index_paths, INSERT_CHUNK};
pub use manager::{IndexConfig, IndexManager};
pub use metric::{score, MAX_DISTANCE};
pub use tree::{Match, MetricNode, MetricTree};
