//! Cache codec and persistence.
//!
//! The on-disk cache is a single JSON document mirroring the tree shape: a
//! map from an entry's data to `{ "key": <distance from its parent>,
//! "children": { ... } }`. The sentinel root carries no distance, so its
//! children map is the document root. Decoding replays the persisted edges
//! verbatim; the metric is never re-evaluated on load.
//!
//! Encode and decode fan out over rayon near the top of the tree and drop
//! to inline recursion below [`CODEC_PARALLEL_DEPTH`]; a child's subtree is
//! always fully built before it is attached to its parent. Filesystem
//! hierarchies nest arbitrarily deep, so reads go through `serde_json`'s
//! `disable_recursion_limit` escape with `serde_stacker` growing the parse
//! stack, and the decoder enforces its own [`MAX_CACHE_DEPTH`] bound
//! instead. Anything malformed (unparseable JSON, an edge key outside the
//! metric range, a duplicate edge, excessive depth) is `CacheCorrupt`, and
//! the caller falls back to a full rebuild.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{IndexError, Result};
use crate::metric::MAX_DISTANCE;
use crate::tree::{MetricNode, MetricTree};

/// Name of the cache file inside the cache directory.
pub const CACHE_FILE_NAME: &str = "cache.json";

/// Maximum accepted document nesting, sized to realistic filesystem depth.
pub const MAX_CACHE_DEPTH: usize = 4096;

/// Tree levels that encode/decode in parallel before dropping to inline
/// recursion.
const CODEC_PARALLEL_DEPTH: usize = 4;

/// Stack headroom for the inline recursion over deep distance chains.
const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW_BY: usize = 1024 * 1024;

/// The recursive persisted form of a subtree: entry data mapped to its
/// parent edge and children.
pub type CacheDoc = BTreeMap<String, CacheChild>;

#[derive(Debug, Serialize, Deserialize)]
pub struct CacheChild {
    /// Distance from this entry to its parent.
    pub key: u32,
    /// Subtree below this entry; empty for a leaf.
    pub children: CacheDoc,
}

// ---------------------------------------------------------------------------
// Encode
// ---------------------------------------------------------------------------

/// Encodes the whole tree as a cache document.
pub fn encode(tree: &MetricTree) -> CacheDoc {
    encode_children(tree.root(), 0)
}

fn encode_children(node: &Arc<MetricNode>, depth: usize) -> CacheDoc {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_BY, || {
        let edges = node.child_edges();
        if depth < CODEC_PARALLEL_DEPTH {
            edges
                .into_par_iter()
                .map(|(distance, child)| encode_edge(distance, &child, depth))
                .collect()
        } else {
            edges
                .into_iter()
                .map(|(distance, child)| encode_edge(distance, &child, depth))
                .collect()
        }
    })
}

fn encode_edge(distance: u32, child: &Arc<MetricNode>, depth: usize) -> (String, CacheChild) {
    (
        child.data().to_string(),
        CacheChild {
            key: distance,
            children: encode_children(child, depth + 1),
        },
    )
}

// ---------------------------------------------------------------------------
// Decode
// ---------------------------------------------------------------------------

/// Reconstructs a tree from a cache document.
pub fn decode(doc: &CacheDoc) -> Result<MetricTree> {
    let tree = MetricTree::new();
    decode_children(tree.root(), doc, 0)?;
    Ok(tree)
}

fn decode_children(parent: &Arc<MetricNode>, doc: &CacheDoc, depth: usize) -> Result<()> {
    if doc.is_empty() {
        return Ok(());
    }
    if depth >= MAX_CACHE_DEPTH {
        return Err(IndexError::CacheCorrupt(format!(
            "document nests deeper than {MAX_CACHE_DEPTH}"
        )));
    }

    let decoded: Vec<(u32, Arc<MetricNode>)> = stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_BY, || {
        if depth < CODEC_PARALLEL_DEPTH {
            doc.par_iter()
                .map(|(data, child)| decode_edge(data, child, depth))
                .collect::<Result<_>>()
        } else {
            doc.iter()
                .map(|(data, child)| decode_edge(data, child, depth))
                .collect::<Result<_>>()
        }
    })?;

    for (key, node) in decoded {
        if !parent.attach(key, node) {
            return Err(IndexError::CacheCorrupt(format!(
                "duplicate distance edge {key} under {:?}",
                parent.data()
            )));
        }
    }
    Ok(())
}

fn decode_edge(data: &str, child: &CacheChild, depth: usize) -> Result<(u32, Arc<MetricNode>)> {
    if child.key > MAX_DISTANCE {
        return Err(IndexError::CacheCorrupt(format!(
            "distance key {} out of range for {data:?}",
            child.key
        )));
    }
    let node = MetricNode::new(data);
    decode_children(&node, &child.children, depth + 1)?;
    Ok((child.key, node))
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

/// Writes the tree to `cache_path` atomically (temp file + rename).
pub fn write_cache(tree: &MetricTree, cache_path: &Path) -> Result<()> {
    let doc = encode(tree);

    let tmp_path = cache_path.with_extension("tmp");
    {
        let output = File::create(&tmp_path)?;
        let mut writer = BufWriter::new(output);
        let mut json = serde_json::Serializer::new(&mut writer);
        doc.serialize(serde_stacker::Serializer::new(&mut json))
            .map_err(|error| IndexError::Internal(format!("failed to encode cache: {error}")))?;
        writer.flush()?;
    }
    fs::rename(&tmp_path, cache_path)?;

    log::debug!("wrote cache to {}", cache_path.display());
    Ok(())
}

/// Loads a tree from `cache_path`.
///
/// Any malformed content yields `CacheCorrupt`; a missing file is plain
/// `Io`. The caller decides whether to rebuild.
pub fn read_cache(cache_path: &Path) -> Result<MetricTree> {
    let text = fs::read_to_string(cache_path)?;

    let mut json = serde_json::Deserializer::from_str(&text);
    json.disable_recursion_limit();
    let doc = CacheDoc::deserialize(serde_stacker::Deserializer::new(&mut json))
        .map_err(|error| IndexError::CacheCorrupt(format!("malformed cache document: {error}")))?;

    decode(&doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Asserts two trees have identical data and edge structure.
    fn assert_isomorphic(a: &MetricTree, b: &MetricTree) {
        let mut stack = vec![(a.root().clone(), b.root().clone())];
        while let Some((left, right)) = stack.pop() {
            assert_eq!(left.data(), right.data());
            let left_edges = left.child_edges();
            let right_edges = right.child_edges();
            assert_eq!(left_edges.len(), right_edges.len(), "under {:?}", left.data());
            for ((ld, lc), (rd, rc)) in left_edges.into_iter().zip(right_edges) {
                assert_eq!(ld, rd, "edge mismatch under {:?}", left.data());
                stack.push((lc, rc));
            }
        }
    }

    fn roundtrip_through_file(tree: &MetricTree) -> MetricTree {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);
        write_cache(tree, &path).unwrap();
        read_cache(&path).unwrap()
    }

    #[test]
    fn roundtrip_empty_tree() {
        let tree = MetricTree::new();
        let restored = roundtrip_through_file(&tree);
        assert!(restored.is_empty());
        assert_isomorphic(&tree, &restored);
    }

    #[test]
    fn roundtrip_small_tree() {
        let tree = MetricTree::new();
        for entry in ["findme.txt", "notit.txt", "foo.txt", "bar.rs", "baz.rs"] {
            tree.add(entry);
        }
        let restored = roundtrip_through_file(&tree);
        assert_eq!(restored.len(), 5);
        assert_isomorphic(&tree, &restored);
    }

    #[test]
    fn roundtrip_deep_chain() {
        // Deeper than the JSON parser's default recursion limit.
        let tree = MetricTree::new();
        let mut current = tree.root().clone();
        for i in 0..150 {
            let child = MetricNode::new(&format!("level-{i}"));
            assert!(current.attach(7, child.clone()));
            current = child;
        }
        let restored = roundtrip_through_file(&tree);
        assert_eq!(restored.len(), 150);
        assert_isomorphic(&tree, &restored);
    }

    #[test]
    fn unparseable_cache_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);
        fs::write(&path, "this is not json").unwrap();

        match read_cache(&path) {
            Err(IndexError::CacheCorrupt(_)) => {}
            other => panic!("expected CacheCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn missing_cache_is_io_not_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);

        match read_cache(&path) {
            Err(IndexError::Io(_)) => {}
            other => panic!("expected Io, got {other:?}"),
        }
    }

    #[test]
    fn out_of_range_key_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);
        fs::write(&path, r#"{"a.txt": {"key": 101, "children": {}}}"#).unwrap();

        match read_cache(&path) {
            Err(IndexError::CacheCorrupt(message)) => assert!(message.contains("101")),
            other => panic!("expected CacheCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn duplicate_edge_is_corrupt() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);
        fs::write(
            &path,
            r#"{"a.txt": {"key": 5, "children": {}}, "b.txt": {"key": 5, "children": {}}}"#,
        )
        .unwrap();

        match read_cache(&path) {
            Err(IndexError::CacheCorrupt(message)) => assert!(message.contains("duplicate")),
            other => panic!("expected CacheCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn overly_deep_document_is_corrupt() {
        let depth = MAX_CACHE_DEPTH + 10;
        let mut text = String::new();
        for _ in 0..depth {
            text.push_str(r#"{"n": {"key": 1, "children": "#);
        }
        text.push_str("{}");
        for _ in 0..depth {
            text.push_str("}}");
        }

        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);
        fs::write(&path, text).unwrap();

        match read_cache(&path) {
            Err(IndexError::CacheCorrupt(message)) => assert!(message.contains("deep")),
            other => panic!("expected CacheCorrupt, got {other:?}"),
        }
    }

    #[test]
    fn decoded_leaf_has_no_children() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CACHE_FILE_NAME);
        fs::write(&path, r#"{"only.txt": {"key": 42, "children": {}}}"#).unwrap();

        let tree = read_cache(&path).unwrap();
        assert_eq!(tree.len(), 1);
        let edges = tree.root().child_edges();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].0, 42);
        assert_eq!(edges[0].1.data(), "only.txt");
        assert!(edges[0].1.child_edges().is_empty());
    }
}
