//! Burkhard-Keller metric tree over the partial-containment metric.
//!
//! Every node owns its entry string and a map from integer distance to child
//! node, with at most one child per distance value. An insert descends along
//! the edge matching the score between the visited node and the new entry
//! until it reaches a free slot; queries prune child edges to a window around
//! the distance computed at each visited node.
//!
//! Each node's children map sits behind its own `parking_lot::RwLock`. That
//! lock is the insert-or-descend primitive: the vacancy check and the leaf
//! creation happen inside one write-lock scope, so two inserts racing on the
//! same empty distance slot resolve to one winner creating the leaf and the
//! loser descending into it. After the build phase the tree is read-mostly
//! and the read path only takes uncontended per-node read locks.
//!
//! Traversals (insert, query, best-match, walk, drop) are iterative. Entries
//! that score identically against a shared ancestor form long single-edge
//! chains, and recursion over such chains would overflow worker stacks.

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::metric::score;

/// A node in the metric tree: one indexed entry plus its distance-keyed
/// children.
pub struct MetricNode {
    data: Box<str>,
    children: RwLock<BTreeMap<u32, Arc<MetricNode>>>,
}

impl MetricNode {
    /// Creates a detached leaf node for the given entry.
    pub fn new(data: &str) -> Arc<Self> {
        Arc::new(Self {
            data: data.into(),
            children: RwLock::new(BTreeMap::new()),
        })
    }

    /// The entry this node represents.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Snapshot of the child edges as (distance, node) pairs.
    pub(crate) fn child_edges(&self) -> Vec<(u32, Arc<MetricNode>)> {
        self.children
            .read()
            .iter()
            .map(|(distance, child)| (*distance, child.clone()))
            .collect()
    }

    /// Attaches a child at the given distance edge without re-scoring.
    ///
    /// Used by the cache decoder, which replays persisted edges verbatim.
    /// Returns false when the edge is already occupied.
    pub(crate) fn attach(&self, distance: u32, child: Arc<MetricNode>) -> bool {
        match self.children.write().entry(distance) {
            Entry::Vacant(slot) => {
                slot.insert(child);
                true
            }
            Entry::Occupied(_) => false,
        }
    }
}

impl std::fmt::Debug for MetricNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricNode")
            .field("data", &self.data)
            .field("children", &self.children.read().len())
            .finish()
    }
}

impl Drop for MetricNode {
    fn drop(&mut self) {
        // Flatten the subtree before the child Arcs unwind, so dropping a
        // deep distance chain stays O(1) in stack depth.
        let mut stack: Vec<Arc<MetricNode>> =
            std::mem::take(self.children.get_mut()).into_values().collect();
        while let Some(child) = stack.pop() {
            if let Some(mut child) = Arc::into_inner(child) {
                stack.extend(std::mem::take(child.children.get_mut()).into_values());
            }
        }
    }
}

/// A matched node and its distance from the query, produced fresh per query
/// call.
#[derive(Debug, Clone)]
pub struct Match {
    pub node: Arc<MetricNode>,
    pub distance: u32,
}

/// The index handle: owns the root sentinel and exposes insert, threshold
/// query, and best-match search.
///
/// The root is an empty-string sentinel with no parent edge; it never
/// corresponds to an indexed entry and is excluded from results.
pub struct MetricTree {
    root: Arc<MetricNode>,
}

impl MetricTree {
    /// Creates an empty tree.
    pub fn new() -> Self {
        Self {
            root: MetricNode::new(""),
        }
    }

    pub(crate) fn root(&self) -> &Arc<MetricNode> {
        &self.root
    }

    /// Inserts an entry, descending until a free distance slot is found.
    ///
    /// Equal distances never overwrite: the insert descends into the
    /// occupant and retries one level deeper.
    pub fn add(&self, entry: &str) {
        let mut current = self.root.clone();
        loop {
            let distance = score(current.data(), entry);
            let next = {
                let mut children = current.children.write();
                match children.entry(distance) {
                    Entry::Vacant(slot) => {
                        slot.insert(MetricNode::new(entry));
                        None
                    }
                    Entry::Occupied(slot) => Some(slot.get().clone()),
                }
            };
            match next {
                Some(child) => current = child,
                None => return,
            }
        }
    }

    /// Collects every entry within `threshold` of `target`, unordered.
    ///
    /// At each visited node with distance `d` to the target, only child
    /// edges in `[d - threshold, d + threshold]` are followed: a node at
    /// edge distance `e` can be no closer than `|e - d|` to the target.
    pub fn query(&self, target: &str, threshold: u32) -> Vec<Match> {
        let mut matches = Vec::new();
        let mut stack = vec![self.root.clone()];
        while let Some(node) = stack.pop() {
            let distance = score(node.data(), target);
            if distance <= threshold && !node.data().is_empty() {
                matches.push(Match {
                    node: node.clone(),
                    distance,
                });
            }
            for (edge, child) in node.child_edges() {
                if edge.saturating_add(threshold) >= distance
                    && edge <= distance.saturating_add(threshold)
                {
                    stack.push(child);
                }
            }
        }
        matches
    }

    /// Finds the single closest entry to `target`.
    ///
    /// Ties resolve to whichever candidate the traversal reaches first;
    /// callers must not assume a specific winner among equal distances.
    /// Returns `None` only for an empty tree.
    pub fn best_match(&self, target: &str) -> Option<Match> {
        let mut best: Option<Match> = None;
        let mut best_distance = u32::MAX;
        let mut stack = vec![self.root.clone()];
        while let Some(node) = stack.pop() {
            let distance = score(node.data(), target);
            if distance < best_distance && !node.data().is_empty() {
                best_distance = distance;
                best = Some(Match {
                    node: node.clone(),
                    distance,
                });
            }
            for (edge, child) in node.child_edges() {
                if edge < distance.saturating_add(best_distance) {
                    stack.push(child);
                }
            }
        }
        best
    }

    /// Visits every indexed entry (the sentinel root is skipped).
    pub fn walk<F: FnMut(&Arc<MetricNode>)>(&self, mut visit: F) {
        let mut stack: Vec<Arc<MetricNode>> =
            self.root.children.read().values().cloned().collect();
        while let Some(node) = stack.pop() {
            visit(&node);
            stack.extend(node.children.read().values().cloned());
        }
    }

    /// Number of indexed entries, by full walk.
    pub fn len(&self) -> usize {
        let mut count = 0;
        self.walk(|_| count += 1);
        count
    }

    pub fn is_empty(&self) -> bool {
        self.root.children.read().is_empty()
    }
}

impl Default for MetricTree {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MetricTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricTree")
            .field("root", &self.root)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::score;
    use rayon::prelude::*;

    #[test]
    fn inserted_entry_is_found_within_its_self_score() {
        let tree = MetricTree::new();
        for entry in ["findme.txt", "notit.txt", "foo.txt"] {
            tree.add(entry);
        }
        for entry in ["findme.txt", "notit.txt", "foo.txt"] {
            let threshold = score(entry, entry);
            let matches = tree.query(entry, threshold);
            assert!(
                matches.iter().any(|m| m.node.data() == entry),
                "{entry} missing at threshold {threshold}"
            );
        }
    }

    #[test]
    fn query_excludes_entries_beyond_threshold() {
        let tree = MetricTree::new();
        tree.add("findme.txt");
        tree.add("notit.txt");
        tree.add("foo.txt");

        // "notit" and "foo" both score exactly 50 against "findme"
        let matches = tree.query("findme", 45);
        assert!(matches.iter().any(|m| m.node.data() == "findme.txt"));
        assert!(!matches.iter().any(|m| m.node.data() == "notit.txt"));
    }

    #[test]
    fn best_match_returns_exact_entry_at_self_score() {
        let tree = MetricTree::new();
        for entry in ["alpha.rs", "beta.rs", "gamma.rs", "delta.rs"] {
            tree.add(entry);
        }
        let best = tree.best_match("gamma.rs").expect("non-empty tree");
        assert_eq!(best.node.data(), "gamma.rs");
        assert_eq!(best.distance, score("gamma.rs", "gamma.rs"));
    }

    #[test]
    fn best_match_on_empty_tree_is_none() {
        let tree = MetricTree::new();
        assert!(tree.best_match("anything").is_none());
    }

    #[test]
    fn equal_distances_chain_instead_of_overwriting() {
        let tree = MetricTree::new();
        // Every entry scores 100 against the empty sentinel, so all of
        // these land in one chain under the root. None may be lost.
        for entry in ["aa", "bb", "cc", "dd", "ee"] {
            tree.add(entry);
        }
        assert_eq!(tree.len(), 5);
    }

    #[test]
    fn walk_visits_every_entry_once() {
        let tree = MetricTree::new();
        let entries = ["one.txt", "two.txt", "three.txt", "four.txt"];
        for entry in entries {
            tree.add(entry);
        }
        let mut seen = Vec::new();
        tree.walk(|node| seen.push(node.data().to_string()));
        seen.sort();
        let mut expected: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn concurrent_inserts_lose_nothing() {
        const COUNT: usize = 10_000;
        const CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

        // Short distinct names keep the metric cheap while still forcing
        // heavy distance collisions (long chains) between the workers.
        let entries: Vec<String> = (0..COUNT)
            .map(|i| {
                let name = [
                    CHARS[i % CHARS.len()],
                    CHARS[(i / CHARS.len()) % CHARS.len()],
                    CHARS[(i / (CHARS.len() * CHARS.len())) % CHARS.len()],
                ];
                String::from_utf8_lossy(&name).into_owned()
            })
            .collect();

        let tree = MetricTree::new();
        entries.par_chunks(256).for_each(|chunk| {
            for entry in chunk {
                tree.add(entry);
            }
        });

        assert_eq!(tree.len(), COUNT);

        // Every entry must also be reachable by walk exactly once.
        let mut seen = std::collections::HashSet::new();
        tree.walk(|node| {
            assert!(seen.insert(node.data().to_string()), "duplicate node");
        });
        assert_eq!(seen.len(), COUNT);
    }

    #[test]
    fn deep_chain_drops_without_overflow() {
        let root = MetricNode::new("");
        let mut current = root.clone();
        for i in 0..50_000 {
            let child = MetricNode::new(&format!("entry-{i}"));
            assert!(current.attach(100, child.clone()));
            current = child;
        }
        drop(current);
        drop(root);
    }
}
