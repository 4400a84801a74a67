//! # BK-Tree
//!
//! Burkhard-Keller tree over hex hashes under Hamming distance.
//!
//! ## How It Works
//! 1. The first hash inserted becomes the root
//! 2. Every other node hangs off its parent under the exact distance between them
//! 3. A range query at node distance `d` only needs children keyed `k` with
//!    `|k - d| <= max_distance` (triangle inequality), everything else is pruned
//!
//! Nodes live in an arena owned by the tree. Insert and search walk it with an
//! explicit stack, so very deep trees on large libraries cannot overflow the call
//! stack.

use super::hamming::hamming_distance;
use std::collections::BTreeMap;

/// Arena index of a node
type NodeId = usize;

#[derive(Debug, Clone)]
struct Node<T> {
    hash: String,
    id: T,
    children: BTreeMap<u32, NodeId>,
}

/// BK-tree mapping hashes to caller ids
#[derive(Debug, Clone)]
pub struct BkTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T: Copy> BkTree<T> {
    /// Create an empty tree
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Insert a hash. Duplicate hashes are kept as distance-0 children.
    pub fn add(&mut self, hash: &str, id: T) {
        let new_id = self.nodes.len();
        let node = Node {
            hash: hash.to_string(),
            id,
            children: BTreeMap::new(),
        };

        if self.nodes.is_empty() {
            self.nodes.push(node);
            return;
        }

        let mut current = 0;
        loop {
            let distance = hamming_distance(&self.nodes[current].hash, hash);
            match self.nodes[current].children.get(&distance) {
                Some(&child) => current = child,
                None => {
                    self.nodes[current].children.insert(distance, new_id);
                    self.nodes.push(node);
                    return;
                }
            }
        }
    }

    /// All `(id, distance)` pairs whose hash lies within `max_distance` of `query`.
    ///
    /// Order is unspecified.
    pub fn search(&self, query: &str, max_distance: u32) -> Vec<(T, u32)> {
        let mut matches = Vec::new();
        if self.nodes.is_empty() {
            return matches;
        }

        let mut stack: Vec<NodeId> = vec![0];
        while let Some(current) = stack.pop() {
            let node = &self.nodes[current];
            let distance = hamming_distance(&node.hash, query);

            if distance <= max_distance {
                matches.push((node.id, distance));
            }

            let low = distance.saturating_sub(max_distance);
            let high = distance.saturating_add(max_distance);
            stack.extend(node.children.range(low..=high).map(|(_, &child)| child));
        }

        matches
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    /// Longest root-to-leaf path, counted in nodes
    pub fn depth(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }

        let mut deepest = 0;
        let mut stack = vec![(0, 1)];
        while let Some((current, level)) = stack.pop() {
            deepest = deepest.max(level);
            for &child in self.nodes[current].children.values() {
                stack.push((child, level + 1));
            }
        }
        deepest
    }
}

impl<T: Copy> Default for BkTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted_ids(mut matches: Vec<(i64, u32)>) -> Vec<i64> {
        matches.sort();
        matches.into_iter().map(|(id, _)| id).collect()
    }

    #[test]
    fn empty_tree_returns_nothing() {
        let tree: BkTree<i64> = BkTree::new();
        assert!(tree.is_empty());
        assert!(tree.search("ff00ff00", 64).is_empty());
    }

    #[test]
    fn first_insert_becomes_root() {
        let mut tree = BkTree::new();
        tree.add("ff00ff00", 1i64);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.search("ff00ff00", 0), vec![(1, 0)]);
    }

    #[test]
    fn range_query_excludes_distant_hashes() {
        let mut tree = BkTree::new();
        tree.add("ff00ff00", 1i64);
        tree.add("ff00ff01", 2);
        tree.add("ff00f000", 4);

        let matches = tree.search("ff00ff00", 1);

        assert_eq!(sorted_ids(matches), vec![1, 2]);
    }

    #[test]
    fn duplicate_hashes_are_all_returned_at_zero() {
        let mut tree = BkTree::new();
        tree.add("abcd", 1i64);
        tree.add("abcd", 2);
        tree.add("abcd", 3);
        tree.add("abce", 4);

        let matches = tree.search("abcd", 0);

        assert_eq!(sorted_ids(matches), vec![1, 2, 3]);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn reported_distances_are_exact() {
        let mut tree = BkTree::new();
        tree.add("00", 1i64);
        tree.add("0f", 2);
        tree.add("ff", 3);

        let mut matches = tree.search("00", 8);
        matches.sort();

        assert_eq!(matches, vec![(1, 0), (2, 4), (3, 8)]);
    }

    #[test]
    fn malformed_hashes_never_match() {
        let mut tree = BkTree::new();
        tree.add("ff", 1i64);
        tree.add("xyz", 2);

        assert_eq!(sorted_ids(tree.search("ff", 8)), vec![1]);
        assert!(tree.search("nothex", u32::MAX - 1).is_empty());
    }

    #[test]
    fn clear_empties_tree() {
        let mut tree = BkTree::new();
        tree.add("ff", 1i64);
        tree.clear();
        assert!(tree.is_empty());
        assert_eq!(tree.depth(), 0);
    }

    #[test]
    fn depth_tracks_chain_length() {
        let mut tree = BkTree::new();
        tree.add("00", 1i64);
        tree.add("01", 2); // distance 1 from root
        tree.add("03", 3); // distance 2 from root
        tree.add("11", 4); // distance 2 from root, then 2 from "03"

        assert_eq!(tree.depth(), 3);
    }
}
