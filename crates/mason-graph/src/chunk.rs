//! Chunks: strongly connected components treated as atomic build groups.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashSet as HashSet, FxHasher};
use serde::{Deserialize, Serialize};

/// A maximal set of mutually reachable nodes, compiled as one atomic unit.
///
/// A single node with no self-cycle is a degenerate chunk of size 1. Equality
/// is set equality and hashing is order-independent, so two chunks built from
/// the same nodes in different traversal orders compare and hash identically.
///
/// Invariant: a chunk is never empty; chunks of one condensation partition the
/// node set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk<N: Eq + Hash> {
    nodes: HashSet<N>,
}

impl<N: Eq + Hash> Chunk<N> {
    /// Create a degenerate chunk containing a single node.
    pub fn single(node: N) -> Self {
        let mut nodes = HashSet::default();
        nodes.insert(node);
        Self { nodes }
    }

    /// Create a chunk from a set of nodes, or `None` if the set is empty.
    pub fn from_nodes(nodes: impl IntoIterator<Item = N>) -> Option<Self> {
        let nodes: HashSet<N> = nodes.into_iter().collect();
        if nodes.is_empty() {
            None
        } else {
            Some(Self { nodes })
        }
    }

    /// Number of nodes in the chunk (always at least 1).
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always `false`; present for clippy's `len`-without-`is_empty` lint.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the chunk is a single-node degenerate chunk.
    pub fn is_single(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Whether the chunk contains the given node.
    pub fn contains(&self, node: &N) -> bool {
        self.nodes.contains(node)
    }

    /// Iterate the chunk's nodes in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &N> {
        self.nodes.iter()
    }
}

impl<N: Eq + Hash> PartialEq for Chunk<N> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl<N: Eq + Hash> Eq for Chunk<N> {}

impl<N: Eq + Hash> Hash for Chunk<N> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Order-independent: combine per-element hashes commutatively.
        let mut combined: u64 = 0;
        for node in &self.nodes {
            let mut hasher = FxHasher::default();
            node.hash(&mut hasher);
            combined = combined.wrapping_add(hasher.finish());
        }
        state.write_u64(combined);
        state.write_usize(self.nodes.len());
    }
}

impl<'a, N: Eq + Hash> IntoIterator for &'a Chunk<N> {
    type Item = &'a N;
    type IntoIter = std::collections::hash_set::Iter<'a, N>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn set_equality_ignores_order() {
        let a = Chunk::from_nodes(["x", "y", "z"]).unwrap();
        let b = Chunk::from_nodes(["z", "x", "y"]).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(Chunk::<&str>::from_nodes([]).is_none());
    }

    #[test]
    fn equal_chunks_hit_the_same_map_slot() {
        let mut map = HashMap::new();
        map.insert(Chunk::from_nodes([1, 2, 3]).unwrap(), "group");
        assert_eq!(map.get(&Chunk::from_nodes([3, 2, 1]).unwrap()), Some(&"group"));
    }

    #[test]
    fn different_sets_are_unequal() {
        let a = Chunk::from_nodes([1, 2]).unwrap();
        let b = Chunk::from_nodes([1, 2, 3]).unwrap();
        assert_ne!(a, b);
        assert!(Chunk::single(1).is_single());
        assert!(!a.is_single());
    }
}
