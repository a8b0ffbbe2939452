//! The dependency-graph view consumed by the condensation builder.
//!
//! The engine never asks for outgoing edges: `incoming(node)` lists the nodes
//! a given node depends on, and everything else is derived from that relation.

use std::hash::Hash;

use rustc_hash::FxHashMap as HashMap;

/// Error types for graph construction and condensation.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// An `incoming` list names a node that is absent from `nodes()`.
    ///
    /// This is a programmer error in the graph supplier; the build cannot
    /// proceed on a graph with dangling edges.
    #[error("malformed graph: node {node} lists unknown dependency {reference}")]
    DanglingEdge {
        /// The node whose incoming list contains the dangling reference.
        node: String,
        /// The referenced node that does not exist.
        reference: String,
    },
}

/// Immutable view of a directed dependency graph.
///
/// `incoming(n)` returns the nodes `n` depends on, i.e. edge direction mirrors
/// the depends-on relationship. Suppliers define the iteration order of
/// `nodes()`; consumers must not rely on it beyond set membership.
pub trait DependencyGraph<N> {
    /// All nodes, in supplier-defined order.
    fn nodes(&self) -> &[N];

    /// The nodes `node` depends on. Empty for unknown nodes.
    fn incoming(&self, node: &N) -> &[N];
}

/// Insertion-ordered adjacency-list graph.
///
/// The default [`DependencyGraph`] implementation, suitable for building a
/// graph from file-system or compiler-driver notifications. Nodes keep their
/// insertion order; edges may reference nodes that were never added, which is
/// reported as [`GraphError::DanglingEdge`] at condensation time rather than
/// silently dropped.
#[derive(Debug, Clone)]
pub struct AdjacencyGraph<N> {
    nodes: Vec<N>,
    index: HashMap<N, usize>,
    incoming: HashMap<N, Vec<N>>,
}

impl<N: Clone + Eq + Hash> AdjacencyGraph<N> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::default(),
            incoming: HashMap::default(),
        }
    }

    /// Add a node. Returns `false` if it was already present.
    pub fn add_node(&mut self, node: N) -> bool {
        if self.index.contains_key(&node) {
            return false;
        }
        self.index.insert(node.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Record that `node` depends on `dependency`.
    ///
    /// Both endpoints are added as nodes if not yet present. Duplicate edges
    /// are kept out of the incoming list.
    pub fn add_edge(&mut self, node: N, dependency: N) {
        self.add_node(node.clone());
        self.add_node(dependency.clone());
        let list = self.incoming.entry(node).or_default();
        if !list.contains(&dependency) {
            list.push(dependency);
        }
    }

    /// Record a dependency edge without registering its endpoints.
    ///
    /// Used by suppliers that fill in edges from a separate source than the
    /// node set; a reference to a node never added surfaces as
    /// [`GraphError::DanglingEdge`] when the graph is condensed.
    pub fn add_raw_edge(&mut self, node: N, dependency: N) {
        self.incoming.entry(node).or_default().push(dependency);
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph has no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the node has been added.
    pub fn contains(&self, node: &N) -> bool {
        self.index.contains_key(node)
    }
}

impl<N> Default for AdjacencyGraph<N> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::default(),
            incoming: HashMap::default(),
        }
    }
}

impl<N: Clone + Eq + Hash> DependencyGraph<N> for AdjacencyGraph<N> {
    fn nodes(&self) -> &[N] {
        &self.nodes
    }

    fn incoming(&self, node: &N) -> &[N] {
        self.incoming.get(node).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insertion_order_is_preserved() {
        let mut g = AdjacencyGraph::new();
        g.add_node("c");
        g.add_node("a");
        g.add_node("b");
        g.add_node("a");
        assert_eq!(g.nodes(), &["c", "a", "b"]);
    }

    #[test]
    fn edges_deduplicate_and_autoregister() {
        let mut g = AdjacencyGraph::new();
        g.add_edge("b", "a");
        g.add_edge("b", "a");
        assert_eq!(g.incoming(&"b"), &["a"]);
        assert!(g.contains(&"a"));
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn unknown_node_has_no_incoming() {
        let g: AdjacencyGraph<&str> = AdjacencyGraph::new();
        assert!(g.incoming(&"missing").is_empty());
    }

    #[test]
    fn raw_edge_keeps_dangling_reference() {
        let mut g = AdjacencyGraph::new();
        g.add_node("a");
        g.add_raw_edge("a", "ghost");
        // The dangling reference survives until condensation reports it.
        assert_eq!(g.incoming(&"a"), &["ghost"]);
        assert!(!g.contains(&"ghost"));
    }
}
