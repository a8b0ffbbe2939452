//! Condensation of a dependency graph into an acyclic graph of chunks.
//!
//! Two nodes land in the same [`Chunk`] iff each is reachable from the other
//! through the `incoming` relation; the induced chunk graph is acyclic by
//! construction, so topological scheduling over it never has to reason about
//! cycles.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fmt;
use std::hash::Hash;

use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::chunk::Chunk;
use crate::graph::{DependencyGraph, GraphError};

/// Acyclic graph of [`Chunk`]s produced by [`build_chunk_graph`].
///
/// Chunks are addressed by index into [`ChunkGraph::chunks`]. An edge from
/// chunk `Ca` to `Cb` exists iff some node of `Ca` lists a node of `Cb` among
/// its incoming edges, i.e. `Ca` depends on `Cb`.
#[derive(Debug, Clone)]
pub struct ChunkGraph<N: Eq + Hash> {
    chunks: Vec<Chunk<N>>,
    /// Per chunk: the chunks it depends on (its incoming edges), ascending.
    dependencies: Vec<Vec<usize>>,
    /// Per chunk: the chunks depending on it, ascending.
    dependents: Vec<Vec<usize>>,
    membership: HashMap<N, usize>,
}

impl<N: Eq + Hash> ChunkGraph<N> {
    /// All chunks. Index positions are stable for the lifetime of the graph.
    pub fn chunks(&self) -> &[Chunk<N>] {
        &self.chunks
    }

    /// The chunk at `index`.
    pub fn chunk(&self, index: usize) -> &Chunk<N> {
        &self.chunks[index]
    }

    /// Number of chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether the graph has no chunks.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Index of the chunk owning `node`, if the node was part of the input.
    pub fn chunk_of(&self, node: &N) -> Option<usize> {
        self.membership.get(node).copied()
    }

    /// Chunks the given chunk depends on.
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.dependencies[index]
    }

    /// Chunks depending on the given chunk.
    pub fn dependents(&self, index: usize) -> &[usize] {
        &self.dependents[index]
    }

    /// Chunks with no dependencies.
    pub fn sources(&self) -> Vec<usize> {
        (0..self.chunks.len())
            .filter(|&c| self.dependencies[c].is_empty())
            .collect()
    }

    /// Deterministic topological order: every chunk appears after all chunks
    /// it depends on. Ties are broken by ascending chunk index.
    pub fn topo_order(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = (0..self.chunks.len())
            .filter(|&c| remaining[c] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(self.chunks.len());
        while let Some(Reverse(c)) = ready.pop() {
            order.push(c);
            for &d in &self.dependents[c] {
                remaining[d] -= 1;
                if remaining[d] == 0 {
                    ready.push(Reverse(d));
                }
            }
        }

        debug_assert_eq!(order.len(), self.chunks.len(), "chunk graph must be acyclic");
        order
    }
}

/// Condense a dependency graph into its acyclic chunk graph.
///
/// Runs Tarjan's strongly-connected-component algorithm over the `incoming`
/// relation. The resulting partition is order-independent; only chunk
/// iteration order may vary between equivalent inputs, and callers must not
/// depend on it beyond set membership.
///
/// # Errors
///
/// Returns [`GraphError::DanglingEdge`] if any `incoming` list names a node
/// absent from `nodes()`.
pub fn build_chunk_graph<N, G>(graph: &G) -> Result<ChunkGraph<N>, GraphError>
where
    N: Clone + Eq + Hash + fmt::Debug,
    G: DependencyGraph<N>,
{
    let nodes = graph.nodes();
    let mut index_of: HashMap<&N, usize> = HashMap::default();
    for (i, node) in nodes.iter().enumerate() {
        index_of.insert(node, i);
    }

    // Successor lists over the incoming relation, with dangling-edge checks.
    let mut successors: Vec<Vec<usize>> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let mut list = Vec::new();
        for dep in graph.incoming(node) {
            match index_of.get(dep) {
                Some(&i) => list.push(i),
                None => {
                    return Err(GraphError::DanglingEdge {
                        node: format!("{node:?}"),
                        reference: format!("{dep:?}"),
                    });
                }
            }
        }
        successors.push(list);
    }

    let sccs = tarjan_sccs(nodes.len(), &successors);

    // Chunk per SCC, membership map from node to owning chunk.
    let mut chunk_index = vec![usize::MAX; nodes.len()];
    let mut chunks = Vec::with_capacity(sccs.len());
    for (ci, scc) in sccs.iter().enumerate() {
        for &n in scc {
            chunk_index[n] = ci;
        }
        let chunk = Chunk::from_nodes(scc.iter().map(|&n| nodes[n].clone()))
            .unwrap_or_else(|| unreachable!("Tarjan never yields an empty component"));
        chunks.push(chunk);
    }

    let mut membership = HashMap::default();
    for (n, node) in nodes.iter().enumerate() {
        membership.insert(node.clone(), chunk_index[n]);
    }

    // Condensed edges, deduplicated and self-loops dropped.
    let mut dependency_sets: Vec<HashSet<usize>> = vec![HashSet::default(); chunks.len()];
    for (n, succ) in successors.iter().enumerate() {
        let cn = chunk_index[n];
        for &s in succ {
            let cs = chunk_index[s];
            if cn != cs {
                dependency_sets[cn].insert(cs);
            }
        }
    }

    let mut dependencies: Vec<Vec<usize>> = Vec::with_capacity(chunks.len());
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); chunks.len()];
    for (c, set) in dependency_sets.into_iter().enumerate() {
        let mut deps: Vec<usize> = set.into_iter().collect();
        deps.sort_unstable();
        for &d in &deps {
            dependents[d].push(c);
        }
        dependencies.push(deps);
    }
    for list in &mut dependents {
        list.sort_unstable();
    }

    Ok(ChunkGraph {
        chunks,
        dependencies,
        dependents,
        membership,
    })
}

/// Iterative Tarjan SCC decomposition.
///
/// Components come out in reverse topological order of the successor relation,
/// which for our incoming-edge convention means dependencies before
/// dependents.
fn tarjan_sccs(node_count: usize, successors: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let mut index = vec![UNVISITED; node_count];
    let mut lowlink = vec![0usize; node_count];
    let mut on_stack = vec![false; node_count];
    let mut scc_stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut sccs: Vec<Vec<usize>> = Vec::new();

    // (node, next successor position) call frames, recursion made explicit to
    // stay safe on deep dependency chains.
    let mut frames: Vec<(usize, usize)> = Vec::new();

    for root in 0..node_count {
        if index[root] != UNVISITED {
            continue;
        }
        frames.push((root, 0));

        while let Some(frame) = frames.last_mut() {
            let v = frame.0;
            if frame.1 == 0 {
                index[v] = next_index;
                lowlink[v] = next_index;
                next_index += 1;
                scc_stack.push(v);
                on_stack[v] = true;
            }

            if frame.1 < successors[v].len() {
                let w = successors[v][frame.1];
                frame.1 += 1;
                if index[w] == UNVISITED {
                    frames.push((w, 0));
                } else if on_stack[w] {
                    lowlink[v] = lowlink[v].min(index[w]);
                }
            } else {
                frames.pop();
                if let Some(&(parent, _)) = frames.last() {
                    lowlink[parent] = lowlink[parent].min(lowlink[v]);
                }
                if lowlink[v] == index[v] {
                    let mut component = Vec::new();
                    loop {
                        let w = scc_stack.pop().unwrap_or_else(|| {
                            unreachable!("SCC stack always holds the component root")
                        });
                        on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    sccs.push(component);
                }
            }
        }
    }

    sccs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::AdjacencyGraph;

    fn graph(edges: &[(&'static str, &[&'static str])]) -> AdjacencyGraph<&'static str> {
        let mut g = AdjacencyGraph::new();
        for (node, deps) in edges {
            g.add_node(*node);
            for dep in *deps {
                g.add_edge(*node, *dep);
            }
        }
        g
    }

    fn chunk_for<'a>(cg: &'a ChunkGraph<&'static str>, node: &'static str) -> &'a Chunk<&'static str> {
        cg.chunk(cg.chunk_of(&node).unwrap())
    }

    #[test]
    fn two_cycles_condense_into_a_chain() {
        // a <- (b <-> c) <- (d <-> e)
        let g = graph(&[
            ("a", &[]),
            ("b", &["a", "c"]),
            ("c", &["b"]),
            ("d", &["c", "e"]),
            ("e", &["d"]),
        ]);
        let cg = build_chunk_graph(&g).unwrap();

        assert_eq!(cg.len(), 3);
        assert_eq!(chunk_for(&cg, "a"), &Chunk::single("a"));
        assert_eq!(chunk_for(&cg, "b"), &Chunk::from_nodes(["b", "c"]).unwrap());
        assert_eq!(chunk_for(&cg, "d"), &Chunk::from_nodes(["d", "e"]).unwrap());

        let ca = cg.chunk_of(&"a").unwrap();
        let cbc = cg.chunk_of(&"b").unwrap();
        let cde = cg.chunk_of(&"d").unwrap();
        assert!(cg.dependencies(ca).is_empty());
        assert_eq!(cg.dependencies(cbc), &[ca]);
        assert_eq!(cg.dependencies(cde), &[cbc]);
    }

    #[test]
    fn three_cycle_with_tail() {
        // (a -> b -> c -> a) and d depending on c.
        let g = graph(&[
            ("a", &["b", "c"]),
            ("b", &["a"]),
            ("c", &["b"]),
            ("d", &["c"]),
        ]);
        let cg = build_chunk_graph(&g).unwrap();

        assert_eq!(cg.len(), 2);
        assert_eq!(
            chunk_for(&cg, "a"),
            &Chunk::from_nodes(["a", "b", "c"]).unwrap()
        );
        assert_eq!(chunk_for(&cg, "d"), &Chunk::single("d"));

        let cabc = cg.chunk_of(&"a").unwrap();
        let cd = cg.chunk_of(&"d").unwrap();
        assert!(cg.dependencies(cabc).is_empty());
        assert_eq!(cg.dependencies(cd), &[cabc]);
        assert_eq!(cg.dependents(cabc), &[cd]);
    }

    #[test]
    fn topo_order_puts_dependencies_first() {
        let g = graph(&[
            ("a", &[]),
            ("b", &["a", "c"]),
            ("c", &["b"]),
            ("d", &["c", "e"]),
            ("e", &["d"]),
        ]);
        let cg = build_chunk_graph(&g).unwrap();
        let order = cg.topo_order();
        assert_eq!(order.len(), cg.len());

        let position: Vec<usize> = {
            let mut pos = vec![0; cg.len()];
            for (i, &c) in order.iter().enumerate() {
                pos[c] = i;
            }
            pos
        };
        for c in 0..cg.len() {
            for &dep in cg.dependencies(c) {
                assert!(position[dep] < position[c], "dependency must come first");
            }
        }
    }

    #[test]
    fn self_loop_is_a_single_chunk() {
        let mut g = AdjacencyGraph::new();
        g.add_edge("a", "a");
        let cg = build_chunk_graph(&g).unwrap();
        assert_eq!(cg.len(), 1);
        assert_eq!(cg.chunk(0), &Chunk::single("a"));
        assert!(cg.dependencies(0).is_empty());
    }

    #[test]
    fn empty_graph_condenses_to_nothing() {
        let g: AdjacencyGraph<&str> = AdjacencyGraph::new();
        let cg = build_chunk_graph(&g).unwrap();
        assert!(cg.is_empty());
        assert!(cg.topo_order().is_empty());
    }

    #[test]
    fn dangling_edge_is_a_hard_error() {
        let mut g = AdjacencyGraph::new();
        g.add_node("a");
        g.add_raw_edge("a", "ghost");
        let err = build_chunk_graph(&g).unwrap_err();
        assert!(matches!(err, GraphError::DanglingEdge { .. }));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn sources_are_dependency_free_chunks() {
        let g = graph(&[("a", &[]), ("b", &["a"]), ("c", &[])]);
        let cg = build_chunk_graph(&g).unwrap();
        let sources = cg.sources();
        assert_eq!(sources.len(), 2);
        for s in sources {
            assert!(cg.dependencies(s).is_empty());
        }
    }
}
