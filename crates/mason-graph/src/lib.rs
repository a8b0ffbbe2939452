//! # mason-graph
//!
//! Pure data structures for incremental-build dependency analysis.
//!
//! This crate provides the graph primitives the mason engine is built on,
//! without any I/O or compiler-driver logic:
//!
//! - **Graph abstraction**: a minimal [`DependencyGraph`] view (`nodes` +
//!   `incoming`) plus an insertion-ordered [`AdjacencyGraph`] implementation
//!   for suppliers and tests.
//! - **Chunk condensation**: [`build_chunk_graph`] collapses every strongly
//!   connected component of a possibly-cyclic graph into a [`Chunk`], yielding
//!   an acyclic [`ChunkGraph`] with a derived topological order.
//! - **Hierarchical path map**: [`PathMap`], a segment trie over
//!   delimiter-separated keys with an explicit per-map interner.
//! - **Build-unit metadata**: comparable, hashable value objects describing
//!   compiled declarations and use-site references ([`metadata`]).
//!
//! ## Quick start
//!
//! ```rust
//! use mason_graph::{AdjacencyGraph, build_chunk_graph};
//!
//! # fn main() -> Result<(), mason_graph::GraphError> {
//! let mut graph = AdjacencyGraph::new();
//! graph.add_edge("b", "a"); // b depends on a
//! graph.add_edge("a", "b"); // and a on b: one cyclic chunk
//! graph.add_edge("c", "a");
//!
//! let chunks = build_chunk_graph(&graph)?;
//! assert_eq!(chunks.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread safety
//!
//! All structures here are plain owned data. Share them behind `Arc` for
//! concurrent reads; mutation requires exclusive access.

pub mod chunk;
pub mod condense;
pub mod graph;
pub mod metadata;
pub mod path_map;

pub use chunk::Chunk;
pub use condense::{ChunkGraph, build_chunk_graph};
pub use graph::{AdjacencyGraph, DependencyGraph, GraphError};
pub use metadata::{
    ConstantValue, DeclId, DeclarationInfo, FieldInfo, MemberDeclarationInfo, MemberReferenceInfo,
    MethodInfo, NameId, ReferenceInfo,
};
pub use path_map::{PathMap, SegmentInterner};

/// Result type alias for graph operations.
pub type Result<T> = std::result::Result<T, GraphError>;
