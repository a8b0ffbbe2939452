//! Ordering of pluggable translation stages by declared input/output types.
//!
//! Stages declare the artifact types they consume and produce; an edge is
//! derived wherever one stage consumes what another produces, and the same
//! chunk condensation used for compilation scheduling orders the result.
//! Mutually dependent stages come back as one group - the condensation
//! models cycles first-class - rather than as an error, and
//! [`StageOrder::cyclic_groups`] names them for diagnostics.

use mason_graph::{AdjacencyGraph, GraphError, build_chunk_graph};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

/// A pluggable pipeline stage with declared artifact-type sets.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    /// Artifact types this stage reads.
    pub consumes: HashSet<String>,
    /// Artifact types this stage writes.
    pub produces: HashSet<String>,
}

impl Stage {
    pub fn new(
        name: impl Into<String>,
        consumes: impl IntoIterator<Item = &'static str>,
        produces: impl IntoIterator<Item = &'static str>,
    ) -> Self {
        Self {
            name: name.into(),
            consumes: consumes.into_iter().map(str::to_owned).collect(),
            produces: produces.into_iter().map(str::to_owned).collect(),
        }
    }
}

/// Stages grouped and ordered so that producers run before consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOrder {
    /// Each group runs as a unit; groups are in dependency-first order.
    /// Names within a group are sorted for determinism.
    pub groups: Vec<Vec<String>>,
}

impl StageOrder {
    /// Groups of size greater than one: stages that mutually consume each
    /// other's outputs.
    pub fn cyclic_groups(&self) -> impl Iterator<Item = &[String]> {
        self.groups
            .iter()
            .filter(|group| group.len() > 1)
            .map(Vec::as_slice)
    }

    /// Flat stage sequence, cyclic groups in their sorted internal order.
    pub fn flatten(&self) -> Vec<&str> {
        self.groups
            .iter()
            .flat_map(|group| group.iter().map(String::as_str))
            .collect()
    }
}

/// Order stages so that every producer of a consumed type runs first.
///
/// # Errors
///
/// Only malformed-graph errors can occur, and only if stage names collide in
/// a way that breaks edge derivation; distinct names make this infallible in
/// practice.
pub fn order_stages(stages: &[Stage]) -> Result<StageOrder, GraphError> {
    let mut producers: HashMap<&str, Vec<&str>> = HashMap::default();
    for stage in stages {
        for artifact in &stage.produces {
            producers.entry(artifact.as_str()).or_default().push(stage.name.as_str());
        }
    }

    let mut graph: AdjacencyGraph<&str> = AdjacencyGraph::new();
    for stage in stages {
        graph.add_node(stage.name.as_str());
        for artifact in &stage.consumes {
            for &producer in producers.get(artifact.as_str()).into_iter().flatten() {
                if producer != stage.name {
                    graph.add_edge(stage.name.as_str(), producer);
                }
            }
        }
    }

    let chunk_graph = build_chunk_graph(&graph)?;
    let groups = chunk_graph
        .topo_order()
        .into_iter()
        .map(|c| {
            let mut names: Vec<String> = chunk_graph
                .chunk(c)
                .iter()
                .map(|name| (*name).to_owned())
                .collect();
            names.sort_unstable();
            names
        })
        .collect();

    Ok(StageOrder { groups })
}
