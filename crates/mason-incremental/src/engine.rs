//! The invalidation engine: compute the minimal rebuild set for a change set.
//!
//! Changed units are mapped to their owning chunks, chunks are processed in
//! topological order (dependencies first), and each processed unit's freshly
//! derived metadata is diffed against prior state. Observable changes route
//! dirtiness to dependents through the reverse reference index; a chunk that
//! gains a newly dirtied member after it was processed is simply re-enqueued,
//! which is safe because each unit's comparison is idempotent and the dirty
//! set only grows.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use mason_graph::{Chunk, ChunkGraph, DependencyGraph, GraphError, build_chunk_graph};
use rayon::prelude::*;
use rustc_hash::FxHashSet as HashSet;
use tracing::{debug, warn};

use crate::cancel::CancelToken;
use crate::diff::{ChangePolicy, Propagation, diff_units};
use crate::state::{BuildState, ReferenceIndex, UnitId, UnitMetadata};

/// Metadata-derivation failure reported by the compiler-driver boundary.
#[derive(Debug, thiserror::Error)]
#[error("metadata derivation failed for {unit}: {message}")]
pub struct SourceError {
    pub unit: UnitId,
    pub message: String,
}

impl SourceError {
    pub fn new(unit: UnitId, message: impl Into<String>) -> Self {
        Self {
            unit,
            message: message.into(),
        }
    }
}

/// Error types for rebuild computation.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The supplied dependency graph is malformed; the build cannot proceed.
    #[error(transparent)]
    MalformedGraph(#[from] GraphError),

    /// The metadata supplier failed for a unit.
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// The compiler-driver boundary: derive fresh build-unit metadata.
///
/// Called once per unit of each processed chunk, conceptually "compile the
/// unit and parse its output". Must be safe to call for the units of one
/// chunk in parallel.
pub trait MetadataSource: Sync {
    fn metadata_for(&self, unit: &UnitId) -> Result<UnitMetadata, SourceError>;
}

/// Directly observed file-system changes feeding one build pass.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    /// Units whose source content changed.
    pub modified: HashSet<UnitId>,
    /// Units that are new this pass.
    pub added: HashSet<UnitId>,
    /// Units whose source was deleted.
    pub removed: HashSet<UnitId>,
}

impl ChangeSet {
    /// A change set of modified units only.
    pub fn modified<I, U>(units: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<UnitId>,
    {
        Self {
            modified: units.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Whether anything changed at all.
    pub fn has_changes(&self) -> bool {
        !self.modified.is_empty() || !self.added.is_empty() || !self.removed.is_empty()
    }

    /// Units that still exist and must seed the dirty set.
    fn seeds(&self) -> impl Iterator<Item = &UnitId> {
        self.modified.iter().chain(self.added.iter())
    }
}

/// Chunks not yet processed when a pass was cancelled.
///
/// The build state is safe to resume from: it reflects exactly the chunks
/// that fully completed.
#[derive(Debug, Clone)]
pub struct ResumeToken {
    /// Pending chunks, dependency-first.
    pub pending: Vec<Chunk<UnitId>>,
}

/// Result of one rebuild computation.
#[derive(Debug)]
pub struct RebuildOutcome {
    /// Units that must be recompiled.
    pub recompile: HashSet<UnitId>,
    /// Persisted artifact paths to delete, sorted and deduplicated.
    pub delete: Vec<String>,
    /// Chunks processed, in completion order (a valid compilation order).
    pub groups: Vec<Chunk<UnitId>>,
    /// Present iff the pass was cancelled before finishing.
    pub resume: Option<ResumeToken>,
}

impl RebuildOutcome {
    /// Whether nothing needs to happen.
    pub fn is_empty(&self) -> bool {
        self.recompile.is_empty() && self.delete.is_empty()
    }
}

/// Compute which units must be rebuilt for `changes`, and which artifacts to
/// delete.
///
/// `state` is updated in place: deleted units leave it, and every unit of a
/// processed chunk has its entry replaced by the freshly derived metadata
/// once that chunk's propagation step completes. Running the engine again
/// with an empty change set therefore yields an empty outcome.
///
/// Missing prior state for a changed unit is not an error: the unit is
/// unconditionally dirty and recompiled without a comparison (fail open).
///
/// # Errors
///
/// [`EngineError::MalformedGraph`] if the graph has dangling edges;
/// [`EngineError::Source`] if metadata derivation fails for a unit.
pub fn compute_rebuild<G, S, P>(
    graph: &G,
    state: &mut BuildState,
    changes: &ChangeSet,
    source: &S,
    policy: &P,
    cancel: &CancelToken,
) -> Result<RebuildOutcome, EngineError>
where
    G: DependencyGraph<UnitId>,
    S: MetadataSource,
    P: ChangePolicy,
{
    let chunk_graph = build_chunk_graph(graph)?;
    let order = chunk_graph.topo_order();
    let mut rank = vec![usize::MAX; chunk_graph.len()];
    for (position, &chunk) in order.iter().enumerate() {
        rank[chunk] = position;
    }

    // The reverse index is built from prior state before any mutation, so
    // propagation follows the edges that existed when dependents were last
    // compiled.
    let index = ReferenceIndex::from_state(state);

    let mut recompile: HashSet<UnitId> = HashSet::default();
    let mut delete: Vec<String> = Vec::new();
    let mut dirty: HashSet<UnitId> = HashSet::default();

    // Deleted sources: drop their artifacts and state, dirty their dependents.
    for unit in &changes.removed {
        match state.remove(unit) {
            Some(prior) => {
                delete.extend(prior.artifacts.iter().cloned());
                for target in dependents_of_deleted(&index, &prior) {
                    dirty.insert(target.clone());
                }
            }
            None => {
                warn!(unit = %unit, "deleted unit had no prior state; nothing to invalidate");
            }
        }
    }

    // Seed the worklist with the chunks owning directly changed units.
    let mut queue: BinaryHeap<Reverse<(usize, usize)>> = BinaryHeap::new();
    let mut queued: HashSet<usize> = HashSet::default();
    let enqueue = |unit: &UnitId,
                   queue: &mut BinaryHeap<Reverse<(usize, usize)>>,
                   queued: &mut HashSet<usize>,
                   recompile: &mut HashSet<UnitId>| {
        match chunk_graph.chunk_of(unit) {
            Some(chunk) => {
                if queued.insert(chunk) {
                    queue.push(Reverse((rank[chunk], chunk)));
                }
            }
            None => {
                // The unit is gone from the current graph; recompiling it is
                // all we can do, and fail-open is the safe direction.
                warn!(unit = %unit, "changed unit is not in the dependency graph");
                recompile.insert(unit.clone());
            }
        }
    };

    for unit in changes.seeds() {
        if state.get(unit).is_none() && !changes.added.contains(unit) {
            warn!(unit = %unit, "no prior state for changed unit; assuming dirty");
        }
        dirty.insert(unit.clone());
        enqueue(unit, &mut queue, &mut queued, &mut recompile);
    }
    for unit in dirty.iter() {
        if !changes.removed.contains(unit) {
            enqueue(unit, &mut queue, &mut queued, &mut recompile);
        }
    }

    let mut groups: Vec<Chunk<UnitId>> = Vec::new();
    let mut processed: HashSet<usize> = HashSet::default();

    while let Some(Reverse((_, chunk_index))) = queue.pop() {
        queued.remove(&chunk_index);

        if cancel.is_cancelled() {
            let resume = drain_pending(&chunk_graph, chunk_index, &mut queue, &rank);
            debug!(pending = resume.pending.len(), "pass cancelled at chunk boundary");
            return Ok(RebuildOutcome {
                recompile,
                delete: finish_delete(delete),
                groups,
                resume: Some(resume),
            });
        }

        let chunk = chunk_graph.chunk(chunk_index);
        let members: Vec<UnitId> = chunk
            .iter()
            .filter(|unit| !changes.removed.contains(*unit))
            .cloned()
            .collect();

        // The whole chunk recompiles as one atomic unit.
        recompile.extend(members.iter().cloned());

        // Fresh metadata for the chunk's members, derived in parallel.
        let fresh: Vec<(UnitId, UnitMetadata)> = members
            .par_iter()
            .map(|unit| source.metadata_for(unit).map(|meta| (unit.clone(), meta)))
            .collect::<Result<_, SourceError>>()?;

        // Diff against prior state, collect propagation targets.
        let mut newly_dirty: Vec<UnitId> = Vec::new();
        for (unit, metadata) in &fresh {
            match state.get(unit) {
                None => {
                    if !changes.added.contains(unit) {
                        warn!(unit = %unit, "missing prior state; recompiling without comparison");
                    }
                }
                Some(prior) => {
                    let diff = diff_units(unit, prior, metadata);
                    if diff.is_noop() {
                        debug!(unit = %unit, "no observable change");
                        continue;
                    }
                    for change in &diff.changes {
                        route(policy.propagation(change), change, &index, &mut newly_dirty);
                    }
                }
            }
        }

        // State writes land only after the chunk's propagation step is done.
        for (unit, metadata) in fresh {
            state.insert(&unit, metadata);
        }

        if processed.insert(chunk_index) {
            groups.push(chunk.clone());
        }

        for unit in newly_dirty {
            if dirty.insert(unit.clone()) {
                enqueue(&unit, &mut queue, &mut queued, &mut recompile);
            }
        }
    }

    debug!(
        recompile = recompile.len(),
        delete = delete.len(),
        groups = groups.len(),
        "rebuild set computed"
    );

    Ok(RebuildOutcome {
        recompile,
        delete: finish_delete(delete),
        groups,
        resume: None,
    })
}

/// Everything that must go dirty when a unit disappears: class referencers,
/// referencers of every member, and subclasses.
fn dependents_of_deleted<'a>(
    index: &'a ReferenceIndex,
    prior: &UnitMetadata,
) -> impl Iterator<Item = &'a UnitId> {
    let class = prior.declaration.id;
    let members: Vec<_> = prior
        .fields
        .iter()
        .map(|f| f.id)
        .chain(prior.methods.iter().map(|m| m.id))
        .collect();

    index
        .class_referencers(class)
        .chain(index.subclasses_of(class))
        .chain(
            members
                .into_iter()
                .flat_map(move |member| index.member_referencers(class, member)),
        )
}

fn route(
    propagation: Propagation,
    change: &crate::diff::MemberChange,
    index: &ReferenceIndex,
    out: &mut Vec<UnitId>,
) {
    use crate::diff::MemberChange;

    let member = match change {
        MemberChange::FieldConstantChanged { field, .. }
        | MemberChange::FieldChanged { field }
        | MemberChange::FieldRemoved { field }
        | MemberChange::FieldAdded { field } => Some(*field),
        MemberChange::MethodSignatureChanged { method, .. }
        | MemberChange::MethodChanged { method, .. }
        | MemberChange::MethodRemoved { method, .. }
        | MemberChange::MethodAdded { method, .. } => Some(*method),
        MemberChange::ClassReplaced { .. } => None,
    };

    match propagation {
        Propagation::None => {}
        Propagation::MemberReferencers { subclasses } => {
            if let Some(member) = member {
                out.extend(index.member_referencers(member.owner, member.id).cloned());
                if subclasses {
                    out.extend(index.subclasses_of(member.owner).cloned());
                }
            }
        }
        Propagation::Subclasses => {
            if let Some(member) = member {
                out.extend(index.subclasses_of(member.owner).cloned());
            }
        }
        Propagation::ClassReferencers => {
            let class = match change {
                MemberChange::ClassReplaced { class } => *class,
                _ => match member {
                    Some(member) => member.owner,
                    None => return,
                },
            };
            out.extend(index.class_referencers(class).cloned());
            out.extend(index.subclasses_of(class).cloned());
        }
    }
}

fn drain_pending(
    chunk_graph: &ChunkGraph<UnitId>,
    current: usize,
    queue: &mut BinaryHeap<Reverse<(usize, usize)>>,
    rank: &[usize],
) -> ResumeToken {
    let mut pending_indices: Vec<usize> = vec![current];
    while let Some(Reverse((_, chunk))) = queue.pop() {
        pending_indices.push(chunk);
    }
    pending_indices.sort_unstable_by_key(|&c| rank[c]);
    pending_indices.dedup();
    ResumeToken {
        pending: pending_indices
            .into_iter()
            .map(|c| chunk_graph.chunk(c).clone())
            .collect(),
    }
}

fn finish_delete(mut delete: Vec<String>) -> Vec<String> {
    delete.sort_unstable();
    delete.dedup();
    delete
}
