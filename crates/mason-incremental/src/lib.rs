//! # mason-incremental
//!
//! The invalidation engine: given a dependency graph, the prior build state,
//! and a set of changed compilation units, decide which units must be rebuilt,
//! in what order, and which persisted artifacts to delete.
//!
//! Built on [`mason_graph`]: changed units are grouped into dependency chunks
//! (strongly connected components), chunks are walked in topological order,
//! and each unit's freshly derived metadata is compared member-by-member
//! against the stored prior state. Only observable changes - as judged by an
//! explicit [`ChangePolicy`] - propagate dirtiness to dependents; a recompile
//! that alters nothing observable stops the wave (the no-op optimization).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use mason_incremental::{ChangeSet, CancelToken, StandardPolicy, compute_rebuild};
//!
//! let outcome = compute_rebuild(
//!     &graph,
//!     &mut state,
//!     &ChangeSet::modified(["src/com/example/Config"]),
//!     &my_metadata_source,
//!     &StandardPolicy,
//!     &CancelToken::new(),
//! )?;
//! for unit in &outcome.recompile {
//!     println!("recompile {unit}");
//! }
//! ```
//!
//! ## Safety model
//!
//! A full rebuild is always a safe superset of the required work, and it is
//! the designed recovery path: corrupt persisted state is discarded wholesale
//! ([`persist::load_or_rebuild`]), and missing prior metadata makes a unit
//! unconditionally dirty. The engine never silently under-approximates.

pub mod cancel;
pub mod diff;
pub mod engine;
pub mod persist;
pub mod stages;
pub mod state;

#[cfg(feature = "logging")]
pub mod logging;

pub use cancel::CancelToken;
pub use diff::{ChangePolicy, MemberChange, Propagation, StandardPolicy, UnitDiff, diff_units};
pub use engine::{
    ChangeSet, EngineError, MetadataSource, RebuildOutcome, ResumeToken, SourceError,
    compute_rebuild,
};
pub use persist::{PersistError, StateLoad, load_or_rebuild, load_state, save_state};
pub use stages::{Stage, StageOrder, order_stages};
pub use state::{BuildState, ReferenceIndex, StateStatistics, UnitId, UnitMetadata};

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
