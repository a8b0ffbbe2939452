//! Prior build state: per-unit metadata keyed by unit path.
//!
//! The state store is a [`PathMap`] so that prefix-shaped operations (state
//! for everything under one source root) stay proportional to subtree size,
//! and so the whole store round-trips losslessly through a flat list of
//! `(path, metadata)` pairs for cross-session persistence.

use std::fmt;
use std::sync::Arc;

use mason_graph::{
    DeclId, DeclarationInfo, FieldInfo, MemberReferenceInfo, MethodInfo, PathMap, ReferenceInfo,
};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Delimiter unit paths are split on inside the state store.
pub(crate) const PATH_DELIMITER: char = '/';

/// Identifier of a compilation unit: its delimiter-separated source path.
///
/// Cheap to clone; equality is value equality of the path string.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(Arc<str>);

impl UnitId {
    /// Create a unit id from a path-like string.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(path.as_ref()))
    }

    /// The unit's path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UnitId({})", self.0)
    }
}

impl From<&str> for UnitId {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Everything the engine knows about one compiled unit.
///
/// Created when a unit's compiled output is parsed, held in [`BuildState`]
/// until superseded by a newer parse of the same unit, and discarded when the
/// unit is deleted or the whole state is invalidated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitMetadata {
    /// The unit's own class declaration.
    pub declaration: DeclarationInfo,
    /// Class ids of direct supertypes, for routing hierarchy-sensitive
    /// propagation to subclasses.
    pub supertypes: SmallVec<[DeclId; 2]>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    /// Classes this unit references.
    pub class_references: Vec<ReferenceInfo>,
    /// Class members this unit references.
    pub member_references: Vec<MemberReferenceInfo>,
    /// Persisted artifact paths produced from this unit; deleted when the
    /// unit is deleted.
    pub artifacts: Vec<String>,
}

impl UnitMetadata {
    /// Metadata for a unit declaring `class_id` and nothing else yet.
    pub fn new(class_id: DeclId) -> Self {
        Self {
            declaration: DeclarationInfo::new(class_id),
            supertypes: SmallVec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            class_references: Vec::new(),
            member_references: Vec::new(),
            artifacts: Vec::new(),
        }
    }
}

/// Aggregate counts over a [`BuildState`], for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateStatistics {
    pub units: usize,
    pub fields: usize,
    pub methods: usize,
    pub references: usize,
}

/// The single shared mutable structure of a build session: prior metadata for
/// every known unit, keyed by unit path.
///
/// Within one pass, a unit's prior entry is always read (for the diff) before
/// being overwritten with the freshly derived metadata.
#[derive(Debug, Clone)]
pub struct BuildState {
    map: PathMap<UnitMetadata>,
}

impl BuildState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self {
            map: PathMap::new(PATH_DELIMITER),
        }
    }

    /// Prior metadata for a unit, if any.
    pub fn get(&self, unit: &UnitId) -> Option<&UnitMetadata> {
        self.map.get(unit.as_str())
    }

    /// Store fresh metadata for a unit, returning the superseded entry.
    pub fn insert(&mut self, unit: &UnitId, metadata: UnitMetadata) -> Option<UnitMetadata> {
        self.map.put(unit.as_str(), metadata)
    }

    /// Drop a unit's entry, returning it.
    pub fn remove(&mut self, unit: &UnitId) -> Option<UnitMetadata> {
        self.map.remove(unit.as_str())
    }

    /// Number of known units.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether no unit is known.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterate all `(unit, metadata)` entries in deterministic store order.
    pub fn units(&self) -> impl Iterator<Item = (UnitId, &UnitMetadata)> {
        self.map.entries().map(|(path, meta)| (UnitId::new(path), meta))
    }

    /// Flat `(path, metadata)` pairs for persistence.
    pub fn to_entries(&self) -> Vec<(String, UnitMetadata)> {
        self.map.entries().map(|(path, meta)| (path, meta.clone())).collect()
    }

    /// Rebuild a state from persisted flat pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, UnitMetadata)>) -> Self {
        Self {
            map: PathMap::from_entries(PATH_DELIMITER, entries),
        }
    }

    /// Aggregate counts, for logging.
    pub fn statistics(&self) -> StateStatistics {
        let mut stats = StateStatistics {
            units: 0,
            fields: 0,
            methods: 0,
            references: 0,
        };
        for (_, meta) in self.map.entries() {
            stats.units += 1;
            stats.fields += meta.fields.len();
            stats.methods += meta.methods.len();
            stats.references += meta.class_references.len() + meta.member_references.len();
        }
        stats
    }
}

impl Default for BuildState {
    fn default() -> Self {
        Self::new()
    }
}

/// Reverse index over a [`BuildState`]: who references what, and who
/// subclasses whom.
///
/// Built once per pass from the prior state, before any state mutation, so
/// propagation always routes along the edges that existed when the changed
/// code was last compiled.
#[derive(Debug, Default)]
pub struct ReferenceIndex {
    class_referencers: HashMap<DeclId, HashSet<UnitId>>,
    member_referencers: HashMap<(DeclId, DeclId), HashSet<UnitId>>,
    subclasses: HashMap<DeclId, HashSet<UnitId>>,
}

impl ReferenceIndex {
    /// Build the index from every unit currently in the state.
    pub fn from_state(state: &BuildState) -> Self {
        let mut index = Self::default();
        for (unit, meta) in state.units() {
            for reference in &meta.class_references {
                index
                    .class_referencers
                    .entry(reference.class)
                    .or_default()
                    .insert(unit.clone());
            }
            for reference in &meta.member_references {
                index
                    .member_referencers
                    .entry((reference.owner, reference.member))
                    .or_default()
                    .insert(unit.clone());
            }
            for &supertype in &meta.supertypes {
                index.subclasses.entry(supertype).or_default().insert(unit.clone());
            }
        }
        index
    }

    /// Units holding a class reference to `class`.
    pub fn class_referencers(&self, class: DeclId) -> impl Iterator<Item = &UnitId> {
        self.class_referencers.get(&class).into_iter().flatten()
    }

    /// Units holding a member reference to `(owner, member)`.
    pub fn member_referencers(&self, owner: DeclId, member: DeclId) -> impl Iterator<Item = &UnitId> {
        self.member_referencers.get(&(owner, member)).into_iter().flatten()
    }

    /// Units listing `class` among their supertypes.
    pub fn subclasses_of(&self, class: DeclId) -> impl Iterator<Item = &UnitId> {
        self.subclasses.get(&class).into_iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mason_graph::NameId;

    fn unit_with_field_ref(class: u32, target_owner: u32, target_member: u32) -> UnitMetadata {
        let mut meta = UnitMetadata::new(DeclId(class));
        meta.member_references
            .push(MemberReferenceInfo::new(DeclId(target_owner), DeclId(target_member)));
        meta.class_references.push(ReferenceInfo::new(DeclId(target_owner)));
        meta
    }

    #[test]
    fn insert_get_remove_round_trip() {
        let mut state = BuildState::new();
        let unit = UnitId::new("src/com/example/App");
        assert!(state.get(&unit).is_none());

        state.insert(&unit, UnitMetadata::new(DeclId(1)));
        assert_eq!(state.len(), 1);
        assert_eq!(state.get(&unit).unwrap().declaration.id, DeclId(1));

        let removed = state.remove(&unit).unwrap();
        assert_eq!(removed.declaration.id, DeclId(1));
        assert!(state.is_empty());
    }

    #[test]
    fn overwrite_returns_superseded_entry() {
        let mut state = BuildState::new();
        let unit = UnitId::new("src/A");
        state.insert(&unit, UnitMetadata::new(DeclId(1)));
        let old = state.insert(&unit, UnitMetadata::new(DeclId(2))).unwrap();
        assert_eq!(old.declaration.id, DeclId(1));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn entries_round_trip() {
        let mut state = BuildState::new();
        state.insert(&UnitId::new("src/A"), UnitMetadata::new(DeclId(1)));
        state.insert(&UnitId::new("src/util/B"), UnitMetadata::new(DeclId(2)));

        let rebuilt = BuildState::from_entries(state.to_entries());
        assert_eq!(rebuilt.len(), 2);
        assert_eq!(
            rebuilt.get(&UnitId::new("src/util/B")).unwrap().declaration.id,
            DeclId(2)
        );
    }

    #[test]
    fn reference_index_routes_referencers_and_subclasses() {
        let mut state = BuildState::new();
        let target = UnitId::new("src/Target");
        let user = UnitId::new("src/User");
        let sub = UnitId::new("src/Sub");

        let mut target_meta = UnitMetadata::new(DeclId(10));
        target_meta
            .fields
            .push(FieldInfo::new(DeclId(11), NameId(1), NameId(2)));
        state.insert(&target, target_meta);
        state.insert(&user, unit_with_field_ref(20, 10, 11));

        let mut sub_meta = UnitMetadata::new(DeclId(30));
        sub_meta.supertypes.push(DeclId(10));
        state.insert(&sub, sub_meta);

        let index = ReferenceIndex::from_state(&state);
        let referencers: Vec<_> = index.member_referencers(DeclId(10), DeclId(11)).collect();
        assert_eq!(referencers, vec![&user]);
        let class_refs: Vec<_> = index.class_referencers(DeclId(10)).collect();
        assert_eq!(class_refs, vec![&user]);
        let subs: Vec<_> = index.subclasses_of(DeclId(10)).collect();
        assert_eq!(subs, vec![&sub]);
        assert_eq!(index.member_referencers(DeclId(99), DeclId(1)).count(), 0);
    }

    #[test]
    fn statistics_count_members() {
        let mut state = BuildState::new();
        let mut meta = UnitMetadata::new(DeclId(1));
        meta.fields.push(FieldInfo::new(DeclId(2), NameId(1), NameId(2)));
        meta.methods.push(MethodInfo::new(DeclId(3), NameId(3), NameId(4)));
        meta.class_references.push(ReferenceInfo::new(DeclId(9)));
        state.insert(&UnitId::new("src/A"), meta);

        let stats = state.statistics();
        assert_eq!(stats.units, 1);
        assert_eq!(stats.fields, 1);
        assert_eq!(stats.methods, 1);
        assert_eq!(stats.references, 1);
    }
}
