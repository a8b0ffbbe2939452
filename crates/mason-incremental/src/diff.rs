//! Member-by-member metadata comparison and the change-observability policy.
//!
//! The diff layer answers one question: after recompiling a unit, which of its
//! declarations changed in a way dependents can observe? Which attribute
//! changes count as observable is policy, not mechanism, so the boundary
//! lives in an explicit, testable [`ChangePolicy`] predicate instead of being
//! hard-coded inside the comparison loop.

use mason_graph::{ConstantValue, DeclId, FieldInfo, MemberDeclarationInfo, MethodInfo};
use rustc_hash::{FxHashMap as HashMap, FxHashSet as HashSet};

use crate::state::{UnitId, UnitMetadata};

/// One observable-or-not change to a unit's declarations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberChange {
    /// A field's compile-time constant changed value.
    FieldConstantChanged {
        field: MemberDeclarationInfo,
        from: ConstantValue,
        to: ConstantValue,
    },
    /// A field's descriptor, access flags, or annotations changed.
    FieldChanged { field: MemberDeclarationInfo },
    FieldRemoved { field: MemberDeclarationInfo },
    FieldAdded { field: MemberDeclarationInfo },
    /// A method's parameter or throws signature changed.
    MethodSignatureChanged {
        method: MemberDeclarationInfo,
        hierarchy_sensitive: bool,
    },
    /// A method's descriptor, access flags, or annotations changed.
    MethodChanged {
        method: MemberDeclarationInfo,
        hierarchy_sensitive: bool,
    },
    MethodRemoved {
        method: MemberDeclarationInfo,
        hierarchy_sensitive: bool,
    },
    MethodAdded {
        method: MemberDeclarationInfo,
        hierarchy_sensitive: bool,
    },
    /// The unit's own class declaration id changed: the class was replaced.
    ClassReplaced { class: DeclId },
}

/// Where a change's dirtiness must travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Propagation {
    /// Not externally observable: no dependent is invalidated.
    None,
    /// Units holding a member reference to the changed member; subclasses of
    /// the owner too when `subclasses` is set.
    MemberReferencers { subclasses: bool },
    /// Only subclasses of the owning class.
    Subclasses,
    /// Units holding a class reference to the owning class.
    ClassReferencers,
}

/// The explicit observability boundary (policy, not mechanism).
///
/// Every change found by [`diff_units`] passes through this predicate;
/// tightening or loosening what counts as externally observable is an edit
/// here, never in the engine's comparison loop.
pub trait ChangePolicy {
    fn propagation(&self, change: &MemberChange) -> Propagation;
}

/// Default policy.
///
/// Observable: constant values, signatures, descriptors, access flags,
/// annotation payload, member removal. Member additions propagate only
/// through the hierarchy (a new method can capture an override); everything
/// identical under those attributes is a no-op change and propagates nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPolicy;

impl ChangePolicy for StandardPolicy {
    fn propagation(&self, change: &MemberChange) -> Propagation {
        match change {
            MemberChange::FieldConstantChanged { .. } => {
                Propagation::MemberReferencers { subclasses: false }
            }
            MemberChange::FieldChanged { .. } | MemberChange::FieldRemoved { .. } => {
                Propagation::MemberReferencers { subclasses: false }
            }
            MemberChange::FieldAdded { .. } => Propagation::None,
            MemberChange::MethodSignatureChanged {
                hierarchy_sensitive, ..
            }
            | MemberChange::MethodChanged {
                hierarchy_sensitive, ..
            }
            | MemberChange::MethodRemoved {
                hierarchy_sensitive, ..
            } => Propagation::MemberReferencers {
                subclasses: *hierarchy_sensitive,
            },
            MemberChange::MethodAdded {
                hierarchy_sensitive, ..
            } => {
                if *hierarchy_sensitive {
                    Propagation::Subclasses
                } else {
                    Propagation::None
                }
            }
            MemberChange::ClassReplaced { .. } => Propagation::ClassReferencers,
        }
    }
}

/// All changes between one unit's prior and fresh metadata.
///
/// An empty change list is the no-op case: the unit was recompiled but
/// nothing observable moved, so the dirtiness wave stops here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDiff {
    pub unit: UnitId,
    pub changes: Vec<MemberChange>,
}

impl UnitDiff {
    /// Whether the recompile changed nothing observable.
    pub fn is_noop(&self) -> bool {
        self.changes.is_empty()
    }
}

/// Compare prior and fresh metadata for one unit.
///
/// Members are matched by declaration identity: the id-only equality of
/// [`FieldInfo`]/[`MethodInfo`] lets prior members be indexed by the value
/// itself and looked up with the fresh instance, payload differences
/// notwithstanding.
pub fn diff_units(unit: &UnitId, prior: &UnitMetadata, fresh: &UnitMetadata) -> UnitDiff {
    let mut changes = Vec::new();
    let owner = fresh.declaration.id;

    if prior.declaration.id != fresh.declaration.id {
        changes.push(MemberChange::ClassReplaced {
            class: prior.declaration.id,
        });
    }

    diff_fields(prior.declaration.id, prior, fresh, &mut changes);
    diff_methods(owner, prior, fresh, &mut changes);

    UnitDiff {
        unit: unit.clone(),
        changes,
    }
}

fn diff_fields(
    prior_owner: DeclId,
    prior: &UnitMetadata,
    fresh: &UnitMetadata,
    changes: &mut Vec<MemberChange>,
) {
    let prior_by_id: HashMap<&FieldInfo, &FieldInfo> =
        prior.fields.iter().map(|f| (f, f)).collect();

    for field in &fresh.fields {
        let member = MemberDeclarationInfo::new(fresh.declaration.id, field.id);
        match prior_by_id.get(field) {
            None => changes.push(MemberChange::FieldAdded { field: member }),
            Some(old) => {
                if old.constant != field.constant {
                    changes.push(MemberChange::FieldConstantChanged {
                        field: member,
                        from: old.constant.clone(),
                        to: field.constant.clone(),
                    });
                }
                if old.descriptor != field.descriptor
                    || old.access_flags != field.access_flags
                    || old.annotations != field.annotations
                {
                    changes.push(MemberChange::FieldChanged { field: member });
                }
            }
        }
    }

    let fresh_ids: HashSet<&FieldInfo> = fresh.fields.iter().collect();
    for field in &prior.fields {
        if !fresh_ids.contains(field) {
            changes.push(MemberChange::FieldRemoved {
                field: MemberDeclarationInfo::new(prior_owner, field.id),
            });
        }
    }
}

fn diff_methods(
    owner: DeclId,
    prior: &UnitMetadata,
    fresh: &UnitMetadata,
    changes: &mut Vec<MemberChange>,
) {
    let prior_by_id: HashMap<&MethodInfo, &MethodInfo> =
        prior.methods.iter().map(|m| (m, m)).collect();

    for method in &fresh.methods {
        let member = MemberDeclarationInfo::new(owner, method.id);
        let sensitive = method.hierarchy_sensitive;
        match prior_by_id.get(method) {
            None => changes.push(MemberChange::MethodAdded {
                method: member,
                hierarchy_sensitive: sensitive,
            }),
            Some(old) => {
                let sensitive = sensitive || old.hierarchy_sensitive;
                if old.signature != method.signature || old.throws != method.throws {
                    changes.push(MemberChange::MethodSignatureChanged {
                        method: member,
                        hierarchy_sensitive: sensitive,
                    });
                }
                if old.descriptor != method.descriptor
                    || old.access_flags != method.access_flags
                    || old.annotations != method.annotations
                {
                    changes.push(MemberChange::MethodChanged {
                        method: member,
                        hierarchy_sensitive: sensitive,
                    });
                }
            }
        }
    }

    let fresh_ids: HashSet<&MethodInfo> = fresh.methods.iter().collect();
    for method in &prior.methods {
        if !fresh_ids.contains(method) {
            changes.push(MemberChange::MethodRemoved {
                method: MemberDeclarationInfo::new(prior.declaration.id, method.id),
                hierarchy_sensitive: method.hierarchy_sensitive,
            });
        }
    }
}
