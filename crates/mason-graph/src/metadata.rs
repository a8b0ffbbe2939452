//! Build-unit metadata value objects.
//!
//! These types describe what a compiled unit declares and what it references,
//! as extracted from compiled output. They are the unit of before/after
//! comparison that drives invalidation, and they double as map keys: identity
//! is the stable integer id assigned at parse time, never the auxiliary
//! payload. Two `FieldInfo`s with the same id are *equal* even when their
//! constant values differ - the diff layer compares payload explicitly,
//! while lookups by id always hit the same slot.

use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Stable id of a declared class, field, or method, assigned at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeclId(pub u32);

/// Interned-name id for identifiers, type descriptors, and signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NameId(pub u32);

/// A declared member identified by its stable id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclarationInfo {
    pub id: DeclId,
}

impl DeclarationInfo {
    pub fn new(id: DeclId) -> Self {
        Self { id }
    }
}

/// A declaration scoped to its owning class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberDeclarationInfo {
    pub owner: DeclId,
    pub id: DeclId,
}

impl MemberDeclarationInfo {
    pub fn new(owner: DeclId, id: DeclId) -> Self {
        Self { owner, id }
    }
}

/// A use-site reference to a class.
///
/// Equality is id equality alone, independent of how many times or where the
/// reference occurs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceInfo {
    pub class: DeclId,
}

impl ReferenceInfo {
    pub fn new(class: DeclId) -> Self {
        Self { class }
    }
}

/// A use-site reference to a class member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberReferenceInfo {
    pub owner: DeclId,
    pub member: DeclId,
}

impl MemberReferenceInfo {
    pub fn new(owner: DeclId, member: DeclId) -> Self {
        Self { owner, member }
    }
}

/// A compile-time constant, or the empty sentinel for "not a constant".
///
/// Full value equality; doubles are compared by bit pattern so the type stays
/// `Eq` and constant-folding dependents are invalidated exactly when the
/// stored value changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConstantValue {
    /// Not a compile-time constant.
    #[default]
    Empty,
    Integer(i64),
    /// IEEE-754 bit pattern; see [`ConstantValue::double`].
    Double(u64),
    Boolean(bool),
    Char(char),
    Str(String),
}

impl ConstantValue {
    /// The "not a constant" sentinel.
    pub const EMPTY: ConstantValue = ConstantValue::Empty;

    /// Wrap a floating-point constant.
    pub fn double(value: f64) -> Self {
        ConstantValue::Double(value.to_bits())
    }

    /// The wrapped floating-point value, if this is a double constant.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            ConstantValue::Double(bits) => Some(f64::from_bits(*bits)),
            _ => None,
        }
    }

    /// Whether this is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        matches!(self, ConstantValue::Empty)
    }
}

/// A declared field: identity plus auxiliary payload.
///
/// Equality and hashing use the id only. The remaining attributes are the
/// payload the diff layer compares member-by-member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldInfo {
    pub id: DeclId,
    pub name: NameId,
    /// Type descriptor id.
    pub descriptor: NameId,
    pub access_flags: u32,
    pub constant: ConstantValue,
    /// Opaque annotation payload ids.
    pub annotations: SmallVec<[NameId; 2]>,
}

impl FieldInfo {
    pub fn new(id: DeclId, name: NameId, descriptor: NameId) -> Self {
        Self {
            id,
            name,
            descriptor,
            access_flags: 0,
            constant: ConstantValue::Empty,
            annotations: SmallVec::new(),
        }
    }

    pub fn with_constant(mut self, constant: ConstantValue) -> Self {
        self.constant = constant;
        self
    }

    pub fn with_access_flags(mut self, flags: u32) -> Self {
        self.access_flags = flags;
        self
    }
}

impl PartialEq for FieldInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for FieldInfo {}

impl Hash for FieldInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A declared method: identity plus auxiliary payload.
///
/// Equality and hashing use the id only, like [`FieldInfo`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodInfo {
    pub id: DeclId,
    pub name: NameId,
    /// Return-type descriptor id.
    pub descriptor: NameId,
    /// Parameter-signature ids, in declaration order.
    pub signature: SmallVec<[NameId; 4]>,
    /// Declared-throws ids.
    pub throws: SmallVec<[NameId; 2]>,
    pub access_flags: u32,
    pub annotations: SmallVec<[NameId; 2]>,
    /// Caller-supplied flag: this member participates in override resolution,
    /// so observable changes to it must reach subclasses. The engine routes
    /// the flag without interpreting it.
    pub hierarchy_sensitive: bool,
}

impl MethodInfo {
    pub fn new(id: DeclId, name: NameId, descriptor: NameId) -> Self {
        Self {
            id,
            name,
            descriptor,
            signature: SmallVec::new(),
            throws: SmallVec::new(),
            access_flags: 0,
            annotations: SmallVec::new(),
            hierarchy_sensitive: false,
        }
    }

    pub fn with_signature(mut self, signature: impl IntoIterator<Item = NameId>) -> Self {
        self.signature = signature.into_iter().collect();
        self
    }

    pub fn with_throws(mut self, throws: impl IntoIterator<Item = NameId>) -> Self {
        self.throws = throws.into_iter().collect();
        self
    }

    pub fn with_access_flags(mut self, flags: u32) -> Self {
        self.access_flags = flags;
        self
    }

    pub fn hierarchy_sensitive(mut self) -> Self {
        self.hierarchy_sensitive = true;
        self
    }
}

impl PartialEq for MethodInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for MethodInfo {}

impl Hash for MethodInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashMap as HashMap;

    #[test]
    fn field_identity_ignores_payload() {
        let plain = FieldInfo::new(DeclId(7), NameId(1), NameId(2));
        let decorated = FieldInfo::new(DeclId(7), NameId(9), NameId(9))
            .with_constant(ConstantValue::Integer(42))
            .with_access_flags(0x19);
        assert_eq!(plain, decorated);

        let mut map = HashMap::default();
        map.insert(plain, "slot");
        assert_eq!(map.get(&decorated), Some(&"slot"));
    }

    #[test]
    fn method_identity_ignores_signature() {
        let a = MethodInfo::new(DeclId(3), NameId(1), NameId(2));
        let b = MethodInfo::new(DeclId(3), NameId(1), NameId(2))
            .with_signature([NameId(5), NameId(6)])
            .hierarchy_sensitive();
        assert_eq!(a, b);

        let mut map = HashMap::default();
        map.insert(b, 1);
        assert_eq!(map.get(&a), Some(&1));
    }

    #[test]
    fn member_declaration_pairs_owner_and_id() {
        let a = MemberDeclarationInfo::new(DeclId(1), DeclId(2));
        let b = MemberDeclarationInfo::new(DeclId(1), DeclId(2));
        let other_owner = MemberDeclarationInfo::new(DeclId(9), DeclId(2));
        assert_eq!(a, b);
        assert_ne!(a, other_owner);
    }

    #[test]
    fn constant_values_compare_by_value() {
        assert_eq!(ConstantValue::Integer(1), ConstantValue::Integer(1));
        assert_ne!(ConstantValue::Integer(1), ConstantValue::Integer(2));
        assert_eq!(ConstantValue::double(1.5), ConstantValue::double(1.5));
        assert_ne!(ConstantValue::double(1.5), ConstantValue::double(2.5));
        assert_eq!(
            ConstantValue::Str("x".into()),
            ConstantValue::Str("x".into())
        );
        assert!(ConstantValue::EMPTY.is_empty());
        assert_ne!(ConstantValue::EMPTY, ConstantValue::Integer(0));
    }

    #[test]
    fn double_round_trips_through_bits() {
        let c = ConstantValue::double(3.25);
        assert_eq!(c.as_double(), Some(3.25));
        assert_eq!(ConstantValue::Integer(1).as_double(), None);
    }
}
