//! This module contains the lattice of abstract facts that the engine
//! attaches to values within a memory state.
//!
//! A [`Fact`] is a product of four component lattices: nullability,
//! constancy, numeric range, and a reference type constraint. `meet` narrows
//! a fact on a branch, `join` widens two facts at a merge point, and the
//! `bottom` sentinel means "provably unreachable".
//!
//! `join` is commutative, associative, and monotone (it never produces a
//! result more precise than either input); this monotonicity is what lets
//! the fixpoint scheduler terminate on cyclic control flow.

use crate::value::ConstantValue;

/// A handle to a type in the program's [`TypeHierarchy`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TypeId(pub u32);

/// The class hierarchy that reference-type constraints are resolved against.
///
/// The hierarchy is supplied by the front end together with the program; the
/// engine only ever queries it, never extends it. Single inheritance is
/// assumed, matching the source domain.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TypeHierarchy {
    /// The parent of each type, indexed by [`TypeId`]; roots have no parent.
    parents: Vec<Option<TypeId>>,
}

impl TypeHierarchy {
    /// Constructs a new, empty type hierarchy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a root type with no supertype, returning its handle.
    pub fn add_root(&mut self) -> TypeId {
        self.add(None)
    }

    /// Adds a subtype of `parent`, returning its handle.
    pub fn add_subtype(&mut self, parent: TypeId) -> TypeId {
        self.add(Some(parent))
    }

    fn add(&mut self, parent: Option<TypeId>) -> TypeId {
        let id = TypeId(
            u32::try_from(self.parents.len())
                .expect("Type hierarchy should not exceed u32::MAX entries"),
        );
        self.parents.push(parent);
        id
    }

    /// Gets the number of types in the hierarchy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    /// Checks if the hierarchy contains no types.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Checks whether `tp` names a type in this hierarchy.
    #[must_use]
    pub fn contains(&self, tp: TypeId) -> bool {
        (tp.0 as usize) < self.parents.len()
    }

    /// Checks whether `sub` is `sup` or one of its transitive subtypes.
    #[must_use]
    pub fn is_subtype(&self, sub: TypeId, sup: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(tp) = current {
            if tp == sup {
                return true;
            }
            current = self.parents.get(tp.0 as usize).copied().flatten();
        }
        false
    }

    /// Computes the most specific common supertype of `a` and `b`, if the two
    /// are related at all.
    #[must_use]
    pub fn common_supertype(&self, a: TypeId, b: TypeId) -> Option<TypeId> {
        let mut current = Some(a);
        while let Some(tp) = current {
            if self.is_subtype(b, tp) {
                return Some(tp);
            }
            current = self.parents.get(tp.0 as usize).copied().flatten();
        }
        None
    }
}

/// The nullability component of a fact.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Nullability {
    /// The value is provably the null reference.
    Null,

    /// The value is provably not null.
    NotNull,

    /// Nothing is known about the value's nullability; the top element.
    Unknown,

    /// No nullability is possible; the bottom element.
    Bottom,
}

impl Nullability {
    /// Narrows `self` against `other`, returning the intersection of the two.
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        use Nullability::{Bottom, NotNull, Null, Unknown};
        match (self, other) {
            (Bottom, _) | (_, Bottom) | (Null, NotNull) | (NotNull, Null) => Bottom,
            (Unknown, x) | (x, Unknown) => x,
            (Null, Null) => Null,
            (NotNull, NotNull) => NotNull,
        }
    }

    /// Widens `self` with `other`, returning the union of the two.
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        use Nullability::{Bottom, NotNull, Null, Unknown};
        match (self, other) {
            (Unknown, _) | (_, Unknown) | (Null, NotNull) | (NotNull, Null) => Unknown,
            (Bottom, x) | (x, Bottom) => x,
            (Null, Null) => Null,
            (NotNull, NotNull) => NotNull,
        }
    }
}

/// The constancy component of a fact.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Constancy {
    /// The value is not known to be any particular constant; the top element.
    Top,

    /// The value is provably this constant.
    Const(ConstantValue),

    /// No constant is possible; the bottom element.
    Bottom,
}

impl Constancy {
    /// Narrows `self` against `other`.
    #[must_use]
    pub fn meet(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Bottom, _) | (_, Self::Bottom) => Self::Bottom,
            (Self::Top, x) | (x, Self::Top) => x.clone(),
            (Self::Const(a), Self::Const(b)) => {
                if a == b {
                    Self::Const(a.clone())
                } else {
                    Self::Bottom
                }
            }
        }
    }

    /// Widens `self` with `other`.
    #[must_use]
    pub fn join(&self, other: &Self) -> Self {
        match (self, other) {
            (Self::Top, _) | (_, Self::Top) => Self::Top,
            (Self::Bottom, x) | (x, Self::Bottom) => x.clone(),
            (Self::Const(a), Self::Const(b)) => {
                if a == b {
                    Self::Const(a.clone())
                } else {
                    Self::Top
                }
            }
        }
    }
}

/// The numeric range component of a fact, an inclusive interval over `i64`.
///
/// An interval with `lo > hi` is the empty (bottom) range; the full interval
/// is the top element. All arithmetic here is overflow-aware: any operation
/// that could overflow widens to the full range rather than wrapping.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValueRange {
    lo: i64,
    hi: i64,
}

impl ValueRange {
    /// The full range; the top element.
    pub const FULL: Self = Self {
        lo: i64::MIN,
        hi: i64::MAX,
    };

    /// The empty range; the bottom element.
    pub const EMPTY: Self = Self { lo: 1, hi: 0 };

    /// Constructs the range `[lo, hi]`. A reversed pair yields the empty
    /// range.
    #[must_use]
    pub fn new(lo: i64, hi: i64) -> Self {
        if lo > hi {
            Self::EMPTY
        } else {
            Self { lo, hi }
        }
    }

    /// Constructs the single-point range `[n, n]`.
    #[must_use]
    pub fn singleton(n: i64) -> Self {
        Self { lo: n, hi: n }
    }

    /// Checks if the range is empty.
    #[must_use]
    pub fn is_empty(self) -> bool {
        self.lo > self.hi
    }

    /// Checks if the range is the full interval.
    #[must_use]
    pub fn is_full(self) -> bool {
        self == Self::FULL
    }

    /// Gets the single value of the range, if it is a single point.
    #[must_use]
    pub fn as_singleton(self) -> Option<i64> {
        if self.lo == self.hi {
            Some(self.lo)
        } else {
            None
        }
    }

    /// Gets the inclusive lower bound.
    #[must_use]
    pub fn lo(self) -> i64 {
        self.lo
    }

    /// Gets the inclusive upper bound.
    #[must_use]
    pub fn hi(self) -> i64 {
        self.hi
    }

    /// Checks whether `n` lies within the range.
    #[must_use]
    pub fn contains(self, n: i64) -> bool {
        self.lo <= n && n <= self.hi
    }

    /// Narrows `self` against `other` (interval intersection).
    #[must_use]
    pub fn meet(self, other: Self) -> Self {
        Self::new(self.lo.max(other.lo), self.hi.min(other.hi))
    }

    /// Widens `self` with `other` (interval hull).
    #[must_use]
    pub fn join(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Self::new(self.lo.min(other.lo), self.hi.max(other.hi))
    }

    /// Computes the range of `self + other`, widening to full on possible
    /// overflow.
    #[must_use]
    pub fn checked_add(self, other: Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::EMPTY;
        }
        match (self.lo.checked_add(other.lo), self.hi.checked_add(other.hi)) {
            (Some(lo), Some(hi)) => Self::new(lo, hi),
            _ => Self::FULL,
        }
    }

    /// Computes the range of `self - other`, widening to full on possible
    /// overflow.
    #[must_use]
    pub fn checked_sub(self, other: Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::EMPTY;
        }
        match (self.lo.checked_sub(other.hi), self.hi.checked_sub(other.lo)) {
            (Some(lo), Some(hi)) => Self::new(lo, hi),
            _ => Self::FULL,
        }
    }

    /// Computes the range of `self * other`, widening to full on possible
    /// overflow.
    #[must_use]
    pub fn checked_mul(self, other: Self) -> Self {
        if self.is_empty() || other.is_empty() {
            return Self::EMPTY;
        }
        let corners = [
            self.lo.checked_mul(other.lo),
            self.lo.checked_mul(other.hi),
            self.hi.checked_mul(other.lo),
            self.hi.checked_mul(other.hi),
        ];
        let mut lo = i64::MAX;
        let mut hi = i64::MIN;
        for corner in corners {
            match corner {
                Some(c) => {
                    lo = lo.min(c);
                    hi = hi.max(c);
                }
                None => return Self::FULL,
            }
        }
        Self::new(lo, hi)
    }

    /// Computes the range of `-self`, widening to full on possible overflow.
    #[must_use]
    pub fn checked_neg(self) -> Self {
        if self.is_empty() {
            return Self::EMPTY;
        }
        match (self.hi.checked_neg(), self.lo.checked_neg()) {
            (Some(lo), Some(hi)) => Self::new(lo, hi),
            _ => Self::FULL,
        }
    }

    /// Checks whether every element of `self` is strictly below every element
    /// of `other`.
    #[must_use]
    pub fn entirely_below(self, other: Self) -> bool {
        !self.is_empty() && !other.is_empty() && self.hi < other.lo
    }

    /// Checks whether the two ranges share no elements.
    #[must_use]
    pub fn disjoint_from(self, other: Self) -> bool {
        self.meet(other).is_empty()
    }
}

/// The reference type constraint component of a fact: an upper bound in the
/// program's type hierarchy.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum TypeConstraint {
    /// Any type is possible; the top element.
    Top,

    /// The value is an instance of `0` or one of its subtypes.
    Upper(TypeId),

    /// No type is possible; the bottom element.
    Bottom,
}

impl TypeConstraint {
    /// Narrows `self` against `other` within `types`.
    ///
    /// Meeting two unrelated upper bounds yields bottom: single inheritance
    /// means a value cannot be an instance of both.
    #[must_use]
    pub fn meet(self, other: Self, types: &TypeHierarchy) -> Self {
        match (self, other) {
            (Self::Bottom, _) | (_, Self::Bottom) => Self::Bottom,
            (Self::Top, x) | (x, Self::Top) => x,
            (Self::Upper(a), Self::Upper(b)) => {
                if types.is_subtype(a, b) {
                    Self::Upper(a)
                } else if types.is_subtype(b, a) {
                    Self::Upper(b)
                } else {
                    Self::Bottom
                }
            }
        }
    }

    /// Widens `self` with `other` within `types`.
    #[must_use]
    pub fn join(self, other: Self, types: &TypeHierarchy) -> Self {
        match (self, other) {
            (Self::Top, _) | (_, Self::Top) => Self::Top,
            (Self::Bottom, x) | (x, Self::Bottom) => x,
            (Self::Upper(a), Self::Upper(b)) => match types.common_supertype(a, b) {
                Some(common) => Self::Upper(common),
                None => Self::Top,
            },
        }
    }
}

/// A lattice element describing everything the engine knows about one value
/// within one memory state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Fact {
    /// What is known about the value being null.
    pub nullability: Nullability,

    /// What is known about the value being a particular constant.
    pub constancy: Constancy,

    /// What is known about the value's numeric range.
    pub range: ValueRange,

    /// What is known about the value's reference type.
    pub type_constraint: TypeConstraint,
}

impl Fact {
    /// The fact carrying no information at all; the top element.
    #[must_use]
    pub fn top() -> Self {
        Self {
            nullability: Nullability::Unknown,
            constancy: Constancy::Top,
            range: ValueRange::FULL,
            type_constraint: TypeConstraint::Top,
        }
    }

    /// The fact meaning "provably unreachable"; the bottom element.
    #[must_use]
    pub fn bottom() -> Self {
        Self {
            nullability: Nullability::Bottom,
            constancy: Constancy::Bottom,
            range: ValueRange::EMPTY,
            type_constraint: TypeConstraint::Bottom,
        }
    }

    /// Checks whether any component of the fact is bottom, which makes the
    /// whole fact bottom.
    #[must_use]
    pub fn is_bottom(&self) -> bool {
        self.nullability == Nullability::Bottom
            || self.constancy == Constancy::Bottom
            || self.range.is_empty()
            || self.type_constraint == TypeConstraint::Bottom
    }

    /// The fact describing a value provably not null, with nothing else
    /// known.
    #[must_use]
    pub fn not_null() -> Self {
        Self {
            nullability: Nullability::NotNull,
            ..Self::top()
        }
    }

    /// The fact describing the null reference.
    #[must_use]
    pub fn null() -> Self {
        Self {
            nullability: Nullability::Null,
            constancy: Constancy::Const(ConstantValue::Null),
            ..Self::top()
        }
    }

    /// The fact describing the provided constant exactly.
    #[must_use]
    pub fn for_constant(constant: &ConstantValue) -> Self {
        match constant {
            ConstantValue::Null => Self::null(),
            ConstantValue::Bool(b) => Self {
                nullability: Nullability::NotNull,
                constancy: Constancy::Const(ConstantValue::Bool(*b)),
                range: ValueRange::singleton(i64::from(*b)),
                type_constraint: TypeConstraint::Top,
            },
            ConstantValue::Int(n) => Self {
                nullability: Nullability::NotNull,
                constancy: Constancy::Const(ConstantValue::Int(*n)),
                range: ValueRange::singleton(*n),
                type_constraint: TypeConstraint::Top,
            },
            ConstantValue::Str(s) => Self {
                nullability: Nullability::NotNull,
                constancy: Constancy::Const(ConstantValue::Str(s.clone())),
                ..Self::top()
            },
        }
    }

    /// The fact describing an integer within `range`.
    #[must_use]
    pub fn in_range(range: ValueRange) -> Self {
        let constancy = match range.as_singleton() {
            Some(n) => Constancy::Const(ConstantValue::Int(n)),
            None => Constancy::Top,
        };
        Self {
            nullability: Nullability::NotNull,
            constancy,
            range,
            type_constraint: TypeConstraint::Top,
        }
    }

    /// The fact describing a non-null instance of `tp` or one of its
    /// subtypes.
    #[must_use]
    pub fn instance_of(tp: TypeId) -> Self {
        Self {
            nullability: Nullability::NotNull,
            type_constraint: TypeConstraint::Upper(tp),
            ..Self::top()
        }
    }

    /// Gets the boolean this fact is proven to be, if any.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match &self.constancy {
            Constancy::Const(ConstantValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Narrows `self` against `other`, componentwise.
    ///
    /// A bottom result means the combination of the two facts is impossible,
    /// i.e. the state carrying it is unreachable.
    #[must_use]
    pub fn meet(&self, other: &Self, types: &TypeHierarchy) -> Self {
        let mut result = Self {
            nullability: self.nullability.meet(other.nullability),
            constancy: self.constancy.meet(&other.constancy),
            range: self.range.meet(other.range),
            type_constraint: self.type_constraint.meet(other.type_constraint, types),
        };

        // An integer constant and a range constrain each other.
        if let Constancy::Const(ConstantValue::Int(n)) = &result.constancy {
            result.range = result.range.meet(ValueRange::singleton(*n));
        }
        if result.is_bottom() {
            return Self::bottom();
        }

        result
    }

    /// Widens `self` with `other`, componentwise.
    ///
    /// The result is never more precise than either input.
    #[must_use]
    pub fn join(&self, other: &Self, types: &TypeHierarchy) -> Self {
        Self {
            nullability: self.nullability.join(other.nullability),
            constancy: self.constancy.join(&other.constancy),
            range: self.range.join(other.range),
            type_constraint: self.type_constraint.join(other.type_constraint, types),
        }
    }

    /// Checks whether every piece of information in `other` is implied by
    /// `self`, i.e. `self` is at least as precise as `other`.
    #[must_use]
    pub fn implies(&self, other: &Self, types: &TypeHierarchy) -> bool {
        self.meet(other, types) == *self
    }
}

#[cfg(test)]
mod test {
    use crate::{
        fact::{Constancy, Fact, Nullability, TypeConstraint, TypeHierarchy, ValueRange},
        value::ConstantValue,
    };

    #[test]
    fn nullability_meet_of_conflicting_facts_is_bottom() {
        assert_eq!(
            Nullability::Null.meet(Nullability::NotNull),
            Nullability::Bottom
        );
    }

    #[test]
    fn nullability_join_of_conflicting_facts_is_unknown() {
        assert_eq!(
            Nullability::Null.join(Nullability::NotNull),
            Nullability::Unknown
        );
    }

    #[test]
    fn range_meet_is_intersection() {
        let a = ValueRange::new(0, 10);
        let b = ValueRange::new(5, 20);
        assert_eq!(a.meet(b), ValueRange::new(5, 10));

        let c = ValueRange::new(15, 20);
        assert!(a.meet(c).is_empty());
    }

    #[test]
    fn range_join_is_hull() {
        let a = ValueRange::new(0, 10);
        let b = ValueRange::new(20, 30);
        assert_eq!(a.join(b), ValueRange::new(0, 30));
    }

    #[test]
    fn range_arithmetic_widens_on_overflow() {
        let near_max = ValueRange::new(i64::MAX - 1, i64::MAX);
        let one = ValueRange::singleton(1);
        assert!(near_max.checked_add(one).is_full());

        let small = ValueRange::new(1, 2);
        assert_eq!(small.checked_add(one), ValueRange::new(2, 3));
    }

    #[test]
    fn type_meet_of_unrelated_types_is_bottom() {
        let mut types = TypeHierarchy::new();
        let object = types.add_root();
        let string = types.add_subtype(object);
        let integer = types.add_subtype(object);

        let a = TypeConstraint::Upper(string);
        let b = TypeConstraint::Upper(integer);
        assert_eq!(a.meet(b, &types), TypeConstraint::Bottom);
        assert_eq!(a.join(b, &types), TypeConstraint::Upper(object));
    }

    #[test]
    fn meet_with_self_is_identity() {
        let types = TypeHierarchy::new();
        let fact = Fact::in_range(ValueRange::new(0, 5));
        assert_eq!(fact.meet(&fact, &types), fact);
        assert_eq!(fact.join(&fact, &types), fact);
    }

    #[test]
    fn meet_with_bottom_is_bottom() {
        let types = TypeHierarchy::new();
        let fact = Fact::not_null();
        assert!(fact.meet(&Fact::bottom(), &types).is_bottom());
    }

    #[test]
    fn join_with_top_is_top() {
        let types = TypeHierarchy::new();
        let fact = Fact::for_constant(&ConstantValue::Int(3));
        assert_eq!(fact.join(&Fact::top(), &types), Fact::top());
    }

    #[test]
    fn integer_constant_constrains_range_on_meet() {
        let types = TypeHierarchy::new();
        let constant = Fact::for_constant(&ConstantValue::Int(7));
        let ranged = Fact::in_range(ValueRange::new(0, 100));
        let met = constant.meet(&ranged, &types);

        assert_eq!(met.range, ValueRange::singleton(7));
        assert_eq!(
            met.constancy,
            Constancy::Const(ConstantValue::Int(7))
        );
    }

    #[test]
    fn implication_follows_precision() {
        let types = TypeHierarchy::new();
        let narrow = Fact::in_range(ValueRange::new(2, 3));
        let wide = Fact::in_range(ValueRange::new(0, 10));

        assert!(narrow.implies(&wide, &types));
        assert!(!wide.implies(&narrow, &types));
    }

    /// A small algebra of facts spanning every lattice component, used to
    /// check the algebraic laws exhaustively rather than on hand-picked pairs.
    fn algebra(types: &mut TypeHierarchy) -> Vec<Fact> {
        let object = types.add_root();
        let string = types.add_subtype(object);

        vec![
            Fact::bottom(),
            Fact::top(),
            Fact::null(),
            Fact::not_null(),
            Fact::in_range(ValueRange::new(0, 10)),
            Fact::in_range(ValueRange::new(5, 20)),
            Fact::for_constant(&ConstantValue::Int(7)),
            Fact::for_constant(&ConstantValue::Bool(true)),
            Fact::instance_of(object),
            Fact::instance_of(string),
        ]
    }

    #[test]
    fn meet_and_join_are_commutative() {
        let mut types = TypeHierarchy::new();
        let facts = algebra(&mut types);

        for a in &facts {
            for b in &facts {
                assert_eq!(a.meet(b, &types), b.meet(a, &types));
                assert_eq!(a.join(b, &types), b.join(a, &types));
            }
        }
    }

    #[test]
    fn join_is_associative() {
        let mut types = TypeHierarchy::new();
        let facts = algebra(&mut types);

        for a in &facts {
            for b in &facts {
                for c in &facts {
                    assert_eq!(
                        a.join(b, &types).join(c, &types),
                        a.join(&b.join(c, &types), &types)
                    );
                }
            }
        }
    }

    #[test]
    fn join_is_monotone() {
        let mut types = TypeHierarchy::new();
        let facts = algebra(&mut types);

        for a in &facts {
            for b in &facts {
                if !a.implies(b, &types) {
                    continue;
                }
                for c in &facts {
                    assert!(a.join(c, &types).implies(&b.join(c, &types), &types));
                }
            }
        }
    }

    #[test]
    fn meet_refines_and_join_widens() {
        let mut types = TypeHierarchy::new();
        let facts = algebra(&mut types);

        for a in &facts {
            for b in &facts {
                assert!(a.meet(b, &types).implies(a, &types));
                assert!(a.implies(&a.join(b, &types), &types));
            }
        }
    }
}
