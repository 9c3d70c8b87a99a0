//! This module contains the set of relations a memory state records between
//! pairs of values.
//!
//! Relations complement per-value facts: `a == b` is not expressible as a
//! fact on either value alone, but once recorded it lets a later comparison
//! of the two be proven without knowing anything else about them.

use std::collections::BTreeSet;

use crate::value::ValueId;

/// The kinds of relation that can hold between two values.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub enum RelationKind {
    /// The two values are the same value.
    Equal,

    /// The two values are provably different.
    NotEqual,
}

/// A relation between an ordered pair of values.
///
/// Pairs are stored with the smaller handle first so that `rel(a, b)` and
/// `rel(b, a)` are the same entry.
#[derive(Clone, Copy, Debug, Eq, Ord, PartialEq, PartialOrd)]
pub struct Relation {
    kind: RelationKind,
    a: ValueId,
    b: ValueId,
}

impl Relation {
    /// Constructs the normalised relation of `kind` between `a` and `b`.
    #[must_use]
    pub fn new(kind: RelationKind, a: ValueId, b: ValueId) -> Self {
        let (a, b) = if a <= b { (a, b) } else { (b, a) };
        Self { kind, a, b }
    }
}

/// The set of relations recorded by one memory state.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RelationSet {
    relations: BTreeSet<Relation>,
}

impl RelationSet {
    /// Constructs a new, empty relation set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that the relation of `kind` holds between `a` and `b`.
    pub fn add(&mut self, kind: RelationKind, a: ValueId, b: ValueId) {
        self.relations.insert(Relation::new(kind, a, b));
    }

    /// Checks whether a relation of `kind` between `a` and `b` has been
    /// recorded.
    #[must_use]
    pub fn holds(&self, kind: RelationKind, a: ValueId, b: ValueId) -> bool {
        self.relations.contains(&Relation::new(kind, a, b))
    }

    /// Removes every relation for which `affected` accepts either endpoint.
    pub fn retain_unaffected(&mut self, mut affected: impl FnMut(ValueId) -> bool) {
        self.relations.retain(|r| !affected(r.a) && !affected(r.b));
    }

    /// Keeps only the relations that are also present in `other`; the merge
    /// of two states can only promise what both promised.
    pub fn intersect_with(&mut self, other: &Self) {
        self.relations = self.relations.intersection(&other.relations).copied().collect();
    }

    /// Checks whether every relation in `other` is also recorded in `self`.
    #[must_use]
    pub fn contains_all_of(&self, other: &Self) -> bool {
        other.relations.is_subset(&self.relations)
    }

    /// Gets the number of recorded relations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.relations.len()
    }

    /// Checks if no relations are recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }
}

#[cfg(test)]
mod test {
    use crate::{
        state::relations::{RelationKind, RelationSet},
        value::ValueId,
    };

    #[test]
    fn relations_are_symmetric() {
        let mut set = RelationSet::new();
        set.add(RelationKind::Equal, ValueId(2), ValueId(1));

        assert!(set.holds(RelationKind::Equal, ValueId(1), ValueId(2)));
        assert!(set.holds(RelationKind::Equal, ValueId(2), ValueId(1)));
        assert!(!set.holds(RelationKind::NotEqual, ValueId(1), ValueId(2)));
    }

    #[test]
    fn intersection_keeps_only_shared_relations() {
        let mut left = RelationSet::new();
        left.add(RelationKind::Equal, ValueId(0), ValueId(1));
        left.add(RelationKind::NotEqual, ValueId(0), ValueId(2));

        let mut right = RelationSet::new();
        right.add(RelationKind::Equal, ValueId(0), ValueId(1));

        left.intersect_with(&right);
        assert_eq!(left.len(), 1);
        assert!(left.holds(RelationKind::Equal, ValueId(0), ValueId(1)));
    }

    #[test]
    fn flushing_removes_relations_touching_affected_values() {
        let mut set = RelationSet::new();
        set.add(RelationKind::Equal, ValueId(0), ValueId(1));
        set.add(RelationKind::Equal, ValueId(2), ValueId(3));

        set.retain_unaffected(|v| v == ValueId(1));
        assert_eq!(set.len(), 1);
        assert!(set.holds(RelationKind::Equal, ValueId(2), ValueId(3)));
    }

    #[test]
    fn subset_check_covers_subsumption() {
        let mut bigger = RelationSet::new();
        bigger.add(RelationKind::Equal, ValueId(0), ValueId(1));
        bigger.add(RelationKind::NotEqual, ValueId(1), ValueId(2));

        let mut smaller = RelationSet::new();
        smaller.add(RelationKind::Equal, ValueId(0), ValueId(1));

        assert!(bigger.contains_all_of(&smaller));
        assert!(!smaller.contains_all_of(&bigger));
    }
}
