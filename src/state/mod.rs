//! This module contains the memory state: the abstract machine state that the
//! engine mutates while interpreting one path through a program.
//!
//! A state owns an operand stack of value handles, a binding from values to
//! lattice [`Fact`]s, a set of recorded [`relations`] between value pairs,
//! and the return-address stack used for subroutine control transfer. The
//! scheduler owns every state; the dispatcher borrows one and returns freshly
//! owned successors, so sibling branches never alias.

pub mod relations;
pub mod stack;

use std::collections::HashMap;

use itertools::Itertools;

use crate::{
    error::analysis::Error,
    fact::{Fact, TypeHierarchy, ValueRange},
    state::{relations::RelationSet, stack::OperandStack},
    value::{SpecialField, ValueArena, ValueData, ValueId, VariableId},
};

/// The abstract machine state at one program point along one path.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemoryState {
    /// The operand stack.
    stack: OperandStack,

    /// The facts tracked for individual values.
    facts: HashMap<ValueId, Fact>,

    /// The relations tracked between pairs of values.
    relations: RelationSet,

    /// The return addresses pushed by in-flight subroutine calls, innermost
    /// last.
    return_stack: Vec<u32>,
}

impl MemoryState {
    /// Constructs a new state with an empty stack and no recorded facts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forks the state at a branch point. The fork shares interned values
    /// with the original but no mutable structure, so mutating either state
    /// never affects the other.
    #[must_use]
    pub fn fork(&self) -> Self {
        self.clone()
    }

    /// Gets the operand stack.
    #[must_use]
    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    /// Gets the operand stack for modification.
    pub fn stack_mut(&mut self) -> &mut OperandStack {
        &mut self.stack
    }

    /// Gets the recorded relations.
    #[must_use]
    pub fn relations(&self) -> &RelationSet {
        &self.relations
    }

    /// Gets the recorded relations for modification.
    pub fn relations_mut(&mut self) -> &mut RelationSet {
        &mut self.relations
    }

    /// Pushes a subroutine return address.
    pub fn push_return_address(&mut self, address: u32) {
        self.return_stack.push(address);
    }

    /// Pops the innermost subroutine return address.
    ///
    /// # Errors
    ///
    /// If no subroutine is in flight, which indicates a malformed program.
    pub fn pop_return_address(&mut self) -> Result<u32, Error> {
        self.return_stack.pop().ok_or(Error::NoReturnAddress)
    }

    /// Computes the current fact for `value` in this state.
    ///
    /// Values without a recorded binding fall back to what their structure
    /// alone guarantees: a constant is exactly itself, an array length is a
    /// non-negative `i32`, a boxed wrapper is never null, and so on.
    #[must_use]
    pub fn fact_of(&self, arena: &ValueArena, value: ValueId) -> Fact {
        if let Some(fact) = self.facts.get(&value) {
            return fact.clone();
        }
        Self::derived_fact(arena, value)
    }

    /// Narrows the fact recorded for `value` by meeting it with `fact`.
    ///
    /// Returns `false` when the meet is bottom, meaning this state has become
    /// unreachable and must be dropped by the caller rather than propagated.
    #[must_use]
    pub fn bind(
        &mut self,
        arena: &ValueArena,
        types: &TypeHierarchy,
        value: ValueId,
        fact: &Fact,
    ) -> bool {
        let current = self.fact_of(arena, value);
        let narrowed = current.meet(fact, types);
        if narrowed.is_bottom() {
            return false;
        }
        self.facts.insert(value, narrowed);
        true
    }

    /// Replaces the fact recorded for `value` outright, without narrowing.
    ///
    /// Used by assignment, where the old binding is invalidated rather than
    /// refined.
    pub fn replace_fact(&mut self, value: ValueId, fact: Fact) {
        self.facts.insert(value, fact);
    }

    /// Removes every fact and relation that depends on `variable`.
    pub fn flush_variable(&mut self, arena: &mut ValueArena, variable: VariableId) {
        self.flush_matching(arena, |v| v == variable);
    }

    /// Removes every fact and relation that depends on a variable accepted by
    /// `affected`.
    ///
    /// Operand-stack slots holding an affected value are replaced with fresh
    /// unknowns. The slot still holds whatever was read before the flush, so
    /// it keeps the fact it had, but it must stop sharing a handle with
    /// post-flush reads of the same variable: the variable may now hold a
    /// different value, and a shared handle would prove the two equal.
    pub fn flush_matching(
        &mut self,
        arena: &mut ValueArena,
        affected: impl Fn(VariableId) -> bool,
    ) {
        let stale: Vec<(usize, Fact)> = self
            .stack
            .as_slice()
            .iter()
            .enumerate()
            .filter(|(_, value)| arena.mentions_matching(**value, &mut |v| affected(v)))
            .map(|(slot, value)| (slot, self.fact_of(arena, *value)))
            .collect();

        self.facts
            .retain(|value, _| !arena.mentions_matching(*value, &mut |v| affected(v)));
        self.relations.retain_unaffected(|value| {
            arena.mentions_matching(value, &mut |v| affected(v))
        });

        for (slot, fact) in stale {
            let fresh = arena.fresh_unknown();
            self.stack.as_mut_slice()[slot] = fresh;
            self.facts.insert(fresh, fact);
        }
    }

    /// Merges `self` with `other` pointwise, producing a state that covers
    /// both.
    ///
    /// Returns [`None`] when the two states are in different subroutine
    /// contexts and cannot be merged.
    ///
    /// # Errors
    ///
    /// If the two operand stacks have different depths. Stack depth at a
    /// given instruction is an invariant of well-formed programs, so this is
    /// a malformed-program error.
    pub fn merge_with(
        &self,
        other: &Self,
        arena: &mut ValueArena,
        types: &TypeHierarchy,
    ) -> Result<Option<Self>, Error> {
        if self.stack.depth() != other.stack.depth() {
            return Err(Error::StackShapeMismatch {
                left: self.stack.depth(),
                right: other.stack.depth(),
            });
        }
        if self.return_stack != other.return_stack {
            return Ok(None);
        }

        let mut merged = Self {
            stack: self.stack.clone(),
            facts: HashMap::new(),
            relations: self.relations.clone(),
            return_stack: self.return_stack.clone(),
        };

        // Slot-wise stack merge: slots agreeing on a value keep it, slots
        // that disagree get a fresh unknown carrying the join of both facts.
        let joined_slots: Vec<(usize, ValueId, Fact)> = self
            .stack
            .as_slice()
            .iter()
            .zip_eq(other.stack.as_slice())
            .enumerate()
            .filter(|(_, (ours, theirs))| ours != theirs)
            .map(|(slot, (ours, theirs))| {
                let joined = self
                    .fact_of(&*arena, *ours)
                    .join(&other.fact_of(&*arena, *theirs), types);
                (slot, arena.fresh_unknown(), joined)
            })
            .collect();
        for (slot, fresh, joined) in joined_slots {
            merged.stack.as_mut_slice()[slot] = fresh;
            merged.facts.insert(fresh, joined);
        }

        // Pointwise fact join over the values both states track; a value
        // tracked by only one side degrades to its structural default.
        for (value, fact) in &self.facts {
            let joined = fact.join(&other.fact_of(&*arena, *value), types);
            merged.facts.insert(*value, joined);
        }
        for (value, fact) in &other.facts {
            if !merged.facts.contains_key(value) {
                let joined = self.fact_of(&*arena, *value).join(fact, types);
                merged.facts.insert(*value, joined);
            }
        }

        merged.relations.intersect_with(&other.relations);

        Ok(Some(merged))
    }

    /// Checks whether exploring `self` is redundant given that `other` has
    /// been explored: true when every fact and relation in `other` is implied
    /// by `self`.
    ///
    /// # Errors
    ///
    /// If the two operand stacks have different depths, which violates the
    /// stack-shape invariant of well-formed programs.
    pub fn is_subsumed_by(
        &self,
        other: &Self,
        arena: &ValueArena,
        types: &TypeHierarchy,
    ) -> Result<bool, Error> {
        if self.stack.depth() != other.stack.depth() {
            return Err(Error::StackShapeMismatch {
                left: self.stack.depth(),
                right: other.stack.depth(),
            });
        }
        if self.stack.as_slice() != other.stack.as_slice()
            || self.return_stack != other.return_stack
        {
            return Ok(false);
        }

        let facts_implied = other.facts.iter().all(|(value, general)| {
            self.fact_of(arena, *value).implies(general, types)
        });

        Ok(facts_implied && self.relations.contains_all_of(&other.relations))
    }

    /// Gets the values for which this state tracks an explicit fact.
    pub fn tracked_values(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.facts.keys().copied()
    }

    /// Computes the fact guaranteed by a value's structure alone.
    fn derived_fact(arena: &ValueArena, value: ValueId) -> Fact {
        match arena.data(value) {
            ValueData::Constant(c) => Fact::for_constant(c),
            ValueData::Wrap { field, .. } => match field {
                SpecialField::ArrayLength | SpecialField::StringLength => {
                    Fact::in_range(ValueRange::new(0, i64::from(i32::MAX)))
                }
                SpecialField::BoxedValue => Fact::not_null(),
                SpecialField::OptionalPresent => Fact::in_range(ValueRange::new(0, 1)),
                SpecialField::UnboxedValue => Fact::in_range(ValueRange::FULL),
            },
            ValueData::InstanceOf { .. } => Fact::in_range(ValueRange::new(0, 1)),
            ValueData::Variable(_)
            | ValueData::FieldRef { .. }
            | ValueData::Op { .. }
            | ValueData::UnOp { .. }
            | ValueData::Unknown { .. } => Fact::top(),
        }
    }
}

#[cfg(test)]
mod test {
    use crate::{
        fact::{Fact, Nullability, TypeHierarchy, ValueRange},
        state::MemoryState,
        value::{ConstantValue, SpecialField, ValueArena, VariableId},
    };

    #[test]
    fn constants_carry_their_derived_fact() {
        let mut arena = ValueArena::new();
        let state = MemoryState::new();
        let five = arena.int_const(5);

        let fact = state.fact_of(&arena, five);
        assert_eq!(fact.range, ValueRange::singleton(5));
        assert_eq!(fact.nullability, Nullability::NotNull);
    }

    #[test]
    fn array_lengths_are_never_negative() {
        let mut arena = ValueArena::new();
        let state = MemoryState::new();
        let array = arena.variable(VariableId(0));
        let length = arena.wrap(SpecialField::ArrayLength, array);

        assert!(state.fact_of(&arena, length).range.lo() >= 0);
    }

    #[test]
    fn binding_narrows_and_detects_contradictions() {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let mut state = MemoryState::new();
        let x = arena.variable(VariableId(0));

        assert!(state.bind(&arena, &types, x, &Fact::not_null()));
        assert!(!state.bind(&arena, &types, x, &Fact::null()));
    }

    #[test]
    fn forked_states_do_not_alias() {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let mut state = MemoryState::new();
        let x = arena.variable(VariableId(0));

        let mut fork = state.fork();
        assert!(fork.bind(&arena, &types, x, &Fact::null()));
        assert!(state.bind(&arena, &types, x, &Fact::not_null()));

        assert_eq!(state.fact_of(&arena, x).nullability, Nullability::NotNull);
        assert_eq!(fork.fact_of(&arena, x).nullability, Nullability::Null);
    }

    #[test]
    fn flushing_a_variable_forgets_its_facts() {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let mut state = MemoryState::new();
        let x = arena.variable(VariableId(0));
        let y = arena.variable(VariableId(1));

        assert!(state.bind(&arena, &types, x, &Fact::not_null()));
        assert!(state.bind(&arena, &types, y, &Fact::not_null()));
        state.flush_variable(&mut arena, VariableId(0));

        assert_eq!(state.fact_of(&arena, x), Fact::top());
        assert_eq!(state.fact_of(&arena, y).nullability, Nullability::NotNull);
    }

    #[test]
    fn flushing_replaces_stale_stack_slots() -> anyhow::Result<()> {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let mut state = MemoryState::new();
        let obj = arena.variable(VariableId(0));
        let field = arena.field_ref(obj, VariableId(1));

        state.stack_mut().push(field)?;
        assert!(state.bind(&arena, &types, field, &Fact::not_null()));
        state.flush_variable(&mut arena, VariableId(1));

        // The slot no longer shares a handle with future reads of the field,
        // but it keeps the fact the read had at the time.
        let slot = state.stack().peek(0)?;
        assert_ne!(slot, field);
        assert_eq!(state.fact_of(&arena, slot).nullability, Nullability::NotNull);
        assert_eq!(state.fact_of(&arena, field), Fact::top());

        Ok(())
    }

    #[test]
    fn merge_joins_facts_pointwise() -> anyhow::Result<()> {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let x = arena.variable(VariableId(0));

        let mut a = MemoryState::new();
        assert!(a.bind(&arena, &types, x, &Fact::in_range(ValueRange::new(0, 5))));
        let mut b = MemoryState::new();
        assert!(b.bind(&arena, &types, x, &Fact::in_range(ValueRange::new(10, 20))));

        let merged = a
            .merge_with(&b, &mut arena, &types)?
            .expect("States in the same context should merge");
        assert_eq!(merged.fact_of(&arena, x).range, ValueRange::new(0, 20));

        Ok(())
    }

    #[test]
    fn merge_of_mismatched_stack_depths_is_an_error() {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let value = arena.int_const(1);

        let mut a = MemoryState::new();
        a.stack_mut().push(value).unwrap();
        let b = MemoryState::new();

        a.merge_with(&b, &mut arena, &types)
            .expect_err("Mismatched stack depths did not error");
    }

    #[test]
    fn merge_of_disagreeing_slots_introduces_a_fresh_unknown() -> anyhow::Result<()> {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let one = arena.int_const(1);
        let two = arena.int_const(2);

        let mut a = MemoryState::new();
        a.stack_mut().push(one).unwrap();
        let mut b = MemoryState::new();
        b.stack_mut().push(two).unwrap();

        let merged = a
            .merge_with(&b, &mut arena, &types)?
            .expect("States in the same context should merge");
        let slot = merged.stack().peek(0).unwrap();
        assert_ne!(slot, one);
        assert_ne!(slot, two);
        assert_eq!(
            merged.fact_of(&arena, slot).range,
            ValueRange::new(1, 2)
        );

        Ok(())
    }

    #[test]
    fn subsumption_follows_precision() -> anyhow::Result<()> {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();
        let x = arena.variable(VariableId(0));

        let mut precise = MemoryState::new();
        assert!(precise.bind(&arena, &types, x, &Fact::for_constant(&ConstantValue::Int(3))));
        let mut general = MemoryState::new();
        assert!(general.bind(&arena, &types, x, &Fact::in_range(ValueRange::new(0, 10))));

        assert!(precise.is_subsumed_by(&general, &arena, &types)?);
        assert!(!general.is_subsumed_by(&precise, &arena, &types)?);

        Ok(())
    }

    #[test]
    fn different_subroutine_contexts_do_not_merge() -> anyhow::Result<()> {
        let mut arena = ValueArena::new();
        let types = TypeHierarchy::new();

        let mut a = MemoryState::new();
        a.push_return_address(4);
        let b = MemoryState::new();

        assert!(a.merge_with(&b, &mut arena, &types)?.is_none());

        Ok(())
    }
}
