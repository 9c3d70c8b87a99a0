//! This module contains the instruction dispatcher: the single exhaustive
//! match that gives each [`Instruction`] its abstract semantics.
//!
//! The dispatcher consumes one state at one instruction index and produces
//! the successor states, each paired with the index it must continue at. A
//! state whose narrowed facts become bottom is provably unreachable and
//! produces no successor; the scheduler simply never sees it again. Branching
//! instructions fork the incoming state before narrowing, so sibling
//! successors never share mutable structure.
//!
//! Reachability flags, contract violations, and archived exit states are
//! written to the [`Report`] as a side effect of dispatch.

use crate::{
    contract::ArgRequirement,
    error::{
        analysis::{Error, Result},
        container::Locatable,
    },
    fact::{Constancy, Fact, Nullability, TypeConstraint, ValueRange},
    program::{Instruction, Program, VariableKind},
    report::{Report, Violation},
    state::{relations::RelationKind, MemoryState},
    value::{BinOp, ConstantValue, SpecialField, UnOp, ValueArena, ValueData, ValueId},
};

/// A successor produced by dispatch: the state paired with the instruction
/// index it continues at.
pub type Successor = (u32, MemoryState);

/// The dispatcher for a single frozen program.
#[derive(Clone, Copy, Debug)]
pub struct Interpreter<'a> {
    program: &'a Program,
}

impl<'a> Interpreter<'a> {
    /// Constructs a dispatcher over `program`.
    #[must_use]
    pub fn new(program: &'a Program) -> Self {
        Self { program }
    }

    /// Executes the instruction at `index` against `state`, returning the
    /// successor states.
    ///
    /// An empty successor list means every outgoing edge was proven
    /// unreachable or the instruction terminates the method; terminal states
    /// are archived in `report` rather than returned.
    ///
    /// # Errors
    ///
    /// Any error returned here means the program violated the front-end
    /// contract: an out-of-bounds index, a stack underflow, a missing call
    /// descriptor, or similar. These are not healed, as facts computed from a
    /// malformed program would be unsound.
    pub fn dispatch(
        &self,
        index: u32,
        mut state: MemoryState,
        arena: &mut ValueArena,
        report: &mut Report,
    ) -> Result<Vec<Successor>> {
        let instruction = self.program.get(index).ok_or_else(|| {
            Error::InstructionIndexOutOfBounds {
                requested: index as usize,
                available: self.program.len(),
            }
            .locate(index)
        })?;
        let types = self.program.types();
        let next = index + 1;
        let mut successors: Vec<Successor> = Vec::with_capacity(2);

        match instruction {
            Instruction::Dup => {
                state.stack_mut().dup().locate(index)?;
                successors.push((next, state));
            }
            Instruction::Swap => {
                state.stack_mut().swap().locate(index)?;
                successors.push((next, state));
            }
            Instruction::Splice { pop, push } => {
                state.stack_mut().splice(*pop, push).locate(index)?;
                successors.push((next, state));
            }
            Instruction::PushVariable(var) => {
                let value = arena.variable(*var);
                state.stack_mut().push(value).locate(index)?;
                successors.push((next, state));
            }
            Instruction::PushConstant(constant) => {
                let value = arena.constant(constant.clone());
                state.stack_mut().push(value).locate(index)?;
                successors.push((next, state));
            }
            Instruction::PushUnknown { fact } => {
                let value = arena.fresh_unknown();
                state.replace_fact(value, fact.clone());
                state.stack_mut().push(value).locate(index)?;
                successors.push((next, state));
            }
            Instruction::Binary(op) => {
                let rhs = state.stack_mut().pop().locate(index)?;
                let lhs = state.stack_mut().pop().locate(index)?;
                if let Some(value) = self.evaluate_binary(*op, lhs, rhs, &mut state, arena) {
                    state.stack_mut().push(value).locate(index)?;
                    successors.push((next, state));
                }
            }
            Instruction::Unary(op) => {
                let operand = state.stack_mut().pop().locate(index)?;
                if let Some(value) = self.evaluate_unary(*op, operand, &mut state, arena) {
                    state.stack_mut().push(value).locate(index)?;
                    successors.push((next, state));
                }
            }
            Instruction::IsInstance { tested } => {
                let operand = state.stack_mut().pop().locate(index)?;
                let fact = state.fact_of(arena, operand);
                let value = if fact.nullability == Nullability::Null {
                    // Null is never an instance of anything.
                    arena.bool_const(false)
                } else if let TypeConstraint::Upper(upper) = fact.type_constraint {
                    if types.is_subtype(upper, *tested) && fact.nullability == Nullability::NotNull
                    {
                        arena.bool_const(true)
                    } else if !types.is_subtype(upper, *tested)
                        && !types.is_subtype(*tested, upper)
                    {
                        arena.bool_const(false)
                    } else {
                        arena.is_instance(operand, *tested)
                    }
                } else {
                    arena.is_instance(operand, *tested)
                };
                state.stack_mut().push(value).locate(index)?;
                successors.push((next, state));
            }
            Instruction::GetField { field, handler } => {
                let qualifier = state.stack_mut().pop().locate(index)?;
                if self.check_dereference(
                    index,
                    qualifier,
                    &mut state,
                    arena,
                    *handler,
                    report,
                    &mut successors,
                ) {
                    let value = arena.field_ref(qualifier, *field);
                    state.stack_mut().push(value).locate(index)?;
                    successors.push((next, state));
                }
            }
            Instruction::SetField { field, handler } => {
                let stored = state.stack_mut().pop().locate(index)?;
                let qualifier = state.stack_mut().pop().locate(index)?;
                if self.check_dereference(
                    index,
                    qualifier,
                    &mut state,
                    arena,
                    *handler,
                    report,
                    &mut successors,
                ) {
                    // Capture the stored fact before the flush invalidates
                    // everything aliasing this field.
                    let stored_fact = state.fact_of(arena, stored);
                    state.flush_variable(arena, *field);
                    let slot = arena.field_ref(qualifier, *field);
                    state.replace_fact(slot, stored_fact);
                    if !arena.mentions_variable(stored, *field) {
                        state.relations_mut().add(RelationKind::Equal, slot, stored);
                    }
                    successors.push((next, state));
                }
            }
            Instruction::GetElement { handler } => {
                let element_index = state.stack_mut().pop().locate(index)?;
                let array = state.stack_mut().pop().locate(index)?;
                if self.check_dereference(
                    index,
                    array,
                    &mut state,
                    arena,
                    *handler,
                    report,
                    &mut successors,
                ) {
                    // An in-bounds read implies a valid non-negative index.
                    let in_bounds = Fact::in_range(ValueRange::new(0, i64::from(i32::MAX)));
                    if state.bind(arena, types, element_index, &in_bounds) {
                        let element = arena.fresh_unknown();
                        state.stack_mut().push(element).locate(index)?;
                        successors.push((next, state));
                    }
                }
            }
            Instruction::Assign { var, init } => {
                let rhs = state.stack_mut().pop().locate(index)?;
                let rhs_fact = state.fact_of(arena, rhs);
                if !init {
                    state.flush_variable(arena, *var);
                }
                let target = arena.variable(*var);
                state.replace_fact(target, rhs_fact);
                if !arena.mentions_variable(rhs, *var) {
                    state.relations_mut().add(RelationKind::Equal, target, rhs);
                }
                successors.push((next, state));
            }
            Instruction::Cast { target, handler } => {
                let value = state.stack().peek(0).locate(index)?;
                let fact = state.fact_of(arena, value);
                let provably_ok = fact.nullability == Nullability::Null
                    || matches!(
                        fact.type_constraint,
                        TypeConstraint::Upper(upper) if types.is_subtype(upper, *target)
                    );
                if provably_ok {
                    successors.push((next, state));
                } else {
                    let failing = Self::exceptional_state(&state);
                    match handler {
                        Some(handler) => successors.push((*handler, failing)),
                        None => report.archive_exceptional_exit(failing),
                    }
                    let narrowed = Fact {
                        type_constraint: TypeConstraint::Upper(*target),
                        ..Fact::top()
                    };
                    if state.bind(arena, types, value, &narrowed) {
                        successors.push((next, state));
                    }
                }
            }
            Instruction::NumericCast { width } => {
                let value = state.stack_mut().pop().locate(index)?;
                let fact = state.fact_of(arena, value);
                let representable = width.range();
                if fact.range.meet(representable) == fact.range {
                    // Already representable at the target width; identity.
                    state.stack_mut().push(value).locate(index)?;
                } else {
                    // Truncation produces a different value, not a narrowing
                    // of the old one.
                    let truncated = arena.fresh_unknown();
                    state.replace_fact(truncated, Fact::in_range(representable));
                    state.stack_mut().push(truncated).locate(index)?;
                }
                successors.push((next, state));
            }
            Instruction::ReadSpecial { field, handler } => {
                let inner = state.stack_mut().pop().locate(index)?;
                let survives = match field {
                    SpecialField::UnboxedValue => self.check_dereference(
                        index,
                        inner,
                        &mut state,
                        arena,
                        *handler,
                        report,
                        &mut successors,
                    ),
                    _ => true,
                };
                if survives {
                    let value = arena.wrap(*field, inner);
                    state.stack_mut().push(value).locate(index)?;
                    successors.push((next, state));
                }
            }
            Instruction::Call { call, handler } => {
                let descriptor = self
                    .program
                    .call(*call)
                    .ok_or_else(|| Error::MissingCallDescriptor(call.0).locate(index))?
                    .clone();

                let mut arguments = Vec::with_capacity(descriptor.arg_count);
                for _ in 0..descriptor.arg_count {
                    arguments.push(state.stack_mut().pop().locate(index)?);
                }
                arguments.reverse();
                let receiver = if descriptor.has_receiver {
                    Some(state.stack_mut().pop().locate(index)?)
                } else {
                    None
                };

                let mut alive = match receiver {
                    Some(receiver) => self.check_dereference(
                        index,
                        receiver,
                        &mut state,
                        arena,
                        *handler,
                        report,
                        &mut successors,
                    ),
                    None => true,
                };
                if alive {
                    for (position, argument) in arguments.iter().enumerate() {
                        if descriptor.vararg && position + 1 == descriptor.arg_count {
                            continue;
                        }
                        if descriptor.arg_requirements.get(position)
                            != Some(&ArgRequirement::NotNull)
                        {
                            continue;
                        }
                        let fact = state.fact_of(arena, *argument);
                        if fact.nullability != Nullability::NotNull {
                            report.report_violation(
                                index,
                                Violation::ArgumentMustNotBeNull {
                                    position,
                                    certain: fact.nullability == Nullability::Null,
                                },
                            );
                        }
                        if !state.bind(arena, types, *argument, &Fact::not_null()) {
                            alive = false;
                            break;
                        }
                    }
                }
                if alive {
                    if descriptor.pure {
                        report.mark_pure_call(index);
                    }

                    // The callee may throw after its arguments are consumed;
                    // an impure one may also have mutated fields first.
                    let mut thrown = Self::exceptional_state(&state);
                    if !descriptor.pure {
                        thrown.flush_matching(arena, |var| {
                            let info = self.program.variable(var);
                            info.kind == VariableKind::Field && !info.stable
                        });
                    }
                    match handler {
                        Some(handler) => successors.push((*handler, thrown)),
                        None => report.archive_exceptional_exit(thrown),
                    }

                    if !descriptor.pure {
                        state.flush_matching(arena, |var| {
                            let info = self.program.variable(var);
                            info.kind == VariableKind::Field && !info.stable
                        });
                    }
                    let result = match (&descriptor.precomputed, descriptor.pure) {
                        (Some(constant), true) => arena.constant(constant.clone()),
                        _ => {
                            let fresh = arena.fresh_unknown();
                            state.replace_fact(fresh, descriptor.return_fact());
                            fresh
                        }
                    };
                    state.stack_mut().push(result).locate(index)?;
                    successors.push((next, state));
                }
            }
            Instruction::Goto { target } => {
                successors.push((*target, state));
            }
            Instruction::CondGoto { target } => {
                let condition = state.stack_mut().pop().locate(index)?;
                let fact = state.fact_of(arena, condition);
                if fact.as_bool().is_none()
                    && fact.range.meet(ValueRange::new(0, 1)).is_empty()
                {
                    return Err(Error::NonBooleanCondition(condition.0).locate(index));
                }
                match fact.as_bool() {
                    Some(true) => {
                        report.mark_branch(index, true);
                        successors.push((*target, state));
                    }
                    Some(false) => {
                        report.mark_branch(index, false);
                        successors.push((next, state));
                    }
                    None => {
                        let mut holds = state.fork();
                        if self.apply_condition(&mut holds, arena, condition, true) {
                            report.mark_branch(index, true);
                            successors.push((*target, holds));
                        }
                        if self.apply_condition(&mut state, arena, condition, false) {
                            report.mark_branch(index, false);
                            successors.push((next, state));
                        }
                    }
                }
            }
            Instruction::Gosub { target } => {
                state.push_return_address(next);
                successors.push((*target, state));
            }
            Instruction::RetSub => {
                let address = state.pop_return_address().locate(index)?;
                successors.push((address, state));
            }
            Instruction::Return => {
                report.archive_exit(state);
            }
            Instruction::Throw { handler } => {
                let exception = state.stack_mut().pop().locate(index)?;
                let fact = state.fact_of(arena, exception);
                if fact.nullability == Nullability::Null {
                    report.report_violation(
                        index,
                        Violation::PossiblyNullDereference { certain: true },
                    );
                }
                if state.bind(arena, types, exception, &Fact::not_null()) {
                    state.stack_mut().clear();
                    match handler {
                        Some(handler) => successors.push((*handler, state)),
                        None => report.archive_exceptional_exit(state),
                    }
                }
            }
            Instruction::CheckNotNull { handler } => {
                let value = state.stack().peek(0).locate(index)?;
                if self.check_dereference(
                    index,
                    value,
                    &mut state,
                    arena,
                    *handler,
                    report,
                    &mut successors,
                ) {
                    successors.push((next, state));
                }
            }
            Instruction::ArraySizeCheck { handler } => {
                let value = state.stack().peek(0).locate(index)?;
                let range = state.fact_of(arena, value).range;
                if range.lo() >= 0 {
                    successors.push((next, state));
                } else {
                    report.report_violation(
                        index,
                        Violation::PossiblyNegativeArraySize {
                            certain: range.hi() < 0,
                        },
                    );
                    let mut negative = Self::exceptional_state(&state);
                    if negative.bind(
                        arena,
                        types,
                        value,
                        &Fact::in_range(ValueRange::new(i64::MIN, -1)),
                    ) {
                        match handler {
                            Some(handler) => successors.push((*handler, negative)),
                            None => report.archive_exceptional_exit(negative),
                        }
                    }
                    if state.bind(
                        arena,
                        types,
                        value,
                        &Fact::in_range(ValueRange::new(0, i64::MAX)),
                    ) {
                        successors.push((next, state));
                    }
                }
            }
            Instruction::FlushVariable(var) => {
                state.flush_variable(arena, *var);
                successors.push((next, state));
            }
            Instruction::FlushFields => {
                state.flush_matching(arena, |var| {
                    let info = self.program.variable(var);
                    info.kind == VariableKind::Field && !info.stable
                });
                successors.push((next, state));
            }
            Instruction::FinishElement { flush } => {
                for var in flush {
                    state.flush_variable(arena, *var);
                }
                successors.push((next, state));
            }
            Instruction::EscapeVariables { vars } => {
                for var in vars {
                    state.flush_variable(arena, *var);
                }
                successors.push((next, state));
            }
            Instruction::Nop => {
                successors.push((next, state));
            }
        }

        Ok(successors)
    }

    /// Builds the state that travels an exceptional edge. The operand stack
    /// does not survive the transfer to a handler, which also keeps the
    /// stack depth uniform across every edge entering one.
    fn exceptional_state(state: &MemoryState) -> MemoryState {
        let mut forked = state.fork();
        forked.stack_mut().clear();
        forked
    }

    /// Performs the null check that precedes a dereference of `value`.
    ///
    /// A possibly-null operand is reported, its null projection is sent along
    /// the exceptional edge, and the surviving state continues with the
    /// operand known not-null. Returns whether the main path survives.
    #[allow(clippy::too_many_arguments)]
    fn check_dereference(
        &self,
        index: u32,
        value: ValueId,
        state: &mut MemoryState,
        arena: &ValueArena,
        handler: Option<u32>,
        report: &mut Report,
        successors: &mut Vec<Successor>,
    ) -> bool {
        let types = self.program.types();
        let fact = state.fact_of(arena, value);
        let safe = fact.nullability == Nullability::NotNull;
        report.mark_dereference(index, safe);
        if safe {
            return true;
        }

        report.report_violation(
            index,
            Violation::PossiblyNullDereference {
                certain: fact.nullability == Nullability::Null,
            },
        );
        let mut null_path = Self::exceptional_state(state);
        if null_path.bind(arena, types, value, &Fact::null()) {
            match handler {
                Some(handler) => successors.push((handler, null_path)),
                None => report.archive_exceptional_exit(null_path),
            }
        }
        state.bind(arena, types, value, &Fact::not_null())
    }

    /// Evaluates a binary operation over `lhs` and `rhs`, returning the value
    /// to push or [`None`] when the state became unreachable.
    fn evaluate_binary(
        &self,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        state: &mut MemoryState,
        arena: &mut ValueArena,
    ) -> Option<ValueId> {
        let types = self.program.types();
        let lhs_fact = state.fact_of(arena, lhs);
        let rhs_fact = state.fact_of(arena, rhs);

        match op {
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
                if let Some(outcome) = Self::prove_comparison(op, lhs, rhs, state, arena) {
                    return Some(arena.bool_const(outcome));
                }
                let value = arena.op(op, lhs, rhs);
                state
                    .bind(arena, types, value, &Fact::in_range(ValueRange::new(0, 1)))
                    .then_some(value)
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul => {
                let range = match op {
                    BinOp::Add => lhs_fact.range.checked_add(rhs_fact.range),
                    BinOp::Sub => lhs_fact.range.checked_sub(rhs_fact.range),
                    _ => lhs_fact.range.checked_mul(rhs_fact.range),
                };
                if let Some(n) = range.as_singleton() {
                    return Some(arena.int_const(n));
                }
                let value = arena.op(op, lhs, rhs);
                state
                    .bind(arena, types, value, &Fact::in_range(range))
                    .then_some(value)
            }
            BinOp::Div | BinOp::Rem => {
                let value = arena.op(op, lhs, rhs);
                state
                    .bind(arena, types, value, &Fact::not_null())
                    .then_some(value)
            }
            BinOp::And => match (lhs_fact.as_bool(), rhs_fact.as_bool()) {
                (Some(a), Some(b)) => Some(arena.bool_const(a && b)),
                (Some(false), _) | (_, Some(false)) => Some(arena.bool_const(false)),
                (Some(true), _) => Some(rhs),
                (_, Some(true)) => Some(lhs),
                _ => {
                    let value = arena.op(op, lhs, rhs);
                    state
                        .bind(arena, types, value, &Fact::in_range(ValueRange::new(0, 1)))
                        .then_some(value)
                }
            },
            BinOp::Or => match (lhs_fact.as_bool(), rhs_fact.as_bool()) {
                (Some(a), Some(b)) => Some(arena.bool_const(a || b)),
                (Some(true), _) | (_, Some(true)) => Some(arena.bool_const(true)),
                (Some(false), _) => Some(rhs),
                (_, Some(false)) => Some(lhs),
                _ => {
                    let value = arena.op(op, lhs, rhs);
                    state
                        .bind(arena, types, value, &Fact::in_range(ValueRange::new(0, 1)))
                        .then_some(value)
                }
            },
            BinOp::Xor => {
                // Boolean xor is logical not-equal.
                if let (Some(a), Some(b)) = (lhs_fact.as_bool(), rhs_fact.as_bool()) {
                    return Some(arena.bool_const(a != b));
                }
                if lhs == rhs {
                    let boolean = ValueRange::new(0, 1);
                    return if lhs_fact.range.meet(boolean) == lhs_fact.range {
                        Some(arena.bool_const(false))
                    } else {
                        Some(arena.int_const(0))
                    };
                }
                let boolean = ValueRange::new(0, 1);
                let fact = if lhs_fact.range.meet(boolean) == lhs_fact.range
                    && rhs_fact.range.meet(boolean) == rhs_fact.range
                {
                    Fact::in_range(boolean)
                } else {
                    Fact::not_null()
                };
                let value = arena.op(op, lhs, rhs);
                state.bind(arena, types, value, &fact).then_some(value)
            }
        }
    }

    /// Evaluates a unary operation, returning the value to push or [`None`]
    /// when the state became unreachable.
    fn evaluate_unary(
        &self,
        op: UnOp,
        operand: ValueId,
        state: &mut MemoryState,
        arena: &mut ValueArena,
    ) -> Option<ValueId> {
        let types = self.program.types();
        let fact = state.fact_of(arena, operand);
        match op {
            UnOp::Not => {
                if let Some(b) = fact.as_bool() {
                    return Some(arena.bool_const(!b));
                }
                if let ValueData::UnOp {
                    op: UnOp::Not,
                    operand: inner,
                } = arena.data(operand)
                {
                    return Some(*inner);
                }
                let value = arena.un_op(UnOp::Not, operand);
                state
                    .bind(arena, types, value, &Fact::in_range(ValueRange::new(0, 1)))
                    .then_some(value)
            }
            UnOp::Neg => {
                let range = fact.range.checked_neg();
                if let Some(n) = range.as_singleton() {
                    return Some(arena.int_const(n));
                }
                let value = arena.un_op(UnOp::Neg, operand);
                state
                    .bind(arena, types, value, &Fact::in_range(range))
                    .then_some(value)
            }
        }
    }

    /// Attempts to prove the outcome of a comparison from the two operands'
    /// facts and the state's recorded relations.
    fn prove_comparison(
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        state: &MemoryState,
        arena: &ValueArena,
    ) -> Option<bool> {
        let equal_outcome = |equal: bool| match op {
            BinOp::Eq | BinOp::Le | BinOp::Ge => Some(equal),
            BinOp::Ne | BinOp::Lt | BinOp::Gt => Some(!equal),
            _ => None,
        };

        // Identical handles name the same value.
        if lhs == rhs || state.relations().holds(RelationKind::Equal, lhs, rhs) {
            return equal_outcome(true);
        }
        if state.relations().holds(RelationKind::NotEqual, lhs, rhs) {
            match op {
                BinOp::Eq => return Some(false),
                BinOp::Ne => return Some(true),
                _ => {}
            }
        }

        let lhs_fact = state.fact_of(arena, lhs);
        let rhs_fact = state.fact_of(arena, rhs);

        match (lhs_fact.nullability, rhs_fact.nullability) {
            (Nullability::Null, Nullability::Null) => return equal_outcome(true),
            (Nullability::Null, Nullability::NotNull)
            | (Nullability::NotNull, Nullability::Null) => match op {
                BinOp::Eq => return Some(false),
                BinOp::Ne => return Some(true),
                _ => {}
            },
            _ => {}
        }

        // Constants compare by content; this covers strings as well.
        if let (Constancy::Const(a), Constancy::Const(b)) =
            (&lhs_fact.constancy, &rhs_fact.constancy)
        {
            match op {
                BinOp::Eq => return Some(a == b),
                BinOp::Ne => return Some(a != b),
                _ => {}
            }
        }

        let (lr, rr) = (lhs_fact.range, rhs_fact.range);
        if lr.is_empty() || rr.is_empty() {
            return None;
        }
        if lr.entirely_below(rr) {
            return match op {
                BinOp::Lt | BinOp::Le | BinOp::Ne => Some(true),
                BinOp::Gt | BinOp::Ge | BinOp::Eq => Some(false),
                _ => None,
            };
        }
        if rr.entirely_below(lr) {
            return match op {
                BinOp::Gt | BinOp::Ge | BinOp::Ne => Some(true),
                BinOp::Lt | BinOp::Le | BinOp::Eq => Some(false),
                _ => None,
            };
        }
        if lr.hi() <= rr.lo() {
            match op {
                BinOp::Le => return Some(true),
                BinOp::Gt => return Some(false),
                _ => {}
            }
        }
        if rr.hi() <= lr.lo() {
            match op {
                BinOp::Ge => return Some(true),
                BinOp::Lt => return Some(false),
                _ => {}
            }
        }
        if lr.disjoint_from(rr) && !lr.is_full() && !rr.is_full() {
            match op {
                BinOp::Eq => return Some(false),
                BinOp::Ne => return Some(true),
                _ => {}
            }
        }

        None
    }

    /// Narrows `state` under the assumption that the boolean `value` is
    /// `assumed`, recursing into the value's structure. Returns whether the
    /// narrowed state is still reachable.
    fn apply_condition(
        &self,
        state: &mut MemoryState,
        arena: &mut ValueArena,
        value: ValueId,
        assumed: bool,
    ) -> bool {
        let types = self.program.types();
        if !state.bind(
            arena,
            types,
            value,
            &Fact::for_constant(&ConstantValue::Bool(assumed)),
        ) {
            return false;
        }

        match arena.data(value).clone() {
            ValueData::UnOp {
                op: UnOp::Not,
                operand,
            } => self.apply_condition(state, arena, operand, !assumed),
            ValueData::Op { op, lhs, rhs } => {
                self.apply_boolean_op(state, arena, op, lhs, rhs, assumed)
            }
            ValueData::InstanceOf { operand, tested } => {
                if assumed {
                    state.bind(arena, types, operand, &Fact::instance_of(tested))
                } else {
                    let current = state.fact_of(arena, operand);
                    if let TypeConstraint::Upper(upper) = current.type_constraint {
                        if types.is_subtype(upper, tested) {
                            // An instance of a subtype can only fail the test
                            // by being null.
                            return state.bind(arena, types, operand, &Fact::null());
                        }
                    }
                    true
                }
            }
            _ => true,
        }
    }

    /// Narrows `state` under the assumption that the boolean operation
    /// `lhs op rhs` evaluates to `assumed`.
    fn apply_boolean_op(
        &self,
        state: &mut MemoryState,
        arena: &mut ValueArena,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
        assumed: bool,
    ) -> bool {
        match (op, assumed) {
            (BinOp::And, true) => {
                self.apply_condition(state, arena, lhs, true)
                    && self.apply_condition(state, arena, rhs, true)
            }
            (BinOp::Or, false) => {
                self.apply_condition(state, arena, lhs, false)
                    && self.apply_condition(state, arena, rhs, false)
            }
            (BinOp::And, false) | (BinOp::Or, true) => true,
            (BinOp::Xor, assumed) => self.narrow_relational(
                state,
                arena,
                if assumed { BinOp::Ne } else { BinOp::Eq },
                lhs,
                rhs,
            ),
            (BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge, _) => {
                let holding = if assumed {
                    op
                } else {
                    match op {
                        BinOp::Eq => BinOp::Ne,
                        BinOp::Ne => BinOp::Eq,
                        BinOp::Lt => BinOp::Ge,
                        BinOp::Le => BinOp::Gt,
                        BinOp::Gt => BinOp::Le,
                        _ => BinOp::Lt,
                    }
                };
                self.narrow_relational(state, arena, holding, lhs, rhs)
            }
            _ => true,
        }
    }

    /// Narrows `state` knowing that the relational operation `lhs op rhs`
    /// holds.
    fn narrow_relational(
        &self,
        state: &mut MemoryState,
        arena: &ValueArena,
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    ) -> bool {
        let types = self.program.types();
        match op {
            BinOp::Eq => {
                state.relations_mut().add(RelationKind::Equal, lhs, rhs);
                let met = state
                    .fact_of(arena, lhs)
                    .meet(&state.fact_of(arena, rhs), types);
                if met.is_bottom() {
                    return false;
                }
                state.bind(arena, types, lhs, &met) && state.bind(arena, types, rhs, &met)
            }
            BinOp::Ne => {
                state.relations_mut().add(RelationKind::NotEqual, lhs, rhs);
                let lhs_fact = state.fact_of(arena, lhs);
                let rhs_fact = state.fact_of(arena, rhs);
                if lhs_fact.nullability == Nullability::Null
                    && !state.bind(arena, types, rhs, &Fact::not_null())
                {
                    return false;
                }
                if rhs_fact.nullability == Nullability::Null
                    && !state.bind(arena, types, lhs, &Fact::not_null())
                {
                    return false;
                }
                if let Some(n) = rhs_fact.range.as_singleton() {
                    if !self.shave_endpoint(state, arena, lhs, n) {
                        return false;
                    }
                }
                if let Some(n) = lhs_fact.range.as_singleton() {
                    if !self.shave_endpoint(state, arena, rhs, n) {
                        return false;
                    }
                }
                true
            }
            BinOp::Lt => self.narrow_ordering(state, arena, lhs, rhs, true),
            BinOp::Le => self.narrow_ordering(state, arena, lhs, rhs, false),
            BinOp::Gt => self.narrow_ordering(state, arena, rhs, lhs, true),
            BinOp::Ge => self.narrow_ordering(state, arena, rhs, lhs, false),
            _ => true,
        }
    }

    /// Narrows `state` knowing that `smaller < larger` (strict) or
    /// `smaller <= larger` (non-strict).
    fn narrow_ordering(
        &self,
        state: &mut MemoryState,
        arena: &ValueArena,
        smaller: ValueId,
        larger: ValueId,
        strict: bool,
    ) -> bool {
        let types = self.program.types();
        let smaller_range = state.fact_of(arena, smaller).range;
        let larger_range = state.fact_of(arena, larger).range;

        let upper = if strict {
            match larger_range.hi().checked_sub(1) {
                Some(upper) => upper,
                None => return false,
            }
        } else {
            larger_range.hi()
        };
        let lower = if strict {
            match smaller_range.lo().checked_add(1) {
                Some(lower) => lower,
                None => return false,
            }
        } else {
            smaller_range.lo()
        };

        state.bind(
            arena,
            types,
            smaller,
            &Fact::in_range(ValueRange::new(i64::MIN, upper)),
        ) && state.bind(
            arena,
            types,
            larger,
            &Fact::in_range(ValueRange::new(lower, i64::MAX)),
        )
    }

    /// Removes the single point `n` from the range of `value` where it sits
    /// on an endpoint. Returns whether the state is still reachable.
    fn shave_endpoint(
        &self,
        state: &mut MemoryState,
        arena: &ValueArena,
        value: ValueId,
        n: i64,
    ) -> bool {
        let types = self.program.types();
        let range = state.fact_of(arena, value).range;
        if range.as_singleton() == Some(n) {
            return false;
        }
        let narrowed = if range.lo() == n {
            ValueRange::new(n + 1, range.hi())
        } else if range.hi() == n {
            ValueRange::new(range.lo(), n - 1)
        } else {
            return true;
        };
        state.bind(arena, types, value, &Fact::in_range(narrowed))
    }
}
