//! Tests the dispatch of calls against their declared contracts: not-null
//! argument requirements, purity, precomputed results, and the flushing of
//! field facts across impure calls.

mod common;

use dataflow_analyzer::{
    contract::{ArgRequirement, CallDescriptor},
    engine::RunStatus,
    fact::{Fact, ValueRange},
    program::{Instruction, ProgramBuilder, VariableInfo},
    report::Violation,
    value::{BinOp, ConstantValue},
};

#[test]
fn a_provably_null_argument_kills_the_calling_path() -> anyhow::Result<()> {
    let mut builder = ProgramBuilder::new();
    let callee =
        builder.declare_call(CallDescriptor::opaque(1).requiring(0, ArgRequirement::NotNull));

    builder.emit(Instruction::PushConstant(ConstantValue::Null));
    let site = builder.call(callee, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert_eq!(result.status, RunStatus::Completed);

    assert_eq!(result.report.violations().len(), 1);
    let violation = &result.report.violations()[0];
    assert_eq!(violation.location, site);
    assert_eq!(
        violation.payload,
        Violation::ArgumentMustNotBeNull {
            position: 0,
            certain: true
        }
    );

    // Binding the argument as non-null contradicts the state, so nothing
    // survives past the call.
    assert!(result.report.exit_states().is_empty());
    assert!(result.report.exceptional_exits().is_empty());

    Ok(())
}

#[test]
fn a_possibly_null_argument_is_reported_but_survives() -> anyhow::Result<()> {
    let mut builder = ProgramBuilder::new();
    let callee =
        builder.declare_call(CallDescriptor::opaque(1).requiring(0, ArgRequirement::NotNull));

    builder.emit(Instruction::PushUnknown { fact: Fact::top() });
    let site = builder.call(callee, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert_eq!(result.report.violations().len(), 1);
    assert_eq!(
        result.report.violations()[0].payload,
        Violation::ArgumentMustNotBeNull {
            position: 0,
            certain: false
        }
    );
    assert_eq!(result.report.violations()[0].location, site);

    // The surviving path reaches the return; the callee's own exceptional
    // edge leaves the method unhandled.
    assert_eq!(result.report.exit_states().len(), 1);
    assert_eq!(result.report.exceptional_exits().len(), 1);

    Ok(())
}

#[test]
fn a_vararg_tail_is_exempt_from_not_null() -> anyhow::Result<()> {
    let mut builder = ProgramBuilder::new();
    let callee = builder.declare_call(
        CallDescriptor::opaque(1)
            .with_vararg()
            .requiring(0, ArgRequirement::NotNull),
    );

    builder.emit(Instruction::PushConstant(ConstantValue::Null));
    builder.call(callee, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert!(result.report.violations().is_empty());
    assert_eq!(result.report.exit_states().len(), 1);

    Ok(())
}

#[test]
fn a_pure_precomputed_call_folds_to_its_constant() -> anyhow::Result<()> {
    let mut builder = ProgramBuilder::new();
    let callee = builder.declare_call(
        CallDescriptor::opaque(0)
            .with_purity()
            .with_precomputed(ConstantValue::Int(7)),
    );

    let site = builder.call(callee, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert!(result.report.pure_calls().contains(&site));

    assert_eq!(result.report.exit_states().len(), 1);
    let state = &result.report.exit_states()[0];
    let top = state.stack().peek(0)?;
    assert_eq!(
        state.fact_of(&result.arena, top).range,
        ValueRange::singleton(7)
    );

    Ok(())
}

#[test]
fn a_call_receiver_is_a_dereference() -> anyhow::Result<()> {
    let mut builder = ProgramBuilder::new();
    let callee = builder.declare_call(CallDescriptor::opaque(0).with_receiver());

    builder.emit(Instruction::PushUnknown { fact: Fact::top() });
    let site = builder.call(callee, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert_eq!(result.report.violations().len(), 1);
    assert_eq!(result.report.violations()[0].location, site);
    assert_eq!(
        result.report.violations()[0].payload,
        Violation::PossiblyNullDereference { certain: false }
    );

    Ok(())
}

#[test]
fn an_impure_call_forgets_unstable_field_facts() -> anyhow::Result<()> {
    // obj.f = 5; impureCall(); -- the stored field fact does not survive.
    let mut builder = ProgramBuilder::new();
    let obj = builder.declare_variable(VariableInfo::local());
    let f = builder.declare_variable(VariableInfo::field(false));
    let callee = builder.declare_call(CallDescriptor::opaque(0));

    builder.emit(Instruction::PushUnknown {
        fact: Fact::not_null(),
    });
    builder.emit(Instruction::Assign { var: obj, init: true });
    builder.emit(Instruction::PushVariable(obj));
    builder.emit(Instruction::PushConstant(ConstantValue::Int(5)));
    builder.set_field(f, None);
    builder.call(callee, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let mut result = common::run(program)?;
    assert_eq!(result.report.exit_states().len(), 1);

    let obj_value = result.arena.variable(obj);
    let field_value = result.arena.field_ref(obj_value, f);
    let state = &result.report.exit_states()[0];
    assert_eq!(state.fact_of(&result.arena, field_value), Fact::top());

    Ok(())
}

#[test]
fn a_field_read_is_not_trusted_across_an_impure_call() -> anyhow::Result<()> {
    // if (obj.f == obj.f) with an impure call between the two reads: the
    // callee may have changed the field, so the comparison must stay open.
    let mut builder = ProgramBuilder::new();
    let obj = builder.declare_variable(VariableInfo::local());
    let f = builder.declare_variable(VariableInfo::field(false));
    let callee = builder.declare_call(CallDescriptor::opaque(0));
    let taken = builder.new_label();

    builder.emit(Instruction::PushUnknown {
        fact: Fact::not_null(),
    });
    builder.emit(Instruction::Assign { var: obj, init: true });
    builder.emit(Instruction::PushVariable(obj));
    builder.get_field(f, None);
    builder.call(callee, None);
    builder.emit(Instruction::Splice {
        pop: 1,
        push: vec![],
    });
    builder.emit(Instruction::PushVariable(obj));
    builder.get_field(f, None);
    builder.emit(Instruction::Binary(BinOp::Eq));
    let branch = builder.cond_goto(taken);
    builder.emit(Instruction::Return);
    builder.bind_label(taken)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert_eq!(result.status, RunStatus::Completed);

    let record = result
        .report
        .branch(branch)
        .expect("The comparison branch was never reached");
    assert!(record.true_taken);
    assert!(record.false_taken);
    assert!(!result.report.branch_always_true(branch));

    Ok(())
}

#[test]
fn a_pure_call_preserves_field_facts() -> anyhow::Result<()> {
    // obj.f = 5; pureCall(); -- the stored field fact survives.
    let mut builder = ProgramBuilder::new();
    let obj = builder.declare_variable(VariableInfo::local());
    let f = builder.declare_variable(VariableInfo::field(false));
    let callee = builder.declare_call(CallDescriptor::opaque(0).with_purity());

    builder.emit(Instruction::PushUnknown {
        fact: Fact::not_null(),
    });
    builder.emit(Instruction::Assign { var: obj, init: true });
    builder.emit(Instruction::PushVariable(obj));
    builder.emit(Instruction::PushConstant(ConstantValue::Int(5)));
    builder.set_field(f, None);
    builder.call(callee, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let mut result = common::run(program)?;
    assert_eq!(result.report.exit_states().len(), 1);

    let obj_value = result.arena.variable(obj);
    let field_value = result.arena.field_ref(obj_value, f);
    let state = &result.report.exit_states()[0];
    assert_eq!(
        state.fact_of(&result.arena, field_value).range,
        ValueRange::singleton(5)
    );

    Ok(())
}
