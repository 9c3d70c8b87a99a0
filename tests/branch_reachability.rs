//! Tests the sticky branch-edge recording: provable conditions leave one
//! edge untaken, and proofs flow from ranges, type tests, and value
//! identity.

mod common;

use dataflow_analyzer::{
    engine::RunStatus,
    fact::{Fact, TypeHierarchy, ValueRange},
    program::{Instruction, ProgramBuilder, VariableInfo},
    value::{BinOp, ConstantValue},
};

#[test]
fn a_range_proves_a_comparison() -> anyhow::Result<()> {
    // x = 5; if (x < 10) { ... } -- the false edge is never taken.
    let mut builder = ProgramBuilder::new();
    let x = builder.declare_variable(VariableInfo::local());
    let taken = builder.new_label();

    builder.emit(Instruction::PushConstant(ConstantValue::Int(5)));
    builder.emit(Instruction::Assign { var: x, init: true });
    builder.emit(Instruction::PushVariable(x));
    builder.emit(Instruction::PushConstant(ConstantValue::Int(10)));
    builder.emit(Instruction::Binary(BinOp::Lt));
    let branch = builder.cond_goto(taken);
    builder.emit(Instruction::Nop);
    builder.bind_label(taken)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.report.branch_always_true(branch));

    Ok(())
}

#[test]
fn a_duplicated_value_always_equals_itself() -> anyhow::Result<()> {
    // An otherwise unknown value compared with its own duplicate.
    let mut builder = ProgramBuilder::new();
    let taken = builder.new_label();

    builder.emit(Instruction::PushUnknown { fact: Fact::top() });
    builder.emit(Instruction::Dup);
    builder.emit(Instruction::Binary(BinOp::Eq));
    let branch = builder.cond_goto(taken);
    builder.emit(Instruction::Nop);
    builder.bind_label(taken)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert!(result.report.branch_always_true(branch));

    Ok(())
}

#[test]
fn two_distinct_unknowns_keep_both_edges() -> anyhow::Result<()> {
    let mut builder = ProgramBuilder::new();
    let taken = builder.new_label();

    builder.emit(Instruction::PushUnknown { fact: Fact::top() });
    builder.emit(Instruction::PushUnknown { fact: Fact::top() });
    builder.emit(Instruction::Binary(BinOp::Eq));
    let branch = builder.cond_goto(taken);
    builder.emit(Instruction::Nop);
    builder.bind_label(taken)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    let record = result.report.branch(branch).expect("Branch was not reached");
    assert!(record.true_taken);
    assert!(record.false_taken);

    Ok(())
}

#[test]
fn a_subtype_is_always_an_instance_of_its_supertype() -> anyhow::Result<()> {
    let mut types = TypeHierarchy::new();
    let object = types.add_root();
    let string = types.add_subtype(object);

    let mut builder = ProgramBuilder::new().with_types(types);
    let taken = builder.new_label();

    builder.emit(Instruction::PushUnknown {
        fact: Fact::instance_of(string),
    });
    builder.emit(Instruction::IsInstance { tested: object });
    let branch = builder.cond_goto(taken);
    builder.emit(Instruction::Nop);
    builder.bind_label(taken)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert!(result.report.branch_always_true(branch));

    Ok(())
}

#[test]
fn unrelated_types_are_never_instances() -> anyhow::Result<()> {
    let mut types = TypeHierarchy::new();
    let object = types.add_root();
    let string = types.add_subtype(object);
    let integer = types.add_subtype(object);

    let mut builder = ProgramBuilder::new().with_types(types);
    let taken = builder.new_label();

    builder.emit(Instruction::PushUnknown {
        fact: Fact::instance_of(string),
    });
    builder.emit(Instruction::IsInstance { tested: integer });
    let branch = builder.cond_goto(taken);
    builder.emit(Instruction::Nop);
    builder.bind_label(taken)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert!(result.report.branch_always_false(branch));

    Ok(())
}

#[test]
fn xor_on_booleans_behaves_as_not_equal() -> anyhow::Result<()> {
    // b ^ b is always false for a boolean b.
    let mut builder = ProgramBuilder::new();
    let taken = builder.new_label();

    builder.emit(Instruction::PushUnknown {
        fact: Fact::in_range(ValueRange::new(0, 1)),
    });
    builder.emit(Instruction::Dup);
    builder.emit(Instruction::Binary(BinOp::Xor));
    let branch = builder.cond_goto(taken);
    builder.emit(Instruction::Nop);
    builder.bind_label(taken)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert!(result.report.branch_always_false(branch));

    Ok(())
}

#[test]
fn unreached_code_leaves_no_branch_record() -> anyhow::Result<()> {
    // The second branch sits behind a goto that skips it.
    let mut builder = ProgramBuilder::new();
    let end = builder.new_label();
    let dead = builder.new_label();

    builder.goto(end);
    builder.bind_label(dead)?;
    builder.emit(Instruction::PushConstant(ConstantValue::Bool(true)));
    let unreached = builder.cond_goto(end);
    builder.bind_label(end)?;
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert_eq!(result.status, RunStatus::Completed);
    assert!(result.report.branch(unreached).is_none());

    Ok(())
}
