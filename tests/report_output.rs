//! Tests the consumer-facing report summary produced from a full run.

mod common;

use dataflow_analyzer::{
    contract::CallDescriptor,
    engine::RunStatus,
    program::{Instruction, ProgramBuilder, VariableInfo},
    report::ReportSummary,
    value::{BinOp, ConstantValue},
};

#[test]
fn the_summary_reflects_the_run() -> anyhow::Result<()> {
    // if (1 < 2) { pureCall(); p.f; }
    let mut builder = ProgramBuilder::new();
    let p = builder.declare_variable(VariableInfo::parameter());
    let f = builder.declare_variable(VariableInfo::field(false));
    let callee = builder.declare_call(CallDescriptor::opaque(0).with_purity());
    let then = builder.new_label();

    builder.emit(Instruction::PushConstant(ConstantValue::Int(1)));
    builder.emit(Instruction::PushConstant(ConstantValue::Int(2)));
    builder.emit(Instruction::Binary(BinOp::Lt));
    let branch = builder.cond_goto(then);
    builder.emit(Instruction::Return);
    builder.bind_label(then)?;
    let call_site = builder.call(callee, None);
    builder.emit(Instruction::PushVariable(p));
    let deref = builder.get_field(f, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    assert_eq!(result.status, RunStatus::Completed);

    let summary = result.report.summary();
    assert_eq!(summary.always_true_branches, vec![branch]);
    assert!(summary.always_false_branches.is_empty());
    assert_eq!(summary.pure_calls, vec![call_site]);

    // The dereference of the unchecked parameter is the one violation, and
    // with a possibly-null operand the site is not proven safe.
    assert_eq!(summary.violations.len(), 1);
    assert_eq!(summary.violations[0].location, deref);
    assert!(summary.violations[0].message.contains("dereferenced"));
    assert!(summary.safe_dereferences.is_empty());

    Ok(())
}

#[test]
fn the_summary_round_trips_through_json() -> anyhow::Result<()> {
    let mut builder = ProgramBuilder::new();
    let p = builder.declare_variable(VariableInfo::parameter());
    let f = builder.declare_variable(VariableInfo::field(false));

    builder.emit(Instruction::PushVariable(p));
    builder.get_field(f, None);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let result = common::run(program)?;
    let summary = result.report.summary();

    let encoded = serde_json::to_string(&summary)?;
    let decoded: ReportSummary = serde_json::from_str(&encoded)?;
    assert_eq!(summary, decoded);
    assert!(!decoded.violations.is_empty());

    Ok(())
}
