//! Tests that malformed programs fail the run loudly instead of producing
//! facts of unknowable soundness.

use dataflow_analyzer::{
    engine::Engine,
    error::analysis::Error,
    fact::{Fact, ValueRange},
    program::{Instruction, ProgramBuilder},
    value::ConstantValue,
    watchdog::LazyWatchdog,
};

#[test]
fn arms_joining_at_different_stack_depths_fail_loudly() -> anyhow::Result<()> {
    // One branch arm leaves one operand, the other leaves two, and both fall
    // into the same join point.
    let mut builder = ProgramBuilder::new();
    let then = builder.new_label();
    let join = builder.new_label();

    builder.emit(Instruction::PushUnknown {
        fact: Fact::in_range(ValueRange::new(0, 1)),
    });
    builder.cond_goto(then);
    builder.emit(Instruction::PushConstant(ConstantValue::Int(1)));
    builder.goto(join);
    builder.bind_label(then)?;
    builder.emit(Instruction::PushConstant(ConstantValue::Int(1)));
    builder.emit(Instruction::PushConstant(ConstantValue::Int(2)));
    builder.bind_label(join)?;
    let at_join = builder.emit(Instruction::Nop);
    builder.emit(Instruction::Return);
    let program = builder.finish()?;

    let error = Engine::new(program, LazyWatchdog.in_rc())
        .run()
        .expect_err("A stack depth mismatch at the join was accepted");
    assert_eq!(error.location, at_join);
    assert!(matches!(error.payload, Error::StackShapeMismatch { .. }));

    Ok(())
}
