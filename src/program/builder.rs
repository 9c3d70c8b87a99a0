//! This module contains the builder through which the front end assembles an
//! instruction program.
//!
//! Forward references are expressed as [`Label`]s: a jump may be emitted
//! before its target exists, and the unresolved offset lives in a patch list
//! until [`ProgramBuilder::finish`] resolves every label and freezes the
//! program. No symbolic offset ever reaches the engine.

use crate::{
    contract::{CallDescriptor, CallId},
    error::program::{Error, Result},
    error::container::Locatable,
    fact::{TypeHierarchy, TypeId},
    program::{instruction::Instruction, Program, VariableInfo},
    value::{SpecialField, VariableId},
};

/// A forward-referenceable jump target.
///
/// Labels are only meaningful with respect to the builder that produced
/// them.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Label(u32);

/// Which target slot of an instruction a patch applies to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum TargetSlot {
    /// The primary jump target of a goto-like instruction.
    Primary,

    /// The exceptional-edge handler of a risky instruction.
    Handler,
}

/// A pending offset patch recorded while the program is under construction.
#[derive(Clone, Copy, Debug)]
struct Fixup {
    /// The index of the instruction to patch.
    instruction: u32,

    /// The slot within that instruction to patch.
    slot: TargetSlot,

    /// The label whose bound index will be written into the slot.
    label: Label,
}

/// The placeholder written into unresolved target slots. Never survives
/// `finish`.
const UNRESOLVED: u32 = u32::MAX;

/// The builder for instruction programs.
#[derive(Clone, Debug, Default)]
pub struct ProgramBuilder {
    instructions: Vec<Instruction>,
    label_bindings: Vec<Option<u32>>,
    fixups: Vec<Fixup>,
    variables: Vec<VariableInfo>,
    calls: Vec<CallDescriptor>,
    types: TypeHierarchy,
}

impl ProgramBuilder {
    /// Constructs a new, empty program builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the type hierarchy that the program's type constraints resolve
    /// against.
    #[must_use]
    pub fn with_types(mut self, types: TypeHierarchy) -> Self {
        self.types = types;
        self
    }

    /// Declares a variable slot, returning its handle.
    pub fn declare_variable(&mut self, info: VariableInfo) -> VariableId {
        let id = VariableId(
            u32::try_from(self.variables.len())
                .expect("Variable table should not exceed u32::MAX entries"),
        );
        self.variables.push(info);
        id
    }

    /// Declares a call site, returning its handle.
    pub fn declare_call(&mut self, descriptor: CallDescriptor) -> CallId {
        let id = CallId(
            u32::try_from(self.calls.len()).expect("Call table should not exceed u32::MAX entries"),
        );
        self.calls.push(descriptor);
        id
    }

    /// Creates a fresh, unbound label.
    pub fn new_label(&mut self) -> Label {
        let label = Label(
            u32::try_from(self.label_bindings.len())
                .expect("Label table should not exceed u32::MAX entries"),
        );
        self.label_bindings.push(None);
        label
    }

    /// Binds `label` to the index of the next instruction to be emitted.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the label has already been bound.
    pub fn bind_label(&mut self, label: Label) -> Result<()> {
        let here = self.next_index();
        let binding = &mut self.label_bindings[label.0 as usize];
        if binding.is_some() {
            return Err(Error::LabelBoundTwice(label.0).locate(here));
        }
        *binding = Some(here);
        Ok(())
    }

    /// Emits `instruction` at the end of the program, returning its index.
    pub fn emit(&mut self, instruction: Instruction) -> u32 {
        let index = self.next_index();
        self.instructions.push(instruction);
        index
    }

    /// Emits an unconditional jump to `label`.
    pub fn goto(&mut self, label: Label) -> u32 {
        self.emit_with_primary(Instruction::Goto { target: UNRESOLVED }, label)
    }

    /// Emits a conditional jump to `label`; control falls through when the
    /// popped condition does not hold.
    pub fn cond_goto(&mut self, label: Label) -> u32 {
        self.emit_with_primary(Instruction::CondGoto { target: UNRESOLVED }, label)
    }

    /// Emits a subroutine jump to `label`.
    pub fn gosub(&mut self, label: Label) -> u32 {
        self.emit_with_primary(Instruction::Gosub { target: UNRESOLVED }, label)
    }

    /// Emits a throw whose exceptional edge goes to `handler`, or leaves the
    /// method when there is none.
    pub fn throw(&mut self, handler: Option<Label>) -> u32 {
        self.emit_with_handler(Instruction::Throw { handler: None }, handler)
    }

    /// Emits a not-null check on the top operand with an exceptional edge to
    /// `handler`.
    pub fn check_not_null(&mut self, handler: Option<Label>) -> u32 {
        self.emit_with_handler(Instruction::CheckNotNull { handler: None }, handler)
    }

    /// Emits an array-size check on the top operand with an exceptional edge
    /// to `handler`.
    pub fn array_size_check(&mut self, handler: Option<Label>) -> u32 {
        self.emit_with_handler(Instruction::ArraySizeCheck { handler: None }, handler)
    }

    /// Emits a field read with an exceptional edge to `handler`.
    pub fn get_field(&mut self, field: VariableId, handler: Option<Label>) -> u32 {
        self.emit_with_handler(
            Instruction::GetField {
                field,
                handler: None,
            },
            handler,
        )
    }

    /// Emits a field write with an exceptional edge to `handler`.
    pub fn set_field(&mut self, field: VariableId, handler: Option<Label>) -> u32 {
        self.emit_with_handler(
            Instruction::SetField {
                field,
                handler: None,
            },
            handler,
        )
    }

    /// Emits an array element read with an exceptional edge to `handler`.
    pub fn get_element(&mut self, handler: Option<Label>) -> u32 {
        self.emit_with_handler(Instruction::GetElement { handler: None }, handler)
    }

    /// Emits a reference cast to `target` with an exceptional edge to
    /// `handler`.
    pub fn cast(&mut self, target: TypeId, handler: Option<Label>) -> u32 {
        self.emit_with_handler(
            Instruction::Cast {
                target,
                handler: None,
            },
            handler,
        )
    }

    /// Emits a synthetic accessor read with an exceptional edge to
    /// `handler`.
    pub fn read_special(&mut self, field: SpecialField, handler: Option<Label>) -> u32 {
        self.emit_with_handler(
            Instruction::ReadSpecial {
                field,
                handler: None,
            },
            handler,
        )
    }

    /// Emits a call to the site described by `call` with an exceptional edge
    /// to `handler`.
    pub fn call(&mut self, call: CallId, handler: Option<Label>) -> u32 {
        self.emit_with_handler(
            Instruction::Call {
                call,
                handler: None,
            },
            handler,
        )
    }

    /// Resolves every label, validates every table reference, and freezes the
    /// program.
    ///
    /// After this point the instruction sequence is immutable; the one-time
    /// offset patch has happened and no symbolic target remains.
    ///
    /// # Errors
    ///
    /// Returns [`Err`] if the program is empty, any referenced label is
    /// unbound or points past the end of the program, or any instruction
    /// refers to a missing variable, call site, or type.
    pub fn finish(mut self) -> Result<Program> {
        if self.instructions.is_empty() {
            return Err(Error::EmptyProgram.locate(0));
        }
        let len = self.next_index();

        for fixup in &self.fixups {
            let resolved = self.label_bindings[fixup.label.0 as usize]
                .ok_or(Error::UnboundLabel(fixup.label.0).locate(fixup.instruction))?;
            if resolved >= len {
                return Err(Error::TargetOutOfBounds {
                    target: resolved,
                    available: len,
                }
                .locate(fixup.instruction));
            }
            let instruction = &mut self.instructions[fixup.instruction as usize];
            patch_target(instruction, fixup.slot, resolved);
        }

        self.validate_references()?;

        Ok(Program::new(
            self.instructions,
            self.variables,
            self.calls,
            self.types,
        ))
    }

    /// Checks that every variable, call, and type referenced by an
    /// instruction exists in the corresponding table.
    fn validate_references(&self) -> Result<()> {
        for (index, instruction) in self.instructions.iter().enumerate() {
            let here = u32::try_from(index).expect("Program length was validated");
            match instruction {
                Instruction::PushVariable(var)
                | Instruction::GetField { field: var, .. }
                | Instruction::SetField { field: var, .. }
                | Instruction::Assign { var, .. }
                | Instruction::FlushVariable(var) => self.check_variable(*var, here)?,
                Instruction::FinishElement { flush: vars }
                | Instruction::EscapeVariables { vars } => {
                    for var in vars {
                        self.check_variable(*var, here)?;
                    }
                }
                Instruction::Call { call, .. } => {
                    if self.calls.get(call.0 as usize).is_none() {
                        return Err(Error::UnknownCallSite(call.0).locate(here));
                    }
                }
                Instruction::Cast { target, .. } | Instruction::IsInstance { tested: target } => {
                    if !self.types.contains(*target) {
                        return Err(Error::UnknownType(target.0).locate(here));
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn check_variable(&self, var: VariableId, here: u32) -> Result<()> {
        if self.variables.get(var.0 as usize).is_none() {
            return Err(Error::UnknownVariable(var.0).locate(here));
        }
        Ok(())
    }

    fn emit_with_primary(&mut self, instruction: Instruction, label: Label) -> u32 {
        let index = self.emit(instruction);
        self.fixups.push(Fixup {
            instruction: index,
            slot: TargetSlot::Primary,
            label,
        });
        index
    }

    fn emit_with_handler(&mut self, instruction: Instruction, handler: Option<Label>) -> u32 {
        let index = self.emit(instruction);
        if let Some(label) = handler {
            self.fixups.push(Fixup {
                instruction: index,
                slot: TargetSlot::Handler,
                label,
            });
        }
        index
    }

    fn next_index(&self) -> u32 {
        u32::try_from(self.instructions.len())
            .unwrap_or_else(|_| panic!("Program length should not exceed {}", u32::MAX))
    }
}

/// Writes `resolved` into the requested target slot of `instruction`.
///
/// # Panics
///
/// Panics if the instruction has no such slot; fixups are only recorded for
/// instructions that do, so this is a programmer bug.
fn patch_target(instruction: &mut Instruction, slot: TargetSlot, resolved: u32) {
    match (slot, instruction) {
        (
            TargetSlot::Primary,
            Instruction::Goto { target }
            | Instruction::CondGoto { target }
            | Instruction::Gosub { target },
        ) => *target = resolved,
        (
            TargetSlot::Handler,
            Instruction::GetField { handler, .. }
            | Instruction::SetField { handler, .. }
            | Instruction::GetElement { handler }
            | Instruction::Cast { handler, .. }
            | Instruction::ReadSpecial { handler, .. }
            | Instruction::Call { handler, .. }
            | Instruction::Throw { handler }
            | Instruction::CheckNotNull { handler }
            | Instruction::ArraySizeCheck { handler },
        ) => *handler = Some(resolved),
        (_, other) => panic!("Instruction {} has no {slot:?} target slot", other.name()),
    }
}

#[cfg(test)]
mod test {
    use crate::{
        error::program::Error,
        program::{instruction::Instruction, ProgramBuilder, VariableInfo},
        value::{ConstantValue, VariableId},
    };

    #[test]
    fn forward_references_are_patched_on_finish() -> anyhow::Result<()> {
        let mut builder = ProgramBuilder::new();
        let end = builder.new_label();

        builder.emit(Instruction::PushConstant(ConstantValue::Bool(true)));
        builder.cond_goto(end);
        builder.emit(Instruction::Nop);
        builder.bind_label(end)?;
        builder.emit(Instruction::Return);

        let program = builder.finish()?;
        assert_eq!(
            program.get(1),
            Some(&Instruction::CondGoto { target: 3 })
        );

        Ok(())
    }

    #[test]
    fn unbound_labels_are_rejected() {
        let mut builder = ProgramBuilder::new();
        let nowhere = builder.new_label();
        builder.goto(nowhere);
        builder.emit(Instruction::Return);

        let error = builder.finish().expect_err("An unbound label was resolved");
        assert_eq!(error.payload, Error::UnboundLabel(0));
    }

    #[test]
    fn labels_cannot_be_bound_twice() -> anyhow::Result<()> {
        let mut builder = ProgramBuilder::new();
        let label = builder.new_label();
        builder.emit(Instruction::Nop);
        builder.bind_label(label)?;
        let error = builder
            .bind_label(label)
            .expect_err("A label was bound twice");
        assert_eq!(error.payload, Error::LabelBoundTwice(0));

        Ok(())
    }

    #[test]
    fn labels_past_the_end_are_rejected() -> anyhow::Result<()> {
        let mut builder = ProgramBuilder::new();
        let past_end = builder.new_label();
        builder.goto(past_end);
        builder.emit(Instruction::Return);
        builder.bind_label(past_end)?;

        let error = builder
            .finish()
            .expect_err("A label past the program end was resolved");
        assert_eq!(
            error.payload,
            Error::TargetOutOfBounds {
                target: 2,
                available: 2,
            }
        );

        Ok(())
    }

    #[test]
    fn empty_programs_are_rejected() {
        let error = ProgramBuilder::new()
            .finish()
            .expect_err("An empty program was frozen");
        assert_eq!(error.payload, Error::EmptyProgram);
    }

    #[test]
    fn undeclared_variables_are_rejected() {
        let mut builder = ProgramBuilder::new();
        builder.emit(Instruction::PushVariable(VariableId(7)));
        builder.emit(Instruction::Return);

        let error = builder
            .finish()
            .expect_err("An undeclared variable was accepted");
        assert_eq!(error.payload, Error::UnknownVariable(7));
    }

    #[test]
    fn declared_variables_are_accepted() -> anyhow::Result<()> {
        let mut builder = ProgramBuilder::new();
        let var = builder.declare_variable(VariableInfo::local());
        builder.emit(Instruction::PushVariable(var));
        builder.emit(Instruction::Return);
        builder.finish()?;

        Ok(())
    }
}
