//! This module contains the program representation that the engine consumes:
//! the flat instruction list, the variable and call tables, and the type
//! hierarchy, all produced by the front-end control-flow builder.

pub mod builder;
pub mod instruction;

pub use builder::{Label, ProgramBuilder};
pub use instruction::{Instruction, NumericWidth};

use crate::{
    contract::{CallDescriptor, CallId},
    fact::{Fact, TypeHierarchy},
    value::VariableId,
};

/// The kind of slot a variable occupies.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VariableKind {
    /// A method parameter.
    Parameter,

    /// A local variable.
    Local,

    /// A field, qualified or not.
    Field,
}

/// Static information about one variable slot.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct VariableInfo {
    /// What kind of slot this is.
    pub kind: VariableKind,

    /// Whether the slot is stable: a stable slot cannot be changed by
    /// unrelated code, so its facts survive calls and aliasing flushes.
    /// Parameters and locals are stable; fields are stable only when the
    /// front end has proven them so (e.g. final fields).
    pub stable: bool,

    /// The fact declared for the slot at method entry, bound before the
    /// first instruction executes. Carries a parameter's declared
    /// nullability and type, or the caller's knowledge of a bound receiver;
    /// [`None`] means nothing is known on entry.
    pub declared: Option<Fact>,
}

impl VariableInfo {
    /// A method parameter slot.
    #[must_use]
    pub fn parameter() -> Self {
        Self {
            kind: VariableKind::Parameter,
            stable: true,
            declared: None,
        }
    }

    /// A local variable slot.
    #[must_use]
    pub fn local() -> Self {
        Self {
            kind: VariableKind::Local,
            stable: true,
            declared: None,
        }
    }

    /// A field slot with the provided stability.
    #[must_use]
    pub fn field(stable: bool) -> Self {
        Self {
            kind: VariableKind::Field,
            stable,
            declared: None,
        }
    }

    /// Declares the fact known for this slot at method entry.
    #[must_use]
    pub fn with_fact(mut self, fact: Fact) -> Self {
        self.declared = Some(fact);
        self
    }
}

/// An instruction program, frozen after construction.
///
/// Handed to the engine as read-only data: the engine never mutates the
/// instruction list, and all jump targets have been resolved to integer
/// indices by the [`ProgramBuilder`].
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    /// The flat, ordered instruction sequence.
    instructions: Vec<Instruction>,

    /// Static information for each variable slot the instructions refer to.
    variables: Vec<VariableInfo>,

    /// The resolved descriptor for each call site.
    calls: Vec<CallDescriptor>,

    /// The class hierarchy that type constraints resolve against.
    types: TypeHierarchy,
}

impl Program {
    pub(crate) fn new(
        instructions: Vec<Instruction>,
        variables: Vec<VariableInfo>,
        calls: Vec<CallDescriptor>,
        types: TypeHierarchy,
    ) -> Self {
        Self {
            instructions,
            variables,
            calls,
            types,
        }
    }

    /// Gets the number of instructions in the program.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// Checks if the program contains no instructions. A frozen program is
    /// never empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Gets the instruction at `index`, if it exists.
    #[must_use]
    pub fn get(&self, index: u32) -> Option<&Instruction> {
        self.instructions.get(index as usize)
    }

    /// Gets the full instruction slice.
    #[must_use]
    pub fn instructions(&self) -> &[Instruction] {
        self.instructions.as_slice()
    }

    /// Gets the static information for every variable slot, indexed by
    /// [`VariableId`].
    #[must_use]
    pub fn variables(&self) -> &[VariableInfo] {
        self.variables.as_slice()
    }

    /// Gets the static information for `variable`.
    ///
    /// # Panics
    ///
    /// Panics if the variable is not in the table; the builder validates
    /// every reference, so this is a programmer bug.
    #[must_use]
    pub fn variable(&self, variable: VariableId) -> &VariableInfo {
        self.variables
            .get(variable.0 as usize)
            .unwrap_or_else(|| panic!("Variable {variable:?} missing from a validated program"))
    }

    /// Gets the descriptor for the call site `call`, if it exists.
    #[must_use]
    pub fn call(&self, call: CallId) -> Option<&CallDescriptor> {
        self.calls.get(call.0 as usize)
    }

    /// Gets the type hierarchy for this program.
    #[must_use]
    pub fn types(&self) -> &TypeHierarchy {
        &self.types
    }
}
