//! This module contains the closed instruction set that programs are built
//! from.
//!
//! Each variant carries only the data its semantics need; jump-like variants
//! carry a resolved integer target index. The set is deliberately a tagged
//! union rather than an open trait hierarchy so that the dispatcher's match
//! is checked for exhaustiveness by the compiler.

use crate::{
    contract::CallId,
    fact::{Fact, TypeId, ValueRange},
    value::{BinOp, ConstantValue, SpecialField, UnOp, VariableId},
};

/// The primitive widths a numeric cast can clamp to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum NumericWidth {
    Byte,
    Short,
    Int,
    Long,
}

impl NumericWidth {
    /// Gets the value range representable at this width.
    #[must_use]
    pub fn range(self) -> ValueRange {
        match self {
            Self::Byte => ValueRange::new(i64::from(i8::MIN), i64::from(i8::MAX)),
            Self::Short => ValueRange::new(i64::from(i16::MIN), i64::from(i16::MAX)),
            Self::Int => ValueRange::new(i64::from(i32::MIN), i64::from(i32::MAX)),
            Self::Long => ValueRange::FULL,
        }
    }
}

/// One instruction in the flat program.
///
/// # Terminology
///
/// When referring to stack slots, slot 0 is the top of the operand stack.
/// `target` fields are indices into the flat instruction list, resolved
/// before the program is frozen; `handler` fields are the resolved targets of
/// implicit exceptional edges, with [`None`] meaning the exceptional path
/// leaves the method.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Duplicates the top operand.
    Dup,

    /// Swaps the top two operands.
    Swap,

    /// Pops `pop` operands and pushes the popped slots listed in `push`, in
    /// order, bottom first. Slot 0 is the last-popped (topmost) operand.
    ///
    /// This generalises the stack shuffling that ternary and short-circuit
    /// desugarings compile to.
    Splice { pop: u8, push: Vec<u8> },

    /// Pushes the value bound to a variable slot.
    PushVariable(VariableId),

    /// Pushes a literal constant.
    PushConstant(ConstantValue),

    /// Pushes a fresh unknown value carrying the given fact.
    PushUnknown { fact: Fact },

    /// Pops two operands and pushes the result of the binary operation.
    ///
    /// Special cases preserved from the source domain: comparing against
    /// null narrows on nullability, string comparison is by content, and
    /// `Xor` on two booleans behaves as not-equal.
    Binary(BinOp),

    /// Pops one operand and pushes the result of the unary operation.
    Unary(UnOp),

    /// Pops one operand and pushes the boolean result of testing it against
    /// `tested`. Null is never an instance of anything.
    IsInstance { tested: TypeId },

    /// Pops a qualifier, checks it for null (the exceptional edge goes to
    /// `handler`), and pushes the value of `field` read through it.
    GetField {
        field: VariableId,
        handler: Option<u32>,
    },

    /// Pops the value to store, pops the qualifier, and rebinds the field
    /// read through that qualifier. Other values aliasing the same field are
    /// invalidated.
    SetField {
        field: VariableId,
        handler: Option<u32>,
    },

    /// Pops an index and an array qualifier, checks the qualifier for null,
    /// and pushes the element value.
    GetElement { handler: Option<u32> },

    /// Pops the right-hand side and binds it to `var`. `init` marks a
    /// variable initialiser, which narrows rather than invalidating previous
    /// relations (there are none yet).
    Assign { var: VariableId, init: bool },

    /// Pops a reference, narrows its type constraint to `target`, and pushes
    /// it back. A provably impossible cast kills the state; a possibly
    /// failing one has an exceptional edge to `handler`.
    Cast {
        target: TypeId,
        handler: Option<u32>,
    },

    /// Pops an integer, clamps its range to `width`, and pushes it back.
    NumericCast { width: NumericWidth },

    /// Pops a value and pushes the synthetic accessor `field` wrapped around
    /// it. Unwrapping a boxed primitive checks the wrapper for null via
    /// `handler`.
    ReadSpecial {
        field: SpecialField,
        handler: Option<u32>,
    },

    /// Pops receiver and arguments per the call descriptor and pushes the
    /// call's result. The exceptional edge of a throwing call goes to
    /// `handler`.
    Call {
        call: CallId,
        handler: Option<u32>,
    },

    /// Unconditional jump to `target`.
    Goto { target: u32 },

    /// Pops a boolean condition; control continues at `target` when it holds
    /// and falls through when it does not.
    CondGoto { target: u32 },

    /// Jumps to the subroutine at `target`, pushing the return address onto
    /// the state's return-address stack. Used to share a single `finally`
    /// body between every path that must run it.
    Gosub { target: u32 },

    /// Pops a return address from the state's return-address stack and jumps
    /// there, completing a [`Instruction::Gosub`].
    RetSub,

    /// Leaves the method. The state is archived as a method exit; there are
    /// no successors.
    Return,

    /// Pops an exception value and transfers control to `handler`, or leaves
    /// the method exceptionally when there is none.
    Throw { handler: Option<u32> },

    /// Checks the top operand for null without popping it. A possibly-null
    /// operand is reported and the exceptional edge goes to `handler`; the
    /// surviving state continues with the operand known not-null.
    CheckNotNull { handler: Option<u32> },

    /// Checks the top operand as an array size. A possibly-negative size is
    /// recorded and the exceptional edge goes to `handler`; the surviving
    /// state continues with the size known non-negative.
    ArraySizeCheck { handler: Option<u32> },

    /// Invalidates every fact and relation depending on `var`.
    FlushVariable(VariableId),

    /// Invalidates every fact and relation depending on a non-stable field.
    FlushFields,

    /// Marker: an element of the source construct finished; flushes the
    /// listed variables whose invalidation was scheduled for this point.
    FinishElement { flush: Vec<VariableId> },

    /// Marker: the listed variables escape into a capture and can no longer
    /// be tracked precisely.
    EscapeVariables { vars: Vec<VariableId> },

    /// Does nothing. Useful as a target anchor.
    Nop,
}

impl Instruction {
    /// Gets a textual representation of the instruction kind to aid in
    /// debugging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dup => "DUP",
            Self::Swap => "SWAP",
            Self::Splice { .. } => "SPLICE",
            Self::PushVariable(_) => "PUSH_VAR",
            Self::PushConstant(_) => "PUSH_CONST",
            Self::PushUnknown { .. } => "PUSH_UNKNOWN",
            Self::Binary(_) => "BINOP",
            Self::Unary(_) => "UNOP",
            Self::IsInstance { .. } => "INSTANCE_OF",
            Self::GetField { .. } => "GET_FIELD",
            Self::SetField { .. } => "SET_FIELD",
            Self::GetElement { .. } => "GET_ELEMENT",
            Self::Assign { .. } => "ASSIGN",
            Self::Cast { .. } => "CAST",
            Self::NumericCast { .. } => "NUM_CAST",
            Self::ReadSpecial { .. } => "READ_SPECIAL",
            Self::Call { .. } => "CALL",
            Self::Goto { .. } => "GOTO",
            Self::CondGoto { .. } => "COND_GOTO",
            Self::Gosub { .. } => "GOSUB",
            Self::RetSub => "RET_SUB",
            Self::Return => "RETURN",
            Self::Throw { .. } => "THROW",
            Self::CheckNotNull { .. } => "CHECK_NOT_NULL",
            Self::ArraySizeCheck { .. } => "ARRAY_SIZE_CHECK",
            Self::FlushVariable(_) => "FLUSH_VAR",
            Self::FlushFields => "FLUSH_FIELDS",
            Self::FinishElement { .. } => "FINISH_ELEMENT",
            Self::EscapeVariables { .. } => "ESCAPE",
            Self::Nop => "NOP",
        }
    }

    /// Gets the resolved primary jump target, if this instruction has one.
    #[must_use]
    pub fn primary_target(&self) -> Option<u32> {
        match self {
            Self::Goto { target } | Self::CondGoto { target } | Self::Gosub { target } => {
                Some(*target)
            }
            _ => None,
        }
    }

    /// Gets the resolved exceptional-edge handler target, if this instruction
    /// carries one.
    #[must_use]
    pub fn handler_target(&self) -> Option<u32> {
        match self {
            Self::GetField { handler, .. }
            | Self::SetField { handler, .. }
            | Self::GetElement { handler }
            | Self::Cast { handler, .. }
            | Self::ReadSpecial { handler, .. }
            | Self::Call { handler, .. }
            | Self::Throw { handler }
            | Self::CheckNotNull { handler }
            | Self::ArraySizeCheck { handler } => *handler,
            _ => None,
        }
    }
}
