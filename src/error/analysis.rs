//! This module contains errors pertaining to the abstract interpretation of
//! an instruction program by the [`crate::engine::Engine`].

use thiserror::Error;

use crate::error::container;

/// Errors that occur during the interpretation of an instruction program.
///
/// Every variant here means the front-end contract was violated by the
/// producer of the program. The engine fails loudly on these rather than
/// healing silently, as any facts computed from a malformed program would be
/// unsound. External cancellation is not an error; it surfaces as a degraded
/// [`RunStatus`](crate::engine::RunStatus) instead.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("Instruction index {requested:?} is out of bounds in a program of length {available:?}")]
    InstructionIndexOutOfBounds { requested: usize, available: usize },

    #[error("Maximum operand stack depth exceeded with request for {requested:?} slots")]
    StackDepthExceeded { requested: usize },

    #[error("An operand at depth {depth:?} was requested but none was available")]
    NoSuchOperand { depth: i64 },

    #[error(
        "Operand stack depths {left:?} and {right:?} disagree at a join point; every state \
         reaching an instruction must carry the same stack depth"
    )]
    StackShapeMismatch { left: usize, right: usize },

    #[error("A subroutine return was executed with no return address on the state's return stack")]
    NoReturnAddress,

    #[error("The splice specification references popped slot {slot:?} but only {popped:?} were popped")]
    InvalidSpliceSlot { slot: u8, popped: u8 },

    #[error("The condition operand {_0:?} does not carry a boolean fact")]
    NonBooleanCondition(u32),

    #[error("Call site {_0:?} has no descriptor in the program's call table")]
    MissingCallDescriptor(u32),
}

/// An analysis error with an associated location in the instruction program.
pub type LocatedError = container::Located<Error>;

/// A container of analysis errors used for aggregation during a run.
pub type Errors = container::Errors<LocatedError>;

/// The result type for methods that may have analysis errors.
pub type Result<T> = std::result::Result<T, LocatedError>;

/// Make it possible to attach locations to these errors.
impl container::Locatable for Error {
    type Located = LocatedError;

    fn locate(self, instruction_index: u32) -> Self::Located {
        container::Located {
            location: instruction_index,
            payload: self,
        }
    }
}
