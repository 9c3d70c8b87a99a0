//! This module contains the error type that pertains to the construction of
//! instruction programs.

use thiserror::Error;

use crate::error::container;

/// Errors that occur while building the flat instruction program, before any
/// analysis has begun.
///
/// These all indicate a bug in the control-flow builder that produced the
/// program, not in the code being analysed.
#[derive(Clone, Debug, Eq, Error, PartialEq)]
pub enum Error {
    #[error("The jump label {_0:?} was never bound to an instruction index")]
    UnboundLabel(u32),

    #[error("The jump label {_0:?} was bound more than once")]
    LabelBoundTwice(u32),

    #[error("Jump target {target:?} is out of bounds in a program of length {available:?}")]
    TargetOutOfBounds { target: u32, available: u32 },

    #[error("The instruction program cannot be empty")]
    EmptyProgram,

    #[error("The variable {_0:?} is not present in the program's variable table")]
    UnknownVariable(u32),

    #[error("The call site {_0:?} is not present in the program's call table")]
    UnknownCallSite(u32),

    #[error("The type {_0:?} is not present in the program's type hierarchy")]
    UnknownType(u32),
}

/// A program-construction error with an associated location in the program.
pub type LocatedError = container::Located<Error>;

/// The result type for functions that may return program-construction errors.
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
