//! This module contains the implementation of the memory state's operand
//! stack.

use crate::{
    constant::MAXIMUM_STACK_DEPTH,
    error::analysis::Error,
    value::ValueId,
};

/// The result type for stack operations; locations are attached by the
/// dispatcher, which knows the current instruction index.
type Result<T> = std::result::Result<T, Error>;

/// The operand stack of a memory state.
///
/// # Indexing
///
/// Indexing into this stack is zero-based, where slot 0 is the top operand.
///
/// # Depth
///
/// The stack is bounded at [`MAXIMUM_STACK_DEPTH`]; a well-formed program
/// never approaches this, so exceeding it is treated as a malformed-program
/// error rather than a recoverable condition.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct OperandStack {
    data: Vec<ValueId>,
}

impl OperandStack {
    /// Creates a new stack without any operands on it.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes the provided value onto the top of the stack.
    ///
    /// # Errors
    ///
    /// If the stack cannot grow to accommodate the requested value.
    pub fn push(&mut self, value: ValueId) -> Result<()> {
        if self.data.len() + 1 > MAXIMUM_STACK_DEPTH {
            return Err(Error::StackDepthExceeded {
                requested: self.data.len() + 1,
            });
        }
        self.data.push(value);
        Ok(())
    }

    /// Pops the top value from the stack.
    ///
    /// # Errors
    ///
    /// If the stack has no operand to pop. This indicates a malformed
    /// instruction program.
    pub fn pop(&mut self) -> Result<ValueId> {
        self.data.pop().ok_or(Error::NoSuchOperand { depth: 0 })
    }

    /// Reads the operand at the provided `depth` without popping it.
    ///
    /// # Errors
    ///
    /// If no operand exists at `depth`.
    pub fn peek(&self, depth: usize) -> Result<ValueId> {
        let current = self.data.len();
        if depth >= current {
            return Err(Error::NoSuchOperand {
                depth: depth as i64,
            });
        }
        Ok(self.data[current - 1 - depth])
    }

    /// Duplicates the top operand.
    ///
    /// # Errors
    ///
    /// If the stack is empty or full.
    pub fn dup(&mut self) -> Result<()> {
        let top = self.peek(0)?;
        self.push(top)
    }

    /// Swaps the top two operands.
    ///
    /// # Errors
    ///
    /// If fewer than two operands exist.
    pub fn swap(&mut self) -> Result<()> {
        if self.data.len() < 2 {
            return Err(Error::NoSuchOperand { depth: 1 });
        }
        let len = self.data.len();
        self.data.swap(len - 1, len - 2);
        Ok(())
    }

    /// Pops `pop` operands and pushes the popped slots selected by `push`, in
    /// order, bottom first. Slot 0 is the operand that was on top before the
    /// splice.
    ///
    /// # Errors
    ///
    /// If fewer than `pop` operands exist, if a selected slot is not among
    /// the popped operands, or if the pushes would overflow the stack.
    pub fn splice(&mut self, pop: u8, push: &[u8]) -> Result<()> {
        let mut popped = Vec::with_capacity(pop as usize);
        for _ in 0..pop {
            popped.push(self.pop()?);
        }
        for slot in push {
            let value = *popped
                .get(*slot as usize)
                .ok_or(Error::InvalidSpliceSlot { slot: *slot, popped: pop })?;
            self.push(value)?;
        }
        Ok(())
    }

    /// Removes every operand. The operand stack does not survive the
    /// transfer to an exception handler.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Gets the current depth of the stack.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.data.len()
    }

    /// Checks if the stack is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.depth() == 0
    }

    /// Gets the operands from bottom to top.
    #[must_use]
    pub fn as_slice(&self) -> &[ValueId] {
        self.data.as_slice()
    }

    /// Gets mutable access to the operands for slot-wise merging.
    pub(crate) fn as_mut_slice(&mut self) -> &mut [ValueId] {
        self.data.as_mut_slice()
    }
}
