//! This module contains the resolved call-site metadata that the front end
//! hands to the engine alongside the instruction program.
//!
//! The engine never resolves overloads or generics itself; by the time a
//! [`CallDescriptor`] reaches it, binding has already happened and only the
//! facts that matter for abstract interpretation remain.

use crate::{
    fact::{Fact, Nullability, TypeConstraint, TypeId},
    value::ConstantValue,
};

/// A handle to a call descriptor in the program's call table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct CallId(pub u32);

/// The nullability a callee requires of one of its arguments.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArgRequirement {
    /// The argument may be anything.
    Any,

    /// The argument must not be null; passing a possibly-null value is a
    /// reportable contract violation.
    NotNull,
}

/// Resolved metadata for one call site.
///
/// Immutable once constructed; the interpreter looks it up at dispatch time
/// only.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CallDescriptor {
    /// The number of arguments popped from the operand stack, not counting
    /// the receiver.
    pub arg_count: usize,

    /// Whether the call pops a receiver below its arguments.
    pub has_receiver: bool,

    /// Whether the final argument position collects varargs. Vararg slots
    /// never carry a not-null requirement on the collected array's elements.
    pub vararg: bool,

    /// Whether the callee is free of observable side effects. A pure call
    /// does not invalidate any field facts.
    pub pure: bool,

    /// The nullability requirement for each declared argument position.
    pub arg_requirements: Vec<ArgRequirement>,

    /// The declared nullability of the returned value.
    pub returns_nullability: Nullability,

    /// The declared upper type bound of the returned value, if any.
    pub returns_type: Option<TypeId>,

    /// A precomputed constant return value, usable only when the call is
    /// pure.
    pub precomputed: Option<ConstantValue>,
}

impl CallDescriptor {
    /// Constructs a descriptor for a call with `arg_count` arguments and no
    /// other knowledge: impure, no receiver, unannotated return.
    #[must_use]
    pub fn opaque(arg_count: usize) -> Self {
        Self {
            arg_count,
            has_receiver: false,
            vararg: false,
            pure: false,
            arg_requirements: vec![ArgRequirement::Any; arg_count],
            returns_nullability: Nullability::Unknown,
            returns_type: None,
            precomputed: None,
        }
    }

    /// Marks the call as popping a receiver below its arguments.
    #[must_use]
    pub fn with_receiver(mut self) -> Self {
        self.has_receiver = true;
        self
    }

    /// Marks the call as vararg in its final argument position.
    #[must_use]
    pub fn with_vararg(mut self) -> Self {
        self.vararg = true;
        self
    }

    /// Marks the call as side-effect free.
    #[must_use]
    pub fn with_purity(mut self) -> Self {
        self.pure = true;
        self
    }

    /// Sets the nullability requirement for the argument at `position`.
    ///
    /// # Panics
    ///
    /// Panics if `position` is out of bounds for the declared argument count.
    /// This is a programmer bug in the front end.
    #[must_use]
    pub fn requiring(mut self, position: usize, requirement: ArgRequirement) -> Self {
        self.arg_requirements[position] = requirement;
        self
    }

    /// Sets the declared nullability of the return value.
    #[must_use]
    pub fn returning(mut self, nullability: Nullability) -> Self {
        self.returns_nullability = nullability;
        self
    }

    /// Sets the declared upper type bound of the return value.
    #[must_use]
    pub fn returning_type(mut self, tp: TypeId) -> Self {
        self.returns_type = Some(tp);
        self
    }

    /// Supplies a precomputed constant return value for a pure call.
    #[must_use]
    pub fn with_precomputed(mut self, value: ConstantValue) -> Self {
        self.precomputed = Some(value);
        self
    }

    /// Gets the total number of operands this call pops from the stack.
    #[must_use]
    pub fn popped_count(&self) -> usize {
        self.arg_count + usize::from(self.has_receiver)
    }

    /// Computes the fact that describes this call's return value, absent any
    /// precomputed constant.
    #[must_use]
    pub fn return_fact(&self) -> Fact {
        let type_constraint = match self.returns_type {
            Some(tp) => TypeConstraint::Upper(tp),
            None => TypeConstraint::Top,
        };
        Fact {
            nullability: self.returns_nullability,
            type_constraint,
            ..Fact::top()
        }
    }
}
