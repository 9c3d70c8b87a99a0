//! This module contains the representation of the symbolic values that the
//! engine pushes around on the operand stack and binds facts to.
//!
//! # Interning
//!
//! Values are deduplicated structurally in a [`ValueArena`], and the rest of
//! the engine only ever handles [`ValueId`] indices into that arena. Two
//! handles are the same value exactly when they are equal, which is what
//! makes relation tracking between values cheap: proving `a == a` is an
//! integer comparison, not a structural walk.
//!
//! The one deliberate exception is [`ValueData::Unknown`], which carries a
//! serial number so that every freshly-created unknown is distinct from every
//! other. An unknown is "top" in the value domain and must never be
//! accidentally proven equal to another unknown.

use std::collections::HashMap;

use crate::fact::TypeId;

/// A handle to a value stored in a [`ValueArena`].
///
/// Handles are only meaningful with respect to the arena that produced them.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ValueId(pub u32);

/// A handle to a slot in the program's variable table.
///
/// Variable slots cover method parameters, locals, and fields; the table
/// itself lives on the program as it is produced by the front end.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct VariableId(pub u32);

/// A compile-time constant that a value may be known to hold.
///
/// Strings are compared by content here; reference equality of two string
/// values is a property of their [`ValueId`]s instead.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ConstantValue {
    /// The null reference.
    Null,

    /// A boolean constant.
    Bool(bool),

    /// An integer constant.
    Int(i64),

    /// A string constant, compared by content.
    Str(String),
}

/// The binary operators that can appear inside an operation value.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,

    /// On boolean operands this is treated as logical not-equal; `a ^ b` for
    /// booleans is equivalent to `a != b`.
    Xor,
}

/// The unary operators that can appear inside an operation value.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum UnOp {
    /// Logical negation of a boolean.
    Not,

    /// Arithmetic negation of an integer.
    Neg,
}

/// The synthetic accessors used to model library invariants without executing
/// any real code.
///
/// A wrapped value such as "the array length of `a`" behaves like a field
/// read whose semantics the engine knows about: an array length is a
/// non-negative integer, a boxed value is never null, and so on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum SpecialField {
    /// The length of an array; always within `[0, i32::MAX]`.
    ArrayLength,

    /// The length of a string; always within `[0, i32::MAX]`.
    StringLength,

    /// The primitive payload of a boxed wrapper.
    UnboxedValue,

    /// The boxed wrapper around a primitive; never null.
    BoxedValue,

    /// Whether an optional-like container holds a value; a boolean.
    OptionalPresent,
}

/// The structural identity of a symbolic value.
///
/// Operation values are kept lazily rather than being evaluated away, so
/// that a conditional branch on, say, `x == null` can later narrow `x` in
/// the state that assumed the condition true.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ValueData {
    /// A value bound to a program variable slot (parameter, local, or
    /// unqualified field).
    Variable(VariableId),

    /// A field read through a qualifier, e.g. `a.f`.
    FieldRef {
        qualifier: ValueId,
        field: VariableId,
    },

    /// A compile-time constant.
    Constant(ConstantValue),

    /// A lazily-kept binary operation over two other values.
    Op {
        op: BinOp,
        lhs: ValueId,
        rhs: ValueId,
    },

    /// A lazily-kept unary operation over another value.
    UnOp { op: UnOp, operand: ValueId },

    /// An `instanceof` test of a value against a type.
    InstanceOf { operand: ValueId, tested: TypeId },

    /// A synthetic accessor wrapped around another value.
    Wrap {
        field: SpecialField,
        inner: ValueId,
    },

    /// A value about which nothing is known. The serial keeps distinct
    /// unknowns from ever comparing equal.
    Unknown { serial: u32 },
}

/// The arena that owns every value created during one engine run.
///
/// The arena is append-only and private to a single run, so no locking is
/// needed anywhere in the engine.
#[derive(Clone, Debug, Default)]
pub struct ValueArena {
    /// The structural data for each value, indexed by [`ValueId`].
    data: Vec<ValueData>,

    /// The reverse mapping used for structural deduplication.
    interned: HashMap<ValueData, ValueId>,

    /// The serial for the next fresh unknown value.
    next_unknown: u32,
}

impl ValueArena {
    /// Constructs a new, empty value arena.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns the provided `data`, returning the handle of the existing
    /// structurally-equal value if one exists.
    pub fn intern(&mut self, data: ValueData) -> ValueId {
        if let Some(existing) = self.interned.get(&data) {
            return *existing;
        }

        let id = ValueId(
            u32::try_from(self.data.len()).expect("Value arena should not exceed u32::MAX entries"),
        );
        self.interned.insert(data.clone(), id);
        self.data.push(data);
        id
    }

    /// Creates a fresh unknown value, distinct from every other value in the
    /// arena.
    pub fn fresh_unknown(&mut self) -> ValueId {
        let serial = self.next_unknown;
        self.next_unknown += 1;
        self.intern(ValueData::Unknown { serial })
    }

    /// Gets the structural data of the value behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` was not produced by this arena. This is a programmer
    /// bug.
    #[must_use]
    pub fn data(&self, id: ValueId) -> &ValueData {
        self.data
            .get(id.0 as usize)
            .unwrap_or_else(|| panic!("Value handle {id:?} does not belong to this arena"))
    }

    /// Interns a variable value for the provided `variable` slot.
    pub fn variable(&mut self, variable: VariableId) -> ValueId {
        self.intern(ValueData::Variable(variable))
    }

    /// Interns a constant value.
    pub fn constant(&mut self, constant: ConstantValue) -> ValueId {
        self.intern(ValueData::Constant(constant))
    }

    /// Interns the null constant.
    pub fn null(&mut self) -> ValueId {
        self.constant(ConstantValue::Null)
    }

    /// Interns a boolean constant.
    pub fn bool_const(&mut self, value: bool) -> ValueId {
        self.constant(ConstantValue::Bool(value))
    }

    /// Interns an integer constant.
    pub fn int_const(&mut self, value: i64) -> ValueId {
        self.constant(ConstantValue::Int(value))
    }

    /// Interns a binary operation value over `lhs` and `rhs`.
    pub fn op(&mut self, op: BinOp, lhs: ValueId, rhs: ValueId) -> ValueId {
        self.intern(ValueData::Op { op, lhs, rhs })
    }

    /// Interns a unary operation value over `operand`.
    pub fn un_op(&mut self, op: UnOp, operand: ValueId) -> ValueId {
        self.intern(ValueData::UnOp { op, operand })
    }

    /// Interns an `instanceof` test of `operand` against `tested`.
    pub fn is_instance(&mut self, operand: ValueId, tested: TypeId) -> ValueId {
        self.intern(ValueData::InstanceOf { operand, tested })
    }

    /// Interns a field read of `field` through `qualifier`.
    pub fn field_ref(&mut self, qualifier: ValueId, field: VariableId) -> ValueId {
        self.intern(ValueData::FieldRef { qualifier, field })
    }

    /// Interns a synthetic accessor of `field` wrapped around `inner`.
    pub fn wrap(&mut self, field: SpecialField, inner: ValueId) -> ValueId {
        self.intern(ValueData::Wrap { field, inner })
    }

    /// Checks whether the value behind `id` structurally mentions `variable`,
    /// either directly or through a qualifier, operand, or wrapper.
    #[must_use]
    pub fn mentions_variable(&self, id: ValueId, variable: VariableId) -> bool {
        match self.data(id) {
            ValueData::Variable(v) => *v == variable,
            ValueData::FieldRef { qualifier, field } => {
                *field == variable || self.mentions_variable(*qualifier, variable)
            }
            ValueData::Op { lhs, rhs, .. } => {
                self.mentions_variable(*lhs, variable) || self.mentions_variable(*rhs, variable)
            }
            ValueData::UnOp { operand, .. } | ValueData::InstanceOf { operand, .. } => {
                self.mentions_variable(*operand, variable)
            }
            ValueData::Wrap { inner, .. } => self.mentions_variable(*inner, variable),
            ValueData::Constant(_) | ValueData::Unknown { .. } => false,
        }
    }

    /// Checks whether the value behind `id` structurally mentions any
    /// variable accepted by `pred`.
    pub fn mentions_matching(&self, id: ValueId, pred: &mut impl FnMut(VariableId) -> bool) -> bool {
        match self.data(id).clone() {
            ValueData::Variable(v) => pred(v),
            ValueData::FieldRef { qualifier, field } => {
                pred(field) || self.mentions_matching(qualifier, pred)
            }
            ValueData::Op { lhs, rhs, .. } => {
                self.mentions_matching(lhs, pred) || self.mentions_matching(rhs, pred)
            }
            ValueData::UnOp { operand, .. } | ValueData::InstanceOf { operand, .. } => {
                self.mentions_matching(operand, pred)
            }
            ValueData::Wrap { inner, .. } => self.mentions_matching(inner, pred),
            ValueData::Constant(_) | ValueData::Unknown { .. } => false,
        }
    }

    /// Checks whether the value behind `id` structurally involves a field
    /// read through a qualifier.
    #[must_use]
    pub fn involves_field_read(&self, id: ValueId) -> bool {
        match self.data(id) {
            ValueData::FieldRef { .. } => true,
            ValueData::Op { lhs, rhs, .. } => {
                self.involves_field_read(*lhs) || self.involves_field_read(*rhs)
            }
            ValueData::UnOp { operand, .. } | ValueData::InstanceOf { operand, .. } => {
                self.involves_field_read(*operand)
            }
            ValueData::Wrap { inner, .. } => self.involves_field_read(*inner),
            ValueData::Variable(_) | ValueData::Constant(_) | ValueData::Unknown { .. } => false,
        }
    }

    /// Gets the number of values held by the arena.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Checks if the arena holds no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod test {
    use crate::value::{BinOp, ConstantValue, SpecialField, ValueArena, VariableId};

    #[test]
    fn interning_deduplicates_structurally_equal_values() {
        let mut arena = ValueArena::new();
        let a = arena.int_const(42);
        let b = arena.int_const(42);

        assert_eq!(a, b);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn interned_operation_values_share_handles() {
        let mut arena = ValueArena::new();
        let x = arena.variable(VariableId(0));
        let null = arena.null();
        let first = arena.op(BinOp::Eq, x, null);
        let second = arena.op(BinOp::Eq, x, null);

        assert_eq!(first, second);
    }

    #[test]
    fn fresh_unknowns_are_always_distinct() {
        let mut arena = ValueArena::new();
        let a = arena.fresh_unknown();
        let b = arena.fresh_unknown();

        assert_ne!(a, b);
    }

    #[test]
    fn string_constants_compare_by_content() {
        let mut arena = ValueArena::new();
        let a = arena.constant(ConstantValue::Str("hello".into()));
        let b = arena.constant(ConstantValue::Str("hello".into()));
        let c = arena.constant(ConstantValue::Str("world".into()));

        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn variable_mentions_are_found_through_wrappers() {
        let mut arena = ValueArena::new();
        let var = VariableId(3);
        let base = arena.variable(var);
        let wrapped = arena.wrap(SpecialField::ArrayLength, base);
        let other = arena.variable(VariableId(4));

        assert!(arena.mentions_variable(wrapped, var));
        assert!(!arena.mentions_variable(other, var));
    }

    #[test]
    fn field_reads_are_detected_inside_operations() {
        let mut arena = ValueArena::new();
        let qualifier = arena.variable(VariableId(0));
        let field = arena.field_ref(qualifier, VariableId(7));
        let one = arena.int_const(1);
        let sum = arena.op(BinOp::Add, field, one);

        assert!(arena.involves_field_read(sum));
        assert!(!arena.involves_field_read(one));
    }
}
