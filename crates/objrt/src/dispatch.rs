//! Operator dispatch over capability tables.
//!
//! Resolution order:
//!
//! | Entry point | Tables consulted | Handler called with |
//! |-------------|------------------|---------------------|
//! | [`Heap::unary`] | `a` | `(a)` |
//! | [`Heap::binary`] | `a`, then `b` | `(a, b)` |
//! | [`Heap::ternary`] | `a`, then `b`, then `c` | `(a, b, c)` |
//! | [`Heap::compare`] | `a`, then `b` | `(&a, &b)` |
//!
//! Operands are never swapped: when the handler comes from `b`'s type it still
//! receives `a` first. If no operand's type fills the slot the call fails with
//! [`RunError::NotImplemented`].
//!
//! Every entry point consumes its operands. On success the handler owns them
//! and must release them; on failure to resolve, dispatch releases them itself.

use smallvec::SmallVec;
use strum::{Display, IntoStaticStr};

use crate::{
    error::{RunError, RunResult},
    heap::{DropWithHeap, Heap},
    object::ObjRef,
    type_object::{BinaryFunc, CompareFunc, TernaryFunc, TypeDescriptor, UnaryFunc},
};

/// Unary operators, resolved on the operand's number table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum UnaryOp {
    #[strum(serialize = "unary -")]
    Negative,
    #[strum(serialize = "unary +")]
    Positive,
    #[strum(serialize = "abs()")]
    Absolute,
    #[strum(serialize = "~")]
    Invert,
}

impl UnaryOp {
    fn slot(self, ty: &TypeDescriptor) -> Option<UnaryFunc> {
        let number = ty.number?;
        match self {
            Self::Negative => number.negative,
            Self::Positive => number.positive,
            Self::Absolute => number.absolute,
            Self::Invert => number.invert,
        }
    }
}

/// Binary operators: the number table plus sequence concatenation and
/// mapping subscript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum BinaryOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Subtract,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "%")]
    Remainder,
    #[strum(serialize = "//")]
    FloorDivide,
    #[strum(serialize = "/")]
    TrueDivide,
    #[strum(serialize = "<<")]
    LShift,
    #[strum(serialize = ">>")]
    RShift,
    #[strum(serialize = "&")]
    And,
    #[strum(serialize = "^")]
    Xor,
    #[strum(serialize = "|")]
    Or,
    #[strum(serialize = "concat")]
    Concat,
    #[strum(serialize = "[]")]
    Subscript,
}

impl BinaryOp {
    fn slot(self, ty: &TypeDescriptor) -> Option<BinaryFunc> {
        match self {
            Self::Concat => ty.sequence?.concat,
            Self::Subscript => ty.mapping?.subscript,
            _ => {
                let number = ty.number?;
                match self {
                    Self::Add => number.add,
                    Self::Subtract => number.subtract,
                    Self::Multiply => number.multiply,
                    Self::Remainder => number.remainder,
                    Self::FloorDivide => number.floor_divide,
                    Self::TrueDivide => number.true_divide,
                    Self::LShift => number.lshift,
                    Self::RShift => number.rshift,
                    Self::And => number.and,
                    Self::Xor => number.xor,
                    Self::Or => number.or,
                    Self::Concat | Self::Subscript => None,
                }
            }
        }
    }
}

/// Ternary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum TernaryOp {
    /// `pow(a, b, c)`; `c` is `None` for plain exponentiation.
    #[strum(serialize = "** or pow()")]
    Power,
}

impl TernaryOp {
    fn slot(self, ty: &TypeDescriptor) -> Option<TernaryFunc> {
        match self {
            Self::Power => ty.number?.power,
        }
    }
}

/// The two comparisons with a dedicated slot on [`TypeDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
pub enum CompareOp {
    #[strum(serialize = "==")]
    Equal,
    #[strum(serialize = "<=")]
    LessOrEqual,
}

impl CompareOp {
    fn slot(self, ty: &TypeDescriptor) -> Option<CompareFunc> {
        match self {
            Self::Equal => ty.equal,
            Self::LessOrEqual => ty.less_or_equal,
        }
    }
}

impl Heap {
    /// Finds the first operand whose type fills a slot.
    ///
    /// Reports the chosen handler to the tracer; on failure the error lists
    /// every operand's type name.
    fn resolve<F>(
        &mut self,
        op: &'static str,
        operands: &[&ObjRef],
        slot: impl Fn(&TypeDescriptor) -> Option<F>,
    ) -> RunResult<F> {
        let mut type_names: SmallVec<[&'static str; 3]> = SmallVec::new();
        for (position, operand) in operands.iter().enumerate() {
            let ty = self.type_of(operand);
            let name = ty.name;
            if let Some(handler) = slot(ty) {
                self.tracer_mut().on_dispatch(op, name, position);
                return Ok(handler);
            }
            type_names.push(name);
        }
        Err(RunError::NotImplemented {
            op,
            operand_types: type_names,
        })
    }

    /// Applies a unary operator, consuming `a`.
    pub fn unary(&mut self, op: UnaryOp, a: ObjRef) -> RunResult<ObjRef> {
        let resolved = self.resolve(op.into(), &[&a], |ty| op.slot(ty));
        match resolved {
            Ok(handler) => handler(self, a),
            Err(err) => {
                self.release_ref(a);
                Err(err)
            }
        }
    }

    /// Applies a binary operator, consuming `a` and `b`.
    ///
    /// ```
    /// use objrt::{BinaryOp, Heap, HeapConfig, types::Short};
    ///
    /// let mut heap = Heap::new(HeapConfig::default());
    /// let a = heap.make_small_value(2).unwrap();
    /// let b = heap.make_small_value(3).unwrap();
    /// let sum = heap.binary(BinaryOp::Add, a, b).unwrap();
    /// assert_eq!(Short::value_of(&heap, &sum), Ok(5));
    /// heap.release_ref(sum);
    /// ```
    pub fn binary(&mut self, op: BinaryOp, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
        let resolved = self.resolve(op.into(), &[&a, &b], |ty| op.slot(ty));
        match resolved {
            Ok(handler) => handler(self, a, b),
            Err(err) => {
                [a, b].drop_with_heap(self);
                Err(err)
            }
        }
    }

    /// Applies a ternary operator, consuming all three operands.
    pub fn ternary(&mut self, op: TernaryOp, a: ObjRef, b: ObjRef, c: ObjRef) -> RunResult<ObjRef> {
        let resolved = self.resolve(op.into(), &[&a, &b, &c], |ty| op.slot(ty));
        match resolved {
            Ok(handler) => handler(self, a, b, c),
            Err(err) => {
                [a, b, c].drop_with_heap(self);
                Err(err)
            }
        }
    }

    /// Compares two values, consuming both and returning a native bool.
    pub fn compare(&mut self, op: CompareOp, a: ObjRef, b: ObjRef) -> RunResult<bool> {
        let result = self
            .resolve(op.into(), &[&a, &b], |ty| op.slot(ty))
            .and_then(|handler| handler(self, &a, &b));
        [a, b].drop_with_heap(self);
        result
    }

    /// Compares two values the caller keeps owning.
    ///
    /// Resolves like [`compare`](Self::compare) but does not report to the
    /// tracer, since it only has shared access to the heap.
    pub fn compare_refs(&self, op: CompareOp, a: &ObjRef, b: &ObjRef) -> RunResult<bool> {
        let (left, right) = (self.type_of(a), self.type_of(b));
        let handler = op
            .slot(left)
            .or_else(|| op.slot(right))
            .ok_or_else(|| RunError::not_implemented(op.into(), &[left.name, right.name]))?;
        handler(self, a, b)
    }

    /// Truth value of `a`, which stays owned by the caller.
    ///
    /// Consults the number table's `bool` slot, then the mapping and sequence
    /// `length` slots (non-zero is true). A type with none of them is true.
    #[must_use]
    pub fn is_true(&self, a: &ObjRef) -> bool {
        let ty = self.type_of(a);
        if let Some(truth) = ty.number.and_then(|number| number.bool) {
            truth(self, a)
        } else if let Some(length) = ty.mapping.and_then(|mapping| mapping.length) {
            length(self, a) > 0
        } else if let Some(length) = ty.sequence.and_then(|sequence| sequence.length) {
            length(self, a) > 0
        } else {
            true
        }
    }

    /// Length of `a` through its sequence or mapping table, borrowing `a`.
    pub fn length(&self, a: &ObjRef) -> RunResult<usize> {
        let ty = self.type_of(a);
        ty.sequence
            .and_then(|sequence| sequence.length)
            .or_else(|| ty.mapping.and_then(|mapping| mapping.length))
            .map(|length| length(self, a))
            .ok_or_else(|| RunError::not_implemented("len()", &[ty.name]))
    }
}
