//! The demonstration `short` integer type.
//!
//! A 32-bit signed integer occupying a 16-byte block. Values in the heap's
//! small-int range are interned; everything else is allocated, and freed
//! `short` blocks are parked in the 16-byte pool for reuse.
//!
//! Arithmetic is checked: results that don't fit in 32 bits fail with
//! [`RunError::Overflow`] rather than wrapping. Division and remainder round
//! toward negative infinity.

use crate::{
    defer_drop,
    dispatch::{BinaryOp, CompareOp},
    error::{RunError, RunResult},
    heap::Heap,
    object::{ObjRef, ObjectData},
    type_object::{NumberMethods, TypeDescriptor, TypeId},
};

/// Block size of a `short`.
pub const SHORT_BASIC_SIZE: usize = 16;

/// Constructor and accessors for `short` values.
#[derive(Debug, Clone, Copy)]
pub struct Short;

impl Short {
    /// Returns a new reference to a `short` holding `value`.
    ///
    /// Goes through the small-object cache, so in-range values are identical.
    #[expect(clippy::new_ret_no_self)]
    pub fn new(heap: &mut Heap, value: i32) -> RunResult<ObjRef> {
        heap.make_small_value(value)
    }

    /// Reads the value of a `short`, borrowing it.
    pub fn value_of(heap: &Heap, obj: &ObjRef) -> RunResult<i32> {
        operand(heap, obj, "short")
    }
}

fn operand(heap: &Heap, obj: &ObjRef, op: &'static str) -> RunResult<i32> {
    match heap.get(obj).data() {
        ObjectData::Short(value) => Ok(*value),
        _ => Err(RunError::TypeMismatch {
            op,
            expected: "short",
            found: heap.type_name(obj),
        }),
    }
}

/// Applies `f` to two short operands, releasing both on every path.
fn arithmetic(
    heap: &mut Heap,
    a: ObjRef,
    b: ObjRef,
    op: &'static str,
    f: fn(i32, i32) -> Option<i32>,
) -> RunResult<ObjRef> {
    let operands = (a, b);
    defer_drop!(operands, heap);
    let x = operand(heap, &operands.0, op)?;
    let y = operand(heap, &operands.1, op)?;
    let value = f(x, y).ok_or(RunError::Overflow { op })?;
    Short::new(heap, value)
}

/// Like [`arithmetic`] but fails with `ZeroDivision` when the right operand is 0.
fn division(
    heap: &mut Heap,
    a: ObjRef,
    b: ObjRef,
    op: &'static str,
    f: fn(i32, i32) -> Option<i32>,
) -> RunResult<ObjRef> {
    let operands = (a, b);
    defer_drop!(operands, heap);
    let x = operand(heap, &operands.0, op)?;
    let y = operand(heap, &operands.1, op)?;
    if y == 0 {
        return Err(RunError::ZeroDivision { op });
    }
    let value = f(x, y).ok_or(RunError::Overflow { op })?;
    Short::new(heap, value)
}

fn floor_div(x: i32, y: i32) -> Option<i32> {
    let quotient = x.checked_div(y)?;
    if x % y != 0 && ((x < 0) != (y < 0)) {
        Some(quotient - 1)
    } else {
        Some(quotient)
    }
}

/// Remainder with the sign of the divisor. `y` must be non-zero.
fn floor_mod(x: i32, y: i32) -> Option<i32> {
    let rem = x.wrapping_rem(y);
    if rem != 0 && ((rem < 0) != (y < 0)) {
        Some(rem + y)
    } else {
        Some(rem)
    }
}

fn short_add(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    arithmetic(heap, a, b, "+", i32::checked_add)
}

fn short_subtract(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    arithmetic(heap, a, b, "-", i32::checked_sub)
}

fn short_multiply(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    arithmetic(heap, a, b, "*", i32::checked_mul)
}

fn short_remainder(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    division(heap, a, b, "%", floor_mod)
}

fn short_floor_divide(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    division(heap, a, b, "//", floor_div)
}

/// `pow(a, b)` when `c` is `None`, `pow(a, b, c)` otherwise.
fn short_power(heap: &mut Heap, a: ObjRef, b: ObjRef, c: ObjRef) -> RunResult<ObjRef> {
    const OP: &str = "** or pow()";
    let operands = [a, b, c];
    defer_drop!(operands, heap);
    let [a, b, c] = operands;
    let base = operand(heap, a, OP)?;
    let exponent = operand(heap, b, OP)?;
    let exponent = u32::try_from(exponent).map_err(|_| RunError::InvalidOperand {
        op: OP,
        reason: "negative exponent",
    })?;

    let value = if heap.get(c).type_id() == TypeId::NONE {
        base.checked_pow(exponent).ok_or(RunError::Overflow { op: OP })?
    } else {
        let modulus = operand(heap, c, OP)?;
        if modulus == 0 {
            return Err(RunError::InvalidOperand {
                op: OP,
                reason: "modulus cannot be zero",
            });
        }
        pow_mod(base, exponent, modulus)
    };
    Short::new(heap, value)
}

/// `base ** exponent % modulus` with the result taking the modulus' sign.
fn pow_mod(base: i32, mut exponent: u32, modulus: i32) -> i32 {
    let m = i64::from(modulus).abs();
    let mut result = 1 % m;
    let mut base = i64::from(base).rem_euclid(m);
    while exponent > 0 {
        if exponent & 1 == 1 {
            result = result * base % m;
        }
        base = base * base % m;
        exponent >>= 1;
    }
    if modulus < 0 && result != 0 {
        result -= m;
    }
    // |result| < |modulus|, so it always fits
    i32::try_from(result).unwrap_or_default()
}

fn unary(heap: &mut Heap, a: ObjRef, op: &'static str, f: fn(i32) -> Option<i32>) -> RunResult<ObjRef> {
    defer_drop!(a, heap);
    let x = operand(heap, a, op)?;
    let value = f(x).ok_or(RunError::Overflow { op })?;
    Short::new(heap, value)
}

fn short_negative(heap: &mut Heap, a: ObjRef) -> RunResult<ObjRef> {
    unary(heap, a, "unary -", i32::checked_neg)
}

fn short_positive(heap: &mut Heap, a: ObjRef) -> RunResult<ObjRef> {
    unary(heap, a, "unary +", Some)
}

fn short_absolute(heap: &mut Heap, a: ObjRef) -> RunResult<ObjRef> {
    unary(heap, a, "abs()", i32::checked_abs)
}

fn short_bool(heap: &Heap, a: &ObjRef) -> bool {
    operand(heap, a, "bool").is_ok_and(|value| value != 0)
}

/// Equal when both are shorts with the same value; a short never equals another type.
fn short_equal(heap: &Heap, a: &ObjRef, b: &ObjRef) -> RunResult<bool> {
    match (operand(heap, a, "=="), operand(heap, b, "==")) {
        (Ok(x), Ok(y)) => Ok(x == y),
        _ => Ok(false),
    }
}

fn short_less_or_equal(heap: &Heap, a: &ObjRef, b: &ObjRef) -> RunResult<bool> {
    Ok(operand(heap, a, "<=")? <= operand(heap, b, "<=")?)
}

const SHORT_NUMBER: NumberMethods = NumberMethods {
    add: Some(short_add),
    subtract: Some(short_subtract),
    multiply: Some(short_multiply),
    remainder: Some(short_remainder),
    floor_divide: Some(short_floor_divide),
    power: Some(short_power),
    negative: Some(short_negative),
    positive: Some(short_positive),
    absolute: Some(short_absolute),
    bool: Some(short_bool),
    ..NumberMethods::EMPTY
};

pub const SHORT_TYPE: TypeDescriptor = TypeDescriptor {
    number: Some(&SHORT_NUMBER),
    equal: Some(short_equal),
    less_or_equal: Some(short_less_or_equal),
    pooled: true,
    ..TypeDescriptor::new("short", SHORT_BASIC_SIZE)
};

// ============================================================================
// Recursive Fibonacci
// ============================================================================

/// Recursive Fibonacci over generic dispatch: `fib(n) = 1` for `n <= 1`,
/// otherwise `fib(n - 1) + fib(n - 2)`.
///
/// Consumes `n` and returns a new reference. Every intermediate value is
/// created, compared, combined and released through the heap, so after it
/// returns the heap holds exactly one more live reference than before: the
/// result. Recursion depth is bounded by the heap's resource limits.
///
/// ```
/// use objrt::{Heap, HeapConfig, types::{Short, fib}};
///
/// let mut heap = Heap::new(HeapConfig::default());
/// let n = Short::new(&mut heap, 10).unwrap();
/// let result = fib(&mut heap, n).unwrap();
/// assert_eq!(Short::value_of(&heap, &result), Ok(89));
/// heap.release_ref(result);
/// ```
pub fn fib(heap: &mut Heap, n: ObjRef) -> RunResult<ObjRef> {
    if let Err(err) = heap.enter_recursion() {
        heap.release_ref(n);
        return Err(err);
    }
    let result = fib_level(heap, n);
    heap.leave_recursion();
    result
}

fn fib_level(heap: &mut Heap, n: ObjRef) -> RunResult<ObjRef> {
    defer_drop!(n, heap);
    let one = Short::new(heap, 1)?;
    let n_ref = heap.acquire_ref(n);
    if heap.compare(CompareOp::LessOrEqual, n_ref, one)? {
        return Short::new(heap, 1);
    }

    let n_minus_1 = minus(heap, n, 1)?;
    let left = fib(heap, n_minus_1)?;
    let right = match minus(heap, n, 2).and_then(|n_minus_2| fib(heap, n_minus_2)) {
        Ok(right) => right,
        Err(err) => {
            heap.release_ref(left);
            return Err(err);
        }
    };
    heap.binary(BinaryOp::Add, left, right)
}

/// `n - k` through dispatch, leaving the caller's reference to `n` intact.
fn minus(heap: &mut Heap, n: &ObjRef, k: i32) -> RunResult<ObjRef> {
    let k = Short::new(heap, k)?;
    let n = heap.acquire_ref(n);
    heap.binary(BinaryOp::Subtract, n, k)
}
