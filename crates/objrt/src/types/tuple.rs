//! The `tuple` type: an immutable variable-length sequence.
//!
//! A tuple owns one strong reference to each item. Its block size grows with
//! its length (`24 + 8 * len`), and it is never pooled.

use smallvec::SmallVec;

use crate::{
    defer_drop,
    dispatch::CompareOp,
    error::{RunError, RunResult},
    heap::Heap,
    object::{ObjId, ObjRef, ObjectData},
    type_object::{MappingMethods, SequenceMethods, TypeDescriptor, TypeId},
    types::Short,
};

/// Constructor and accessors for `tuple` values.
#[derive(Debug, Clone, Copy)]
pub struct Tuple;

impl Tuple {
    /// Builds a tuple, taking ownership of `items`.
    ///
    /// If allocation fails the items are released.
    #[expect(clippy::new_ret_no_self)]
    pub fn new(heap: &mut Heap, items: impl IntoIterator<Item = ObjRef>) -> RunResult<ObjRef> {
        let ids = items.into_iter().map(ObjRef::into_id).collect();
        heap.allocate_object(TypeId::TUPLE, ObjectData::Tuple(ids))
    }

    /// Returns a new reference to item `index`, counting from the end when negative.
    pub fn item(heap: &mut Heap, tuple: &ObjRef, index: i64) -> RunResult<ObjRef> {
        let id = item_id(heap, tuple, index, "tuple item")?;
        Ok(heap.new_ref(id))
    }
}

fn items<'h>(heap: &'h Heap, obj: &ObjRef, op: &'static str) -> RunResult<&'h [ObjId]> {
    match heap.get(obj).data() {
        ObjectData::Tuple(items) => Ok(items.as_slice()),
        _ => Err(RunError::TypeMismatch {
            op,
            expected: "tuple",
            found: heap.type_name(obj),
        }),
    }
}

fn item_id(heap: &Heap, tuple: &ObjRef, index: i64, op: &'static str) -> RunResult<ObjId> {
    let items = items(heap, tuple, op)?;
    let len = i64::try_from(items.len()).unwrap_or(i64::MAX);
    let resolved = if index < 0 { index + len } else { index };
    usize::try_from(resolved)
        .ok()
        .and_then(|i| items.get(i).copied())
        .ok_or(RunError::InvalidOperand {
            op,
            reason: "tuple index out of range",
        })
}

fn tuple_length(heap: &Heap, obj: &ObjRef) -> usize {
    items(heap, obj, "len()").map_or(0, <[ObjId]>::len)
}

fn tuple_concat(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    let operands = (a, b);
    defer_drop!(operands, heap);
    let left = items(heap, &operands.0, "concat")?;
    let right = items(heap, &operands.1, "concat")?;
    let ids: SmallVec<[ObjId; 4]> = left.iter().chain(right).copied().collect();
    for &id in &ids {
        heap.inc_ref(id);
    }
    heap.allocate_object(TypeId::TUPLE, ObjectData::Tuple(ids))
}

fn tuple_subscript(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    let operands = (a, b);
    defer_drop!(operands, heap);
    let index = Short::value_of(heap, &operands.1)?;
    let id = item_id(heap, &operands.0, i64::from(index), "[]")?;
    Ok(heap.new_ref(id))
}

/// Item-wise equality through each item's `equal` slot.
fn tuple_equal(heap: &Heap, a: &ObjRef, b: &ObjRef) -> RunResult<bool> {
    let (Ok(left), Ok(right)) = (items(heap, a, "=="), items(heap, b, "==")) else {
        return Ok(false);
    };
    if left.len() != right.len() {
        return Ok(false);
    }
    for (&x, &y) in left.iter().zip(right) {
        if x == y {
            continue;
        }
        let equal = ObjRef::borrowed(x, |x| ObjRef::borrowed(y, |y| heap.compare_refs(CompareOp::Equal, x, y)))?;
        if !equal {
            return Ok(false);
        }
    }
    Ok(true)
}

const TUPLE_SEQUENCE: SequenceMethods = SequenceMethods {
    length: Some(tuple_length),
    concat: Some(tuple_concat),
};

const TUPLE_MAPPING: MappingMethods = MappingMethods {
    length: Some(tuple_length),
    subscript: Some(tuple_subscript),
};

pub const TUPLE_TYPE: TypeDescriptor = TypeDescriptor {
    item_size: 8,
    sequence: Some(&TUPLE_SEQUENCE),
    mapping: Some(&TUPLE_MAPPING),
    equal: Some(tuple_equal),
    ..TypeDescriptor::new("tuple", 24)
};
