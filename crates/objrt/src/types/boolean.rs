//! The `bool` type. Only the two cached singletons ever exist.

use crate::{
    error::RunResult,
    heap::Heap,
    object::{ObjRef, ObjectData},
    type_object::{NumberMethods, TypeDescriptor},
};

fn value(heap: &Heap, obj: &ObjRef) -> Option<bool> {
    match heap.get(obj).data() {
        ObjectData::Bool(value) => Some(*value),
        _ => None,
    }
}

fn bool_bool(heap: &Heap, obj: &ObjRef) -> bool {
    value(heap, obj).unwrap_or(true)
}

/// Equal when both are bools with the same value; a bool never equals another type.
fn bool_equal(heap: &Heap, a: &ObjRef, b: &ObjRef) -> RunResult<bool> {
    Ok(matches!((value(heap, a), value(heap, b)), (Some(x), Some(y)) if x == y))
}

const BOOL_NUMBER: NumberMethods = NumberMethods {
    bool: Some(bool_bool),
    ..NumberMethods::EMPTY
};

pub const BOOL_TYPE: TypeDescriptor = TypeDescriptor {
    number: Some(&BOOL_NUMBER),
    equal: Some(bool_equal),
    ..TypeDescriptor::new("bool", 16)
};
