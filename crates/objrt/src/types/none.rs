//! The `NoneType` singleton type. Its only capability is falsiness.

use crate::{
    heap::Heap,
    object::ObjRef,
    type_object::{NumberMethods, TypeDescriptor},
};

fn none_bool(_heap: &Heap, _obj: &ObjRef) -> bool {
    false
}

const NONE_NUMBER: NumberMethods = NumberMethods {
    bool: Some(none_bool),
    ..NumberMethods::EMPTY
};

pub const NONE_TYPE: TypeDescriptor = TypeDescriptor {
    number: Some(&NONE_NUMBER),
    ..TypeDescriptor::new("NoneType", 16)
};
