//! Interned singletons.
//!
//! `None`, `True`, `False` and every integer in the configured small-int range
//! are created once, when the heap is built, as immortal objects. They never go
//! through the underlying allocator and never enter a pool. The cache owns one
//! reference to each, so a program with balanced acquire/release never drives
//! their refcount to zero.

use std::ops::Range;

use crate::{
    object::{HeapObject, ObjId, ObjectData, Slot},
    type_object::{TypeId, TypeRegistry},
};

#[derive(Debug)]
pub(crate) struct SmallObjectCache {
    none: ObjId,
    true_obj: ObjId,
    false_obj: ObjId,
    small_ints: Vec<ObjId>,
    range: Range<i32>,
}

impl SmallObjectCache {
    /// Creates every interned object directly in `slots`.
    pub fn populate(slots: &mut Vec<Slot>, types: &TypeRegistry, range: Range<i32>) -> Self {
        let mut insert = |type_id: TypeId, data: ObjectData| {
            let id = ObjId::new(slots.len());
            slots.push(Slot::Live(HeapObject {
                refcount: 1,
                type_id,
                len: 0,
                alloc_size: types.get(type_id).alloc_size(0),
                immortal: true,
                data,
            }));
            id
        };

        let none = insert(TypeId::NONE, ObjectData::None);
        let false_obj = insert(TypeId::BOOL, ObjectData::Bool(false));
        let true_obj = insert(TypeId::BOOL, ObjectData::Bool(true));
        let small_ints = range
            .clone()
            .map(|value| insert(TypeId::SHORT, ObjectData::Short(value)))
            .collect();

        Self {
            none,
            true_obj,
            false_obj,
            small_ints,
            range,
        }
    }

    pub fn none(&self) -> ObjId {
        self.none
    }

    pub fn bool(&self, value: bool) -> ObjId {
        if value { self.true_obj } else { self.false_obj }
    }

    /// Returns the interned instance for `value`, if it is in range.
    pub fn small_int(&self, value: i32) -> Option<ObjId> {
        if !self.range.contains(&value) {
            return None;
        }
        let offset = usize::try_from(i64::from(value) - i64::from(self.range.start)).ok()?;
        self.small_ints.get(offset).copied()
    }

    pub fn range(&self) -> Range<i32> {
        self.range.clone()
    }

    /// Number of interned objects.
    pub fn len(&self) -> usize {
        self.small_ints.len() + 3
    }
}
