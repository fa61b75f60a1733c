//! Object header, owned references and arena slots.
//!
//! Every runtime value lives in one slot of the heap arena and is reached through
//! an [`ObjId`]. Code that *owns* a strong reference holds an [`ObjRef`]; the
//! type deliberately implements neither `Clone` nor `Copy`, so ownership of a
//! reference is tracked by the compiler and handing one to a dispatch entry
//! point moves it.

use std::fmt;

use smallvec::SmallVec;

use crate::type_object::TypeId;

/// Index of an object's slot in the heap arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct ObjId(usize);

impl ObjId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw index value.
    #[inline]
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An owned strong reference to a live object.
///
/// Each `ObjRef` accounts for exactly one unit of its object's refcount. It must
/// be given back with [`Heap::release_ref`](crate::Heap::release_ref) (or moved
/// into an API that consumes it); see [`DropWithHeap`](crate::DropWithHeap).
///
/// With the `ref-count-panic` feature enabled, dropping an `ObjRef` any other way
/// panics, which turns a leaked reference into a test failure.
#[derive(Debug)]
pub struct ObjRef(ObjId);

impl ObjRef {
    /// Wraps an id whose refcount unit the caller already owns.
    pub(crate) fn from_owned(id: ObjId) -> Self {
        Self(id)
    }

    /// Returns the id of the referenced object.
    #[inline]
    #[must_use]
    pub fn id(&self) -> ObjId {
        self.0
    }

    /// Runs `f` with a temporary handle to `id` that carries no refcount unit.
    ///
    /// Used to hand an id held inside a container to a slot that borrows.
    pub(crate) fn borrowed<R>(id: ObjId, f: impl FnOnce(&Self) -> R) -> R {
        let handle = Self(id);
        let result = f(&handle);
        handle.into_id();
        result
    }

    /// Gives up the handle without touching the refcount.
    ///
    /// The caller becomes responsible for the refcount unit the handle carried.
    pub(crate) fn into_id(self) -> ObjId {
        let id = self.0;
        std::mem::forget(self);
        id
    }
}

/// Catches strong references that go out of scope without being released.
#[cfg(feature = "ref-count-panic")]
impl Drop for ObjRef {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            panic!(
                "ObjRef({}) dropped without calling release_ref() - this is a reference counting bug",
                self.0
            );
        }
    }
}

/// Payload of a live object.
///
/// Values are immutable once constructed; only the header's refcount changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectData {
    None,
    Bool(bool),
    /// Demonstration 32-bit integer.
    Short(i32),
    /// Tuple items; the tuple owns one strong reference to each.
    Tuple(SmallVec<[ObjId; 4]>),
    /// Scalar payload for host-registered types.
    Opaque(i64),
}

impl ObjectData {
    /// Ids of objects this payload holds a strong reference to.
    pub(crate) fn child_ids(&self) -> &[ObjId] {
        match self {
            Self::Tuple(items) => items,
            _ => &[],
        }
    }

    /// Whether this payload is the one instances of `type_id` carry.
    pub(crate) fn fits(&self, type_id: TypeId) -> bool {
        match self {
            Self::None => type_id == TypeId::NONE,
            Self::Bool(_) => type_id == TypeId::BOOL,
            Self::Short(_) => type_id == TypeId::SHORT,
            Self::Tuple(_) => type_id == TypeId::TUPLE,
            Self::Opaque(_) => !type_id.is_builtin(),
        }
    }
}

/// Header plus payload of a live object.
///
/// `len` is the element count of variable-length objects and 0 for fixed-size
/// ones. `alloc_size` is the block size actually acquired for the object,
/// which is what the size-class pools key on.
#[derive(Debug)]
pub struct HeapObject {
    pub(crate) refcount: usize,
    pub(crate) type_id: TypeId,
    pub(crate) len: usize,
    pub(crate) alloc_size: usize,
    pub(crate) immortal: bool,
    pub(crate) data: ObjectData,
}

impl HeapObject {
    #[must_use]
    pub fn refcount(&self) -> usize {
        self.refcount
    }

    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Element count for variable-length objects, 0 otherwise.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size in bytes of the block this object occupies.
    #[must_use]
    pub fn alloc_size(&self) -> usize {
        self.alloc_size
    }

    /// True for cache-owned singletons which are never deallocated.
    #[must_use]
    pub fn is_immortal(&self) -> bool {
        self.immortal
    }

    #[must_use]
    pub fn data(&self) -> &ObjectData {
        &self.data
    }
}

/// A freed block parked in a size-class pool.
///
/// Has no type and no refcount: a pooled block can only become live again by
/// being popped and re-initialised by an allocation of the same size class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FreeNode {
    /// Next pooled block of the same size class.
    pub next: Option<ObjId>,
    /// Block size in bytes.
    pub size: usize,
}

/// One arena slot.
#[derive(Debug)]
pub(crate) enum Slot {
    /// Returned to the underlying allocator; the index may be reused.
    Vacant,
    Live(HeapObject),
    Pooled(FreeNode),
}
