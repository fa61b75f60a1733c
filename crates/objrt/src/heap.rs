//! The refcounted object heap.
//!
//! A [`Heap`] owns every piece of mutable runtime state: the slot arena, the
//! size-class pools, the underlying allocator's accounting, the small-object
//! cache, the type registry and the tracer. There are no globals, so two heaps
//! are fully independent.
//!
//! # Ownership
//!
//! Strong references are [`ObjRef`] handles. [`Heap::acquire_ref`] makes a new
//! one, [`Heap::release_ref`] gives one back. Dispatch entry points and
//! capability handlers take their operands by value and return one new
//! reference. Inside handlers, [`defer_drop!`](crate::defer_drop) guarantees an
//! operand is released on every exit path.

use std::{collections::BTreeMap, mem::ManuallyDrop, ptr::addr_of};

use smallvec::{SmallVec, smallvec};

use crate::{
    alloc::{AllocatorStats, BlockAllocator},
    cache::SmallObjectCache,
    config::HeapConfig,
    error::{InvariantError, RunError, RunResult},
    object::{HeapObject, ObjId, ObjRef, ObjectData, Slot},
    pool::SizeClassPools,
    resource::ResourceTracker,
    stats::HeapStats,
    tracer::{HeapTracer, NoopTracer},
    type_object::{TypeDescriptor, TypeId, TypeRegistry},
    types,
};

/// Refcounted object store with pooled allocation and interned singletons.
#[derive(Debug)]
pub struct Heap {
    slots: Vec<Slot>,
    /// Slot indices returned to the underlying allocator.
    vacant: Vec<ObjId>,
    pools: SizeClassPools,
    allocator: BlockAllocator,
    cache: SmallObjectCache,
    types: TypeRegistry,
    tracer: Box<dyn HeapTracer>,
    /// Current depth of recursive runtime helpers such as `short::fib`.
    recursion_depth: usize,
    invariant_violations: usize,
}

impl Heap {
    /// Builds a heap, registers the built-in types and populates the cache.
    #[must_use]
    pub fn new(config: HeapConfig) -> Self {
        let mut types = TypeRegistry::new();
        types::register_builtins(&mut types);

        let mut slots = Vec::with_capacity(config.initial_capacity);
        let cache = SmallObjectCache::populate(&mut slots, &types, config.cached_int_range());

        Self {
            slots,
            vacant: Vec::new(),
            pools: SizeClassPools::new(&config.pool),
            allocator: BlockAllocator::new(config.build_tracker()),
            cache,
            types,
            tracer: Box::new(NoopTracer),
            recursion_depth: 0,
            invariant_violations: 0,
        }
    }

    /// Replaces the tracer.
    #[must_use]
    pub fn with_tracer(mut self, tracer: Box<dyn HeapTracer>) -> Self {
        self.tracer = tracer;
        self
    }

    /// Replaces the resource tracker chosen from [`HeapConfig::limits`].
    ///
    /// Must be called before any object is allocated.
    #[must_use]
    pub fn with_tracker(mut self, tracker: Box<dyn ResourceTracker>) -> Self {
        self.allocator.set_tracker(tracker);
        self
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    /// Registers a host type and returns its id.
    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> TypeId {
        self.types.register(descriptor)
    }

    /// Looks a type up by name; the most recent registration wins.
    #[must_use]
    pub fn type_id_by_name(&self, name: &str) -> Option<TypeId> {
        self.types.by_name(name)
    }

    #[must_use]
    pub fn type_descriptor(&self, type_id: TypeId) -> &TypeDescriptor {
        self.types.get(type_id)
    }

    /// Returns the descriptor of a live object's type.
    #[must_use]
    pub fn type_of(&self, obj: &ObjRef) -> &TypeDescriptor {
        self.types.get(self.get(obj).type_id)
    }

    #[must_use]
    pub fn type_name(&self, obj: &ObjRef) -> &'static str {
        self.type_of(obj).name
    }

    // ------------------------------------------------------------------
    // Allocation
    // ------------------------------------------------------------------

    /// Allocates an instance of a host-registered type with a scalar payload.
    ///
    /// Built-in types are rejected: they are created through
    /// [`Short::new`](crate::types::Short::new), [`Tuple::new`](crate::types::Tuple::new),
    /// [`none`](Self::none) and [`bool`](Self::bool), which keep interning and
    /// item ownership intact. So is an id this heap never registered.
    pub fn allocate(&mut self, type_id: TypeId, payload: i64) -> RunResult<ObjRef> {
        if type_id.is_builtin() || !self.types.contains(type_id) {
            return Err(RunError::InvalidOperand {
                op: "allocate",
                reason: "not a host-registered type",
            });
        }
        self.allocate_object(type_id, ObjectData::Opaque(payload))
    }

    /// Allocates a new object of `type_id` with refcount 1.
    ///
    /// The block size is `basic_size + item_size * len`, where `len` is the
    /// element count of `data`. A pooled block of that size is reused when
    /// available; otherwise a fresh block is charged to the resource tracker.
    ///
    /// `data` transfers ownership of any references it holds. If the
    /// allocation fails those references are released before returning.
    pub(crate) fn allocate_object(&mut self, type_id: TypeId, data: ObjectData) -> RunResult<ObjRef> {
        debug_assert!(data.fits(type_id), "payload {data:?} does not fit type {type_id:?}");
        let descriptor = self.types.get(type_id);
        let (type_name, len) = (descriptor.name, data.child_ids().len());
        let size = descriptor.alloc_size(len);

        let id = if let Some(id) = self.pools.pop(size, &self.slots) {
            self.tracer.on_pool_reuse(id, type_name, size);
            id
        } else {
            if let Err(err) = self.allocator.allocate(size) {
                for &child in data.child_ids() {
                    self.dec_ref(child);
                }
                return Err(err.into());
            }
            let id = self.take_vacant_slot();
            self.tracer.on_allocate(id, type_name, size);
            id
        };

        self.slots[id.index()] = Slot::Live(HeapObject {
            refcount: 1,
            type_id,
            len,
            alloc_size: size,
            immortal: false,
            data,
        });
        Ok(ObjRef::from_owned(id))
    }

    fn take_vacant_slot(&mut self) -> ObjId {
        self.vacant.pop().unwrap_or_else(|| {
            self.slots.push(Slot::Vacant);
            ObjId::new(self.slots.len() - 1)
        })
    }

    // ------------------------------------------------------------------
    // Small-object cache
    // ------------------------------------------------------------------

    /// Returns a `short` for `value`, interned when it is in the small-int range.
    pub fn make_small_value(&mut self, value: i32) -> RunResult<ObjRef> {
        if let Some(id) = self.cache.small_int(value) {
            return Ok(self.cache_hit(id));
        }
        self.allocate_object(TypeId::SHORT, ObjectData::Short(value))
    }

    /// Returns a new reference to the `None` singleton.
    pub fn none(&mut self) -> ObjRef {
        let id = self.cache.none();
        self.cache_hit(id)
    }

    /// Returns a new reference to the `True` or `False` singleton.
    pub fn bool(&mut self, value: bool) -> ObjRef {
        let id = self.cache.bool(value);
        self.cache_hit(id)
    }

    fn cache_hit(&mut self, id: ObjId) -> ObjRef {
        self.tracer.on_cache_hit(id);
        self.new_ref(id)
    }

    /// The interned integer range.
    #[must_use]
    pub fn small_int_range(&self) -> std::ops::Range<i32> {
        self.cache.range()
    }

    // ------------------------------------------------------------------
    // Reference counting
    // ------------------------------------------------------------------

    /// Returns a new strong reference to the same object.
    pub fn acquire_ref(&mut self, obj: &ObjRef) -> ObjRef {
        self.new_ref(obj.id())
    }

    /// Gives back a strong reference.
    ///
    /// When the last reference goes, the object's own references are released
    /// and its block is pooled or returned to the underlying allocator.
    ///
    /// A bookkeeping inconsistency (releasing an immortal singleton's last
    /// reference) panics in debug builds. In release builds the offending
    /// decrement is skipped, counted in [`HeapStats::invariant_violations`] and
    /// reported to the tracer.
    pub fn release_ref(&mut self, obj: ObjRef) {
        self.dec_ref(obj.into_id());
    }

    /// Like [`release_ref`](Self::release_ref), but reports a bookkeeping
    /// inconsistency as [`RunError::Invariant`] instead.
    pub fn try_release(&mut self, obj: ObjRef) -> RunResult<()> {
        self.dec_ref_checked(obj.into_id()).map_err(RunError::from)
    }

    /// Makes a new strong reference from a bare id, e.g. a tuple item.
    pub(crate) fn new_ref(&mut self, id: ObjId) -> ObjRef {
        self.inc_ref(id);
        ObjRef::from_owned(id)
    }

    pub(crate) fn inc_ref(&mut self, id: ObjId) {
        match self.slots.get_mut(id.index()) {
            Some(Slot::Live(object)) => object.refcount += 1,
            _ => panic!("Heap::inc_ref: object {id} is not live"),
        }
    }

    pub(crate) fn dec_ref(&mut self, id: ObjId) {
        if let Err(err) = self.dec_ref_checked(id) {
            self.report_invariant_violation(&err);
        }
    }

    fn report_invariant_violation(&mut self, err: &InvariantError) {
        self.invariant_violations += 1;
        self.tracer.on_invariant_violation(err);
        if cfg!(debug_assertions) {
            panic!("refcount invariant violated: {err}");
        }
    }

    /// Decrements `id` and deallocates everything that reaches zero.
    ///
    /// Children are released iteratively so deeply nested tuples can't
    /// overflow the native stack. A child that fails the check does not stop
    /// the cascade: every other pending id is still released, and the first
    /// failure is returned at the end.
    fn dec_ref_checked(&mut self, id: ObjId) -> Result<(), InvariantError> {
        let mut first_error = None;
        let mut pending: SmallVec<[ObjId; 8]> = smallvec![id];
        while let Some(id) = pending.pop() {
            match self.decrement(id) {
                Ok(Some(dead)) => {
                    pending.extend(dead.data.child_ids().iter().copied());
                    self.free_block(id, &dead);
                }
                Ok(None) => {}
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Decrements one object, taking it out of its slot when the count reaches zero.
    fn decrement(&mut self, id: ObjId) -> Result<Option<HeapObject>, InvariantError> {
        let slot = self
            .slots
            .get_mut(id.index())
            .ok_or(InvariantError::UnknownObject(id))?;
        let object = match slot {
            Slot::Live(object) => object,
            Slot::Vacant => return Err(InvariantError::AlreadyFreed(id)),
            Slot::Pooled(_) => return Err(InvariantError::Pooled(id)),
        };
        if object.refcount == 1 && object.immortal {
            return Err(InvariantError::ImmortalReleased {
                id,
                type_name: self.types.get(object.type_id).name,
            });
        }
        object.refcount -= 1;
        if object.refcount > 0 {
            return Ok(None);
        }
        let Slot::Live(dead) = std::mem::replace(slot, Slot::Vacant) else {
            unreachable!("slot was live above");
        };
        Ok(Some(dead))
    }

    /// Pools the block of a dead object, or returns it to the allocator.
    fn free_block(&mut self, id: ObjId, dead: &HeapObject) {
        let size = dead.alloc_size;
        if self.types.get(dead.type_id).pooled && self.pools.push(id, size, &mut self.slots) {
            self.tracer.on_pool(id, size);
        } else {
            self.allocator.deallocate(size);
            self.vacant.push(id);
            self.tracer.on_free(id, size);
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    /// Returns the header and payload of a live object.
    #[must_use]
    pub fn get(&self, obj: &ObjRef) -> &HeapObject {
        self.object(obj.id())
            .expect("Heap::get: ObjRef points at a dead object")
    }

    /// Returns the object at `id` if it is live.
    #[must_use]
    pub fn object(&self, id: ObjId) -> Option<&HeapObject> {
        match self.slots.get(id.index()) {
            Some(Slot::Live(object)) => Some(object),
            _ => None,
        }
    }

    /// Refcount of the object at `id`, `None` once it is dead.
    #[must_use]
    pub fn refcount(&self, id: ObjId) -> Option<usize> {
        self.object(id).map(HeapObject::refcount)
    }

    #[must_use]
    pub fn is_live(&self, id: ObjId) -> bool {
        self.object(id).is_some()
    }

    /// Identity comparison.
    #[must_use]
    pub fn is(&self, a: &ObjRef, b: &ObjRef) -> bool {
        a.id() == b.id()
    }

    /// Counters of the underlying allocator.
    #[must_use]
    pub fn allocator_stats(&self) -> AllocatorStats {
        self.allocator.stats()
    }

    /// Number of blocks parked in the pool for `size`.
    #[must_use]
    pub fn pooled_blocks(&self, size: usize) -> usize {
        self.pools.pooled_in_class(size)
    }

    /// Returns a snapshot of the heap for leak checks and diffs.
    #[must_use]
    pub fn heap_stats(&self) -> HeapStats {
        let mut objects_by_type: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut live_objects = 0;
        let mut immortal_objects = 0;
        for slot in &self.slots {
            if let Slot::Live(object) = slot {
                live_objects += 1;
                if object.immortal {
                    immortal_objects += 1;
                }
                *objects_by_type.entry(self.types.get(object.type_id).name).or_insert(0) += 1;
            }
        }

        debug_assert_eq!(immortal_objects, self.cache.len(), "cached objects must stay live");

        let tracker = self.allocator.tracker();
        HeapStats {
            live_objects,
            immortal_objects,
            pooled_blocks: self.pools.pooled_blocks(),
            vacant_slots: self.vacant.len(),
            total_slots: self.slots.len(),
            objects_by_type,
            invariant_violations: self.invariant_violations,
            tracker_allocations: tracker.allocation_count(),
            tracker_memory_bytes: tracker.current_memory_bytes(),
        }
    }

    // ------------------------------------------------------------------
    // Recursion and tracing
    // ------------------------------------------------------------------

    /// Enters one level of runtime recursion, failing past the tracker's limit.
    pub fn enter_recursion(&mut self) -> RunResult<()> {
        self.allocator.tracker().check_recursion_depth(self.recursion_depth)?;
        self.recursion_depth += 1;
        Ok(())
    }

    /// Leaves a level entered with [`enter_recursion`](Self::enter_recursion).
    pub fn leave_recursion(&mut self) {
        debug_assert!(self.recursion_depth > 0, "leave_recursion without enter");
        self.recursion_depth = self.recursion_depth.saturating_sub(1);
    }

    #[must_use]
    pub fn recursion_depth(&self) -> usize {
        self.recursion_depth
    }

    pub(crate) fn tracer_mut(&mut self) -> &mut dyn HeapTracer {
        self.tracer.as_mut()
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(HeapConfig::default())
    }
}

// ============================================================================
// Scoped cleanup
// ============================================================================

/// Types that contain a `Heap`, so they can take part in the [`HeapGuard`] pattern.
pub trait ContainsHeap {
    fn heap_mut(&mut self) -> &mut Heap;
}

impl ContainsHeap for Heap {
    #[inline]
    fn heap_mut(&mut self) -> &mut Self {
        self
    }
}

/// Values that hold strong references and need the heap to give them back.
///
/// Rust's `Drop` has no access to the `Heap`, so owned references are released
/// explicitly through this trait. Every value implementing it must be cleaned
/// up on every code path; prefer [`defer_drop!`](crate::defer_drop) or
/// [`HeapGuard`] over manual calls in each branch.
pub trait DropWithHeap {
    /// Consumes `self` and releases every reference it holds.
    fn drop_with_heap(self, heap: &mut Heap);
}

impl DropWithHeap for ObjRef {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap) {
        heap.release_ref(self);
    }
}

impl<U: DropWithHeap> DropWithHeap for Option<U> {
    #[inline]
    fn drop_with_heap(self, heap: &mut Heap) {
        if let Some(value) = self {
            value.drop_with_heap(heap);
        }
    }
}

impl<U: DropWithHeap> DropWithHeap for Vec<U> {
    fn drop_with_heap(self, heap: &mut Heap) {
        for value in self {
            value.drop_with_heap(heap);
        }
    }
}

impl<U: DropWithHeap, const N: usize> DropWithHeap for [U; N] {
    fn drop_with_heap(self, heap: &mut Heap) {
        for value in self {
            value.drop_with_heap(heap);
        }
    }
}

impl<A: DropWithHeap, B: DropWithHeap> DropWithHeap for (A, B) {
    fn drop_with_heap(self, heap: &mut Heap) {
        let (a, b) = self;
        a.drop_with_heap(heap);
        b.drop_with_heap(heap);
    }
}

/// RAII guard that releases a [`DropWithHeap`] value on every code path.
///
/// The guard's `Drop` impl calls [`DropWithHeap::drop_with_heap`], so cleanup
/// happens whether the scope exits normally, via `?`, or by early return. Use
/// [`into_inner`](Self::into_inner) to reclaim the value instead.
pub struct HeapGuard<'a, H: ContainsHeap, V: DropWithHeap> {
    // manually dropped because it needs to be dropped by move.
    value: ManuallyDrop<V>,
    heap: &'a mut H,
}

impl<'a, H: ContainsHeap, V: DropWithHeap> HeapGuard<'a, H, V> {
    #[inline]
    pub fn new(value: V, heap: &'a mut H) -> Self {
        Self {
            value: ManuallyDrop::new(value),
            heap,
        }
    }

    /// Consumes the guard and returns the value without releasing it.
    #[inline]
    pub fn into_inner(self) -> V {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `ManuallyDrop::new(self)` prevents `Drop` on self, so the value is taken exactly once
        unsafe { ManuallyDrop::take(&mut this.value) }
    }

    /// Borrows the value and the heap. This is what [`defer_drop!`](crate::defer_drop) uses.
    #[inline]
    pub fn as_parts(&mut self) -> (&V, &mut H) {
        (&self.value, self.heap)
    }

    /// Consumes the guard and returns the value and heap separately, without releasing.
    #[inline]
    pub fn into_parts(self) -> (V, &'a mut H) {
        let mut this = ManuallyDrop::new(self);
        // SAFETY: `ManuallyDrop` prevents `Drop` on self, so both fields are moved out exactly once
        unsafe { (ManuallyDrop::take(&mut this.value), addr_of!(this.heap).read()) }
    }

    #[inline]
    pub fn heap(&mut self) -> &mut H {
        self.heap
    }
}

impl<H: ContainsHeap, V: DropWithHeap> Drop for HeapGuard<'_, H, V> {
    fn drop(&mut self) {
        // SAFETY: the value is only taken here or in `into_inner`/`into_parts`, which skip this impl
        unsafe { ManuallyDrop::take(&mut self.value) }.drop_with_heap(self.heap.heap_mut());
    }
}

/// Ensures a [`DropWithHeap`] value is released when the scope exits.
///
/// Moves `$value` into a [`HeapGuard`] and rebinds `$value` as `&V` and `$heap`
/// as `&mut H`. Because `$heap` is rebound with `let`, it cannot be `self`;
/// assign `let this = self;` first.
///
/// ```
/// use objrt::{defer_drop, Heap, HeapConfig, ObjRef, RunResult, types::Short};
///
/// fn doubled(heap: &mut Heap, n: ObjRef) -> RunResult<ObjRef> {
///     defer_drop!(n, heap);
///     let value = Short::value_of(heap, n)?;
///     heap.make_small_value(value * 2)
/// }
///
/// let mut heap = Heap::new(HeapConfig::default());
/// let n = heap.make_small_value(21).unwrap();
/// let n_id = n.id();
/// let result = doubled(&mut heap, n).unwrap();
/// assert_eq!(Short::value_of(&heap, &result), Ok(42));
/// // only the cache's own reference is left
/// assert_eq!(heap.refcount(n_id), Some(1));
/// heap.release_ref(result);
/// ```
#[macro_export]
macro_rules! defer_drop {
    ($value:ident, $heap:ident) => {
        let mut _guard = $crate::HeapGuard::new($value, $heap);
        #[allow(
            clippy::allow_attributes,
            reason = "the reborrowed parts may not both be used in every case, so allow unused vars to avoid warnings"
        )]
        #[allow(unused_variables)]
        let ($value, $heap) = _guard.as_parts();
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Short;

    #[test]
    fn fresh_object_starts_at_one() {
        let mut heap = Heap::default();
        let obj = Short::new(&mut heap, 1000).unwrap();
        assert_eq!(heap.refcount(obj.id()), Some(1));
        assert_eq!(heap.get(&obj).alloc_size(), 16);
        heap.release_ref(obj);
    }

    #[test]
    fn last_release_pools_short_blocks() {
        let mut heap = Heap::default();
        let obj = Short::new(&mut heap, 1000).unwrap();
        let id = obj.id();
        heap.release_ref(obj);
        assert!(!heap.is_live(id));
        assert!(matches!(heap.slots[id.index()], Slot::Pooled(_)));
        assert_eq!(heap.pooled_blocks(16), 1);
    }

    #[test]
    fn try_release_reports_released_singleton() {
        let mut heap = Heap::default();
        let none_id = heap.cache.none();
        // forge the cache's own reference
        let forged = ObjRef::from_owned(none_id);
        let err = heap.try_release(forged).unwrap_err();
        assert_eq!(
            err,
            RunError::Invariant(InvariantError::ImmortalReleased {
                id: none_id,
                type_name: "NoneType",
            })
        );
        assert_eq!(heap.refcount(none_id), Some(1));
    }

    #[test]
    fn try_release_reports_double_free() {
        let mut heap = Heap::new(HeapConfig::default().pool(crate::PoolConfig::disabled()));
        let obj = Short::new(&mut heap, 5000).unwrap();
        let id = obj.id();
        heap.release_ref(obj);
        let err = heap.try_release(ObjRef::from_owned(id)).unwrap_err();
        assert_eq!(err, RunError::Invariant(InvariantError::AlreadyFreed(id)));
    }

    #[test]
    fn try_release_reports_pooled_block() {
        let mut heap = Heap::default();
        let obj = Short::new(&mut heap, 5000).unwrap();
        let id = obj.id();
        heap.release_ref(obj);
        let err = heap.try_release(ObjRef::from_owned(id)).unwrap_err();
        assert_eq!(err, RunError::Invariant(InvariantError::Pooled(id)));
    }

    #[test]
    fn bad_child_does_not_stop_the_cascade() {
        let mut heap = Heap::default();
        let good = Short::new(&mut heap, 6000).unwrap();
        let good_id = good.id();
        let bad = Short::new(&mut heap, 5000).unwrap();
        let bad_id = bad.id();
        heap.release_ref(bad);

        // a 48-byte block, so it never comes from the 16-byte pool
        let items = smallvec![bad_id, good.into_id(), bad_id];
        let tuple = heap.allocate_object(TypeId::TUPLE, ObjectData::Tuple(items)).unwrap();
        let tuple_id = tuple.id();

        let err = heap.try_release(tuple).unwrap_err();
        assert_eq!(err, RunError::Invariant(InvariantError::Pooled(bad_id)));
        assert!(!heap.is_live(tuple_id));
        assert!(!heap.is_live(good_id));
        assert_eq!(heap.pooled_blocks(16), 2);
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic(expected = "refcount invariant violated"))]
    fn unchecked_double_release_is_counted() {
        let mut heap = Heap::default();
        let obj = Short::new(&mut heap, 5000).unwrap();
        let id = obj.id();
        heap.release_ref(obj);
        heap.release_ref(ObjRef::from_owned(id));
        assert_eq!(heap.heap_stats().invariant_violations, 1);
    }

    #[test]
    fn recursion_depth_is_bounded() {
        let limits = crate::ResourceLimits::new().max_recursion_depth(Some(2));
        let mut heap = Heap::new(HeapConfig::default().limits(limits));
        heap.enter_recursion().unwrap();
        heap.enter_recursion().unwrap();
        assert!(heap.enter_recursion().is_err());
        heap.leave_recursion();
        heap.leave_recursion();
        assert_eq!(heap.recursion_depth(), 0);
    }
}
