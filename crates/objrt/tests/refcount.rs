//! Tests for reference counting and the small-object cache.
//!
//! Verifies that acquire/release pairs restore refcounts, that interned values
//! are identity-stable, and that dead objects release what they own.

use objrt::{
    ErrorKind, Heap, HeapConfig, ObjectData, PoolConfig, RunError, TypeDescriptor, TypeId,
    types::{Short, Tuple},
};

fn heap() -> Heap {
    Heap::new(HeapConfig::default())
}

// =============================================================================
// 1. Acquire / release round trip
// =============================================================================

/// N acquires followed by N releases leave the refcount where it started.
#[test]
fn acquire_release_round_trip() {
    let mut heap = heap();
    let obj = Short::new(&mut heap, 1234).unwrap();
    let id = obj.id();
    let baseline = heap.refcount(id).unwrap();

    let extra: Vec<_> = (0..5).map(|_| heap.acquire_ref(&obj)).collect();
    assert_eq!(heap.refcount(id), Some(baseline + 5));
    for handle in extra {
        heap.release_ref(handle);
    }
    assert_eq!(heap.refcount(id), Some(baseline));

    heap.release_ref(obj);
    assert!(!heap.is_live(id));
}

/// The same round trip holds for interned values.
#[test]
fn acquire_release_round_trip_on_cached_value() {
    let mut heap = heap();
    let obj = heap.make_small_value(3).unwrap();
    let id = obj.id();
    let baseline = heap.refcount(id).unwrap();

    let again = heap.acquire_ref(&obj);
    let third = heap.acquire_ref(&again);
    assert_eq!(heap.refcount(id), Some(baseline + 2));
    heap.release_ref(third);
    heap.release_ref(again);
    assert_eq!(heap.refcount(id), Some(baseline));
    heap.release_ref(obj);
    assert_eq!(heap.refcount(id), Some(baseline - 1));
}

// =============================================================================
// 2. Interning identity
// =============================================================================

/// Two requests for the same in-range value return the identical object.
#[test]
fn in_range_values_are_identical() {
    let mut heap = heap();
    let a = heap.make_small_value(42).unwrap();
    let b = Short::new(&mut heap, 42).unwrap();
    let id = a.id();
    assert!(heap.is(&a, &b));
    assert!(heap.get(&a).is_immortal());
    // the cache's own reference plus two outstanding ones
    assert_eq!(heap.refcount(id), Some(3));
    heap.release_ref(a);
    heap.release_ref(b);
    assert_eq!(heap.refcount(id), Some(1));

    let again = heap.make_small_value(42).unwrap();
    assert_eq!(again.id(), id);
    heap.release_ref(again);
}

/// Out-of-range values are separate allocations.
#[test]
fn out_of_range_values_are_distinct() {
    let mut heap = heap();
    let a = heap.make_small_value(256).unwrap();
    let b = heap.make_small_value(256).unwrap();
    assert!(!heap.is(&a, &b));
    assert_eq!(heap.get(&a).data(), &ObjectData::Short(256));
    assert!(!heap.get(&a).is_immortal());
    heap.release_ref(a);
    heap.release_ref(b);
}

/// The interned range is configurable, including negative values.
#[test]
fn configured_range_interns_negative_values() {
    let mut heap = Heap::new(HeapConfig::default().small_int_range(-5..10));
    let a = heap.make_small_value(-5).unwrap();
    let b = heap.make_small_value(-5).unwrap();
    assert!(heap.is(&a, &b));
    let c = heap.make_small_value(10).unwrap();
    assert!(!heap.get(&c).is_immortal());
    for obj in [a, b, c] {
        heap.release_ref(obj);
    }
}

/// `None` and the booleans are singletons.
#[test]
fn none_and_bools_are_singletons() {
    let mut heap = heap();
    let n1 = heap.none();
    let n2 = heap.none();
    let t = heap.bool(true);
    let f = heap.bool(false);
    assert!(heap.is(&n1, &n2));
    assert!(!heap.is(&t, &f));
    assert_eq!(heap.type_name(&n1), "NoneType");
    assert_eq!(heap.type_name(&t), "bool");
    for obj in [n1, n2, t, f] {
        heap.release_ref(obj);
    }
}

/// Releasing a singleton only decrements; the cache keeps it alive.
#[test]
fn releasing_a_singleton_only_decrements() {
    let mut heap = heap();
    let none = heap.none();
    let id = none.id();
    heap.release_ref(none);
    assert_eq!(heap.refcount(id), Some(1));
    assert_eq!(heap.heap_stats().invariant_violations, 0);
}

// =============================================================================
// 3. Deallocation
// =============================================================================

/// A tuple releases its items when it dies.
#[test]
fn dead_tuple_releases_items() {
    let mut heap = Heap::new(HeapConfig::default().pool(PoolConfig::disabled()));
    let item = Short::new(&mut heap, 1000).unwrap();
    let item_id = item.id();
    let extra = heap.acquire_ref(&item);
    let tuple = Tuple::new(&mut heap, [item, extra]).unwrap();
    assert_eq!(heap.refcount(item_id), Some(2));
    assert_eq!(heap.get(&tuple).len(), 2);
    assert_eq!(heap.get(&tuple).alloc_size(), 24 + 2 * 8);

    let tuple_id = tuple.id();
    heap.release_ref(tuple);
    assert!(!heap.is_live(tuple_id));
    assert!(!heap.is_live(item_id));
    assert_eq!(heap.allocator_stats().live_blocks, 0);
}

/// Deeply nested tuples are freed without recursion.
#[test]
fn deeply_nested_tuples_are_freed() {
    let mut heap = heap();
    let mut inner = Tuple::new(&mut heap, std::iter::empty()).unwrap();
    for _ in 0..10_000 {
        inner = Tuple::new(&mut heap, [inner]).unwrap();
    }
    heap.release_ref(inner);
    assert_eq!(heap.allocator_stats().live_blocks, 0);
    assert_eq!(heap.heap_stats().objects_by_type.get("tuple"), None);
}

/// Freed slots are reused by later allocations.
#[test]
fn vacant_slots_are_reused() {
    let mut heap = Heap::new(HeapConfig::default().pool(PoolConfig::disabled()));
    let a = Short::new(&mut heap, 5000).unwrap();
    let id = a.id();
    heap.release_ref(a);
    let b = Short::new(&mut heap, 6000).unwrap();
    assert_eq!(b.id(), id);
    heap.release_ref(b);
}

// =============================================================================
// 4. Host allocation
// =============================================================================

/// Built-in types can't be allocated directly, so interning and tuple item
/// ownership can't be bypassed.
#[test]
fn builtin_types_are_not_host_allocatable() {
    let mut heap = heap();
    let expected = RunError::InvalidOperand {
        op: "allocate",
        reason: "not a host-registered type",
    };
    for type_id in [TypeId::NONE, TypeId::BOOL, TypeId::SHORT, TypeId::TUPLE] {
        assert_eq!(heap.allocate(type_id, 5).unwrap_err(), expected);
    }

    let a = heap.make_small_value(5).unwrap();
    let b = Short::new(&mut heap, 5).unwrap();
    assert!(heap.is(&a, &b));
    heap.release_ref(a);
    heap.release_ref(b);
    assert_eq!(heap.allocator_stats().total_allocations, 0);
}

/// A type id registered on another heap is rejected rather than aliasing a slot.
#[test]
fn foreign_type_id_is_rejected() {
    let mut other = heap();
    let foreign = other.register_type(TypeDescriptor::new("cell", 16));
    let mut heap = heap();
    assert_eq!(heap.allocate(foreign, 0).unwrap_err().kind(), ErrorKind::InvalidOperand);

    let local = heap.register_type(TypeDescriptor::new("cell", 16));
    let obj = heap.allocate(local, 42).unwrap();
    assert_eq!(heap.get(&obj).data(), &ObjectData::Opaque(42));
    assert_eq!(heap.type_name(&obj), "cell");
    heap.release_ref(obj);
}
