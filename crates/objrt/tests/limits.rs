//! Tests for allocation budgets enforced through `ResourceLimits`.

use objrt::{
    BinaryOp, Heap, HeapConfig, LimitedTracker, PoolConfig, ResourceError, ResourceLimits, RunError,
    types::{Short, Tuple},
};
use pretty_assertions::assert_eq;

fn limited(limits: ResourceLimits) -> Heap {
    Heap::new(HeapConfig::default().limits(limits).pool(PoolConfig::disabled()))
}

// =============================================================================
// 1. Refused allocations
// =============================================================================

#[test]
fn allocation_limit_refuses_fresh_blocks() {
    let mut heap = limited(ResourceLimits::new().max_allocations(2));
    let a = Short::new(&mut heap, 1000).unwrap();
    let b = Short::new(&mut heap, 2000).unwrap();
    let err = Short::new(&mut heap, 3000).unwrap_err();
    assert_eq!(err, RunError::Resource(ResourceError::Allocation { limit: 2, count: 3 }));
    assert_eq!(err.to_string(), "allocation limit exceeded: 3 > 2");
    heap.release_ref(a);
    heap.release_ref(b);
}

/// A handler whose result allocation fails still releases its operands.
#[test]
fn failed_dispatch_releases_operands() {
    let mut heap = limited(ResourceLimits::new().max_allocations(2));
    let a = Short::new(&mut heap, 1000).unwrap();
    let b = Short::new(&mut heap, 2000).unwrap();
    let err = heap.binary(BinaryOp::Add, a, b).unwrap_err();
    assert!(matches!(err, RunError::Resource(ResourceError::Allocation { .. })));
    assert_eq!(heap.allocator_stats().live_blocks, 0);
    assert_eq!(heap.heap_stats().tracker_allocations, Some(0));
}

/// A tuple that can't be allocated releases the items it was given.
#[test]
fn failed_tuple_releases_items() {
    let mut heap = limited(ResourceLimits::new().max_allocations(2));
    let x = Short::new(&mut heap, 1000).unwrap();
    let y = Short::new(&mut heap, 2000).unwrap();
    let (x_id, y_id) = (x.id(), y.id());
    assert!(Tuple::new(&mut heap, [x, y]).is_err());
    assert!(!heap.is_live(x_id));
    assert!(!heap.is_live(y_id));
}

#[test]
fn memory_limit_counts_block_sizes() {
    let mut heap = limited(ResourceLimits::new().max_memory(40));
    let a = Short::new(&mut heap, 1000).unwrap();
    let b = Short::new(&mut heap, 2000).unwrap();
    let err = Short::new(&mut heap, 3000).unwrap_err();
    assert_eq!(err, RunError::Resource(ResourceError::Memory { limit: 40, used: 48 }));
    assert_eq!(heap.heap_stats().tracker_memory_bytes, Some(32));
    heap.release_ref(a);
    heap.release_ref(b);
    assert_eq!(heap.heap_stats().tracker_memory_bytes, Some(0));
}

// =============================================================================
// 2. What is not charged
// =============================================================================

/// Interned values never reach the underlying allocator.
#[test]
fn cached_values_are_free() {
    let mut heap = limited(ResourceLimits::new().max_allocations(0));
    let values: Vec<_> = (0..256).map(|v| Short::new(&mut heap, v).unwrap()).collect();
    let none = heap.none();
    assert!(Short::new(&mut heap, 256).is_err());
    for value in values {
        heap.release_ref(value);
    }
    heap.release_ref(none);
}

/// Reusing a pooled block is not charged again.
#[test]
fn pool_reuse_is_not_charged() {
    let limits = ResourceLimits::new().max_allocations(1);
    let mut heap = Heap::new(HeapConfig::default().limits(limits));
    for value in 1000..1100 {
        let obj = Short::new(&mut heap, value).unwrap();
        heap.release_ref(obj);
    }
    assert_eq!(heap.heap_stats().tracker_allocations, Some(1));
}

/// A tracker can be supplied directly instead of through the config.
#[test]
fn explicit_tracker() {
    let tracker = LimitedTracker::new(ResourceLimits::new().max_allocations(1));
    let mut heap = Heap::new(HeapConfig::default()).with_tracker(Box::new(tracker));
    let a = Short::new(&mut heap, 1000).unwrap();
    assert!(Short::new(&mut heap, 2000).is_err());
    heap.release_ref(a);
}
