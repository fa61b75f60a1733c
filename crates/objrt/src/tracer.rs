//! Heap event tracing.
//!
//! The [`HeapTracer`] trait defines hook points at the heap's lifetime events:
//! fresh allocation, pool reuse, pooling, freeing, cache hits, operator
//! dispatch and invariant violations. Every hook defaults to a no-op, so an
//! implementation only overrides what it cares about.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Does nothing (default) |
//! | [`StderrTracer`] | Human-readable event log to stderr |
//! | [`LogTracer`] | Forwards events to the `log` facade |
//! | [`RecordingTracer`] | Captures events for assertions in tests |
//!
//! The heap stores its tracer as `Box<dyn HeapTracer>`:
//!
//! ```
//! use objrt::{Heap, HeapConfig, RecordingTracer};
//!
//! let tracer = RecordingTracer::new();
//! let heap = Heap::new(HeapConfig::default()).with_tracer(Box::new(tracer.clone()));
//! drop(heap);
//! assert!(tracer.events().is_empty());
//! ```

use std::{cell::RefCell, fmt, rc::Rc};

use crate::{error::InvariantError, object::ObjId};

/// Event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A fresh block was taken from the underlying allocator.
    Allocate { id: ObjId, type_name: &'static str, size: usize },
    /// A pooled block was re-initialised as a new object.
    PoolReuse { id: ObjId, type_name: &'static str, size: usize },
    /// A dead object's block was parked in its size-class pool.
    Pool { id: ObjId, size: usize },
    /// A dead object's block was returned to the underlying allocator.
    Free { id: ObjId, size: usize },
    /// An interned singleton was handed out instead of allocating.
    CacheHit { id: ObjId },
    /// A dispatch entry point resolved `op` to a handler on `handler_type`.
    ///
    /// `operand` is the position (0-based) of the operand whose type supplied
    /// the handler.
    Dispatch { op: &'static str, handler_type: &'static str, operand: usize },
    /// Refcount or free-list bookkeeping was found inconsistent.
    InvariantViolation(InvariantError),
}

/// Hooks called by the heap. All default to no-ops.
pub trait HeapTracer: fmt::Debug {
    /// Called after a fresh block has been allocated for `id`.
    #[inline]
    fn on_allocate(&mut self, _id: ObjId, _type_name: &'static str, _size: usize) {}

    /// Called after a pooled block has been reused for `id`.
    #[inline]
    fn on_pool_reuse(&mut self, _id: ObjId, _type_name: &'static str, _size: usize) {}

    /// Called after the block of dead object `id` was parked in a pool.
    #[inline]
    fn on_pool(&mut self, _id: ObjId, _size: usize) {}

    /// Called after the block of dead object `id` was returned to the allocator.
    #[inline]
    fn on_free(&mut self, _id: ObjId, _size: usize) {}

    /// Called when the small-object cache satisfies a request.
    #[inline]
    fn on_cache_hit(&mut self, _id: ObjId) {}

    /// Called when a dispatch entry point has picked its handler.
    ///
    /// # Arguments
    /// * `op` - Operator symbol, e.g. `"+"`
    /// * `handler_type` - Name of the type whose capability table supplied the handler
    /// * `operand` - Position of that operand in the call
    #[inline]
    fn on_dispatch(&mut self, _op: &'static str, _handler_type: &'static str, _operand: usize) {}

    /// Called when an unchecked release hits a bookkeeping inconsistency.
    #[inline]
    fn on_invariant_violation(&mut self, _error: &InvariantError) {}
}

// ============================================================================
// NoopTracer
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl HeapTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Tracer that prints a human-readable event log to stderr.
///
/// Output format:
/// ```text
///   +++ ALLOC   #260 short     16 bytes
///   ... CALL    +  on short (operand 0)
///   --- POOL    #260           16 bytes
///   +++ REUSE   #260 short     16 bytes
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Whether cache hits are logged; they dominate the output for small values.
    show_cache_hits: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also logs every small-object cache hit.
    #[must_use]
    pub fn with_cache_hits(mut self) -> Self {
        self.show_cache_hits = true;
        self
    }
}

impl HeapTracer for StderrTracer {
    fn on_allocate(&mut self, id: ObjId, type_name: &'static str, size: usize) {
        eprintln!("  +++ ALLOC   {id:<5} {type_name:<9} {size} bytes");
    }

    fn on_pool_reuse(&mut self, id: ObjId, type_name: &'static str, size: usize) {
        eprintln!("  +++ REUSE   {id:<5} {type_name:<9} {size} bytes");
    }

    fn on_pool(&mut self, id: ObjId, size: usize) {
        eprintln!("  --- POOL    {id:<5} {:<9} {size} bytes", "");
    }

    fn on_free(&mut self, id: ObjId, size: usize) {
        eprintln!("  --- FREE    {id:<5} {:<9} {size} bytes", "");
    }

    fn on_cache_hit(&mut self, id: ObjId) {
        if self.show_cache_hits {
            eprintln!("  ... CACHE   {id}");
        }
    }

    fn on_dispatch(&mut self, op: &'static str, handler_type: &'static str, operand: usize) {
        eprintln!("  ... CALL    {op:<2} on {handler_type} (operand {operand})");
    }

    fn on_invariant_violation(&mut self, error: &InvariantError) {
        eprintln!("  !!! INVARIANT {error}");
    }
}

// ============================================================================
// LogTracer
// ============================================================================

/// Tracer that forwards events to the [`log`] facade.
///
/// Block traffic is logged at `trace`, dispatch at `debug` and invariant
/// violations at `error`, all under the `objrt::heap` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTracer;

const LOG_TARGET: &str = "objrt::heap";

impl HeapTracer for LogTracer {
    fn on_allocate(&mut self, id: ObjId, type_name: &'static str, size: usize) {
        log::trace!(target: LOG_TARGET, "allocate {id} {type_name} ({size} bytes)");
    }

    fn on_pool_reuse(&mut self, id: ObjId, type_name: &'static str, size: usize) {
        log::trace!(target: LOG_TARGET, "reuse pooled {id} as {type_name} ({size} bytes)");
    }

    fn on_pool(&mut self, id: ObjId, size: usize) {
        log::trace!(target: LOG_TARGET, "pool {id} ({size} bytes)");
    }

    fn on_free(&mut self, id: ObjId, size: usize) {
        log::trace!(target: LOG_TARGET, "free {id} ({size} bytes)");
    }

    fn on_cache_hit(&mut self, id: ObjId) {
        log::trace!(target: LOG_TARGET, "cache hit {id}");
    }

    fn on_dispatch(&mut self, op: &'static str, handler_type: &'static str, operand: usize) {
        log::debug!(target: LOG_TARGET, "dispatch {op} to {handler_type} (operand {operand})");
    }

    fn on_invariant_violation(&mut self, error: &InvariantError) {
        log::error!(target: LOG_TARGET, "invariant violation: {error}");
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Tracer that records every event into a shared buffer.
///
/// Clones share the buffer, so a test can keep one handle and give the other
/// to the heap.
#[derive(Debug, Clone, Default)]
pub struct RecordingTracer {
    events: Rc<RefCell<Vec<TraceEvent>>>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the events recorded so far.
    #[must_use]
    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.borrow().clone()
    }

    /// Discards recorded events.
    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    fn record(&self, event: TraceEvent) {
        self.events.borrow_mut().push(event);
    }
}

impl HeapTracer for RecordingTracer {
    fn on_allocate(&mut self, id: ObjId, type_name: &'static str, size: usize) {
        self.record(TraceEvent::Allocate { id, type_name, size });
    }

    fn on_pool_reuse(&mut self, id: ObjId, type_name: &'static str, size: usize) {
        self.record(TraceEvent::PoolReuse { id, type_name, size });
    }

    fn on_pool(&mut self, id: ObjId, size: usize) {
        self.record(TraceEvent::Pool { id, size });
    }

    fn on_free(&mut self, id: ObjId, size: usize) {
        self.record(TraceEvent::Free { id, size });
    }

    fn on_cache_hit(&mut self, id: ObjId) {
        self.record(TraceEvent::CacheHit { id });
    }

    fn on_dispatch(&mut self, op: &'static str, handler_type: &'static str, operand: usize) {
        self.record(TraceEvent::Dispatch {
            op,
            handler_type,
            operand,
        });
    }

    fn on_invariant_violation(&mut self, error: &InvariantError) {
        self.record(TraceEvent::InvariantViolation(error.clone()));
    }
}
