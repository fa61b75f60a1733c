#![doc = include_str!("../../../README.md")]
// first to include defer_drop macro
mod heap;

mod alloc;
mod cache;
mod config;
mod dispatch;
mod error;
mod object;
mod pool;
mod resource;
mod stats;
pub mod tracer;
mod type_object;
pub mod types;

pub use crate::{
    alloc::AllocatorStats,
    config::{DEFAULT_SMALL_INT_RANGE, HeapConfig, MAX_SMALL_INT_CACHE},
    dispatch::{BinaryOp, CompareOp, TernaryOp, UnaryOp},
    error::{ErrorKind, InvariantError, RunError, RunResult},
    heap::{ContainsHeap, DropWithHeap, Heap, HeapGuard},
    object::{HeapObject, ObjId, ObjRef, ObjectData},
    pool::PoolConfig,
    resource::{
        DEFAULT_MAX_RECURSION_DEPTH, LimitedTracker, NoLimitTracker, ResourceError, ResourceLimits, ResourceTracker,
    },
    stats::{HeapDiff, HeapStats},
    tracer::{HeapTracer, LogTracer, NoopTracer, RecordingTracer, StderrTracer, TraceEvent},
    type_object::{
        BinaryFunc, CompareFunc, InquiryFunc, LenFunc, MappingMethods, NumberMethods, SequenceMethods, TernaryFunc,
        TypeDescriptor, TypeId, UnaryFunc,
    },
};
