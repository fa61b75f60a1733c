//! Tests for heap event tracing.

use objrt::{
    BinaryOp, Heap, HeapConfig, HeapTracer, LogTracer, NumberMethods, ObjRef, PoolConfig, RecordingTracer, RunResult,
    StderrTracer, TraceEvent, TypeDescriptor,
    types::{Short, fib},
};
use pretty_assertions::assert_eq;

fn recorded(config: HeapConfig) -> (Heap, RecordingTracer) {
    let tracer = RecordingTracer::new();
    let heap = Heap::new(config).with_tracer(Box::new(tracer.clone()));
    (heap, tracer)
}

#[test]
fn allocation_pool_and_reuse_events() {
    let (mut heap, tracer) = recorded(HeapConfig::default());
    let a = Short::new(&mut heap, 1000).unwrap();
    let id = a.id();
    heap.release_ref(a);
    let b = Short::new(&mut heap, 2000).unwrap();
    heap.release_ref(b);

    assert_eq!(
        tracer.events(),
        vec![
            TraceEvent::Allocate {
                id,
                type_name: "short",
                size: 16
            },
            TraceEvent::Pool { id, size: 16 },
            TraceEvent::PoolReuse {
                id,
                type_name: "short",
                size: 16
            },
            TraceEvent::Pool { id, size: 16 },
        ]
    );
}

#[test]
fn free_and_cache_hit_events() {
    let (mut heap, tracer) = recorded(HeapConfig::default().pool(PoolConfig::disabled()));
    let small = Short::new(&mut heap, 3).unwrap();
    let small_id = small.id();
    heap.release_ref(small);
    let big = Short::new(&mut heap, 3000).unwrap();
    let big_id = big.id();
    heap.release_ref(big);

    assert_eq!(
        tracer.events(),
        vec![
            TraceEvent::CacheHit { id: small_id },
            TraceEvent::Allocate {
                id: big_id,
                type_name: "short",
                size: 16
            },
            TraceEvent::Free { id: big_id, size: 16 },
        ]
    );
}

fn keep_left(heap: &mut Heap, a: ObjRef, b: ObjRef) -> RunResult<ObjRef> {
    heap.release_ref(b);
    Ok(a)
}

static KEEP_LEFT_NUMBER: NumberMethods = NumberMethods {
    add: Some(keep_left),
    ..NumberMethods::EMPTY
};

/// Dispatch events name the type and operand position that supplied the handler.
#[test]
fn dispatch_event_reports_fallback_operand() {
    let (mut heap, tracer) = recorded(HeapConfig::default());
    let plain = heap.register_type(TypeDescriptor::new("plain", 16));
    let right = heap.register_type(TypeDescriptor {
        number: Some(&KEEP_LEFT_NUMBER),
        ..TypeDescriptor::new("right", 16)
    });
    let x = heap.allocate(plain, 1).unwrap();
    let y = heap.allocate(right, 2).unwrap();
    tracer.clear();

    let result = heap.binary(BinaryOp::Add, x, y).unwrap();
    assert_eq!(
        tracer.events().first(),
        Some(&TraceEvent::Dispatch {
            op: "+",
            handler_type: "right",
            operand: 1
        })
    );
    heap.release_ref(result);

    tracer.clear();
    let (one, two) = (Short::new(&mut heap, 1).unwrap(), Short::new(&mut heap, 2).unwrap());
    let three = heap.binary(BinaryOp::Add, one, two).unwrap();
    heap.release_ref(three);
    assert!(tracer.events().contains(&TraceEvent::Dispatch {
        op: "+",
        handler_type: "short",
        operand: 0
    }));
}

/// The logging tracers accept every event without a subscriber installed.
#[test]
fn log_and_stderr_tracers_run_fib() {
    let tracers: [Box<dyn HeapTracer>; 2] = [Box::new(LogTracer), Box::new(StderrTracer::new().with_cache_hits())];
    for tracer in tracers {
        let mut heap = Heap::new(HeapConfig::default()).with_tracer(tracer);
        let n = Short::new(&mut heap, 8).unwrap();
        let result = fib(&mut heap, n).unwrap();
        assert_eq!(Short::value_of(&heap, &result), Ok(34));
        heap.release_ref(result);
    }
}
