use criterion::{Bencher, Criterion, black_box, criterion_group, criterion_main};
use objrt::{Heap, HeapConfig, PoolConfig, types::{Short, fib}};

/// Computes `fib(n)` on a warm heap and releases the result each iteration.
fn run_fib(bench: &mut Bencher, config: HeapConfig, n: i32, expected: i32) {
    let mut heap = Heap::new(config);
    bench.iter(|| {
        let arg = Short::new(&mut heap, black_box(n)).unwrap();
        let result = fib(&mut heap, arg).unwrap();
        let value = Short::value_of(&heap, &result).unwrap();
        assert_eq!(value, expected);
        heap.release_ref(result);
        black_box(value);
    });
}

fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("fib_20__pooled", |b| run_fib(b, HeapConfig::default(), 20, 10946));
    c.bench_function("fib_20__unpooled", |b| {
        run_fib(b, HeapConfig::default().pool(PoolConfig::disabled()), 20, 10946);
    });
    c.bench_function("fib_20__no_small_ints", |b| {
        run_fib(b, HeapConfig::default().small_int_range(0..0), 20, 10946);
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
