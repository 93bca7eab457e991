use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use trellis_core::graph::Graph;
use trellis_core::reactive::{Memo, Runtime, Signal};

const CHAIN_LENGTHS: [usize; 3] = [10, 100, 1000];
const FAN_WIDTHS: [usize; 3] = [4, 32, 256];

/// source -> m1 -> m2 -> ... -> mN, read lazily from the end.
fn bench_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation.chain");

    for length in CHAIN_LENGTHS {
        let graph = Graph::new();
        let source = Signal::new(&graph, 0_u64);
        let mut tail = Memo::new(&graph, move |g| source.get(g));
        for _ in 1..length {
            let prev = tail;
            tail = Memo::new(&graph, move |g| Ok(prev.get(g)? + 1));
        }

        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("write_then_read", length), &length, |b, _| {
            b.iter(|| {
                next += 1;
                source.set(&graph, next).unwrap();
                black_box(tail.get(&graph).unwrap())
            })
        });

        group.bench_with_input(BenchmarkId::new("read_clean", length), &length, |b, _| {
            b.iter(|| black_box(tail.get(&graph).unwrap()))
        });
    }

    group.finish();
}

/// source fans out to N memos joined by one memo, observed by an effect.
fn bench_diamond(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation.diamond");

    for width in FAN_WIDTHS {
        let rt = Runtime::new();
        let graph = rt.graph();
        let source = Signal::new(graph, 0_u64);
        let branches: Vec<Memo<u64>> = (0..width as u64)
            .map(|offset| Memo::new(graph, move |g| Ok(source.get(g)? + offset)))
            .collect();
        let join = Memo::new(graph, move |g| {
            branches.iter().try_fold(0_u64, |acc, branch| Ok(acc + branch.get(g)?))
        });
        rt.effect(move |g, _| {
            black_box(join.get(g)?);
            Ok(())
        });
        rt.flush().unwrap();

        let mut next = 0_u64;
        group.bench_with_input(BenchmarkId::new("write_then_flush", width), &width, |b, _| {
            b.iter(|| {
                next += 1;
                source.set(graph, next).unwrap();
                black_box(rt.flush().unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_chain, bench_diamond);
criterion_main!(benches);
