use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use reftrace_core::{get_state_at, Instrumenter, ReplayCursor, TraceConfig, TraceRun, TraceRuntime};

const WORKLOAD: &str = r#"
const nodes = [];
const index = {};
for (let i = 0; i < 400; i++) {
  const node = { id: i, next: null, tags: [] };
  if (nodes.length > 0) { nodes[nodes.length - 1].next = node; }
  node.tags.push(i % 7);
  index["n" + i] = node;
  nodes.push(node);
  if (i % 5 === 0) { delete index["n" + (i - 1)]; }
}
nodes.length
"#;

fn record(snapshot_interval: u64) -> TraceRun {
    TraceRuntime::new(TraceConfig {
        snapshot_interval,
        ..TraceConfig::default()
    })
    .trace_source(WORKLOAD)
    .unwrap()
}

fn bench_instrument(c: &mut Criterion) {
    let instrumenter = Instrumenter::new();
    c.bench_function("instrument", |b| {
        b.iter(|| instrumenter.instrument(black_box(WORKLOAD)).unwrap())
    });
}

fn bench_trace(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace");
    group.sample_size(20);
    let runtime = TraceRuntime::default();
    group.bench_function("traced", |b| {
        b.iter(|| runtime.trace_source(black_box(WORKLOAD)).unwrap())
    });
    group.bench_function("plain", |b| {
        b.iter(|| runtime.run_plain(black_box(WORKLOAD)).unwrap())
    });
    group.finish();
}

// Receiver sync on a growing array should stay linear per call
fn bench_array_growth(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_push");
    group.sample_size(10);
    let runtime = TraceRuntime::default();
    for n in [1_000u64, 2_000, 4_000] {
        let source = format!("const a = [];\nfor (let i = 0; i < {n}; i++) {{ a.push(i); }}\na.length");
        group.bench_with_input(BenchmarkId::new("traced", n), &source, |b, source| {
            b.iter(|| runtime.trace_source(black_box(source)).unwrap())
        });
    }
    group.finish();
}

// Random access cost is bounded by the distance to the previous snapshot
fn bench_random_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_state_at");
    for interval in [1u64, 10, 50, 250, 1_000_000] {
        let run = record(interval);
        let last = run.trace.last_step().unwrap_or(0);
        let targets: Vec<u64> = (0..16).map(|i| last * i / 15).collect();
        group.bench_with_input(BenchmarkId::new("interval", interval), &run, |b, run| {
            b.iter(|| {
                for step in &targets {
                    black_box(get_state_at(&run.trace, *step));
                }
            })
        });
    }
    group.finish();
}

fn bench_sequential(c: &mut Criterion) {
    let run = record(50);
    c.bench_function("cursor_full_walk", |b| {
        b.iter(|| ReplayCursor::new(&run.trace).count())
    });
}

criterion_group!(
    benches,
    bench_instrument,
    bench_trace,
    bench_array_growth,
    bench_random_access,
    bench_sequential
);
criterion_main!(benches);
