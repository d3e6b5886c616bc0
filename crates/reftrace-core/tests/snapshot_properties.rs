//! Snapshots must never change what replay reconstructs

use proptest::prelude::*;
use reftrace_core::{
    get_state_at, CheckpointRecorder, HeapState, ObjId, ObjKind, Primitive, ReplayCursor,
    TraceConfig, TraceLog, TraceRuntime, ValueRef,
};

const KEYS: [&str; 4] = ["a", "b", "c", "d"];
const ROOTS: [&str; 3] = ["x", "y", "z"];

#[derive(Debug, Clone)]
enum Op {
    Alloc(bool),
    WritePrim(usize, usize, i32),
    Link(usize, usize, usize),
    Delete(usize, usize),
    RootObj(usize, usize),
    RootPrim(usize, i32),
    RootDel(usize),
    Step,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Alloc),
        (0..8usize, 0..KEYS.len(), any::<i32>()).prop_map(|(o, k, v)| Op::WritePrim(o, k, v)),
        (0..8usize, 0..KEYS.len(), 0..8usize).prop_map(|(o, k, t)| Op::Link(o, k, t)),
        (0..8usize, 0..KEYS.len()).prop_map(|(o, k)| Op::Delete(o, k)),
        (0..ROOTS.len(), 0..8usize).prop_map(|(r, o)| Op::RootObj(r, o)),
        (0..ROOTS.len(), any::<i32>()).prop_map(|(r, v)| Op::RootPrim(r, v)),
        (0..ROOTS.len()).prop_map(Op::RootDel),
        Just(Op::Step),
        Just(Op::Step),
    ]
}

/// Drive a recorder directly, returning the trace and the live state
/// observed at the end of every step
fn record(ops: &[Op], interval: u64) -> (TraceLog, Vec<HeapState>) {
    let mut recorder = CheckpointRecorder::new(interval);
    let mut objects: Vec<ObjId> = Vec::new();
    let mut expected = Vec::new();
    let mut identity = 0;
    let pick = |objects: &[ObjId], i: usize| objects.get(i % objects.len().max(1)).copied();

    for (index, op) in ops.iter().enumerate() {
        let checkpoint = format!("L{}:1", index + 1);
        let checkpoint = Some(checkpoint.as_str());
        match *op {
            Op::Alloc(array) => {
                identity += 1;
                let kind = if array { ObjKind::Array } else { ObjKind::Object };
                objects.push(recorder.ensure_obj_id(identity, kind, None));
            }
            Op::WritePrim(o, k, v) => {
                if let Some(id) = pick(&objects, o) {
                    let value = ValueRef::prim(Primitive::Number(f64::from(v)));
                    recorder.write(id, KEYS[k], value, checkpoint);
                }
            }
            Op::Link(o, k, t) => {
                if let (Some(id), Some(target)) = (pick(&objects, o), pick(&objects, t)) {
                    recorder.write(id, KEYS[k], ValueRef::obj(target), checkpoint);
                }
            }
            Op::Delete(o, k) => {
                if let Some(id) = pick(&objects, o) {
                    if recorder.state().object(id).is_some_and(|obj| obj.props.contains_key(KEYS[k])) {
                        recorder.del(id, KEYS[k], checkpoint);
                    }
                }
            }
            Op::RootObj(r, o) => {
                if let Some(id) = pick(&objects, o) {
                    recorder.root_set(ROOTS[r], ValueRef::obj(id), checkpoint);
                }
            }
            Op::RootPrim(r, v) => {
                let value = ValueRef::prim(Primitive::Number(f64::from(v)));
                recorder.root_set(ROOTS[r], value, checkpoint);
            }
            Op::RootDel(r) => recorder.root_del(ROOTS[r], checkpoint),
            Op::Step => {
                expected.push(recorder.state().clone());
                recorder.checkpoint_step(checkpoint);
            }
        }
    }
    let final_state = recorder.state().clone();
    let trace = recorder.finish();
    if trace.steps.len() > expected.len() {
        expected.push(final_state);
    }
    (trace, expected)
}

proptest! {
    #[test]
    fn replay_matches_live_state(ops in prop::collection::vec(op(), 1..120), interval in 1u64..9) {
        let (trace, expected) = record(&ops, interval);
        prop_assert_eq!(trace.steps.len(), expected.len());
        prop_assert_eq!(trace.skipped, 0);
        for (step, state) in expected.iter().enumerate() {
            prop_assert_eq!(&get_state_at(&trace, step as u64), state);
        }
    }

    #[test]
    fn snapshot_interval_is_invisible(ops in prop::collection::vec(op(), 1..120), interval in 1u64..9) {
        let (dense, _) = record(&ops, interval);
        let (sparse, _) = record(&ops, u64::MAX);
        prop_assert_eq!(&dense.events, &sparse.events);
        prop_assert_eq!(sparse.snapshots.len(), 1);
        for step in 0..dense.steps.len() as u64 {
            prop_assert_eq!(get_state_at(&dense, step), get_state_at(&sparse, step));
        }
    }

    #[test]
    fn cursor_agrees_with_random_access(ops in prop::collection::vec(op(), 1..80)) {
        let (trace, _) = record(&ops, 3);
        for (meta, state) in ReplayCursor::new(&trace) {
            prop_assert_eq!(state, get_state_at(&trace, meta.step_id));
        }
    }
}

fn program(rounds: u32, seed: u32) -> String {
    format!(
        r#"
const log = [];
const cache = {{ hits: 0 }};
function visit(n) {{
  const node = {{ n, seen: n % 3 === 0 }};
  if (node.seen) {{ cache.hits += 1; delete node.n; }}
  log.push(node);
  return node;
}}
for (let i = 0; i < {rounds}; i++) {{
  const last = visit(i + {seed});
  if (log.length > 4) {{ log.shift(); }}
  cache.last = last;
}}
log.length
"#
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn traced_programs_replay_the_same_at_any_interval(rounds in 0u32..12, seed in 0u32..5, interval in 1u64..6) {
        let source = program(rounds, seed);
        let dense = TraceRuntime::new(TraceConfig { snapshot_interval: interval, ..TraceConfig::default() })
            .trace_source(&source)
            .unwrap();
        let sparse = TraceRuntime::new(TraceConfig { snapshot_interval: 100_000, ..TraceConfig::default() })
            .trace_source(&source)
            .unwrap();
        prop_assert_eq!(dense.error, None);
        prop_assert_eq!(&dense.trace.events, &sparse.trace.events);
        prop_assert_eq!(dense.trace.skipped, 0);
        for step in 0..dense.trace.steps.len() as u64 {
            prop_assert_eq!(get_state_at(&dense.trace, step), get_state_at(&sparse.trace, step));
        }
    }
}
