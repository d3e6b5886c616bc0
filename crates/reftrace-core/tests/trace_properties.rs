//! End-to-end properties of recorded traces

use pretty_assertions::assert_eq;
use reftrace_core::{
    get_state_at, trace::CallKind, DeltaEvent, HeapState, InstrumentError, ObjId, ObjKind,
    Primitive, ReftraceError, TraceConfig, TraceRun, TraceRuntime, ValueRef,
};
use std::time::Duration;

fn trace(source: &str) -> TraceRun {
    TraceRuntime::default().trace_source(source).unwrap()
}

fn final_state(run: &TraceRun) -> HeapState {
    get_state_at(&run.trace, run.trace.last_step().unwrap())
}

fn num(n: f64) -> ValueRef {
    ValueRef::prim(Primitive::Number(n))
}

fn root_obj(state: &HeapState, name: &str) -> ObjId {
    state
        .root(name)
        .and_then(ValueRef::as_obj)
        .unwrap_or_else(|| panic!("root {name} is not an object: {:?}", state.root(name)))
}

#[test]
fn test_end_to_end_heap_state() {
    let run = trace("const x = 1;\nconst y = { a: x };\ny.a = 2;");
    assert_eq!(run.error, None);
    let state = final_state(&run);

    assert_eq!(state.root("x"), Some(&num(1.0)));
    let y = root_obj(&state, "y");
    let object = state.object(y).unwrap();
    assert_eq!(object.obj_kind, ObjKind::Object);
    assert_eq!(object.props.len(), 1);
    assert_eq!(object.props.get("a"), Some(&num(2.0)));

    let stamp = state.last_write.get(&format!("{y}:a")).unwrap();
    assert_eq!(stamp.checkpoint_id.as_deref(), Some("L3:1"));
    assert_eq!(Some(stamp.step_id), run.trace.last_step());
}

#[test]
fn test_identity_is_preserved_across_aliases() {
    let run = trace("const a = {};\nconst b = a;\nb.x = 1;");
    let state = final_state(&run);
    assert_eq!(root_obj(&state, "a"), root_obj(&state, "b"));

    let writes = run
        .trace
        .events
        .iter()
        .filter(|e| matches!(e, DeltaEvent::Write { .. }))
        .count();
    assert_eq!(writes, 1);
    let allocs = run
        .trace
        .events
        .iter()
        .filter(|e| matches!(e, DeltaEvent::Alloc { .. }))
        .count();
    assert_eq!(allocs, 1);
}

#[test]
fn test_literal_fields_follow_alloc_in_order() {
    let run = trace("const o = { a: 1, b: 2 };");
    let kinds: Vec<String> = run
        .trace
        .events
        .iter()
        .map(|e| match e {
            DeltaEvent::Alloc { .. } => "alloc".to_string(),
            DeltaEvent::Write { key, .. } => format!("write {key}"),
            DeltaEvent::RootSet { name, .. } => format!("root {name}"),
            other => format!("{other}"),
        })
        .collect();
    assert_eq!(kinds, vec!["alloc", "write a", "write b", "root o"]);
}

#[test]
fn test_literal_initializer_effects_interleave_with_field_writes() {
    let source = r#"
const log = [];
function s1() { log.push("s1"); return 1; }
function s2() { log.push("s2"); return 2; }
const o = { a: s1(), b: s2() };
"#;
    let run = trace(source);
    let state = final_state(&run);
    let o = root_obj(&state, "o");
    let log = root_obj(&state, "log");

    let position = |wanted: &dyn Fn(&DeltaEvent) -> bool| {
        run.trace
            .events
            .iter()
            .position(|e| wanted(e))
            .unwrap_or_else(|| panic!("missing event in {:?}", run.trace.events))
    };
    let write_of = |target: ObjId, field: &'static str| {
        move |e: &DeltaEvent| matches!(e, DeltaEvent::Write { target: t, key, .. } if *t == target && key == field)
    };
    let order = [
        position(&|e| matches!(e, DeltaEvent::Alloc { id, .. } if *id == o)),
        position(&write_of(log, "0")),
        position(&write_of(o, "a")),
        position(&write_of(log, "1")),
        position(&write_of(o, "b")),
        position(&|e| matches!(e, DeltaEvent::RootSet { name, .. } if name == "o")),
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]), "{order:?}");
}

#[test]
fn test_array_sync_tracks_shrinking_and_same_value() {
    let source = r#"
const a = [1, 2, 3];
a.push(NaN);
a.push(NaN);
a.pop();
a.splice(0, 1);
a[0] = -0;
a.length = 2;
a.tag = "t";
a.reverse();
"#;
    let run = trace(source);
    assert_eq!(run.error, None);
    let state = final_state(&run);
    let a = state.object(root_obj(&state, "a")).unwrap();

    let mut fields: Vec<(&str, &ValueRef)> = a.props.iter().map(|(k, v)| (k.as_str(), v)).collect();
    fields.sort_by_key(|(k, _)| *k);
    let minus_zero = num(-0.0);
    let tag = ValueRef::prim(Primitive::String("t".to_string()));
    assert_eq!(fields, vec![("0", &num(3.0)), ("1", &minus_zero), ("tag", &tag)]);

    // Re-pushing an equal NaN is not a change
    let nan_writes = run
        .trace
        .events
        .iter()
        .filter(|e| matches!(e, DeltaEvent::Write { key, value, .. } if key == "3" && *value == num(f64::NAN)))
        .count();
    assert_eq!(nan_writes, 1);
}

#[test]
fn test_growing_array_traces_within_default_timeout() {
    let run = TraceRuntime::default()
        .trace_source("const a = [];\nfor (let i = 0; i < 2000; i++) { a.push(i); }\na.length")
        .unwrap();
    assert_eq!(run.completion.as_deref(), Some("2000"));
    let state = final_state(&run);
    let a = state.object(root_obj(&state, "a")).unwrap();
    assert_eq!(a.props.len(), 2000);
    assert_eq!(a.props.get("1999"), Some(&num(1999.0)));

    let element_writes = run
        .trace
        .events
        .iter()
        .filter(|e| matches!(e, DeltaEvent::Write { .. }))
        .count();
    assert_eq!(element_writes, 2000);
}

#[test]
fn test_alloc_precedes_every_reference() {
    let source = r#"
class Node { constructor(v) { this.v = v; this.next = null; } }
const head = new Node(1);
head.next = new Node(2);
head.next.next = { tail: [1, 2, { deep: true }] };
const copy = Object.assign({}, head);
delete copy.v;
copy
"#;
    let run = trace(source);
    let mut allocated = std::collections::HashSet::new();
    for event in &run.trace.events {
        let referenced = match event {
            DeltaEvent::Alloc { id, .. } => {
                allocated.insert(*id);
                None
            }
            DeltaEvent::Write { value, .. } | DeltaEvent::RootSet { value, .. } => value.as_obj(),
            _ => None,
        };
        if let Some(target) = event.target() {
            assert!(allocated.contains(&target), "{event} before alloc");
        }
        if let Some(id) = referenced {
            assert!(allocated.contains(&id), "{event} references {id} before alloc");
        }
    }
    assert_eq!(run.trace.skipped, 0);
}

#[test]
fn test_steps_partition_the_event_log() {
    let source = r#"
const items = [];
for (let i = 0; i < 5; i++) { items.push({ i }); }
function drop(list) { const last = list.pop(); return last; }
const gone = drop(items);
items.length
"#;
    let run = trace(source);
    let mut next = 0;
    for (index, step) in run.trace.steps.iter().enumerate() {
        assert_eq!(step.step_id, index as u64);
        assert_eq!(step.delta_from, next);
        assert!(step.delta_to >= step.delta_from);
        next = step.delta_to;
    }
    assert_eq!(next, run.trace.events.len());
    assert_eq!(run.completion.as_deref(), Some("4"));
}

#[test]
fn test_replay_is_idempotent() {
    let run = trace("const a = { n: 0 };\nfor (let i = 0; i < 4; i++) { a.n += i; }\na.n");
    for step in 0..=run.trace.last_step().unwrap() {
        assert_eq!(get_state_at(&run.trace, step), get_state_at(&run.trace, step));
    }
    assert_eq!(run.completion.as_deref(), Some("6"));
}

#[test]
fn test_function_locals_leave_roots_on_exit() {
    let run = trace("function f() { const t = 1; }\nf();");
    let state = final_state(&run);
    assert!(state.root("t").is_none());
    assert!(state.root("f").is_some());
    assert!(run
        .trace
        .steps
        .iter()
        .any(|s| s.live_root_names.iter().any(|n| n == "t")));

    let calls: Vec<(CallKind, &str)> = run
        .trace
        .call_events
        .iter()
        .map(|c| (c.kind, c.fn_name.as_str()))
        .collect();
    assert_eq!(calls, vec![(CallKind::Enter, "f"), (CallKind::Exit, "f")]);
}

#[test]
fn test_method_calls_sync_receivers() {
    let run = trace("const arr = [];\narr.push({ v: 1 });\nconst t = {};\nObject.assign(t, { a: 'x' });");
    let state = final_state(&run);

    let arr = state.object(root_obj(&state, "arr")).unwrap();
    assert_eq!(arr.obj_kind, ObjKind::Array);
    let element = arr.props.get("0").and_then(ValueRef::as_obj).unwrap();
    assert_eq!(state.object(element).unwrap().props.get("v"), Some(&num(1.0)));

    let t = state.object(root_obj(&state, "t")).unwrap();
    assert_eq!(
        t.props.get("a"),
        Some(&ValueRef::prim(Primitive::String("x".to_string())))
    );
}

#[test]
fn test_class_instances_carry_class_name() {
    let run = trace("class P { constructor(x) { this.x = x; } }\nconst p = new P(3);");
    let state = final_state(&run);
    let p = state.object(root_obj(&state, "p")).unwrap();
    assert_eq!(p.class_name.as_deref(), Some("P"));
    assert_eq!(p.props.get("x"), Some(&num(3.0)));
    let constructor = state.object(root_obj(&state, "P")).unwrap();
    assert_eq!(constructor.obj_kind, ObjKind::Class);
}

#[test]
fn test_exception_keeps_partial_trace() {
    let run = trace("const a = {};\na.x = 1;\nnull.y;\na.x = 2;");
    let error = run.error.as_ref().unwrap();
    assert_eq!(error.name, "TypeError");
    assert_eq!(error.message, "Cannot read properties of null (reading 'y')");
    assert_eq!(run.completion, None);

    let state = final_state(&run);
    let a = state.object(root_obj(&state, "a")).unwrap();
    assert_eq!(a.props.get("x"), Some(&num(1.0)));
}

#[test]
fn test_timeout_discards_trace() {
    let runtime = TraceRuntime::new(TraceConfig {
        timeout: Duration::from_millis(100),
        ..TraceConfig::default()
    });
    let result = runtime.trace_source("const o = {};\nwhile (true) { o.n = 1; }");
    assert!(matches!(result, Err(ReftraceError::Timeout { .. })), "{result:?}");
}

#[test]
fn test_writes_to_primitives_are_counted() {
    let run = trace("const n = 5;\nn.k = 1;\ndelete n.k;");
    assert_eq!(run.error, None);
    assert_eq!(run.trace.skipped, 2);
}

#[test]
fn test_instrumentation_failures_run_nothing() {
    let err = TraceRuntime::default().trace_source("let __tr = 1;").unwrap_err();
    assert!(matches!(
        err,
        ReftraceError::Instrument(InstrumentError::Unsupported { .. })
    ));
    let err = TraceRuntime::default().trace_source("let x = ;").unwrap_err();
    assert!(matches!(err, ReftraceError::Instrument(InstrumentError::Parse(_))));
}

#[test]
fn test_console_is_captured_during_tracing() {
    let run = trace("const o = { a: 1 };\nconsole.log('value', o.a);");
    assert_eq!(run.console, vec!["value 1".to_string()]);
    assert_eq!(run.trace.skipped, 0);
}

#[test]
fn test_trace_serializes_to_json() {
    let run = trace("const p = { x: 1 };\np.x = NaN;");
    let json = serde_json::to_value(final_state(&run)).unwrap();
    assert_eq!(json["roots"]["p"]["kind"], "obj");
    assert_eq!(
        json["objects"]["o1"]["props"]["x"],
        serde_json::json!({"kind": "prim", "v": {"type": "number", "value": "NaN"}})
    );
    let log = serde_json::to_value(&run.trace).unwrap();
    assert!(log["steps"].as_array().is_some_and(|s| !s.is_empty()));
}
