use super::*;
use pretty_assertions::assert_eq;

/// Minimal runtime value for driving the recorder directly
#[derive(Debug, Clone)]
enum TestValue {
    Num(f64),
    Obj(u64, Vec<(String, TestValue)>),
}

impl Inspect for TestValue {
    fn classify(&self) -> Classified {
        match self {
            TestValue::Num(n) => Classified::Primitive(Primitive::Number(*n)),
            TestValue::Obj(identity, _) => Classified::Object {
                identity: *identity,
                kind: ObjKind::Object,
                class_name: None,
            },
        }
    }

    fn fields(&self) -> Vec<(String, Self)> {
        match self {
            TestValue::Num(_) => Vec::new(),
            TestValue::Obj(_, fields) => fields.clone(),
        }
    }
}

fn num(n: f64) -> ValueRef {
    ValueRef::prim(Primitive::Number(n))
}

fn create_test_recorder() -> CheckpointRecorder {
    CheckpointRecorder::new(4)
}

#[test]
fn test_checkpoint_id_format() {
    assert_eq!(checkpoint_id(3, 14), "L3:14");
}

#[test]
fn test_ids_are_stable_and_start_at_one() {
    let mut recorder = create_test_recorder();
    let a = recorder.ensure_obj_id(10, ObjKind::Object, None);
    let b = recorder.ensure_obj_id(20, ObjKind::Array, None);
    let again = recorder.ensure_obj_id(10, ObjKind::Object, None);
    assert_eq!(a.to_string(), "o1");
    assert_eq!(b.to_string(), "o2");
    assert_eq!(a, again);
    // Only the two first sightings allocate
    assert_eq!(recorder.event_count(), 2);
}

#[test]
fn test_first_sight_records_existing_fields() {
    let mut recorder = create_test_recorder();
    let inner = TestValue::Obj(2, vec![("n".into(), TestValue::Num(1.0))]);
    let outer = TestValue::Obj(1, vec![("x".into(), TestValue::Num(5.0)), ("inner".into(), inner)]);

    let value = recorder.to_value_ref(&outer);
    let id = value.as_obj().unwrap();
    let object = recorder.state().object(id).unwrap();
    assert_eq!(object.props.get("x"), Some(&num(5.0)));
    let inner_id = object.props.get("inner").and_then(ValueRef::as_obj).unwrap();
    assert_eq!(recorder.state().object(inner_id).unwrap().props.get("n"), Some(&num(1.0)));
}

#[test]
fn test_first_sight_except_leaves_key_to_caller() {
    let mut recorder = create_test_recorder();
    let value = TestValue::Obj(1, vec![("a".into(), TestValue::Num(1.0)), ("b".into(), TestValue::Num(2.0))]);
    let id = recorder.to_value_ref_except(&value, "b").as_obj().unwrap();
    let props = &recorder.state().object(id).unwrap().props;
    assert_eq!(props.len(), 1);
    assert!(props.contains_key("a"));
}

#[test]
fn test_cyclic_first_sight_terminates() {
    #[derive(Clone)]
    struct SelfRef;
    impl Inspect for SelfRef {
        fn classify(&self) -> Classified {
            Classified::Object {
                identity: 7,
                kind: ObjKind::Object,
                class_name: None,
            }
        }
        fn fields(&self) -> Vec<(String, Self)> {
            vec![("me".to_string(), SelfRef)]
        }
    }

    let mut recorder = create_test_recorder();
    let id = recorder.to_value_ref(&SelfRef).as_obj().unwrap();
    assert_eq!(
        recorder.state().object(id).unwrap().props.get("me"),
        Some(&ValueRef::obj(id))
    );
}

#[test]
fn test_write_to_unknown_object_is_skipped() {
    let mut recorder = create_test_recorder();
    recorder.write(ObjId(99), "x", num(1.0), Some("L1:1"));
    recorder.del(ObjId(99), "x", None);
    assert_eq!(recorder.skipped(), 2);
    assert_eq!(recorder.event_count(), 0);
    assert_eq!(recorder.finish().skipped, 2);
}

#[test]
fn test_step_ranges_partition_events() {
    let mut recorder = create_test_recorder();
    let id = recorder.ensure_obj_id(1, ObjKind::Object, None);
    recorder.write(id, "a", num(1.0), Some("L1:1"));
    recorder.checkpoint_step(Some("L1:1"));
    recorder.checkpoint_step(Some("L2:1"));
    recorder.root_set("x", ValueRef::obj(id), Some("L3:1"));
    recorder.checkpoint_step(Some("L3:1"));
    let trace = recorder.finish();

    assert_eq!(trace.steps.len(), 3);
    let mut next = 0;
    for (i, step) in trace.steps.iter().enumerate() {
        assert_eq!(step.step_id, i as u64);
        assert_eq!(step.delta_from, next);
        next = step.delta_to;
    }
    assert_eq!(next, trace.events.len());
    assert_eq!(trace.steps[1].delta_from, trace.steps[1].delta_to);
    assert_eq!(trace.steps[2].live_root_names, vec!["x".to_string()]);
}

#[test]
fn test_trailing_events_close_into_final_step() {
    let mut recorder = create_test_recorder();
    recorder.checkpoint_step(Some("L1:1"));
    recorder.root_set("y", num(2.0), None);
    recorder.root_del("y", None);
    let trace = recorder.finish();

    assert_eq!(trace.steps.len(), 2);
    let last = trace.steps.last().unwrap();
    assert_eq!(last.checkpoint_id.as_deref(), Some("L1:1"));
    assert_eq!((last.delta_from, last.delta_to), (0, 2));
}

#[test]
fn test_no_trailing_step_without_events() {
    let mut recorder = create_test_recorder();
    recorder.checkpoint_step(Some("L1:1"));
    assert_eq!(recorder.finish().steps.len(), 1);
}

#[test]
fn test_empty_recorder_has_placeholder_step_and_snapshot() {
    let trace = create_test_recorder().finish();
    assert_eq!(trace.steps.len(), 1);
    assert_eq!(trace.snapshots.len(), 1);
    assert_eq!(trace.snapshots[0].at, 0);
    assert_eq!(get_state_at(&trace, 0), HeapState::new());
}

#[test]
fn test_snapshots_hold_state_at_step_start() {
    let mut recorder = CheckpointRecorder::new(2);
    for i in 0..5 {
        recorder.root_set("i", num(i as f64), None);
        recorder.checkpoint_step(None);
    }
    let trace = recorder.finish();
    let labels: Vec<u64> = trace.snapshots.iter().map(|s| s.at).collect();
    assert_eq!(labels, vec![0, 2, 4]);
    // The snapshot labelled 2 holds the state after step 1
    assert_eq!(trace.snapshots[1].state.root("i"), Some(&num(1.0)));
}

#[test]
fn test_replay_matches_every_step() {
    let mut recorder = CheckpointRecorder::new(3);
    let mut expected = Vec::new();
    let id = recorder.ensure_obj_id(1, ObjKind::Array, None);
    recorder.root_set("arr", ValueRef::obj(id), Some("L1:1"));
    for i in 0..10 {
        recorder.write(id, &i.to_string(), num(i as f64), Some("L2:3"));
        if i % 4 == 3 {
            recorder.del(id, &(i - 1).to_string(), Some("L3:3"));
        }
        expected.push(recorder.state().clone());
        recorder.checkpoint_step(Some("L2:3"));
    }
    let trace = recorder.finish();
    for (step, state) in expected.iter().enumerate() {
        assert_eq!(&get_state_at(&trace, step as u64), state);
    }
}

#[test]
fn test_replay_clamps_past_last_step() {
    let mut recorder = create_test_recorder();
    recorder.root_set("a", num(1.0), Some("L1:1"));
    recorder.checkpoint_step(Some("L1:1"));
    recorder.root_set("a", num(2.0), Some("L2:1"));
    recorder.checkpoint_step(Some("L2:1"));
    let trace = recorder.finish();
    assert_eq!(get_state_at(&trace, 1_000), get_state_at(&trace, 1));
    assert_eq!(get_state_at(&trace, 1_000).root("a"), Some(&num(2.0)));
}

#[test]
fn test_last_write_stamps() {
    let mut recorder = create_test_recorder();
    let id = recorder.ensure_obj_id(1, ObjKind::Object, None);
    recorder.checkpoint_step(None);
    recorder.write(id, "k", num(1.0), Some("L4:2"));
    recorder.root_set("r", ValueRef::obj(id), Some("L5:1"));
    let trace = recorder.finish();
    let state = get_state_at(&trace, 1);
    assert_eq!(
        state.last_write.get("o1:k"),
        Some(&WriteStamp {
            step_id: 1,
            checkpoint_id: Some("L4:2".to_string())
        })
    );
    assert_eq!(state.last_write.get("root:r").map(|s| s.step_id), Some(1));
}

#[test]
fn test_cursor_walks_all_steps() {
    let mut recorder = CheckpointRecorder::new(2);
    for i in 0..4 {
        recorder.root_set("n", num(i as f64), None);
        recorder.checkpoint_step(None);
    }
    let trace = recorder.finish();
    let walked: Vec<(u64, HeapState)> = ReplayCursor::new(&trace)
        .map(|(meta, state)| (meta.step_id, state))
        .collect();
    assert_eq!(walked.len(), 4);
    for (step, state) in walked {
        assert_eq!(state, get_state_at(&trace, step));
    }
}

#[test]
fn test_call_events_carry_current_step() {
    let mut recorder = create_test_recorder();
    recorder.checkpoint_step(None);
    recorder.call_enter("f", Some("L1:1"));
    recorder.call_exit("f", Some("L1:1"));
    let trace = recorder.finish();
    assert_eq!(trace.call_events.len(), 2);
    assert!(trace.call_events.iter().all(|c| c.step_id == 1));
    assert_eq!(trace.calls_at(1).count(), 2);
}

#[test]
fn test_nan_primitives_compare_equal() {
    assert_eq!(Primitive::Number(f64::NAN), Primitive::Number(f64::NAN));
    assert_ne!(Primitive::Number(0.0), Primitive::Number(-0.0));
}

#[test]
fn test_json_shape() {
    let mut recorder = create_test_recorder();
    let id = recorder.ensure_obj_id(1, ObjKind::Object, Some("Point".to_string()));
    recorder.write(id, "x", ValueRef::prim(Primitive::Number(f64::NAN)), Some("L1:5"));
    recorder.root_set("p", ValueRef::obj(id), Some("L1:1"));
    recorder.checkpoint_step(Some("L1:1"));
    let trace = recorder.finish();
    let json = serde_json::to_value(get_state_at(&trace, 0)).unwrap();

    assert_eq!(json["roots"]["p"], serde_json::json!({"kind": "obj", "id": "o1"}));
    assert_eq!(json["objects"]["o1"]["objKind"], "object");
    assert_eq!(json["objects"]["o1"]["className"], "Point");
    assert_eq!(
        json["objects"]["o1"]["props"]["x"],
        serde_json::json!({"kind": "prim", "v": {"type": "number", "value": "NaN"}})
    );
    assert_eq!(json["lastWrite"]["o1:x"]["checkpointId"], "L1:5");

    let events = serde_json::to_value(&trace.events).unwrap();
    assert_eq!(events[0]["type"], "alloc");
    assert_eq!(events[1]["type"], "write");
    assert_eq!(events[2]["type"], "rootSet");
    assert_eq!(events[2]["checkpointId"], "L1:1");
}

#[test]
fn test_apply_ignores_unknown_targets() {
    let mut state = HeapState::new();
    apply_event(
        &mut state,
        &DeltaEvent::Write {
            target: ObjId(3),
            key: "x".into(),
            value: num(1.0),
            checkpoint_id: None,
            step_id: 0,
        },
    );
    assert_eq!(state, HeapState::new());
}
