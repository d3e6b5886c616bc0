// Checkpoint recorder: live heap state plus the growing delta log
use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::*;

/// How a runtime value looks to the recorder
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Primitive(Primitive),
    Object {
        /// Runtime identity; stable and never reused within one run
        identity: u64,
        kind: ObjKind,
        class_name: Option<String>,
    },
}

/// Implemented by the runtime for the values it hands to the recorder
pub trait Inspect: Sized {
    fn classify(&self) -> Classified;

    /// Enumerable own fields of an object value, in order
    fn fields(&self) -> Vec<(String, Self)>;
}

#[derive(Debug)]
pub struct CheckpointRecorder {
    snapshot_interval: u64,
    state: HeapState,
    ids: HashMap<u64, ObjId>,
    next_id: u64,
    steps: Vec<StepMeta>,
    events: Vec<DeltaEvent>,
    snapshots: Vec<Snapshot>,
    call_events: Vec<CallEvent>,
    skipped: u64,
    current_step: StepId,
    /// Index of the first event of the current step
    step_start: usize,
    last_checkpoint: Option<CheckpointId>,
}

impl CheckpointRecorder {
    pub fn new(snapshot_interval: u64) -> Self {
        let state = HeapState::new();
        Self {
            snapshot_interval: snapshot_interval.max(1),
            snapshots: vec![Snapshot {
                at: 0,
                state: state.clone(),
            }],
            state,
            ids: HashMap::new(),
            next_id: 1,
            // Placeholder for step 0, overwritten when the step closes
            steps: vec![StepMeta {
                step_id: 0,
                checkpoint_id: None,
                live_root_names: Vec::new(),
                delta_from: 0,
                delta_to: 0,
            }],
            events: Vec::new(),
            call_events: Vec::new(),
            skipped: 0,
            current_step: 0,
            step_start: 0,
            last_checkpoint: None,
        }
    }

    pub fn state(&self) -> &HeapState {
        &self.state
    }

    pub fn current_step(&self) -> StepId {
        self.current_step
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    /// Id already assigned to a runtime identity
    pub fn known_id(&self, identity: u64) -> Option<ObjId> {
        self.ids.get(&identity).copied()
    }

    /// Stable id for a runtime identity, emitting `alloc` on first sight
    pub fn ensure_obj_id(&mut self, identity: u64, kind: ObjKind, class_name: Option<String>) -> ObjId {
        if let Some(id) = self.ids.get(&identity) {
            return *id;
        }
        let id = ObjId(self.next_id);
        self.next_id += 1;
        self.ids.insert(identity, id);
        trace!(%id, %kind, "alloc");
        self.push(DeltaEvent::Alloc {
            id,
            obj_kind: kind,
            class_name,
            step_id: self.current_step,
        });
        id
    }

    /// Classify a value, tracking objects on first sight
    pub fn to_value_ref<V: Inspect>(&mut self, value: &V) -> ValueRef {
        self.to_value_ref_inner(value, None)
    }

    /// Like [`Self::to_value_ref`], but first sight does not record `skip_key`
    ///
    /// Used when the caller is about to record that field itself.
    pub fn to_value_ref_except<V: Inspect>(&mut self, value: &V, skip_key: &str) -> ValueRef {
        self.to_value_ref_inner(value, Some(skip_key))
    }

    fn to_value_ref_inner<V: Inspect>(&mut self, value: &V, skip_key: Option<&str>) -> ValueRef {
        match value.classify() {
            Classified::Primitive(v) => ValueRef::Prim { v },
            Classified::Object {
                identity,
                kind,
                class_name,
            } => {
                if let Some(id) = self.known_id(identity) {
                    return ValueRef::Obj { id };
                }
                let id = self.ensure_obj_id(identity, kind, class_name);
                // Objects built outside instrumented code arrive with fields
                for (key, field) in value.fields() {
                    if Some(key.as_str()) == skip_key {
                        continue;
                    }
                    let field_ref = self.to_value_ref(&field);
                    self.write(id, &key, field_ref, None);
                }
                ValueRef::Obj { id }
            }
        }
    }

    fn push(&mut self, event: DeltaEvent) {
        apply_event(&mut self.state, &event);
        self.events.push(event);
    }

    /// Count a hook call that had nothing to act on
    pub fn note_skip(&mut self, reason: &str) {
        self.skipped += 1;
        warn!(reason, step = self.current_step, "skipped trace event");
    }

    pub fn write(&mut self, target: ObjId, key: &str, value: ValueRef, checkpoint_id: Option<&str>) {
        if !self.state.objects.contains_key(&target) {
            self.note_skip("write to untracked object");
            return;
        }
        self.push(DeltaEvent::Write {
            target,
            key: key.to_string(),
            value,
            checkpoint_id: checkpoint_id.map(str::to_string),
            step_id: self.current_step,
        });
    }

    pub fn del(&mut self, target: ObjId, key: &str, checkpoint_id: Option<&str>) {
        if !self.state.objects.contains_key(&target) {
            self.note_skip("delete on untracked object");
            return;
        }
        self.push(DeltaEvent::Delete {
            target,
            key: key.to_string(),
            checkpoint_id: checkpoint_id.map(str::to_string),
            step_id: self.current_step,
        });
    }

    pub fn root_set(&mut self, name: &str, value: ValueRef, checkpoint_id: Option<&str>) {
        self.push(DeltaEvent::RootSet {
            name: name.to_string(),
            value,
            checkpoint_id: checkpoint_id.map(str::to_string),
            step_id: self.current_step,
        });
    }

    pub fn root_del(&mut self, name: &str, checkpoint_id: Option<&str>) {
        self.push(DeltaEvent::RootDel {
            name: name.to_string(),
            checkpoint_id: checkpoint_id.map(str::to_string),
            step_id: self.current_step,
        });
    }

    /// Close the current step and advance the timeline
    pub fn checkpoint_step(&mut self, checkpoint_id: Option<&str>) {
        let meta = StepMeta {
            step_id: self.current_step,
            checkpoint_id: checkpoint_id.map(str::to_string),
            live_root_names: self.state.root_names(),
            delta_from: self.step_start,
            delta_to: self.events.len(),
        };
        debug!(
            step = self.current_step,
            checkpoint = checkpoint_id.unwrap_or("-"),
            events = meta.delta_to - meta.delta_from,
            "step closed"
        );
        if self.current_step == 0 {
            self.steps[0] = meta;
        } else {
            self.steps.push(meta);
        }
        self.step_start = self.events.len();
        self.last_checkpoint = checkpoint_id.map(str::to_string);

        let next = self.current_step + 1;
        if next % self.snapshot_interval == 0 {
            self.snapshots.push(Snapshot {
                at: next,
                state: self.state.clone(),
            });
        }
        self.current_step = next;
    }

    pub fn call_enter(&mut self, fn_name: &str, checkpoint_id: Option<&str>) {
        self.push_call(CallKind::Enter, fn_name, checkpoint_id);
    }

    pub fn call_exit(&mut self, fn_name: &str, checkpoint_id: Option<&str>) {
        self.push_call(CallKind::Exit, fn_name, checkpoint_id);
    }

    fn push_call(&mut self, kind: CallKind, fn_name: &str, checkpoint_id: Option<&str>) {
        self.call_events.push(CallEvent {
            kind,
            fn_name: fn_name.to_string(),
            step_id: self.current_step,
            checkpoint_id: checkpoint_id.map(str::to_string),
        });
    }

    /// Hand off the finished log
    pub fn finish(mut self) -> TraceLog {
        if self.events.len() > self.step_start {
            let last = self.last_checkpoint.clone();
            self.checkpoint_step(last.as_deref());
        }
        debug!(
            steps = self.steps.len(),
            events = self.events.len(),
            snapshots = self.snapshots.len(),
            skipped = self.skipped,
            "trace finished"
        );
        TraceLog {
            steps: self.steps,
            events: self.events,
            snapshots: self.snapshots,
            call_events: self.call_events,
            skipped: self.skipped,
        }
    }
}
