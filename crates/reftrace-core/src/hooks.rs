// Runtime tracing hooks: the ABI between instrumented programs and the recorder
use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::evaluator::{Heap, HookHost, ObjectHandle, ObjectKind, Value};
use crate::trace::{CheckpointRecorder, Classified, Inspect, ObjId, ObjKind, Primitive, TraceLog, ValueRef};

/// Methods of the injected hooks object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Step,
    Intern,
    Write,
    Del,
    RootSet,
    RootDel,
    Enter,
    Exit,
    Sync,
}

impl Hook {
    pub const ALL: [Hook; 9] = [
        Hook::Step,
        Hook::Intern,
        Hook::Write,
        Hook::Del,
        Hook::RootSet,
        Hook::RootDel,
        Hook::Enter,
        Hook::Exit,
        Hook::Sync,
    ];

    pub fn method_name(&self) -> &'static str {
        match self {
            Hook::Step => "step",
            Hook::Intern => "intern",
            Hook::Write => "write",
            Hook::Del => "del",
            Hook::RootSet => "rootSet",
            Hook::RootDel => "rootDel",
            Hook::Enter => "enter",
            Hook::Exit => "exit",
            Hook::Sync => "sync",
        }
    }

    /// Argument position holding a property key, converted to a string by the caller
    pub fn key_arg(&self) -> Option<usize> {
        match self {
            Hook::Write | Hook::Del => Some(1),
            _ => None,
        }
    }

    /// Value the hook evaluates to in the instrumented program
    pub fn passthrough(&self, args: &[Value]) -> Value {
        let arg = |i: usize| args.get(i).cloned().unwrap_or(Value::Undefined);
        match self {
            Hook::Step | Hook::RootSet | Hook::Sync => arg(1),
            Hook::Intern => arg(0),
            Hook::Write => arg(2),
            Hook::Del => Value::Boolean(true),
            Hook::RootDel | Hook::Enter | Hook::Exit => Value::Undefined,
        }
    }
}

/// A value together with the heap it lives in
pub struct HeapValue<'a> {
    heap: &'a Heap,
    value: Value,
}

impl<'a> HeapValue<'a> {
    pub fn new(heap: &'a Heap, value: Value) -> Self {
        Self { heap, value }
    }
}

impl Inspect for HeapValue<'_> {
    fn classify(&self) -> Classified {
        match &self.value {
            Value::Undefined => Classified::Primitive(Primitive::Undefined),
            Value::Null => Classified::Primitive(Primitive::Null),
            Value::Boolean(b) => Classified::Primitive(Primitive::Boolean(*b)),
            Value::Number(n) => Classified::Primitive(Primitive::Number(*n)),
            Value::BigInt(n) => Classified::Primitive(Primitive::BigInt(*n)),
            Value::String(s) => Classified::Primitive(Primitive::String(s.clone())),
            Value::Object(handle) => {
                let object = self.heap.get(*handle);
                let (kind, class_name) = match &object.kind {
                    ObjectKind::Ordinary => (ObjKind::Object, object.class_name.clone()),
                    ObjectKind::Array(_) => (ObjKind::Array, None),
                    ObjectKind::Closure(_) | ObjectKind::Native(_) => (ObjKind::Function, None),
                    ObjectKind::Class(_) => (ObjKind::Class, object.class_name.clone()),
                };
                Classified::Object {
                    identity: identity(*handle),
                    kind,
                    class_name,
                }
            }
        }
    }

    fn fields(&self) -> Vec<(String, Self)> {
        match &self.value {
            Value::Object(handle) => self
                .heap
                .get(*handle)
                .own_entries()
                .into_iter()
                .map(|(key, value)| (key, HeapValue::new(self.heap, value)))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn identity(handle: ObjectHandle) -> u64 {
    u64::from(handle.0)
}

/// Hook host that feeds a [`CheckpointRecorder`]
#[derive(Debug)]
pub struct TracingHooks {
    recorder: CheckpointRecorder,
    /// Arrays as of their last sync, keyed by runtime identity
    synced: HashMap<u64, ArrayShadow>,
}

/// What the recorder last saw of an array's own fields
#[derive(Debug, Default)]
struct ArrayShadow {
    elements: Vec<Value>,
    props: Vec<String>,
}

/// SameValue over runtime values; `+0`/`-0` differ and `NaN` equals itself
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits() || (x.is_nan() && y.is_nan()),
        _ => a == b,
    }
}

impl TracingHooks {
    pub fn new(recorder: CheckpointRecorder) -> Self {
        Self {
            recorder,
            synced: HashMap::new(),
        }
    }

    pub fn recorder(&self) -> &CheckpointRecorder {
        &self.recorder
    }

    pub fn finish(self) -> TraceLog {
        self.recorder.finish()
    }

    fn value_ref(&mut self, heap: &Heap, value: &Value) -> ValueRef {
        self.recorder.to_value_ref(&HeapValue::new(heap, value.clone()))
    }

    fn write(&mut self, heap: &Heap, target: &Value, key: &str, checkpoint: Option<&str>) {
        let Value::Object(handle) = target else {
            self.recorder.note_skip("write to primitive");
            return;
        };
        let object = heap.get(*handle);
        if matches!(object.kind, ObjectKind::Array(_)) {
            // Index and length writes can move several elements at once
            if self.recorder.known_id(identity(*handle)).is_none() {
                self.recorder
                    .to_value_ref_except(&HeapValue::new(heap, target.clone()), key);
            }
            self.sync_object(heap, *handle, checkpoint);
            return;
        }
        let id = match self.recorder.known_id(identity(*handle)) {
            Some(id) => id,
            None => match self
                .recorder
                .to_value_ref_except(&HeapValue::new(heap, target.clone()), key)
                .as_obj()
            {
                Some(id) => id,
                None => return,
            },
        };
        // Writes that landed on non-enumerable slots are not part of the trace
        if let Some(stored) = object.props.get(key) {
            let value = self.value_ref(heap, stored);
            self.recorder.write(id, key, value, checkpoint);
        }
    }

    fn delete(&mut self, heap: &Heap, target: &Value, key: &str, checkpoint: Option<&str>) {
        let Value::Object(handle) = target else {
            self.recorder.note_skip("delete on primitive");
            return;
        };
        let Some(id) = self.recorder.known_id(identity(*handle)) else {
            // First sight already reflects the deletion
            self.value_ref(heap, target);
            return;
        };
        if matches!(heap.get(*handle).kind, ObjectKind::Array(_)) {
            self.sync_object(heap, *handle, checkpoint);
            return;
        }
        let recorded = self
            .recorder
            .state()
            .object(id)
            .is_some_and(|o| o.props.contains_key(key));
        if recorded {
            self.recorder.del(id, key, checkpoint);
        }
    }

    /// Diff a tracked object's fields against the recorder's view
    fn sync_object(&mut self, heap: &Heap, handle: ObjectHandle, checkpoint: Option<&str>) {
        let Some(id) = self.recorder.known_id(identity(handle)) else {
            return;
        };
        let object = heap.get(handle);
        let ObjectKind::Array(elements) = &object.kind else {
            self.sync_entries(heap, id, &object.own_entries(), checkpoint);
            return;
        };
        let shadow = match self.synced.remove(&identity(handle)) {
            Some(shadow) => shadow,
            None => {
                // First sync compares against whatever first sight recorded
                self.sync_entries(heap, id, &object.own_entries(), checkpoint);
                self.synced.insert(identity(handle), ArrayShadow::of(object.props.keys(), elements));
                return;
            }
        };

        for (index, element) in elements.iter().enumerate() {
            let changed = shadow
                .elements
                .get(index)
                .map_or(true, |previous| !same_value(previous, element));
            if changed {
                self.sync_field(heap, id, &index.to_string(), element, checkpoint);
            }
        }
        for index in elements.len()..shadow.elements.len() {
            self.recorder.del(id, &index.to_string(), checkpoint);
        }
        for (key, value) in &object.props {
            self.sync_field(heap, id, key, value, checkpoint);
        }
        for key in shadow.props.iter().filter(|k| !object.props.contains_key(*k)) {
            self.recorder.del(id, key, checkpoint);
        }
        self.synced.insert(identity(handle), ArrayShadow::of(object.props.keys(), elements));
    }

    /// Full diff of `current` against the recorded fields of `id`
    fn sync_entries(&mut self, heap: &Heap, id: ObjId, current: &[(String, Value)], checkpoint: Option<&str>) {
        for (key, value) in current {
            self.sync_field(heap, id, key, value, checkpoint);
        }
        let keys: HashSet<&str> = current.iter().map(|(key, _)| key.as_str()).collect();
        let stale: Vec<String> = match self.recorder.state().object(id) {
            Some(object) => object
                .props
                .keys()
                .filter(|k| !keys.contains(k.as_str()))
                .cloned()
                .collect(),
            None => Vec::new(),
        };
        for key in stale {
            self.recorder.del(id, &key, checkpoint);
        }
    }

    fn sync_field(&mut self, heap: &Heap, id: ObjId, key: &str, value: &Value, checkpoint: Option<&str>) {
        let value = self.value_ref(heap, value);
        let unchanged = self
            .recorder
            .state()
            .object(id)
            .and_then(|o| o.props.get(key))
            .is_some_and(|recorded| *recorded == value);
        if !unchanged {
            self.recorder.write(id, key, value, checkpoint);
        }
    }
}

impl ArrayShadow {
    fn of<'a>(props: impl Iterator<Item = &'a String>, elements: &[Value]) -> Self {
        Self {
            elements: elements.to_vec(),
            props: props.cloned().collect(),
        }
    }
}

fn string_arg(args: &[Value], index: usize) -> String {
    match args.get(index) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => crate::evaluator::number_to_string(*n),
        _ => String::new(),
    }
}

fn checkpoint_arg(args: &[Value], index: usize) -> Option<String> {
    match args.get(index) {
        Some(Value::String(s)) => Some(s.clone()),
        _ => None,
    }
}

impl HookHost for TracingHooks {
    fn call_hook(&mut self, hook: Hook, heap: &Heap, args: &[Value]) -> Value {
        let arg = |i: usize| args.get(i).unwrap_or(&Value::Undefined);
        trace!(hook = hook.method_name(), step = self.recorder.current_step(), "hook");
        match hook {
            Hook::Step => {
                let checkpoint = checkpoint_arg(args, 0);
                self.recorder.checkpoint_step(checkpoint.as_deref());
            }
            Hook::Intern => {
                self.value_ref(heap, arg(0));
            }
            Hook::Write => {
                let key = string_arg(args, 1);
                let checkpoint = checkpoint_arg(args, 3);
                self.write(heap, arg(0), &key, checkpoint.as_deref());
            }
            Hook::Del => {
                let key = string_arg(args, 1);
                let checkpoint = checkpoint_arg(args, 2);
                self.delete(heap, arg(0), &key, checkpoint.as_deref());
            }
            Hook::RootSet => {
                let name = string_arg(args, 0);
                let checkpoint = checkpoint_arg(args, 2);
                let value = self.value_ref(heap, arg(1));
                self.recorder.root_set(&name, value, checkpoint.as_deref());
            }
            Hook::RootDel => {
                let name = string_arg(args, 0);
                let checkpoint = checkpoint_arg(args, 1);
                self.recorder.root_del(&name, checkpoint.as_deref());
            }
            Hook::Enter | Hook::Exit => {
                let name = string_arg(args, 0);
                let checkpoint = checkpoint_arg(args, 1);
                if hook == Hook::Enter {
                    self.recorder.call_enter(&name, checkpoint.as_deref());
                } else {
                    self.recorder.call_exit(&name, checkpoint.as_deref());
                }
            }
            Hook::Sync => {
                let checkpoint = checkpoint_arg(args, 2);
                if let Value::Object(receiver) = arg(0) {
                    self.sync_object(heap, *receiver, checkpoint.as_deref());
                }
                // Builtins such as Object.assign mutate and return another object
                if let Value::Object(result) = arg(1) {
                    if arg(0).as_object() != Some(*result) {
                        self.sync_object(heap, *result, checkpoint.as_deref());
                    }
                }
            }
        }
        hook.passthrough(args)
    }
}
