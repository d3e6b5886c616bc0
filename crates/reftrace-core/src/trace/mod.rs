// Trace data model: heap states, delta events, steps and snapshots
//
// A trace is an append-only event log partitioned into steps. Snapshots of
// the full heap state are taken every N steps so that replay only has to
// apply a bounded number of events.

pub mod apply;
pub mod recorder;
pub mod replay;

#[cfg(test)]
mod tests;

use std::fmt;

use indexmap::IndexMap;
use serde::{Serialize, Serializer};

pub use apply::apply_event;
pub use recorder::{CheckpointRecorder, Classified, Inspect};
pub use replay::{get_state_at, ReplayCursor};

/// Static source location key, `L<line>:<col>`
pub type CheckpointId = String;

/// Position on the trace timeline
pub type StepId = u64;

pub fn checkpoint_id(line: u32, col: u32) -> CheckpointId {
    format!("L{line}:{col}")
}

/// Synthetic object id, printed as `o<n>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjId(pub u64);

impl fmt::Display for ObjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "o{}", self.0)
    }
}

impl Serialize for ObjId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// An exact primitive value
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Primitive {
    Undefined,
    Null,
    Boolean(bool),
    Number(#[serde(serialize_with = "serialize_number")] f64),
    BigInt(#[serde(serialize_with = "serialize_bigint")] i128),
    String(String),
}

/// SameValue: NaN equals NaN, +0 and -0 differ
impl PartialEq for Primitive {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Primitive::Number(a), Primitive::Number(b)) => {
                (a.is_nan() && b.is_nan()) || (a == b && a.is_sign_negative() == b.is_sign_negative())
            }
            (Primitive::Undefined, Primitive::Undefined) | (Primitive::Null, Primitive::Null) => true,
            (Primitive::Boolean(a), Primitive::Boolean(b)) => a == b,
            (Primitive::BigInt(a), Primitive::BigInt(b)) => a == b,
            (Primitive::String(a), Primitive::String(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Undefined => write!(f, "undefined"),
            Primitive::Null => write!(f, "null"),
            Primitive::Boolean(b) => write!(f, "{b}"),
            Primitive::Number(n) if *n == 0.0 && n.is_sign_negative() => write!(f, "-0"),
            Primitive::Number(n) => write!(f, "{}", crate::evaluator::number_to_string(*n)),
            Primitive::BigInt(n) => write!(f, "{n}n"),
            Primitive::String(s) => write!(f, "{s:?}"),
        }
    }
}

// JSON has no NaN, infinities or negative zero
fn serialize_number<S: Serializer>(n: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    if n.is_finite() && !(*n == 0.0 && n.is_sign_negative()) {
        serializer.serialize_f64(*n)
    } else if n.is_nan() {
        serializer.serialize_str("NaN")
    } else if n.is_infinite() {
        serializer.serialize_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        serializer.serialize_str("-0")
    }
}

fn serialize_bigint<S: Serializer>(n: &i128, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(n)
}

/// Reference from a root or field to a value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ValueRef {
    Prim { v: Primitive },
    Obj { id: ObjId },
}

impl ValueRef {
    pub fn prim(v: Primitive) -> Self {
        ValueRef::Prim { v }
    }

    pub fn obj(id: ObjId) -> Self {
        ValueRef::Obj { id }
    }

    pub fn as_obj(&self) -> Option<ObjId> {
        match self {
            ValueRef::Obj { id } => Some(*id),
            ValueRef::Prim { .. } => None,
        }
    }
}

impl fmt::Display for ValueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueRef::Prim { v } => write!(f, "{v}"),
            ValueRef::Obj { id } => write!(f, "{id}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjKind {
    Object,
    Array,
    Function,
    Class,
}

impl fmt::Display for ObjKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ObjKind::Object => "object",
            ObjKind::Array => "array",
            ObjKind::Function => "function",
            ObjKind::Class => "class",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapObject {
    pub id: ObjId,
    pub obj_kind: ObjKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub props: IndexMap<String, ValueRef>,
}

impl HeapObject {
    pub fn new(id: ObjId, obj_kind: ObjKind, class_name: Option<String>) -> Self {
        Self {
            id,
            obj_kind,
            class_name,
            props: IndexMap::new(),
        }
    }
}

/// When and where a field or root was last written
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteStamp {
    pub step_id: StepId,
    pub checkpoint_id: Option<CheckpointId>,
}

/// Reconstructed heap at one point of the timeline
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HeapState {
    pub objects: IndexMap<ObjId, HeapObject>,
    pub roots: IndexMap<String, ValueRef>,
    /// Keyed by `<ObjId>:<key>` and `root:<name>`
    pub last_write: IndexMap<String, WriteStamp>,
}

impl HeapState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object(&self, id: ObjId) -> Option<&HeapObject> {
        self.objects.get(&id)
    }

    pub fn root(&self, name: &str) -> Option<&ValueRef> {
        self.roots.get(name)
    }

    /// Root names in sorted order
    pub fn root_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.roots.keys().cloned().collect();
        names.sort();
        names
    }
}

pub fn field_key(id: ObjId, key: &str) -> String {
    format!("{id}:{key}")
}

pub fn root_key(name: &str) -> String {
    format!("root:{name}")
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(
    tag = "type",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum DeltaEvent {
    Alloc {
        id: ObjId,
        obj_kind: ObjKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        class_name: Option<String>,
        step_id: StepId,
    },
    Write {
        target: ObjId,
        key: String,
        value: ValueRef,
        checkpoint_id: Option<CheckpointId>,
        step_id: StepId,
    },
    Delete {
        target: ObjId,
        key: String,
        checkpoint_id: Option<CheckpointId>,
        step_id: StepId,
    },
    RootSet {
        name: String,
        value: ValueRef,
        checkpoint_id: Option<CheckpointId>,
        step_id: StepId,
    },
    RootDel {
        name: String,
        checkpoint_id: Option<CheckpointId>,
        step_id: StepId,
    },
}

impl DeltaEvent {
    pub fn step_id(&self) -> StepId {
        match self {
            DeltaEvent::Alloc { step_id, .. }
            | DeltaEvent::Write { step_id, .. }
            | DeltaEvent::Delete { step_id, .. }
            | DeltaEvent::RootSet { step_id, .. }
            | DeltaEvent::RootDel { step_id, .. } => *step_id,
        }
    }

    /// Object the event mutates, if any
    pub fn target(&self) -> Option<ObjId> {
        match self {
            DeltaEvent::Alloc { id, .. } => Some(*id),
            DeltaEvent::Write { target, .. } | DeltaEvent::Delete { target, .. } => Some(*target),
            DeltaEvent::RootSet { .. } | DeltaEvent::RootDel { .. } => None,
        }
    }
}

impl fmt::Display for DeltaEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeltaEvent::Alloc {
                id,
                obj_kind,
                class_name,
                ..
            } => match class_name {
                Some(class_name) => write!(f, "alloc {id} {obj_kind} {class_name}"),
                None => write!(f, "alloc {id} {obj_kind}"),
            },
            DeltaEvent::Write { target, key, value, .. } => write!(f, "write {target}.{key} = {value}"),
            DeltaEvent::Delete { target, key, .. } => write!(f, "delete {target}.{key}"),
            DeltaEvent::RootSet { name, value, .. } => write!(f, "root {name} = {value}"),
            DeltaEvent::RootDel { name, .. } => write!(f, "unroot {name}"),
        }
    }
}

/// Metadata of one closed step; `[delta_from, delta_to)` indexes the event log
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMeta {
    pub step_id: StepId,
    pub checkpoint_id: Option<CheckpointId>,
    pub live_root_names: Vec<String>,
    pub delta_from: usize,
    pub delta_to: usize,
}

/// Full heap state at the start of step `at`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub at: StepId,
    pub state: HeapState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Enter,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    pub kind: CallKind,
    pub fn_name: String,
    pub step_id: StepId,
    pub checkpoint_id: Option<CheckpointId>,
}

/// Immutable output of one recorded run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceLog {
    pub steps: Vec<StepMeta>,
    pub events: Vec<DeltaEvent>,
    pub snapshots: Vec<Snapshot>,
    pub call_events: Vec<CallEvent>,
    /// Hook calls dropped because their target was not a tracked object
    pub skipped: u64,
}

impl TraceLog {
    pub fn last_step(&self) -> Option<StepId> {
        self.steps.last().map(|s| s.step_id)
    }

    pub fn step(&self, step: StepId) -> Option<&StepMeta> {
        // Step ids are dense and start at zero
        self.steps.get(usize::try_from(step).ok()?).filter(|m| m.step_id == step)
    }

    /// Events recorded during `step`
    pub fn events_of(&self, step: StepId) -> &[DeltaEvent] {
        match self.step(step) {
            Some(meta) => &self.events[meta.delta_from..meta.delta_to],
            None => &[],
        }
    }

    /// Call events tagged with `step`
    pub fn calls_at(&self, step: StepId) -> impl Iterator<Item = &CallEvent> {
        self.call_events.iter().filter(move |c| c.step_id == step)
    }
}
