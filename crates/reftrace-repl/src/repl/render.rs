//! Text rendering of heap states and trace metadata

use reftrace_core::{
    trace::{CallEvent, CallKind},
    DeltaEvent, HeapObject, HeapState, StepId, StepMeta, TraceRun,
};

/// `Step 3/10 at L2:5 (2 events)`
pub fn step_header(meta: &StepMeta, last: StepId) -> String {
    let events = meta.delta_to - meta.delta_from;
    let plural = if events == 1 { "" } else { "s" };
    format!(
        "Step {}/{} at {} ({events} event{plural})",
        meta.step_id,
        last,
        meta.checkpoint_id.as_deref().unwrap_or("-")
    )
}

pub fn roots(state: &HeapState) -> String {
    if state.roots.is_empty() {
        return "  (no roots)".to_string();
    }
    state
        .root_names()
        .iter()
        .filter_map(|name| state.root(name).map(|value| format!("  {name} = {value}")))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One object as `o2 object P {x: 3}`
pub fn object(object: &HeapObject) -> String {
    let fields = object
        .props
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join(", ");
    match &object.class_name {
        Some(class) => format!("{} {} {class} {{{fields}}}", object.id, object.obj_kind),
        None => format!("{} {} {{{fields}}}", object.id, object.obj_kind),
    }
}

pub fn objects(state: &HeapState) -> String {
    if state.objects.is_empty() {
        return "  (no objects)".to_string();
    }
    state
        .objects
        .values()
        .map(|o| format!("  {}", object(o)))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn events(events: &[DeltaEvent]) -> String {
    if events.is_empty() {
        return "  (no events)".to_string();
    }
    events
        .iter()
        .map(|e| format!("  {e}"))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn calls<'a>(calls: impl Iterator<Item = &'a CallEvent>) -> String {
    let lines: Vec<String> = calls
        .map(|c| {
            let kind = match c.kind {
                CallKind::Enter => "enter",
                CallKind::Exit => "exit",
            };
            format!(
                "  {kind} {} @{}",
                c.fn_name,
                c.checkpoint_id.as_deref().unwrap_or("-")
            )
        })
        .collect();
    if lines.is_empty() {
        "  (no calls)".to_string()
    } else {
        lines.join("\n")
    }
}

/// Line number of a `L<line>:<col>` checkpoint
pub fn checkpoint_line(checkpoint: &str) -> Option<usize> {
    checkpoint.strip_prefix('L')?.split(':').next()?.parse().ok()
}

/// Numbered listing with `current` marked
pub fn listing(source: &str, current: Option<usize>) -> String {
    source
        .lines()
        .enumerate()
        .map(|(index, line)| {
            let number = index + 1;
            let marker = if Some(number) == current { "=>" } else { "  " };
            format!("{marker} {number:>3} | {line}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Console output, outcome and trace size of a finished run
pub fn summary(run: &TraceRun) -> String {
    let mut lines: Vec<String> = run.console.iter().map(|l| format!("| {l}")).collect();
    match (&run.error, &run.completion) {
        (Some(error), _) => lines.push(error.to_string()),
        (None, Some(value)) => lines.push(format!("=> {value}")),
        (None, None) => {}
    }
    let trace = &run.trace;
    lines.push(format!(
        "Traced {} steps ({} events, {} snapshots)",
        trace.steps.len(),
        trace.events.len(),
        trace.snapshots.len()
    ));
    if trace.skipped > 0 {
        lines.push(format!("Warning: {} events skipped", trace.skipped));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use reftrace_core::{ObjId, ObjKind, Primitive, ValueRef};

    fn sample_state() -> HeapState {
        let mut state = HeapState::new();
        let mut point = HeapObject::new(ObjId(1), ObjKind::Object, Some("Point".to_string()));
        point
            .props
            .insert("x".to_string(), ValueRef::prim(Primitive::Number(3.0)));
        point.props.insert("next".to_string(), ValueRef::obj(ObjId(2)));
        state.objects.insert(ObjId(1), point);
        state
            .objects
            .insert(ObjId(2), HeapObject::new(ObjId(2), ObjKind::Array, None));
        state.roots.insert("p".to_string(), ValueRef::obj(ObjId(1)));
        state.roots.insert(
            "label".to_string(),
            ValueRef::prim(Primitive::String("hi".to_string())),
        );
        state
    }

    #[test]
    fn test_roots_are_sorted() {
        assert_eq!(roots(&sample_state()), "  label = \"hi\"\n  p = o1");
        assert_eq!(roots(&HeapState::new()), "  (no roots)");
    }

    #[test]
    fn test_objects() {
        assert_eq!(
            objects(&sample_state()),
            "  o1 object Point {x: 3, next: o2}\n  o2 array {}"
        );
    }

    #[test]
    fn test_checkpoint_line() {
        assert_eq!(checkpoint_line("L12:4"), Some(12));
        assert_eq!(checkpoint_line("12:4"), None);
        assert_eq!(checkpoint_line("Lx:1"), None);
    }

    #[test]
    fn test_listing_marks_current_line() {
        assert_eq!(
            listing("let a = 1;\na = 2;", Some(2)),
            "     1 | let a = 1;\n=>   2 | a = 2;"
        );
    }

    #[test]
    fn test_step_header() {
        let meta = StepMeta {
            step_id: 3,
            checkpoint_id: Some("L2:5".to_string()),
            live_root_names: Vec::new(),
            delta_from: 4,
            delta_to: 5,
        };
        assert_eq!(step_header(&meta, 10), "Step 3/10 at L2:5 (1 event)");
    }
}
