// Event application, shared by the recorder and the replay engine
use super::*;

/// Apply one delta event to `state`
///
/// Events that target an unknown object are ignored; the recorder never
/// emits them, so this only matters for hand-built logs.
pub fn apply_event(state: &mut HeapState, event: &DeltaEvent) {
    match event {
        DeltaEvent::Alloc {
            id,
            obj_kind,
            class_name,
            ..
        } => {
            state
                .objects
                .entry(*id)
                .or_insert_with(|| HeapObject::new(*id, *obj_kind, class_name.clone()));
        }
        DeltaEvent::Write {
            target,
            key,
            value,
            checkpoint_id,
            step_id,
        } => {
            if let Some(object) = state.objects.get_mut(target) {
                object.props.insert(key.clone(), value.clone());
                state.last_write.insert(
                    field_key(*target, key),
                    WriteStamp {
                        step_id: *step_id,
                        checkpoint_id: checkpoint_id.clone(),
                    },
                );
            }
        }
        DeltaEvent::Delete {
            target,
            key,
            checkpoint_id,
            step_id,
        } => {
            if let Some(object) = state.objects.get_mut(target) {
                object.props.shift_remove(key);
                state.last_write.insert(
                    field_key(*target, key),
                    WriteStamp {
                        step_id: *step_id,
                        checkpoint_id: checkpoint_id.clone(),
                    },
                );
            }
        }
        DeltaEvent::RootSet {
            name,
            value,
            checkpoint_id,
            step_id,
        } => {
            state.roots.insert(name.clone(), value.clone());
            state.last_write.insert(
                root_key(name),
                WriteStamp {
                    step_id: *step_id,
                    checkpoint_id: checkpoint_id.clone(),
                },
            );
        }
        DeltaEvent::RootDel { name, .. } => {
            state.roots.shift_remove(name);
        }
    }
}
