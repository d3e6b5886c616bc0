// Replay: reconstruct the heap at any step of a trace
use super::*;

/// Heap state after `step`; requests past the end clamp to the last step
pub fn get_state_at(trace: &TraceLog, step: StepId) -> HeapState {
    let Some(last) = trace.last_step() else {
        return HeapState::new();
    };
    let step = step.min(last);

    // Snapshot with the largest `at <= step`
    let index = trace.snapshots.partition_point(|s| s.at <= step);
    let (mut state, from) = match index.checked_sub(1).map(|i| &trace.snapshots[i]) {
        Some(snapshot) => (snapshot.state.clone(), snapshot.at),
        None => (HeapState::new(), 0),
    };
    for s in from..=step {
        for event in trace.events_of(s) {
            apply_event(&mut state, event);
        }
    }
    state
}

/// Forward walk over every step, applying each step's events once
pub struct ReplayCursor<'a> {
    trace: &'a TraceLog,
    state: HeapState,
    next: usize,
}

impl<'a> ReplayCursor<'a> {
    pub fn new(trace: &'a TraceLog) -> Self {
        Self {
            trace,
            state: HeapState::new(),
            next: 0,
        }
    }

    /// State after the most recently yielded step
    pub fn state(&self) -> &HeapState {
        &self.state
    }
}

impl<'a> Iterator for ReplayCursor<'a> {
    type Item = (&'a StepMeta, HeapState);

    fn next(&mut self) -> Option<Self::Item> {
        let meta = self.trace.steps.get(self.next)?;
        for event in &self.trace.events[meta.delta_from..meta.delta_to] {
            apply_event(&mut self.state, event);
        }
        self.next += 1;
        Some((meta, self.state.clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.trace.steps.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
