//! Child classification, history pruning, and status recomputation.
//!
//! Pure functions over a freshly listed set of owned work-units. The
//! reconciler calls these every pass instead of trusting any cached view, so
//! the status block stays correct under concurrent external deletions.

use metronome_core::{CompletionState, Schedule, ScheduleStatus, WorkUnit};

/// Owned work-units partitioned by reported completion state, each class
/// ordered by creation time ascending.
#[derive(Debug, Default)]
pub struct Classified {
    pub active: Vec<WorkUnit>,
    pub succeeded: Vec<WorkUnit>,
    pub failed: Vec<WorkUnit>,
}

/// Partition children by completion state.
pub fn classify(mut children: Vec<WorkUnit>) -> Classified {
    children.sort_by_key(|unit| unit.meta.creation_timestamp);

    let mut classified = Classified::default();
    for unit in children {
        match unit.status.state {
            CompletionState::Running => classified.active.push(unit),
            CompletionState::Succeeded => classified.succeeded.push(unit),
            CompletionState::Failed => classified.failed.push(unit),
        }
    }
    classified
}

/// Select the completed work-units to delete under the retention limits.
///
/// Each class is already creation-ordered; the oldest excess beyond the limit
/// is returned. A limit of 0 keeps none; `None` keeps all (objects persisted
/// without passing the admission defaulter).
pub fn prune_targets<'a>(
    succeeded: &'a [WorkUnit],
    failed: &'a [WorkUnit],
    success_limit: Option<u32>,
    fail_limit: Option<u32>,
) -> Vec<&'a WorkUnit> {
    let mut targets = Vec::new();
    targets.extend(excess(succeeded, success_limit));
    targets.extend(excess(failed, fail_limit));
    targets
}

fn excess(class: &[WorkUnit], limit: Option<u32>) -> impl Iterator<Item = &WorkUnit> {
    let keep = match limit {
        Some(limit) => limit as usize,
        None => class.len(),
    };
    class.iter().take(class.len().saturating_sub(keep))
}

/// Recompute the status block from the classified children.
///
/// `active` becomes the running set (creation order); `last_successful_time`
/// advances to the most recent succeeded child's completion time;
/// `last_schedule_time` is left untouched — the reconciler owns it and writes
/// it when a run is actually executed.
pub fn update_status(schedule: &Schedule, classified: &Classified) -> ScheduleStatus {
    let last_successful_time = classified
        .succeeded
        .iter()
        .filter_map(|unit| unit.status.completion_time)
        .max()
        .or(schedule.status.last_successful_time);

    ScheduleStatus {
        active: classified.active.iter().map(WorkUnit::reference).collect(),
        last_schedule_time: schedule.status.last_schedule_time,
        last_successful_time,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
