//! Replay-safe due/missed-run computation over a parsed cron schedule.
//!
//! Expressions are parsed through the shared five-field normalization in
//! `metronome_core::cron_expr`. The due-run walk is the idempotent core of
//! the reconciler: given the last point we know was handled and `now`, it
//! finds the single run to execute, how many were skipped, and the next fire
//! time to sleep until.

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

pub use metronome_core::cron_expr::parse_cron;

/// Outcome of the due-run walk.
#[derive(Debug, Clone, PartialEq)]
pub struct DueRuns {
    /// The most recent scheduled time ≤ now, if any run is due at all. Only
    /// this one is executed; older missed runs are abandoned.
    pub last_due: Option<DateTime<Utc>>,
    /// The next fire time strictly after now (None for schedules that never
    /// fire again).
    pub next: Option<DateTime<Utc>>,
    /// Due times walked past without executing. When `capped`, this is a
    /// floor, not an exact count.
    pub skipped: usize,
    /// The walk hit the catch-up bound and stopped counting.
    pub capped: bool,
}

/// Enumerate scheduled times in `(earliest, now]` and pick the run to execute.
///
/// `earliest` is exclusive: a run exactly at the last handled time is not due
/// again, which is what makes replays after a crash or duplicate enqueue
/// harmless. When more than `max_catch_up` runs have accumulated the walk
/// stops counting and the most recent due time is located by scanning a
/// widening window back from `now` instead, so an ancient `earliest` never
/// costs an unbounded forward walk.
pub fn due_runs(
    schedule: &Schedule,
    earliest: DateTime<Utc>,
    now: DateTime<Utc>,
    max_catch_up: usize,
) -> DueRuns {
    let next = schedule.after(&now).next();

    if earliest > now {
        // Deadline clamping can push the scan point past now; nothing is due.
        return DueRuns {
            last_due: None,
            next,
            skipped: 0,
            capped: false,
        };
    }

    let mut last_due = None;
    let mut count = 0usize;
    let mut capped = false;
    for t in schedule.after(&earliest) {
        if t > now {
            break;
        }
        last_due = Some(t);
        count += 1;
        if count > max_catch_up {
            capped = true;
            break;
        }
    }

    if capped {
        last_due = most_recent_due(schedule, earliest, now);
    }

    DueRuns {
        last_due,
        next,
        skipped: count.saturating_sub(1),
        capped,
    }
}

/// Most recent scheduled time in `(earliest, now]`, found by scanning a
/// geometrically widening window backwards from `now`.
fn most_recent_due(
    schedule: &Schedule,
    earliest: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    let mut window = Duration::minutes(1);
    loop {
        let start = std::cmp::max(earliest, now - window);
        let mut last = None;
        for t in schedule.after(&start) {
            if t > now {
                break;
            }
            last = Some(t);
        }
        if last.is_some() || start == earliest {
            return last;
        }
        window = window * 16;
    }
}

// ── Tests ───────────────────────────────────────────────────────────
