//! Resource model: schedules, work-units, and the keys that identify them.
//!
//! A `Schedule` declares *when* and *what* to run; a `WorkUnit` is one
//! transient execution spawned for a single due run. Work-units point back at
//! their owning schedule with a plain key (identifier + lookup), never an
//! owning reference — the controller re-derives the active set from the store
//! each pass instead of holding child pointers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Hard ceiling on resource names imposed by the platform.
pub const MAX_NAME_LEN: usize = 63;

/// Length of the `-{unix-seconds}` suffix appended to generated work-unit
/// names: one dash plus a 10-digit epoch timestamp.
pub const GENERATED_SUFFIX_LEN: usize = 11;

// ── Keys ────────────────────────────────────────────────────────────

/// Identifies one schedule resource: the reconciliation key and the unit of
/// work-queue deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScheduleKey {
    pub namespace: String,
    pub name: String,
}

impl ScheduleKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ScheduleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// ── Metadata ────────────────────────────────────────────────────────

/// Identity and bookkeeping shared by all resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub namespace: String,
    pub name: String,
    /// Stamped when the object is built; immutable once persisted.
    #[serde(default = "Utc::now")]
    pub creation_timestamp: DateTime<Utc>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            creation_timestamp: Utc::now(),
        }
    }
}

// ── Concurrency policy ──────────────────────────────────────────────

/// Rule governing overlapping runs of the same schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcurrencyPolicy {
    /// Concurrent runs may pile up freely.
    Allow,
    /// Skip a due run while a previous one is still active.
    Forbid,
    /// Delete the currently active run(s) before starting the new one.
    Replace,
}

impl fmt::Display for ConcurrencyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyPolicy::Allow => write!(f, "Allow"),
            ConcurrencyPolicy::Forbid => write!(f, "Forbid"),
            ConcurrencyPolicy::Replace => write!(f, "Replace"),
        }
    }
}

impl FromStr for ConcurrencyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Allow" => Ok(ConcurrencyPolicy::Allow),
            "Forbid" => Ok(ConcurrencyPolicy::Forbid),
            "Replace" => Ok(ConcurrencyPolicy::Replace),
            other => Err(format!("unknown concurrency policy: {other}")),
        }
    }
}

// ── Schedule resource ───────────────────────────────────────────────

/// Template copied verbatim into each created work-unit. Opaque to the
/// controller; only the external execution platform interprets it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkUnitTemplate {
    #[serde(default)]
    pub spec: serde_json::Value,
}

/// Desired state, settable by the owning user.
///
/// Optional fields left `None` are filled by the admission defaulter before
/// the object is persisted; the reconciler may still see `None` for objects
/// that bypassed admission (tests do this deliberately).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    /// Five-field cron expression: minute hour day-of-month month day-of-week.
    pub cron: String,
    #[serde(default)]
    pub template: WorkUnitTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency_policy: Option<ConcurrencyPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    /// Maximum staleness (seconds) allowed for a missed run before it is
    /// abandoned rather than caught up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub starting_deadline_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub successful_history_limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_history_limit: Option<u32>,
}

/// Reference to an active work-unit, recorded in schedule status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkUnitRef {
    pub namespace: String,
    pub name: String,
}

/// Derived state, written only by the reconciler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStatus {
    /// Work-units whose completion state is not yet finished, ordered by
    /// creation time. Recomputed from ground truth every reconcile.
    #[serde(default)]
    pub active: Vec<WorkUnitRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_schedule_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_time: Option<DateTime<Utc>>,
}

/// The user-declared object describing when and what to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub meta: ObjectMeta,
    pub spec: ScheduleSpec,
    #[serde(default)]
    pub status: ScheduleStatus,
}

impl Schedule {
    pub fn key(&self) -> ScheduleKey {
        ScheduleKey::new(&self.meta.namespace, &self.meta.name)
    }
}

// ── Work-unit resource ──────────────────────────────────────────────

/// Completion state reported asynchronously by the external execution
/// platform. The controller only reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionState {
    Running,
    Succeeded,
    Failed,
}

impl CompletionState {
    pub fn is_finished(&self) -> bool {
        matches!(self, CompletionState::Succeeded | CompletionState::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnitStatus {
    pub state: CompletionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_time: Option<DateTime<Utc>>,
}

impl Default for WorkUnitStatus {
    fn default() -> Self {
        Self {
            state: CompletionState::Running,
            completion_time: None,
        }
    }
}

/// One transient execution spawned for a single due run of a schedule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    pub meta: ObjectMeta,
    /// Back-reference to the owning schedule. Deleting the schedule cascades
    /// deletion of its work-units via the platform's reference-counting GC.
    pub owner: ScheduleKey,
    /// The run time this unit was created for.
    pub scheduled_at: DateTime<Utc>,
    /// Payload copied verbatim from the schedule's template.
    #[serde(default)]
    pub spec: serde_json::Value,
    #[serde(default)]
    pub status: WorkUnitStatus,
}

impl WorkUnit {
    pub fn reference(&self) -> WorkUnitRef {
        WorkUnitRef {
            namespace: self.meta.namespace.clone(),
            name: self.meta.name.clone(),
        }
    }
}

/// Deterministic work-unit name for one due run: `{schedule}-{unix-seconds}`,
/// truncated to the platform name ceiling.
///
/// Admission caps schedule names at `MAX_NAME_LEN - GENERATED_SUFFIX_LEN`, so
/// composed names normally fit without truncation; the clamp covers objects
/// persisted outside the admission path.
pub fn work_unit_name(schedule_name: &str, scheduled_at: DateTime<Utc>) -> String {
    let mut name = format!("{}-{}", schedule_name, scheduled_at.timestamp());
    name.truncate(MAX_NAME_LEN);
    name
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn work_unit_name_is_deterministic() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        assert_eq!(
            work_unit_name("backup", at),
            format!("backup-{}", at.timestamp())
        );
        assert_eq!(work_unit_name("backup", at), work_unit_name("backup", at));
    }

    #[test]
    fn work_unit_name_suffix_is_eleven_chars() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let name = work_unit_name("x", at);
        assert_eq!(name.len(), 1 + GENERATED_SUFFIX_LEN);
    }

    #[test]
    fn work_unit_name_truncates_at_ceiling() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let long = "a".repeat(80);
        assert_eq!(work_unit_name(&long, at).len(), MAX_NAME_LEN);
    }

    #[test]
    fn max_length_admitted_name_composes_within_ceiling() {
        let at = Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap();
        let name = "a".repeat(MAX_NAME_LEN - GENERATED_SUFFIX_LEN);
        assert!(work_unit_name(&name, at).len() <= MAX_NAME_LEN);
    }

    #[test]
    fn concurrency_policy_round_trips() {
        for policy in [
            ConcurrencyPolicy::Allow,
            ConcurrencyPolicy::Forbid,
            ConcurrencyPolicy::Replace,
        ] {
            assert_eq!(policy.to_string().parse::<ConcurrencyPolicy>(), Ok(policy));
        }
        assert!("Sometimes".parse::<ConcurrencyPolicy>().is_err());
    }

    #[test]
    fn schedule_key_display() {
        assert_eq!(ScheduleKey::new("default", "backup").to_string(), "default/backup");
    }
}
