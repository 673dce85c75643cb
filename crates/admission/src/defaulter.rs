//! Admission-time defaulting for unset optional schedule fields.

use metronome_core::config::AdmissionDefaults;
use metronome_core::ScheduleSpec;

/// Fill each unset optional field from the configured defaults.
///
/// Never overwrites an explicitly set value, and applying twice yields the
/// same result as once. The cron expression and template are never touched.
pub fn apply_defaults(spec: &mut ScheduleSpec, defaults: &AdmissionDefaults) {
    if spec.concurrency_policy.is_none() {
        spec.concurrency_policy = Some(defaults.concurrency_policy);
    }
    if spec.suspend.is_none() {
        spec.suspend = Some(defaults.suspend);
    }
    if spec.successful_history_limit.is_none() {
        spec.successful_history_limit = Some(defaults.successful_history_limit);
    }
    if spec.failed_history_limit.is_none() {
        spec.failed_history_limit = Some(defaults.failed_history_limit);
    }
}

// ── Tests ───────────────────────────────────────────────────────────
