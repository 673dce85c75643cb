//! Schedule validation: cron grammar and name-length checks with structured,
//! field-pathed errors.
//!
//! Returns a [`ValidationResult`] aggregating every error found (admission
//! rejections report all field errors in one response, not just the first).

use serde::{Deserialize, Serialize};

use metronome_core::{cron_expr, Schedule, GENERATED_SUFFIX_LEN, MAX_NAME_LEN};

// ── Result types ────────────────────────────────────────────────────

/// Overall validation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// A blocking validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationError {
    /// JSON-path-like location, e.g. `"spec.cron"`.
    pub path: String,
    pub message: String,
}

/// A non-blocking advisory warning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationResult {
    pub(crate) fn new() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.valid = false;
        self.errors.push(ValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    pub(crate) fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(ValidationWarning {
            path: path.into(),
            message: message.into(),
        });
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Validate a schedule object: cron grammar plus name length.
pub fn validate_schedule(schedule: &Schedule) -> ValidationResult {
    let mut result = ValidationResult::new();
    validate_name(&schedule.meta.name, &mut result);
    validate_cron(&schedule.spec.cron, &mut result);
    validate_deadline(schedule.spec.starting_deadline_seconds, &mut result);
    result
}

/// Maximum admissible schedule name length.
///
/// The reconciler appends an 11-character `-{unix-seconds}` suffix when
/// generating work-unit names, and the composed name must stay within the
/// 63-character platform ceiling — so schedule names cap at 52. Checked here
/// so it never surfaces as a runtime create failure.
pub const MAX_SCHEDULE_NAME_LEN: usize = MAX_NAME_LEN - GENERATED_SUFFIX_LEN;

fn validate_name(name: &str, result: &mut ValidationResult) {
    if name.len() > MAX_SCHEDULE_NAME_LEN {
        result.error(
            "meta.name",
            format!("must be no more than {MAX_SCHEDULE_NAME_LEN} characters"),
        );
    }
    if name.is_empty() {
        result.error("meta.name", "must not be empty");
    }
}

fn validate_cron(expr: &str, result: &mut ValidationResult) {
    let fields = expr.split_whitespace().count();
    if fields != 5 {
        result.error(
            "spec.cron",
            format!("cron must have exactly 5 fields (min hour dom month dow), got {fields}"),
        );
        return;
    }

    // The shared normalization (seconds column, day-of-week numbering) keeps
    // what admission accepts in lockstep with what the scheduler executes.
    // The parser's message carries the offending detail.
    if let Err(e) = cron_expr::parse_cron(expr) {
        result.error("spec.cron", format!("invalid cron expression: {e}"));
    }
}

fn validate_deadline(deadline: Option<i64>, result: &mut ValidationResult) {
    match deadline {
        Some(d) if d < 0 => {
            result.error("spec.starting_deadline_seconds", "must not be negative");
        }
        // A deadline shorter than the reconcile cadence means nearly every
        // run lands outside its window and gets abandoned.
        Some(d) if d < 10 => {
            result.warn(
                "spec.starting_deadline_seconds",
                "deadlines under 10 seconds will cause most runs to be missed",
            );
        }
        _ => {}
    }
}

// ── Tests ───────────────────────────────────────────────────────────
