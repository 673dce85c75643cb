//! Admission decision logic for schedule objects: defaulting, validation, and
//! the typed entry points the gateway transport calls into.
//!
//! The transport (HTTP routing, TLS, request decoding) lives outside this
//! crate; it hands us an already-decoded [`AdmissionObject`] and an
//! [`Operation`]. Objects arrive as a tagged variant rather than an opaque
//! value, so a wrong kind is rejected at the boundary as a contract error
//! instead of a runtime downcast failure.
//!
//! Defaulting and validation are pure with respect to the rest of the system:
//! they never enqueue work or touch child resources.

pub mod defaulter;
pub mod validation;

use thiserror::Error;
use tracing::info;

use metronome_core::config::AdmissionDefaults;
use metronome_core::{Schedule, WorkUnit};

pub use defaulter::apply_defaults;
pub use validation::{validate_schedule, ValidationError, ValidationResult};

// ── Entry-point types ───────────────────────────────────────────────

/// Operation the gateway is admitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
}

/// A decoded object arriving at the admission boundary.
#[derive(Debug, Clone)]
pub enum AdmissionObject {
    Schedule(Schedule),
    /// Work-units are created only by the reconciler and carry no admission
    /// logic; one arriving here is a gateway wiring mistake.
    WorkUnit(WorkUnit),
}

impl AdmissionObject {
    pub fn kind(&self) -> &'static str {
        match self {
            AdmissionObject::Schedule(_) => "Schedule",
            AdmissionObject::WorkUnit(_) => "WorkUnit",
        }
    }
}

/// Non-blocking advisories returned alongside an accept.
pub type Warnings = Vec<String>;

#[derive(Error, Debug)]
pub enum AdmissionError {
    /// User input malformed; carries every field error found.
    #[error("{name} is invalid: {}", format_errors(.errors))]
    Invalid {
        name: String,
        errors: Vec<ValidationError>,
    },

    /// Caller handed us the wrong resource kind. A contract violation, not a
    /// user-facing validation failure — fail fast, never retried.
    #[error("expected a {expected} object but got {got}")]
    UnexpectedKind {
        expected: &'static str,
        got: &'static str,
    },
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.path, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

// ── Gateway adapter ─────────────────────────────────────────────────

/// The decision half of the admission gateway: default, then validate.
pub struct AdmissionReview {
    defaults: AdmissionDefaults,
}

impl AdmissionReview {
    pub fn new(defaults: AdmissionDefaults) -> Self {
        Self { defaults }
    }

    /// Fill unset optional fields in place. Idempotent; only fails on a
    /// wrong-kind contract violation.
    pub fn on_default(&self, obj: &mut AdmissionObject) -> Result<(), AdmissionError> {
        match obj {
            AdmissionObject::Schedule(schedule) => {
                info!(key = %schedule.key(), "defaulting schedule");
                apply_defaults(&mut schedule.spec, &self.defaults);
                Ok(())
            }
            other => Err(AdmissionError::UnexpectedKind {
                expected: "Schedule",
                got: other.kind(),
            }),
        }
    }

    /// Validate the incoming object for the given operation.
    ///
    /// Create and Update validate the new object and aggregate all field
    /// errors into one rejection; Delete accepts without validation. `old` is
    /// carried for update-aware checks but unused today.
    pub fn on_validate(
        &self,
        op: Operation,
        _old: Option<&AdmissionObject>,
        new: &AdmissionObject,
    ) -> Result<Warnings, AdmissionError> {
        let schedule = match new {
            AdmissionObject::Schedule(schedule) => schedule,
            other => {
                return Err(AdmissionError::UnexpectedKind {
                    expected: "Schedule",
                    got: other.kind(),
                })
            }
        };

        match op {
            Operation::Delete => Ok(Vec::new()),
            Operation::Create | Operation::Update => {
                info!(key = %schedule.key(), op = ?op, "validating schedule");
                let result = validate_schedule(schedule);
                if result.valid {
                    Ok(result
                        .warnings
                        .into_iter()
                        .map(|w| format!("{}: {}", w.path, w.message))
                        .collect())
                } else {
                    Err(AdmissionError::Invalid {
                        name: schedule.meta.name.clone(),
                        errors: result.errors,
                    })
                }
            }
        }
    }

    /// Run the full admission decision: default, then validate. On success
    /// the returned schedule is what gets persisted.
    pub fn admit(&self, op: Operation, schedule: Schedule) -> Result<Schedule, AdmissionError> {
        let mut obj = AdmissionObject::Schedule(schedule);
        self.on_default(&mut obj)?;
        self.on_validate(op, None, &obj)?;
        match obj {
            AdmissionObject::Schedule(schedule) => Ok(schedule),
            other => Err(AdmissionError::UnexpectedKind {
                expected: "Schedule",
                got: other.kind(),
            }),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
