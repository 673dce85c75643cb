//! The scheduling controller: turns persisted schedules into work-units at
//! their cron-declared times.
//!
//! Layout:
//! - [`clock`]: time source seam
//! - [`cron_math`]: due/missed-run computation
//! - [`history`]: child classification, pruning, status recomputation
//! - [`queue`]: keyed work queue with dedup, delay, and backoff
//! - [`reconciler`]: the per-schedule reconcile pass
//! - [`runner`]: watch pump + worker pool runtime
//! - [`manifests`]: YAML schedule manifests loaded at startup

pub mod clock;
pub mod cron_math;
pub mod history;
pub mod manifests;
pub mod queue;
pub mod reconciler;
pub mod runner;

pub use clock::{Clock, FixedClock, SystemClock};
pub use queue::WorkQueue;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use runner::Controller;
