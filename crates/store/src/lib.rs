//! Object-store contract consumed by the controller, plus an in-memory
//! implementation used by the controller binary and the integration tests.
//!
//! The store is the eventually-consistent external collaborator: it persists
//! schedules and work-units keyed by namespace+name, cascades work-unit
//! deletion when their owning schedule goes away, and fans out a
//! watch/notification stream that the controller turns into re-enqueues.

pub mod memory;

use async_trait::async_trait;
use tokio::sync::broadcast;

use metronome_core::{
    MetronomeError, Schedule, ScheduleKey, ScheduleStatus, WorkUnit, WorkUnitStatus,
};

pub use memory::MemoryStore;

pub type Result<T> = std::result::Result<T, MetronomeError>;

// ── Watch events ────────────────────────────────────────────────────

/// A change notification. Every variant names the schedule key it concerns so
/// the controller can enqueue it directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    ScheduleChanged(ScheduleKey),
    ScheduleDeleted(ScheduleKey),
    /// A work-unit owned by this schedule was created, deleted, or changed
    /// completion state.
    WorkUnitChanged { owner: ScheduleKey },
}

impl StoreEvent {
    /// The reconciliation key this event should wake up.
    pub fn key(&self) -> &ScheduleKey {
        match self {
            StoreEvent::ScheduleChanged(key) | StoreEvent::ScheduleDeleted(key) => key,
            StoreEvent::WorkUnitChanged { owner } => owner,
        }
    }
}

// ── Store contract ──────────────────────────────────────────────────

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get_schedule(&self, key: &ScheduleKey) -> Result<Schedule>;
    async fn create_schedule(&self, schedule: Schedule) -> Result<()>;
    async fn update_schedule(&self, schedule: Schedule) -> Result<()>;
    /// Deletes the schedule and cascades deletion of every work-unit whose
    /// owner back-reference points at it.
    async fn delete_schedule(&self, key: &ScheduleKey) -> Result<()>;
    /// Writes only the status block; the spec is left untouched.
    async fn update_schedule_status(&self, key: &ScheduleKey, status: ScheduleStatus)
        -> Result<()>;

    /// All work-units whose owner back-reference is `owner`, ordered by
    /// creation time.
    async fn list_owned_work_units(&self, owner: &ScheduleKey) -> Result<Vec<WorkUnit>>;
    async fn get_work_unit(&self, namespace: &str, name: &str) -> Result<WorkUnit>;
    async fn create_work_unit(&self, unit: WorkUnit) -> Result<()>;
    async fn delete_work_unit(&self, namespace: &str, name: &str) -> Result<()>;
    /// Completion state is reported by the external execution platform; the
    /// controller never calls this outside of tests.
    async fn update_work_unit_status(
        &self,
        namespace: &str,
        name: &str,
        status: WorkUnitStatus,
    ) -> Result<()>;

    /// Subscribe to the watch stream. Receivers that lag may miss events;
    /// the controller treats every event as a hint and re-reads ground truth.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
