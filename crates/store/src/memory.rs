//! In-memory [`ObjectStore`] with broadcast watch events.
//!
//! Emulates the external resource store closely enough for the controller
//! binary and the integration tests: duplicate creates fail with
//! AlreadyExists, schedule deletion cascades to owned work-units (standing in
//! for the platform's owner-reference garbage collector), and every mutation
//! fans out a [`StoreEvent`].

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use metronome_core::{
    MetronomeError, Schedule, ScheduleKey, ScheduleStatus, WorkUnit, WorkUnitStatus,
};

use crate::{ObjectStore, Result, StoreEvent};

/// Broadcast channel capacity; laggy receivers drop old events, which is fine
/// because events are hints, not state.
const EVENT_BUFFER: usize = 256;

#[derive(Default)]
struct State {
    schedules: HashMap<ScheduleKey, Schedule>,
    /// Keyed by (namespace, name).
    work_units: HashMap<(String, String), WorkUnit>,
}

pub struct MemoryStore {
    inner: RwLock<State>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            inner: RwLock::new(State::default()),
            events,
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No receivers is not an error.
        let _ = self.events.send(event);
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn get_schedule(&self, key: &ScheduleKey) -> Result<Schedule> {
        self.inner
            .read()
            .await
            .schedules
            .get(key)
            .cloned()
            .ok_or_else(|| MetronomeError::ScheduleNotFound(key.to_string()))
    }

    async fn create_schedule(&self, schedule: Schedule) -> Result<()> {
        let key = schedule.key();
        let mut state = self.inner.write().await;
        if state.schedules.contains_key(&key) {
            return Err(MetronomeError::AlreadyExists(key.to_string()));
        }
        state.schedules.insert(key.clone(), schedule);
        drop(state);
        debug!(key = %key, "schedule created");
        self.emit(StoreEvent::ScheduleChanged(key));
        Ok(())
    }

    async fn update_schedule(&self, schedule: Schedule) -> Result<()> {
        let key = schedule.key();
        let mut state = self.inner.write().await;
        if !state.schedules.contains_key(&key) {
            return Err(MetronomeError::ScheduleNotFound(key.to_string()));
        }
        state.schedules.insert(key.clone(), schedule);
        drop(state);
        self.emit(StoreEvent::ScheduleChanged(key));
        Ok(())
    }

    async fn delete_schedule(&self, key: &ScheduleKey) -> Result<()> {
        let mut state = self.inner.write().await;
        if state.schedules.remove(key).is_none() {
            return Err(MetronomeError::ScheduleNotFound(key.to_string()));
        }
        // Owner-reference cascade: the real platform's garbage collector
        // removes orphaned children; here we do it inline.
        state.work_units.retain(|_, unit| unit.owner != *key);
        drop(state);
        debug!(key = %key, "schedule deleted (cascading owned work-units)");
        self.emit(StoreEvent::ScheduleDeleted(key.clone()));
        Ok(())
    }

    async fn update_schedule_status(
        &self,
        key: &ScheduleKey,
        status: ScheduleStatus,
    ) -> Result<()> {
        let mut state = self.inner.write().await;
        let schedule = state
            .schedules
            .get_mut(key)
            .ok_or_else(|| MetronomeError::ScheduleNotFound(key.to_string()))?;
        schedule.status = status;
        drop(state);
        self.emit(StoreEvent::ScheduleChanged(key.clone()));
        Ok(())
    }

    async fn list_owned_work_units(&self, owner: &ScheduleKey) -> Result<Vec<WorkUnit>> {
        let state = self.inner.read().await;
        let mut units: Vec<WorkUnit> = state
            .work_units
            .values()
            .filter(|unit| unit.owner == *owner)
            .cloned()
            .collect();
        units.sort_by_key(|unit| unit.meta.creation_timestamp);
        Ok(units)
    }

    async fn get_work_unit(&self, namespace: &str, name: &str) -> Result<WorkUnit> {
        self.inner
            .read()
            .await
            .work_units
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| MetronomeError::WorkUnitNotFound(format!("{namespace}/{name}")))
    }

    async fn create_work_unit(&self, unit: WorkUnit) -> Result<()> {
        let id = (unit.meta.namespace.clone(), unit.meta.name.clone());
        let owner = unit.owner.clone();
        let mut state = self.inner.write().await;
        if state.work_units.contains_key(&id) {
            return Err(MetronomeError::AlreadyExists(format!("{}/{}", id.0, id.1)));
        }
        state.work_units.insert(id, unit);
        drop(state);
        self.emit(StoreEvent::WorkUnitChanged { owner });
        Ok(())
    }

    async fn delete_work_unit(&self, namespace: &str, name: &str) -> Result<()> {
        let id = (namespace.to_string(), name.to_string());
        let mut state = self.inner.write().await;
        match state.work_units.remove(&id) {
            Some(unit) => {
                drop(state);
                self.emit(StoreEvent::WorkUnitChanged { owner: unit.owner });
                Ok(())
            }
            None => Err(MetronomeError::WorkUnitNotFound(format!(
                "{namespace}/{name}"
            ))),
        }
    }

    async fn update_work_unit_status(
        &self,
        namespace: &str,
        name: &str,
        status: WorkUnitStatus,
    ) -> Result<()> {
        let id = (namespace.to_string(), name.to_string());
        let mut state = self.inner.write().await;
        let unit = state
            .work_units
            .get_mut(&id)
            .ok_or_else(|| MetronomeError::WorkUnitNotFound(format!("{namespace}/{name}")))?;
        unit.status = status;
        let owner = unit.owner.clone();
        drop(state);
        self.emit(StoreEvent::WorkUnitChanged { owner });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

// ── Tests ───────────────────────────────────────────────────────────
