//! The reconcile pass: converts one schedule's declared intent into concrete
//! work-unit lifecycle actions.
//!
//! Each pass runs a fixed sequence — load, observe/prune/status, suspend
//! check, missed-run math, concurrency policy, create, requeue — and is
//! replay-safe: everything it derives comes from a fresh read of the store,
//! and a duplicate create is treated as success.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use metronome_core::{
    work_unit_name, ConcurrencyPolicy, MetronomeError, ObjectMeta, Schedule, ScheduleKey,
    WorkUnit,
};
use metronome_store::ObjectStore;

use crate::clock::Clock;
use crate::cron_math::{due_runs, parse_cron};
use crate::history;

/// What the runner should do with the key after a clean pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Re-enqueue the key after this delay (time until the next fire).
    RequeueAfter(Duration),
    /// Nothing to wake up for: suspended, or the schedule never fires again.
    /// A watch event re-triggers when anything changes.
    Idle,
    /// The schedule no longer exists; drop the key entirely.
    Gone,
}

pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    clock: Arc<dyn Clock>,
    /// Catch-up bound: with more missed runs than this, only the most recent
    /// due time executes.
    max_catch_up: usize,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ObjectStore>, clock: Arc<dyn Clock>, max_catch_up: usize) -> Self {
        Self {
            store,
            clock,
            max_catch_up,
        }
    }

    /// Run one reconcile pass for `key`.
    ///
    /// Transient store errors abort the pass and bubble up for backoff
    /// re-enqueue; a vanished schedule or child is benign.
    pub async fn reconcile(&self, key: &ScheduleKey) -> Result<ReconcileOutcome, MetronomeError> {
        let now = self.clock.now();

        // 1. Load.
        let schedule = match self.store.get_schedule(key).await {
            Ok(schedule) => schedule,
            Err(e) if e.is_not_found() => {
                debug!(key = %key, "schedule gone, dropping key");
                return Ok(ReconcileOutcome::Gone);
            }
            Err(e) => return Err(e),
        };

        // 2. Observe: classify children from ground truth, prune history,
        // recompute status.
        let children = self.store.list_owned_work_units(key).await?;
        let classified = history::classify(children);

        for target in history::prune_targets(
            &classified.succeeded,
            &classified.failed,
            schedule.spec.successful_history_limit,
            schedule.spec.failed_history_limit,
        ) {
            match self
                .store
                .delete_work_unit(&target.meta.namespace, &target.meta.name)
                .await
            {
                Ok(()) => info!(key = %key, unit = %target.meta.name, "pruned work-unit beyond history limit"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }

        let mut status = history::update_status(&schedule, &classified);
        if status != schedule.status {
            self.store.update_schedule_status(key, status.clone()).await?;
        }

        // 3. Suspend check.
        if schedule.spec.suspend == Some(true) {
            debug!(key = %key, "schedule suspended, not scheduling");
            return Ok(ReconcileOutcome::Idle);
        }

        // 4. Missed-run computation.
        let cron_schedule = parse_cron(&schedule.spec.cron).map_err(|e| {
            // Admission rejects these; seeing one here means the object
            // bypassed validation.
            MetronomeError::Contract(format!("persisted schedule {key} has invalid cron: {e}"))
        })?;

        let mut earliest = status
            .last_schedule_time
            .unwrap_or(schedule.meta.creation_timestamp);
        if let Some(deadline) = schedule.spec.starting_deadline_seconds {
            let cutoff = now - chrono::Duration::seconds(deadline);
            if cutoff > earliest {
                earliest = cutoff;
            }
        }

        let due = due_runs(&cron_schedule, earliest, now, self.max_catch_up);
        if due.skipped > 0 {
            info!(
                key = %key,
                skipped = due.skipped,
                capped = due.capped,
                "abandoning missed runs (catch-up bound or starting deadline)"
            );
        }

        let Some(run_at) = due.last_due else {
            return Ok(Self::requeue(due.next, now));
        };

        // 5. Concurrency policy.
        let policy = schedule
            .spec
            .concurrency_policy
            .unwrap_or(ConcurrencyPolicy::Allow);
        match policy {
            ConcurrencyPolicy::Allow => {}
            ConcurrencyPolicy::Forbid => {
                if !classified.active.is_empty() {
                    info!(
                        key = %key,
                        active = classified.active.len(),
                        "active run present and policy is Forbid, skipping this run"
                    );
                    return Ok(Self::requeue(due.next, now));
                }
            }
            ConcurrencyPolicy::Replace => {
                for unit in &classified.active {
                    match self
                        .store
                        .delete_work_unit(&unit.meta.namespace, &unit.meta.name)
                        .await
                    {
                        Ok(()) => info!(key = %key, unit = %unit.meta.name, "replacing active work-unit"),
                        Err(e) if e.is_not_found() => {}
                        Err(e) => return Err(e),
                    }
                }
                status.active.clear();
            }
        }

        // 6. Create the work-unit for the due run.
        let unit = self.build_work_unit(&schedule, run_at);
        let unit_ref = unit.reference();
        match self.store.create_work_unit(unit).await {
            Ok(()) => info!(key = %key, unit = %unit_ref.name, run_at = %run_at, "created work-unit"),
            Err(e) if e.is_already_exists() => {
                // Duplicate fire of the same scheduled time; the earlier
                // create already did the work.
                debug!(key = %key, unit = %unit_ref.name, "work-unit already exists, replaying as success");
            }
            Err(e) => {
                warn!(key = %key, error = %e, "work-unit create failed");
                return Err(e);
            }
        }

        status.last_schedule_time = Some(run_at);
        // On the replay path the unit already exists as Running and was
        // classified into the active set; don't record it twice.
        if !status.active.contains(&unit_ref) {
            status.active.push(unit_ref);
        }
        self.store.update_schedule_status(key, status).await?;

        // 7. Requeue at the next fire time.
        Ok(Self::requeue(due.next, now))
    }

    fn requeue(next: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ReconcileOutcome {
        match next {
            Some(next) => ReconcileOutcome::RequeueAfter(
                (next - now).to_std().unwrap_or(Duration::ZERO),
            ),
            None => ReconcileOutcome::Idle,
        }
    }

    fn build_work_unit(&self, schedule: &Schedule, run_at: DateTime<Utc>) -> WorkUnit {
        WorkUnit {
            meta: ObjectMeta {
                namespace: schedule.meta.namespace.clone(),
                name: work_unit_name(&schedule.meta.name, run_at),
                creation_timestamp: self.clock.now(),
            },
            owner: schedule.key(),
            scheduled_at: run_at,
            spec: schedule.spec.template.spec.clone(),
            status: Default::default(),
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use metronome_core::{
        CompletionState, ScheduleSpec, ScheduleStatus, WorkUnitStatus, WorkUnitTemplate,
    };
    use metronome_store::MemoryStore;

    use crate::clock::FixedClock;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 15, 10, 0, 0).unwrap()
    }

    fn schedule_at(cron: &str, created: DateTime<Utc>) -> Schedule {
        Schedule {
            meta: ObjectMeta {
                namespace: "default".to_string(),
                name: "backup".to_string(),
                creation_timestamp: created,
            },
            spec: ScheduleSpec {
                cron: cron.to_string(),
                template: WorkUnitTemplate {
                    spec: serde_json::json!({"command": ["sleep", "3600"]}),
                },
                concurrency_policy: Some(ConcurrencyPolicy::Allow),
                suspend: Some(false),
                starting_deadline_seconds: None,
                successful_history_limit: Some(3),
                failed_history_limit: Some(1),
            },
            status: ScheduleStatus::default(),
        }
    }

    fn running_unit(name: &str, owner: &ScheduleKey, created: DateTime<Utc>) -> WorkUnit {
        WorkUnit {
            meta: ObjectMeta {
                namespace: "default".to_string(),
                name: name.to_string(),
                creation_timestamp: created,
            },
            owner: owner.clone(),
            scheduled_at: created,
            spec: serde_json::Value::Null,
            status: Default::default(),
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        clock: Arc<FixedClock>,
        reconciler: Reconciler,
        key: ScheduleKey,
    }

    fn harness(now: DateTime<Utc>) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(FixedClock::new(now));
        let reconciler = Reconciler::new(store.clone(), clock.clone(), 100);
        Harness {
            store,
            clock,
            reconciler,
            key: ScheduleKey::new("default", "backup"),
        }
    }

    #[tokio::test]
    async fn missing_schedule_is_gone_not_error() {
        let h = harness(base_time());
        let outcome = h.reconciler.reconcile(&h.key).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Gone);
    }

    #[tokio::test]
    async fn fresh_schedule_waits_for_first_fire() {
        // Created at 10:00:00 with "*/5": nothing due, requeue at 10:05.
        let h = harness(base_time());
        h.store
            .create_schedule(schedule_at("*/5 * * * *", base_time()))
            .await
            .unwrap();

        let outcome = h.reconciler.reconcile(&h.key).await.unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::RequeueAfter(Duration::from_secs(300))
        );
        assert!(h
            .store
            .list_owned_work_units(&h.key)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn due_run_creates_one_work_unit_and_records_time() {
        let h = harness(base_time());
        h.store
            .create_schedule(schedule_at("*/5 * * * *", base_time()))
            .await
            .unwrap();

        h.clock.set(base_time() + chrono::Duration::minutes(6));
        h.reconciler.reconcile(&h.key).await.unwrap();

        let units = h.store.list_owned_work_units(&h.key).await.unwrap();
        assert_eq!(units.len(), 1);
        let run_at = base_time() + chrono::Duration::minutes(5);
        assert_eq!(units[0].scheduled_at, run_at);
        assert_eq!(units[0].meta.name, work_unit_name("backup", run_at));
        assert_eq!(units[0].spec, serde_json::json!({"command": ["sleep", "3600"]}));

        let schedule = h.store.get_schedule(&h.key).await.unwrap();
        assert_eq!(schedule.status.last_schedule_time, Some(run_at));
        assert_eq!(schedule.status.active.len(), 1);
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_for_the_same_due_time() {
        let h = harness(base_time());
        h.store
            .create_schedule(schedule_at("*/5 * * * *", base_time()))
            .await
            .unwrap();

        h.clock.set(base_time() + chrono::Duration::minutes(6));
        h.reconciler.reconcile(&h.key).await.unwrap();
        // Replay at the same instant: last_schedule_time excludes the run.
        h.reconciler.reconcile(&h.key).await.unwrap();

        assert_eq!(h.store.list_owned_work_units(&h.key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn replayed_create_keeps_active_references_unique() {
        // The unit for the due run already exists (an earlier pass created it
        // but crashed before writing status). The replay must not record it
        // in the active set a second time.
        let h = harness(base_time());
        h.store
            .create_schedule(schedule_at("*/5 * * * *", base_time()))
            .await
            .unwrap();
        let run_at = base_time() + chrono::Duration::minutes(5);
        h.store
            .create_work_unit(running_unit(
                &work_unit_name("backup", run_at),
                &h.key,
                run_at,
            ))
            .await
            .unwrap();

        h.clock.set(run_at + chrono::Duration::minutes(1));
        h.reconciler.reconcile(&h.key).await.unwrap();

        let status = h.store.get_schedule(&h.key).await.unwrap().status;
        assert_eq!(status.active.len(), 1);
        assert_eq!(status.active[0].name, work_unit_name("backup", run_at));
        assert_eq!(status.last_schedule_time, Some(run_at));
        assert_eq!(h.store.list_owned_work_units(&h.key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn suspended_schedule_skips_scheduling_but_updates_status() {
        let h = harness(base_time());
        let mut schedule = schedule_at("*/5 * * * *", base_time());
        schedule.spec.suspend = Some(true);
        h.store.create_schedule(schedule).await.unwrap();

        // An externally created active unit should still land in status.
        h.store
            .create_work_unit(running_unit("manual", &h.key, base_time()))
            .await
            .unwrap();

        h.clock.set(base_time() + chrono::Duration::minutes(30));
        let outcome = h.reconciler.reconcile(&h.key).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::Idle);
        let schedule = h.store.get_schedule(&h.key).await.unwrap();
        assert_eq!(schedule.status.active.len(), 1);
        // No run executed while suspended.
        assert_eq!(schedule.status.last_schedule_time, None);
        assert_eq!(h.store.list_owned_work_units(&h.key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn forbid_skips_run_while_active_present() {
        let h = harness(base_time());
        let mut schedule = schedule_at("*/5 * * * *", base_time());
        schedule.spec.concurrency_policy = Some(ConcurrencyPolicy::Forbid);
        h.store.create_schedule(schedule).await.unwrap();
        h.store
            .create_work_unit(running_unit("still-running", &h.key, base_time()))
            .await
            .unwrap();

        h.clock.set(base_time() + chrono::Duration::minutes(6));
        h.reconciler.reconcile(&h.key).await.unwrap();

        // Zero new units; active unchanged in count.
        let units = h.store.list_owned_work_units(&h.key).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].meta.name, "still-running");
        let schedule = h.store.get_schedule(&h.key).await.unwrap();
        assert_eq!(schedule.status.active.len(), 1);
        assert_eq!(schedule.status.last_schedule_time, None);
    }

    #[tokio::test]
    async fn replace_deletes_active_then_creates_new() {
        let h = harness(base_time());
        let mut schedule = schedule_at("*/5 * * * *", base_time());
        schedule.spec.concurrency_policy = Some(ConcurrencyPolicy::Replace);
        h.store.create_schedule(schedule).await.unwrap();
        h.store
            .create_work_unit(running_unit("superseded", &h.key, base_time()))
            .await
            .unwrap();

        h.clock.set(base_time() + chrono::Duration::minutes(6));
        h.reconciler.reconcile(&h.key).await.unwrap();

        let units = h.store.list_owned_work_units(&h.key).await.unwrap();
        assert_eq!(units.len(), 1);
        let run_at = base_time() + chrono::Duration::minutes(5);
        assert_eq!(units[0].meta.name, work_unit_name("backup", run_at));

        let schedule = h.store.get_schedule(&h.key).await.unwrap();
        assert_eq!(schedule.status.active.len(), 1);
        assert_eq!(schedule.status.active[0].name, units[0].meta.name);
    }

    #[tokio::test]
    async fn history_pruning_deletes_oldest_excess() {
        let h = harness(base_time());
        h.store
            .create_schedule(schedule_at("*/5 * * * *", base_time()))
            .await
            .unwrap();

        // 5 succeeded units, oldest first; limit is 3.
        for i in 0..5 {
            let created = base_time() - chrono::Duration::minutes(50 - i * 10);
            let mut unit = running_unit(&format!("old-{i}"), &h.key, created);
            unit.status = WorkUnitStatus {
                state: CompletionState::Succeeded,
                completion_time: Some(created + chrono::Duration::minutes(1)),
            };
            h.store.create_work_unit(unit).await.unwrap();
        }

        h.reconciler.reconcile(&h.key).await.unwrap();

        let remaining: Vec<String> = h
            .store
            .list_owned_work_units(&h.key)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.meta.name)
            .collect();
        assert_eq!(remaining, vec!["old-2", "old-3", "old-4"]);
    }

    #[tokio::test]
    async fn missed_runs_beyond_deadline_are_abandoned() {
        // Created an hour ago, hourly-ish misses, deadline of 2 minutes:
        // the only catchable run is one within the deadline window.
        let created = base_time() - chrono::Duration::hours(1);
        let h = harness(base_time());
        let mut schedule = schedule_at("*/5 * * * *", created);
        schedule.spec.starting_deadline_seconds = Some(120);
        h.store.create_schedule(schedule).await.unwrap();

        // now = 10:01:00; within the 2-minute deadline only 10:00 is due.
        h.clock.set(base_time() + chrono::Duration::minutes(1));
        h.reconciler.reconcile(&h.key).await.unwrap();

        let units = h.store.list_owned_work_units(&h.key).await.unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].scheduled_at, base_time());
    }

    #[tokio::test]
    async fn deadline_with_no_run_inside_window_skips_entirely() {
        let created = base_time() - chrono::Duration::hours(2);
        let h = harness(base_time());
        let mut schedule = schedule_at("0 * * * *", created);
        schedule.spec.starting_deadline_seconds = Some(60);
        h.store.create_schedule(schedule).await.unwrap();

        // now = 10:30; last fire 10:00 is outside the 1-minute deadline.
        h.clock.set(base_time() + chrono::Duration::minutes(30));
        let outcome = h.reconciler.reconcile(&h.key).await.unwrap();

        assert!(h
            .store
            .list_owned_work_units(&h.key)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            outcome,
            ReconcileOutcome::RequeueAfter(Duration::from_secs(30 * 60))
        );
    }

    #[tokio::test]
    async fn status_active_reflects_externally_completed_units() {
        let h = harness(base_time());
        h.store
            .create_schedule(schedule_at("*/5 * * * *", base_time()))
            .await
            .unwrap();
        h.store
            .create_work_unit(running_unit("job-1", &h.key, base_time()))
            .await
            .unwrap();

        h.reconciler.reconcile(&h.key).await.unwrap();
        assert_eq!(h.store.get_schedule(&h.key).await.unwrap().status.active.len(), 1);

        // The platform reports completion; the next pass drops it from active.
        let done_at = base_time() + chrono::Duration::minutes(1);
        h.store
            .update_work_unit_status(
                "default",
                "job-1",
                WorkUnitStatus {
                    state: CompletionState::Succeeded,
                    completion_time: Some(done_at),
                },
            )
            .await
            .unwrap();
        h.clock.set(base_time() + chrono::Duration::minutes(2));
        h.reconciler.reconcile(&h.key).await.unwrap();

        let status = h.store.get_schedule(&h.key).await.unwrap().status;
        assert!(status.active.is_empty());
        assert_eq!(status.last_successful_time, Some(done_at));
    }
}
