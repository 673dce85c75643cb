//! Keyed work queue: immediate enqueue, delayed (timer-based) enqueue, and
//! per-key in-flight deduplication.
//!
//! Guarantees at-most-one in-flight reconcile per key: an enqueue of a key
//! that is currently being processed is coalesced into a "dirty" mark and
//! redelivered after [`WorkQueue::done`], never run concurrently. Delayed
//! enqueues are a re-insertion at a deadline, not a blocking sleep — workers
//! keep draining other keys while timers pend. Transient failures re-enqueue
//! with per-key exponential backoff, reset by [`WorkQueue::forget`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::trace;

use metronome_core::ScheduleKey;

struct Inner {
    /// Keys ready for delivery, FIFO.
    ready: VecDeque<ScheduleKey>,
    /// Membership set for `ready`.
    queued: HashSet<ScheduleKey>,
    /// Keys currently held by a worker.
    processing: HashSet<ScheduleKey>,
    /// Processing keys that were re-enqueued meanwhile; redelivered on done().
    dirty: HashSet<ScheduleKey>,
    /// Pending timer per key; only the soonest deadline is kept.
    delayed: HashMap<ScheduleKey, Instant>,
    /// Consecutive failure count per key, drives the backoff curve.
    failures: HashMap<ScheduleKey, u32>,
    shutdown: bool,
}

pub struct WorkQueue {
    inner: Mutex<Inner>,
    wake: Notify,
    backoff_base: Duration,
    backoff_max: Duration,
}

impl WorkQueue {
    pub fn new(backoff_base: Duration, backoff_max: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                queued: HashSet::new(),
                processing: HashSet::new(),
                dirty: HashSet::new(),
                delayed: HashMap::new(),
                failures: HashMap::new(),
                shutdown: false,
            }),
            wake: Notify::new(),
            backoff_base,
            backoff_max,
        }
    }

    /// Enqueue a key for immediate delivery. Cancels any pending timer for
    /// the key (the immediate wakeup supersedes it).
    pub fn insert(&self, key: ScheduleKey) {
        let mut inner = self.inner.lock().unwrap();
        if inner.shutdown {
            return;
        }
        inner.delayed.remove(&key);
        if inner.processing.contains(&key) {
            trace!(key = %key, "key in flight, marking dirty");
            inner.dirty.insert(key);
        } else if inner.queued.insert(key.clone()) {
            inner.ready.push_back(key);
        }
        drop(inner);
        self.wake.notify_waiters();
    }

    /// Enqueue a key for delivery after `delay`. If a sooner timer or an
    /// immediate enqueue is already pending, that one wins.
    pub fn insert_after(&self, key: ScheduleKey, delay: Duration) {
        if delay.is_zero() {
            self.insert(key);
            return;
        }
        let deadline = Instant::now() + delay;
        let mut inner = self.inner.lock().unwrap();
        if inner.shutdown || inner.queued.contains(&key) {
            return;
        }
        let slot = inner.delayed.entry(key).or_insert(deadline);
        if deadline < *slot {
            *slot = deadline;
        }
        drop(inner);
        self.wake.notify_waiters();
    }

    /// Re-enqueue after a transient failure, with exponential backoff.
    pub fn requeue_backoff(&self, key: ScheduleKey) {
        let attempts = {
            let mut inner = self.inner.lock().unwrap();
            let entry = inner.failures.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };
        let exp = attempts.saturating_sub(1).min(20);
        let delay = self
            .backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_max);
        trace!(key = %key, attempts, ?delay, "requeue with backoff");
        self.insert_after(key, delay);
    }

    /// Clear failure history and any pending timer for a key. Called after a
    /// clean terminal pass and when the schedule is gone.
    pub fn forget(&self, key: &ScheduleKey) {
        let mut inner = self.inner.lock().unwrap();
        inner.failures.remove(key);
        inner.delayed.remove(key);
    }

    /// Mark a delivered key as finished. If the key went dirty while in
    /// flight it is immediately redelivered.
    pub fn done(&self, key: &ScheduleKey) {
        let mut inner = self.inner.lock().unwrap();
        inner.processing.remove(key);
        if inner.dirty.remove(key) && inner.queued.insert(key.clone()) {
            inner.ready.push_back(key.clone());
        }
        drop(inner);
        self.wake.notify_waiters();
    }

    /// Stop delivering keys. Workers currently processing finish their pass;
    /// subsequent `next()` calls return None.
    pub fn shutdown(&self) {
        self.inner.lock().unwrap().shutdown = true;
        self.wake.notify_waiters();
    }

    /// Await the next key. Returns None once the queue is shut down.
    pub async fn next(&self) -> Option<ScheduleKey> {
        loop {
            // Register for wakeups before inspecting state, so an insert
            // between the check and the await is not lost.
            let notified = self.wake.notified();

            let deadline = {
                let mut inner = self.inner.lock().unwrap();
                Self::promote_due(&mut inner);
                if let Some(key) = inner.ready.pop_front() {
                    inner.queued.remove(&key);
                    inner.processing.insert(key.clone());
                    return Some(key);
                }
                if inner.shutdown {
                    return None;
                }
                inner.delayed.values().min().copied()
            };

            match deadline {
                Some(deadline) => {
                    tokio::select! {
                        _ = notified => {}
                        _ = tokio::time::sleep_until(deadline) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Move expired timers into the ready queue.
    fn promote_due(inner: &mut Inner) {
        let now = Instant::now();
        let due: Vec<ScheduleKey> = inner
            .delayed
            .iter()
            .filter(|(_, at)| **at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in due {
            inner.delayed.remove(&key);
            if inner.processing.contains(&key) {
                inner.dirty.insert(key);
            } else if inner.queued.insert(key.clone()) {
                inner.ready.push_back(key);
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
