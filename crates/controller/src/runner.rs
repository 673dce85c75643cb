//! Controller runtime: watch pump, worker pool, graceful shutdown.
//!
//! One task pumps store events into the work queue; N workers drain it, each
//! running reconcile passes and feeding outcomes back as re-enqueues. A
//! shutdown notification stops the pump and drains the workers.

use std::sync::Arc;

use tokio::sync::{broadcast, Mutex, Notify};
use tracing::{debug, info, warn};

use metronome_core::config::ControllerConfig;
use metronome_store::{ObjectStore, StoreEvent};

use crate::clock::Clock;
use crate::queue::WorkQueue;
use crate::reconciler::{ReconcileOutcome, Reconciler};

pub struct Controller {
    queue: Arc<WorkQueue>,
    reconciler: Arc<Reconciler>,
    // Receiver created at construction so no event between new() and run()
    // is missed.
    events: Mutex<Option<broadcast::Receiver<StoreEvent>>>,
    workers: usize,
    shutdown: Arc<Notify>,
}

impl Controller {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        clock: Arc<dyn Clock>,
        config: &ControllerConfig,
    ) -> Self {
        let events = store.subscribe();
        let queue = Arc::new(WorkQueue::new(
            std::time::Duration::from_millis(config.backoff_base_ms),
            std::time::Duration::from_millis(config.backoff_max_ms),
        ));
        let reconciler = Arc::new(Reconciler::new(store, clock, config.max_catch_up));
        Self {
            queue,
            reconciler,
            events: Mutex::new(Some(events)),
            workers: config.workers,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Handle used to request a graceful stop from another task.
    pub fn shutdown_handle(&self) -> Arc<Notify> {
        self.shutdown.clone()
    }

    /// Run the watch pump and worker pool until shutdown is requested, then
    /// drain in-flight passes and return.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut events = self
            .events
            .lock()
            .await
            .take()
            .ok_or_else(|| anyhow::anyhow!("controller already running"))?;

        info!(workers = self.workers, "controller starting");

        let pump = {
            let queue = self.queue.clone();
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        event = events.recv() => match event {
                            Ok(event) => {
                                debug!(key = %event.key(), ?event, "watch event");
                                queue.insert(event.key().clone());
                            }
                            Err(broadcast::error::RecvError::Lagged(missed)) => {
                                // Events are hints; a reconcile re-reads
                                // ground truth, so lag is survivable.
                                warn!(missed, "watch stream lagged");
                            }
                            Err(broadcast::error::RecvError::Closed) => break,
                        },
                        _ = shutdown.notified() => break,
                    }
                }
                queue.shutdown();
            })
        };

        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let queue = self.queue.clone();
            let reconciler = self.reconciler.clone();
            handles.push(tokio::spawn(async move {
                while let Some(key) = queue.next().await {
                    match reconciler.reconcile(&key).await {
                        Ok(ReconcileOutcome::RequeueAfter(delay)) => {
                            queue.forget(&key);
                            queue.insert_after(key.clone(), delay);
                        }
                        Ok(ReconcileOutcome::Idle) | Ok(ReconcileOutcome::Gone) => {
                            queue.forget(&key);
                        }
                        Err(e) => {
                            warn!(worker, key = %key, error = %e, "reconcile failed, backing off");
                            queue.requeue_backoff(key.clone());
                        }
                    }
                    queue.done(&key);
                }
                debug!(worker, "worker draining complete");
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
        let _ = pump.await;

        info!("controller stopped");
        Ok(())
    }
}
