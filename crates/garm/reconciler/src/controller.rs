//! Controller: drives a reconciler from a work queue

use crate::error::ReconcileError;
use crate::queue::WorkQueue;
use async_trait::async_trait;
use garm_types::ObjectKey;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// What to do with a key after a successful pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Action {
    requeue_after: Option<Duration>,
}

impl Action {
    /// Reconcile again after `after`
    pub fn requeue(after: Duration) -> Self {
        Self {
            requeue_after: Some(after),
        }
    }

    /// Nothing to do until the object changes
    pub fn await_change() -> Self {
        Self {
            requeue_after: None,
        }
    }

    pub fn requeue_after(&self) -> Option<Duration> {
        self.requeue_after
    }
}

/// Converges one kind of object
#[async_trait]
pub trait Reconciler: Send + Sync + 'static {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// One pass over the object at `key`
    async fn reconcile(&self, key: &ObjectKey) -> Result<Action, ReconcileError>;
}

/// Runs a bounded pool of workers over a queue
pub struct Controller<R: Reconciler> {
    reconciler: Arc<R>,
    queue: WorkQueue<ObjectKey>,
    workers: usize,
}

impl<R: Reconciler> Controller<R> {
    pub fn new(reconciler: Arc<R>, queue: WorkQueue<ObjectKey>, workers: usize) -> Self {
        Self {
            reconciler,
            queue,
            workers: workers.max(1),
        }
    }

    pub fn queue(&self) -> WorkQueue<ObjectKey> {
        self.queue.clone()
    }

    /// Process keys until cancelled
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(
            controller = self.reconciler.name(),
            workers = self.workers,
            "Controller started"
        );

        let mut handles = Vec::with_capacity(self.workers);
        for worker in 0..self.workers {
            let reconciler = self.reconciler.clone();
            let queue = self.queue.clone();
            handles.push(tokio::spawn(async move {
                while let Some(key) = queue.get().await {
                    process(reconciler.as_ref(), &queue, &key)
                        .instrument(tracing::info_span!(
                            "reconcile",
                            controller = reconciler.name(),
                            worker,
                            key = %key
                        ))
                        .await;
                    queue.done(&key).await;
                }
            }));
        }

        cancel.cancelled().await;
        self.queue.shutdown().await;

        for handle in handles {
            if let Err(e) = handle.await {
                tracing::error!(controller = self.reconciler.name(), error = %e, "Worker panicked");
            }
        }

        tracing::info!(controller = self.reconciler.name(), "Controller stopped");
    }
}

/// One pass plus its re-queue decision
pub async fn process<R: Reconciler + ?Sized>(
    reconciler: &R,
    queue: &WorkQueue<ObjectKey>,
    key: &ObjectKey,
) {
    match reconciler.reconcile(key).await {
        Ok(action) => {
            queue.forget(key);
            if let Some(after) = action.requeue_after() {
                tracing::debug!(requeue_after = ?after, "Reconciled");
                queue.add_after(key.clone(), after);
            } else {
                tracing::debug!("Reconciled");
            }
        }
        Err(e) => {
            let delay = queue.add_rate_limited(key.clone());
            if e.is_permanent() {
                tracing::warn!(error = %e, retry_in = ?delay, "Reconcile failed on invalid input");
            } else {
                tracing::error!(error = %e, retry_in = ?delay, "Reconcile failed");
            }
        }
    }
}
