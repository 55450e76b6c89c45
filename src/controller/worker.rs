use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::cache::Indexer;
use crate::committer::Committer;
use crate::committer::SubResource;
use crate::metrics::RECONCILE_DURATION;
use crate::metrics::RECONCILE_TOTAL;
use crate::queue::WorkQueue;
use crate::reconciler::ReconcileOutcome;
use crate::reconciler::Reconciler;
use crate::utils::async_task::spawn_task;
use crate::ObjectKey;
use crate::Resource;
use crate::Result;

/// How a successfully processed key leaves the queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Done,
    Requeue,
}

/// Worker pool driving reconciliation passes for one primary resource.
pub struct Controller<R: Resource> {
    name: String,
    queue: Arc<WorkQueue>,
    indexer: Arc<Indexer<R>>,
    reconciler: Arc<dyn Reconciler<R>>,
    committer: Committer,
}

impl<R: Resource> Controller<R> {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<WorkQueue>,
        indexer: Arc<Indexer<R>>,
        reconciler: Arc<dyn Reconciler<R>>,
        committer: Committer,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            indexer,
            reconciler,
            committer,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Runs `workers` workers until `shutdown` fires, then drains the queue.
    pub async fn run(
        self: Arc<Self>,
        workers: usize,
        mut shutdown: watch::Receiver<()>,
    ) -> Result<()> {
        info!(controller = %self.name, workers, "starting workers");

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers {
            let controller = self.clone();
            spawn_task(
                &format!("{}-worker-{i}", self.name),
                move || async move {
                    while controller.process_next_work_item().await {}
                    Ok(())
                },
                Some(&mut handles),
            );
        }

        let _ = shutdown.changed().await;
        info!(controller = %self.name, "shutting down workers");
        self.queue.shut_down();
        for handle in handles {
            handle.await?;
        }
        info!(controller = %self.name, "workers stopped");
        Ok(())
    }

    /// Takes one key off the queue and processes it.
    ///
    /// Returns `false` once the queue is shut down.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        let start = Instant::now();
        let result = self.process(&key).await;
        RECONCILE_DURATION
            .with_label_values(&[&self.name])
            .observe(start.elapsed().as_secs_f64());

        match result {
            Ok(ProcessOutcome::Done) => {
                self.record("success");
                self.queue.forget(&key);
                self.queue.done(&key);
            }
            Ok(ProcessOutcome::Requeue) => {
                self.record("requeue");
                debug!(controller = %self.name, key = %key, "requeue");
                self.queue.done(&key);
                self.queue.add(&key);
            }
            Err(e) if e.is_not_found() => {
                self.record("not_found");
                debug!(controller = %self.name, key = %key, "object deleted during reconcile: {}", e);
                self.queue.forget(&key);
                self.queue.done(&key);
            }
            Err(e) if e.is_retryable() => {
                self.record("error");
                warn!(
                    controller = %self.name,
                    key = %key,
                    requeues = self.queue.num_requeues(&key),
                    "reconcile failed, requeuing with backoff: {}",
                    e
                );
                self.queue.add_rate_limited(&key);
                self.queue.done(&key);
            }
            Err(e) => {
                self.record("dropped");
                error!(controller = %self.name, key = %key, "dropping key: {}", e);
                self.queue.forget(&key);
                self.queue.done(&key);
            }
        }
        true
    }

    /// One reconciliation pass over the object behind `key`.
    pub async fn process(
        &self,
        key: &str,
    ) -> Result<ProcessOutcome> {
        ObjectKey::parse(key)?;

        let Some(current) = self.indexer.get_by_key(key) else {
            debug!(controller = %self.name, key, "object not found, dropping");
            return Ok(ProcessOutcome::Done);
        };
        debug!(
            controller = %self.name,
            key,
            resource_version = current.resource_version(),
            "processing"
        );

        let old = R::clone(&current);
        let mut obj = old.clone();

        if self.reconciler.reconcile_status(&mut obj).await? == ReconcileOutcome::StopAndRequeue {
            return Ok(ProcessOutcome::Requeue);
        }
        if let Some(version) = self
            .committer
            .commit(SubResource::Status, &old, &obj)
            .await?
        {
            obj.meta_mut().resource_version = version;
        }

        if self.reconciler.reconcile_spec(&mut obj).await? == ReconcileOutcome::StopAndRequeue {
            return Ok(ProcessOutcome::Requeue);
        }
        self.committer.commit(SubResource::Spec, &old, &obj).await?;

        Ok(ProcessOutcome::Done)
    }

    fn record(
        &self,
        result: &str,
    ) {
        RECONCILE_TOTAL
            .with_label_values(&[&self.name, result])
            .inc();
    }
}
