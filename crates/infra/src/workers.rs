//! Dispatch worker pool.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, info, warn};

use crate::dispatcher::TaskDispatcher;
use crate::error::{DispatchError, EngineError};
use crate::queue::{PickJob, PickQueue};
use crate::retry::RetryPolicy;

/// N threads pulling pending picks off the queue.
///
/// Transient errors (no robot, lost claim race) go back on the queue with backoff
/// until the retry policy gives up; the unit then stays PENDING_PICK and is counted
/// as abandoned. Jams and timeouts are final: the dispatcher already escalated them.
#[derive(Debug)]
pub struct DispatchPool {
    workers: Vec<thread::JoinHandle<()>>,
    abandoned: Arc<AtomicU64>,
}

impl DispatchPool {
    pub fn spawn(
        size: usize,
        queue: Arc<PickQueue>,
        dispatcher: Arc<TaskDispatcher>,
        retry: RetryPolicy,
    ) -> Result<Self, EngineError> {
        let abandoned = Arc::new(AtomicU64::new(0));
        let mut workers = Vec::with_capacity(size);

        for index in 0..size.max(1) {
            let queue = Arc::clone(&queue);
            let dispatcher = Arc::clone(&dispatcher);
            let retry = retry.clone();
            let abandoned = Arc::clone(&abandoned);
            let handle = thread::Builder::new()
                .name(format!("dispatch-{index}"))
                .spawn(move || worker_loop(index, &queue, &dispatcher, &retry, &abandoned))
                .map_err(|source| EngineError::Spawn {
                    name: "dispatch-worker",
                    source,
                })?;
            workers.push(handle);
        }

        info!(workers = workers.len(), "dispatch pool started");
        Ok(Self { workers, abandoned })
    }

    /// Wait for every worker and return how many units were given up on after
    /// exhausting transient retries. The queue must be closed first.
    pub fn join(self) -> u64 {
        for worker in self.workers {
            let _ = worker.join();
        }
        let abandoned = self.abandoned.load(Ordering::Relaxed);
        info!(abandoned, "dispatch pool stopped");
        abandoned
    }
}

fn worker_loop(
    index: usize,
    queue: &PickQueue,
    dispatcher: &TaskDispatcher,
    retry: &RetryPolicy,
    abandoned: &AtomicU64,
) {
    debug!(worker = index, "dispatch worker started");

    while let Some(job) = queue.pop_blocking() {
        match dispatcher.dispatch_pick(job.unit_id) {
            Ok(record) => {
                debug!(worker = index, unit = %job.unit_id, robot = %record.robot_id, "pick done");
            }
            Err(e) if e.is_transient() => requeue(queue, retry, abandoned, job, &e),
            Err(DispatchError::Domain(e)) => {
                warn!(worker = index, unit = %job.unit_id, error = %e, "pick rejected");
            }
            Err(e) => {
                debug!(worker = index, unit = %job.unit_id, error = %e, "pick ended in exception");
            }
        }
        queue.done();
    }

    debug!(worker = index, "dispatch worker stopped");
}

fn requeue(queue: &PickQueue, retry: &RetryPolicy, abandoned: &AtomicU64, job: PickJob, error: &DispatchError) {
    if !retry.should_retry(job.attempt) {
        abandoned.fetch_add(1, Ordering::Relaxed);
        warn!(unit = %job.unit_id, attempts = job.attempt + 1, error = %error, "pick abandoned");
        return;
    }

    let next = PickJob {
        unit_id: job.unit_id,
        attempt: job.attempt + 1,
    };
    let delay = retry.delay_for_attempt(next.attempt);
    debug!(unit = %job.unit_id, attempt = next.attempt, delay_ms = delay.as_millis() as u64, "pick requeued");
    if queue.push_retry(next, delay).is_err() {
        debug!(unit = %job.unit_id, "queue closed; retry dropped");
    }
}
