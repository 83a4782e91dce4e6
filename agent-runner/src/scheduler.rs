//! Bounded execution pool for streaming runs
//!
//! Jobs are boxed futures placed on a bounded MPMC queue. A fixed set of core
//! workers lives until shutdown. When queued jobs outnumber idle workers the
//! pool grows up to `max_workers`; surplus workers retire after sitting idle
//! for the keep-alive period.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_channel::TrySendError;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use agentweb_core::SchedulerConfig;

use crate::error::SchedulerError;

type Job = BoxFuture<'static, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Core,
    Surplus,
}

struct Inner {
    jobs: async_channel::Receiver<Job>,
    max_workers: usize,
    capacity: usize,
    keep_alive: Duration,
    workers: AtomicUsize,
    busy: AtomicUsize,
    next_id: AtomicUsize,
}

/// Closes the queue once the last scheduler handle is dropped
struct CloseOnDrop(async_channel::Sender<Job>);

impl Drop for CloseOnDrop {
    fn drop(&mut self) {
        self.0.close();
    }
}

/// Cloneable handle to a bounded worker pool
///
/// Must be created inside a Tokio runtime; core workers are spawned eagerly.
#[derive(Clone)]
pub struct ExecutionScheduler {
    inner: Arc<Inner>,
    queue: Arc<CloseOnDrop>,
}

impl ExecutionScheduler {
    pub fn new(config: &SchedulerConfig) -> Self {
        let max_workers = config.max_workers.max(1);
        let core_workers = config.core_workers.min(max_workers);
        let capacity = config.queue_capacity.max(1);
        let (tx, rx) = async_channel::bounded(capacity);

        let inner = Arc::new(Inner {
            jobs: rx,
            max_workers,
            capacity,
            keep_alive: config.keep_alive(),
            workers: AtomicUsize::new(core_workers),
            busy: AtomicUsize::new(0),
            next_id: AtomicUsize::new(0),
        });
        for _ in 0..core_workers {
            spawn_worker(&inner, Role::Core);
        }

        info!(
            "Execution scheduler started (core {}, max {}, queue {}, keep-alive {:?})",
            core_workers, max_workers, capacity, inner.keep_alive
        );

        Self {
            inner,
            queue: Arc::new(CloseOnDrop(tx)),
        }
    }

    /// Queue a job, rejecting it when the queue is full or closed
    pub fn submit<F>(&self, job: F) -> Result<(), SchedulerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.queue.0.try_send(job.boxed()).map_err(|e| match e {
            TrySendError::Full(_) => {
                warn!(
                    "Execution queue full ({} pending), rejecting job",
                    self.inner.capacity
                );
                SchedulerError::QueueFull {
                    capacity: self.inner.capacity,
                }
            }
            TrySendError::Closed(_) => SchedulerError::Closed,
        })?;
        grow_if_saturated(&self.inner);
        Ok(())
    }

    /// Live workers, core and surplus
    pub fn worker_count(&self) -> usize {
        self.inner.workers.load(Ordering::SeqCst)
    }

    /// Workers currently running a job
    pub fn busy_count(&self) -> usize {
        self.inner.busy.load(Ordering::SeqCst)
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.inner.jobs.len()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.0.is_closed()
    }

    /// Stop accepting jobs. Already queued jobs still run, then workers exit.
    pub fn shutdown(&self) {
        if self.queue.0.close() {
            info!(
                "Execution scheduler shutting down ({} queued, {} running)",
                self.queued(),
                self.busy_count()
            );
        }
    }
}

/// Start a surplus worker when queued jobs outnumber idle workers
fn grow_if_saturated(inner: &Arc<Inner>) {
    loop {
        if inner.jobs.is_closed() {
            return;
        }
        let workers = inner.workers.load(Ordering::SeqCst);
        let idle = workers.saturating_sub(inner.busy.load(Ordering::SeqCst));
        if workers >= inner.max_workers || idle >= inner.jobs.len() {
            return;
        }
        if inner
            .workers
            .compare_exchange(workers, workers + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            spawn_worker(inner, Role::Surplus);
            return;
        }
    }
}

fn spawn_worker(inner: &Arc<Inner>, role: Role) {
    let inner = Arc::clone(inner);
    let id = inner.next_id.fetch_add(1, Ordering::SeqCst);
    tokio::spawn(async move { worker(inner, role, id).await });
}

async fn worker(inner: Arc<Inner>, role: Role, id: usize) {
    debug!("Worker {} ({:?}) started", id, role);
    loop {
        let job = match role {
            Role::Core => inner.jobs.recv().await.ok(),
            Role::Surplus => match tokio::time::timeout(inner.keep_alive, inner.jobs.recv()).await {
                Ok(job) => job.ok(),
                Err(_) => {
                    debug!("Worker {} idle for {:?}, retiring", id, inner.keep_alive);
                    None
                }
            },
        };
        let Some(job) = job else { break };

        inner.busy.fetch_add(1, Ordering::SeqCst);
        grow_if_saturated(&inner);
        if AssertUnwindSafe(job).catch_unwind().await.is_err() {
            warn!("Worker {} job panicked", id);
        }
        inner.busy.fetch_sub(1, Ordering::SeqCst);
    }

    inner.workers.fetch_sub(1, Ordering::SeqCst);
    debug!("Worker {} ({:?}) stopped", id, role);
    // a job may have been queued while this worker was counted as idle
    grow_if_saturated(&inner);
}
