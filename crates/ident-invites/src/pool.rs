//! Bounded worker pool for lookup checks and callback deliveries.
//!
//! At most `workers` tasks run at once and at most `queue_capacity` more wait
//! for a free worker. Once both are used up, [`WorkerPool::try_spawn`] rejects
//! the submission (reject-new backpressure) while [`WorkerPool::spawn`] waits
//! for a slot. Foreground publishes use the former, reconciliation ticks the
//! latter so that every pending invite gets its check.
//!
//! A panicking task is caught and logged; it never affects other tasks.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt as _;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::error::InviteError;

pub struct WorkerPool {
    name: &'static str,
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WorkerPool {
    pub fn new(name: &'static str, workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        Self {
            name,
            admission: Arc::new(Semaphore::new(workers + queue_capacity)),
            workers: Arc::new(Semaphore::new(workers)),
            tracker: TaskTracker::new(),
        }
    }

    /// Queue `task` for execution, or fail fast when the pool is full or closed.
    pub fn try_spawn<F>(&self, task: F) -> Result<(), InviteError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(InviteError::PoolClosed);
        }
        let admitted = self
            .admission
            .clone()
            .try_acquire_owned()
            .map_err(|_| InviteError::PoolSaturated)?;
        self.launch(admitted, task);
        Ok(())
    }

    /// Queue `task`, waiting for a queue slot when the pool is full.
    ///
    /// Cancel-safe: dropping the future before admission submits nothing.
    pub async fn spawn<F>(&self, task: F) -> Result<(), InviteError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(InviteError::PoolClosed);
        }
        let admitted = self
            .admission
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| InviteError::PoolClosed)?;
        if self.tracker.is_closed() {
            return Err(InviteError::PoolClosed);
        }
        self.launch(admitted, task);
        Ok(())
    }

    fn launch<F>(&self, admitted: OwnedSemaphorePermit, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let workers = self.workers.clone();
        let name = self.name;
        self.tracker.spawn(async move {
            let _admitted = admitted;
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_owned())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_owned());
                error!(pool = name, panic = %msg, "Worker task panicked");
            }
        });
    }

    /// Tasks admitted and not yet finished (running or queued).
    pub fn pending(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting work and wait up to `grace` for admitted tasks.
    ///
    /// Returns `true` when everything finished in time. Stragglers keep running
    /// detached; they are not aborted.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.tracker.close();
        let pending = self.tracker.len();
        if pending > 0 {
            info!(pool = self.name, pending, "Waiting for in-flight tasks");
        }
        match tokio::time::timeout(grace, self.tracker.wait()).await {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    pool = self.name,
                    abandoned = self.tracker.len(),
                    "Shutdown grace period elapsed, abandoning tasks"
                );
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrency_is_capped_at_worker_count() {
        let pool = WorkerPool::new("test", 2, 10);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..8 {
            let running = running.clone();
            let peak = peak.clone();
            pool.try_spawn(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn rejects_new_work_when_saturated() {
        let pool = WorkerPool::new("test", 1, 1);
        let gate = Arc::new(Semaphore::new(0));

        for _ in 0..2 {
            let gate = gate.clone();
            pool.try_spawn(async move {
                let _ = gate.acquire().await;
            })
            .unwrap();
        }
        assert!(matches!(pool.try_spawn(async {}), Err(InviteError::PoolSaturated)));
        assert_eq!(pool.pending(), 2);

        gate.add_permits(2);
        assert!(pool.shutdown(Duration::from_secs(5)).await);
    }

    #[tokio::test]
    async fn spawn_waits_for_a_free_slot() {
        let pool = WorkerPool::new("test", 1, 1);
        let gate = Arc::new(Semaphore::new(0));
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..2 {
            let gate = gate.clone();
            pool.try_spawn(async move {
                let _ = gate.acquire().await;
            })
            .unwrap();
        }

        let d = done.clone();
        let waiting = pool.spawn(async move {
            d.fetch_add(1, Ordering::SeqCst);
        });
        tokio::pin!(waiting);
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut waiting).await.is_err());

        gate.add_permits(2);
        waiting.await.unwrap();
        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panics_are_isolated() {
        let pool = WorkerPool::new("test", 2, 2);
        let done = Arc::new(AtomicUsize::new(0));

        pool.try_spawn(async { panic!("boom") }).unwrap();
        let d = done.clone();
        pool.try_spawn(async move {
            d.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        assert!(pool.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_gives_up_after_grace_period() {
        let pool = WorkerPool::new("test", 1, 0);
        pool.try_spawn(async { tokio::time::sleep(Duration::from_secs(3600)).await }).unwrap();

        assert!(!pool.shutdown(Duration::from_secs(60)).await);
        assert!(matches!(pool.try_spawn(async {}), Err(InviteError::PoolClosed)));
        assert!(matches!(pool.spawn(async {}).await, Err(InviteError::PoolClosed)));
    }
}
