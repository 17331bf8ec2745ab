//! Bounded task pool with run-inline overflow.
//!
//! When the pool is saturated the submitting task executes the work itself
//! instead of queueing it. Backpressure therefore propagates to whoever is
//! producing work, and the pool can never build an unbounded backlog.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size)),
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Run `work` on a pooled task if a slot is free, otherwise run it
    /// inline on the caller. Either way the future completes exactly once.
    pub async fn dispatch<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match self.permits.clone().try_acquire_owned() {
            Ok(permit) => {
                tokio::spawn(async move {
                    work.await;
                    drop(permit);
                });
            }
            Err(_) => work.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_dispatch_runs_work() {
        let pool = WorkerPool::new(2);
        let (tx, rx) = oneshot::channel();
        pool.dispatch(async move {
            let _ = tx.send(42u32);
        })
        .await;
        assert_eq!(rx.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_saturated_pool_runs_inline() {
        let pool = WorkerPool::new(1);
        let (hold_tx, hold_rx) = oneshot::channel::<()>();

        // Occupy the single slot.
        pool.dispatch(async move {
            let _ = hold_rx.await;
        })
        .await;
        assert_eq!(pool.available(), 0);

        // With no free permit the work runs on the calling task, so it has
        // finished by the time dispatch returns.
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = ran.clone();
        pool.dispatch(async move {
            ran2.fetch_add(1, Ordering::SeqCst);
        })
        .await;
        assert_eq!(ran.load(Ordering::SeqCst), 1);

        let _ = hold_tx.send(());
    }

    #[tokio::test]
    async fn test_permits_are_released() {
        let pool = WorkerPool::new(1);
        pool.dispatch(async {}).await;
        // The spawned task releases its permit when it finishes.
        tokio::task::yield_now().await;
        for _ in 0..20 {
            if pool.available() == 1 {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        panic!("permit never returned to the pool");
    }
}
