//! Bounded task pool shared by the probing and speed-test stages.
//!
//! Both stages draw permits from one admission gate (a counting semaphore),
//! so at most `max_concurrency` tasks run at once regardless of stage.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::warn;

/// Create the admission gate for a run.
pub fn admission_gate(max_concurrency: usize) -> Arc<Semaphore> {
    Arc::new(Semaphore::new(max_concurrency))
}

/// A set of spawned tasks limited by a shared admission gate.
pub struct BoundedPool<T> {
    gate: Arc<Semaphore>,
    tasks: JoinSet<T>,
}

impl<T: Send + 'static> BoundedPool<T> {
    pub fn new(gate: Arc<Semaphore>) -> Self {
        Self {
            gate,
            tasks: JoinSet::new(),
        }
    }

    /// Wait for a free permit, then spawn `task`. The permit is held until the
    /// task finishes.
    pub async fn submit<F>(&mut self, task: F) -> Result<()>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let permit = self
            .gate
            .clone()
            .acquire_owned()
            .await
            .context("admission gate closed")?;

        self.tasks.spawn(async move {
            let _permit = permit;
            task.await
        });
        Ok(())
    }

    /// Wait for every submitted task and return their outputs in completion
    /// order. Panicked tasks are logged and skipped.
    pub async fn join(mut self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.tasks.len());
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(value) => out.push(value),
                Err(e) => warn!(error = %e, "pool task failed"),
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_concurrency_never_exceeds_gate() {
        let gate = admission_gate(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut pool = BoundedPool::new(gate.clone());
        for i in 0..20usize {
            let running = running.clone();
            let peak = peak.clone();
            pool.submit(async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                i
            })
            .await
            .unwrap();
        }

        let mut outputs = pool.join().await;
        outputs.sort_unstable();
        assert_eq!(outputs, (0..20).collect::<Vec<_>>());
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(gate.available_permits(), 3);
    }

    #[tokio::test]
    async fn test_gate_is_reusable_across_pools() {
        let gate = admission_gate(2);

        let mut first = BoundedPool::new(gate.clone());
        first.submit(async { 1 }).await.unwrap();
        assert_eq!(first.join().await, vec![1]);

        let mut second = BoundedPool::new(gate.clone());
        second.submit(async { 2 }).await.unwrap();
        second.submit(async { 3 }).await.unwrap();
        let mut out = second.join().await;
        out.sort_unstable();
        assert_eq!(out, vec![2, 3]);
        assert_eq!(gate.available_permits(), 2);
    }

    #[tokio::test]
    async fn test_closed_gate_rejects_submission() {
        let gate = admission_gate(1);
        gate.close();
        let mut pool = BoundedPool::<()>::new(gate);
        assert!(pool.submit(async {}).await.is_err());
        assert!(pool.join().await.is_empty());
    }
}
