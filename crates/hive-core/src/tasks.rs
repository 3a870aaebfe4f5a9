//! Bounded pool for background work with observable completion.
//!
//! Every submitted future runs on its own task but only after taking one of
//! the pool's permits, so at most `size` jobs make progress at once. Failures
//! are logged and counted; the returned [`TaskHandle`] lets callers await the
//! result when they care.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("task pool closed")]
    Closed,

    #[error("task {0} panicked")]
    Panicked(String),

    #[error("task {0} was cancelled")]
    Cancelled(String),

    #[error("{0}")]
    Failed(String),
}

/// Counter snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    counters: Arc<Counters>,
    size: usize,
}

impl fmt::Debug for TaskPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPool")
            .field("size", &self.size)
            .field("available", &self.permits.available_permits())
            .finish()
    }
}

/// Awaitable result of a submitted job.
pub struct TaskHandle<T> {
    name: String,
    join: JoinHandle<Result<T, TaskError>>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn join(self) -> Result<T, TaskError> {
        match self.join.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => Err(TaskError::Panicked(self.name)),
            Err(_) => Err(TaskError::Cancelled(self.name)),
        }
    }
}

impl TaskPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            counters: Arc::new(Counters::default()),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` once a permit is free.
    pub fn submit<F, T, E>(&self, name: impl Into<String>, job: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let name = name.into();
        let permits = self.permits.clone();
        let counters = self.counters.clone();
        counters.submitted.fetch_add(1, Ordering::Relaxed);

        let task_name = name.clone();
        let join = tokio::spawn(async move {
            let _permit = permits.acquire_owned().await.map_err(|_| TaskError::Closed)?;
            match job.await {
                Ok(value) => {
                    counters.completed.fetch_add(1, Ordering::Relaxed);
                    debug!(task = %task_name, "task completed");
                    Ok(value)
                }
                Err(err) => {
                    counters.failed.fetch_add(1, Ordering::Relaxed);
                    warn!(task = %task_name, error = %err, "task failed");
                    Err(TaskError::Failed(err.to_string()))
                }
            }
        });
        TaskHandle { name, join }
    }

    /// Refuse new work; jobs still waiting for a permit fail with `Closed`.
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn stats(&self) -> TaskStats {
        TaskStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn results_and_failures_are_observable() {
        let pool = TaskPool::new(2);
        let ok = pool.submit("ok", async { Ok::<_, String>(7) });
        let bad = pool.submit("bad", async { Err::<u8, _>("boom") });

        assert_eq!(ok.join().await, Ok(7));
        assert_eq!(bad.join().await, Err(TaskError::Failed("boom".into())));
        let stats = pool.stats();
        assert_eq!(stats.submitted, 2);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_is_bounded() {
        let pool = TaskPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                pool.submit(format!("job-{i}"), async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(i)
                })
            })
            .collect();

        for handle in handles {
            handle.join().await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn closed_pool_rejects_waiting_jobs() {
        let pool = TaskPool::new(1);
        pool.close();
        let handle = pool.submit("late", async { Ok::<_, String>(()) });
        assert_eq!(handle.join().await, Err(TaskError::Closed));
    }
}
