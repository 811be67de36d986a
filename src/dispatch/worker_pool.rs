//! Bounded pool of worker threads for blocking resource calls.

use std::cell::Cell;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::dispatch::DispatchError;
use crate::observability::metrics;

thread_local! {
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as a worker until dropped, including on unwind.
struct WorkerMark;

impl WorkerMark {
    fn enter() -> Self {
        IN_WORKER.with(|w| w.set(true));
        WorkerMark
    }
}

impl Drop for WorkerMark {
    fn drop(&mut self) {
        IN_WORKER.with(|w| w.set(false));
    }
}

/// Runs closures on tokio's blocking pool, at most `max_blocking` at a time.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    permits: Arc<Semaphore>,
    max_blocking: usize,
}

impl WorkerPool {
    pub fn new(max_blocking: usize) -> Self {
        let max_blocking = max_blocking.max(1);
        Self {
            permits: Arc::new(Semaphore::new(max_blocking)),
            max_blocking,
        }
    }

    pub fn max_blocking(&self) -> usize {
        self.max_blocking
    }

    /// True on a thread currently running pool work.
    pub fn on_worker_thread() -> bool {
        IN_WORKER.with(Cell::get)
    }

    /// Run `f` on a worker and wait for its result. Work submitted from a
    /// worker runs inline so nested submissions cannot exhaust the permits.
    pub async fn run<F, R>(&self, f: F) -> Result<R, DispatchError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        if Self::on_worker_thread() {
            return Ok(f());
        }
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DispatchError::Closed)?;
        metrics::record_worker_dispatch();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _mark = WorkerMark::enter();
            f()
        })
        .await
        .map_err(|e| DispatchError::Worker(e.to_string()))
    }

    /// Fire-and-forget variant of [`run`](Self::run).
    pub fn spawn<F>(&self, f: F) -> JoinHandle<Result<(), DispatchError>>
    where
        F: FnOnce() + Send + 'static,
    {
        let pool = self.clone();
        tokio::spawn(async move { pool.run(f).await })
    }
}
