//! Fixed-size fork-join worker pool.

use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{ParallelError, Result};

/// A fixed-size pool of worker threads.
///
/// Every call partitions work, dispatches it, and blocks the caller until all
/// sub-tasks have completed. Work started through [`WorkerPool::install`] runs
/// on the pool, so nested rayon iterators inside it reuse the same workers
/// instead of the global rayon pool.
///
/// Cloning is cheap; clones share the same threads.
#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<rayon::ThreadPool>,
    workers: usize,
}

impl WorkerPool {
    /// Create a pool with exactly `workers` threads.
    pub fn new(workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(ParallelError::ZeroWorkers);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("bvhkit-worker-{i}"))
            .build()
            .map_err(|e| ParallelError::PoolBuild(e.to_string()))?;
        Ok(Self {
            pool: Arc::new(pool),
            workers,
        })
    }

    /// Create a pool with one worker per available hardware thread.
    pub fn with_available_parallelism() -> Result<Self> {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(workers)
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Run `op` on the pool and wait for its result.
    pub fn install<R, OP>(&self, op: OP) -> R
    where
        R: Send,
        OP: FnOnce() -> R + Send,
    {
        self.pool.install(op)
    }

    /// Invoke `f(task_index)` for every task in `0..task_count` and block
    /// until all have returned.
    pub fn run<F>(&self, task_count: usize, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        match task_count {
            0 => {}
            1 => f(0),
            _ => self.pool.install(|| {
                (0..task_count)
                    .into_par_iter()
                    .with_max_len(1)
                    .for_each(|task| f(task))
            }),
        }
    }

    /// Like [`WorkerPool::run`] but collects one result per task, in task order.
    pub fn map<R, F>(&self, task_count: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        match task_count {
            0 => Vec::new(),
            1 => vec![f(0)],
            _ => self.pool.install(|| {
                (0..task_count)
                    .into_par_iter()
                    .with_max_len(1)
                    .map(|task| f(task))
                    .collect()
            }),
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_zero_workers_rejected() {
        assert!(matches!(WorkerPool::new(0), Err(ParallelError::ZeroWorkers)));
    }

    #[test]
    fn test_run_visits_every_task() {
        let pool = WorkerPool::new(4).unwrap();
        let sum = AtomicUsize::new(0);
        pool.run(100, |t| {
            sum.fetch_add(t, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), (0..100).sum::<usize>());
    }

    #[test]
    fn test_map_preserves_task_order() {
        let pool = WorkerPool::new(3).unwrap();
        let out = pool.map(10, |t| t * t);
        assert_eq!(out, (0..10).map(|t| t * t).collect::<Vec<_>>());
    }

    #[test]
    fn test_install_runs_on_pool() {
        let pool = WorkerPool::new(2).unwrap();
        let threads = pool.install(rayon::current_num_threads);
        assert_eq!(threads, 2);
        assert_eq!(pool.worker_count(), 2);
    }

    #[test]
    fn test_empty_task_sets() {
        let pool = WorkerPool::new(2).unwrap();
        pool.run(0, |_| panic!("no tasks expected"));
        assert!(pool.map(0, |t| t).is_empty());
    }
}
