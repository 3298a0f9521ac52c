//! Bounded worker pool fed from a fixed-size queue

use crossbeam::channel::{self, SendError};
use tracing::debug;

use crate::parallel::CancelToken;

/// Fixed number of OS threads pulling work items from a shared bounded queue.
///
/// At most `workers` items are processed at once and at most
/// `queue_capacity` are buffered ahead of them.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    workers: usize,
    queue_capacity: usize,
}

/// Results of a pool run plus the items never handed to a worker
#[derive(Debug)]
pub struct PoolRun<T, R> {
    pub results: Vec<R>,
    pub skipped: Vec<T>,
}

impl WorkerPool {
    /// Create a pool with `workers` threads (at least one)
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            queue_capacity: workers * 2,
        }
    }

    /// Pool sized to the available hardware parallelism
    pub fn with_available_parallelism() -> Self {
        Self::new(num_cpus::get())
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `work` over every item and wait for all of them to settle.
    ///
    /// Once `cancel` fires no further items are queued; items already queued
    /// or running still finish. Results arrive in completion order.
    pub fn run<T, R, F>(&self, items: Vec<T>, cancel: &CancelToken, work: F) -> PoolRun<T, R>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let workers = self.workers.min(items.len()).max(1);
        let (job_tx, job_rx) = channel::bounded::<T>(self.queue_capacity);
        let (result_tx, result_rx) = channel::unbounded::<R>();
        let mut skipped = Vec::new();

        std::thread::scope(|s| {
            for id in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                let work = &work;

                s.spawn(move || {
                    let mut handled = 0usize;
                    for item in job_rx.iter() {
                        if result_tx.send(work(item)).is_err() {
                            break;
                        }
                        handled += 1;
                    }
                    debug!("Worker {} drained queue after {} item(s)", id, handled);
                });
            }
            drop(job_rx);
            drop(result_tx);

            let mut items = items.into_iter();
            while let Some(item) = items.next() {
                if cancel.is_cancelled() {
                    skipped.push(item);
                    skipped.extend(&mut items);
                    break;
                }
                if let Err(SendError(item)) = job_tx.send(item) {
                    skipped.push(item);
                    skipped.extend(&mut items);
                    break;
                }
            }
            drop(job_tx);
        });

        PoolRun {
            results: result_rx.into_iter().collect(),
            skipped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_pool_processes_everything() {
        let pool = WorkerPool::new(3);
        let run = pool.run((0..100).collect(), &CancelToken::new(), |n: u32| n * 2);

        let mut results = run.results;
        results.sort_unstable();
        assert_eq!(results, (0..100).map(|n| n * 2).collect::<Vec<_>>());
        assert!(run.skipped.is_empty());
    }

    #[test]
    fn test_pool_respects_worker_bound() {
        let pool = WorkerPool::new(2);
        let active = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        pool.run((0..20).collect::<Vec<u32>>(), &CancelToken::new(), |_| {
            let now = active.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(2));
            active.fetch_sub(1, Ordering::SeqCst);
        });

        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_cancelled_pool_issues_nothing() {
        let cancel = CancelToken::new();
        cancel.cancel();

        let run = WorkerPool::new(4).run(vec!["a", "b", "c"], &cancel, |s| s.len());
        assert!(run.results.is_empty());
        assert_eq!(run.skipped, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cancel_mid_run_lets_in_flight_finish() {
        let cancel = CancelToken::new();
        let run = WorkerPool::new(1).run((0..50).collect::<Vec<u32>>(), &cancel, |n| {
            if n == 0 {
                cancel.cancel();
            }
            n
        });

        assert!(run.results.contains(&0));
        assert_eq!(run.results.len() + run.skipped.len(), 50);
        assert!(!run.skipped.is_empty());
    }

    #[test]
    fn test_empty_input() {
        let run = WorkerPool::new(4).run(Vec::<u8>::new(), &CancelToken::new(), |n| n);
        assert!(run.results.is_empty());
        assert!(run.skipped.is_empty());
    }
}
