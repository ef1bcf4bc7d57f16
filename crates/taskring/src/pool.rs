//! Worker thread management
//!
//! Workers are OS threads that poll one scheduler in a loop. There is no
//! parking: an idle worker runs the configured busy-wait policy between
//! empty polls, so shutdown latency is bounded by one backoff step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use taskring_core::backoff::{Backoff, WaitStrategy};
use taskring_core::tr_debug;

use crate::config::PoolConfig;
use crate::scheduler::{Polled, Scheduler};

/// Pool of worker threads polling one scheduler
pub struct WorkerPool {
    /// Join handles for worker threads
    handles: Vec<JoinHandle<()>>,

    /// Number of active workers
    num_workers: usize,

    /// Shutdown flag shared with the workers
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    /// Start `config.num_workers` workers polling `scheduler`.
    pub fn start(scheduler: Arc<Scheduler>, config: &PoolConfig) -> Self {
        let num_workers = config.num_workers.max(1);
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(num_workers);
        for i in 0..num_workers {
            let scheduler = Arc::clone(&scheduler);
            let shutdown = Arc::clone(&shutdown);
            let wait = config.wait;

            let handle = thread::Builder::new()
                .name(format!("taskring-worker-{}", i))
                .spawn(move || {
                    worker_loop(&scheduler, &shutdown, wait);
                })
                .expect("Failed to spawn worker thread");

            handles.push(handle);
        }

        WorkerPool {
            handles,
            num_workers,
            shutdown,
        }
    }

    /// Signal shutdown to all workers.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    /// Check if shutdown was requested.
    #[inline]
    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Wait for all workers to finish.
    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }

    /// Get number of workers.
    #[inline]
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }
}

fn worker_loop(scheduler: &Scheduler, shutdown: &AtomicBool, wait: WaitStrategy) {
    let mut backoff = Backoff::new(wait);
    while !shutdown.load(Ordering::Acquire) {
        match scheduler.poll() {
            Polled::Ran => backoff.reset(),
            Polled::Cancelled(routine) => {
                // Routines that cancel under a pool have no caller left to
                // take them back; they are dropped here
                tr_debug!("worker dropped a cancelled routine");
                drop(routine);
                backoff.reset();
            }
            Polled::Empty => backoff.snooze(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::routine_fn;
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[test]
    fn test_pool_drains_scheduled_routines() {
        const ROUTINES: usize = 64;

        let scheduler = Scheduler::new(ROUTINES).unwrap();
        let completed = Arc::new(AtomicUsize::new(0));

        for _ in 0..ROUTINES {
            let completed = Arc::clone(&completed);
            scheduler
                .try_schedule(routine_fn(move |cx| {
                    completed.fetch_add(1, Ordering::SeqCst);
                    cx.cancel();
                }))
                .unwrap();
        }

        let config = PoolConfig::from_env()
            .num_workers(4)
            .wait(WaitStrategy::SpinYield);
        let pool = WorkerPool::start(Arc::clone(&scheduler), &config);
        assert_eq!(pool.num_workers(), 4);

        let deadline = Instant::now() + Duration::from_secs(10);
        while completed.load(Ordering::SeqCst) < ROUTINES {
            assert!(Instant::now() < deadline, "pool failed to drain routines");
            thread::yield_now();
        }

        pool.shutdown();
        assert!(pool.is_shutdown());
        pool.join();

        assert_eq!(completed.load(Ordering::SeqCst), ROUTINES);
        assert_eq!(scheduler.reserved(), 0);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_pool_shutdown_with_live_routines() {
        let scheduler = Scheduler::new(4).unwrap();
        // A routine that never cancels keeps cycling through the ring
        scheduler.try_schedule(routine_fn(|_| {})).unwrap();

        let config = PoolConfig::from_env().num_workers(2);
        let pool = WorkerPool::start(Arc::clone(&scheduler), &config);
        thread::sleep(Duration::from_millis(20));

        pool.shutdown();
        pool.join();

        // The routine still holds its reservation and stays queued
        assert_eq!(scheduler.reserved(), 1);
    }
}
