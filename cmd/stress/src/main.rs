//! Stress test - exactly-once delivery and migration churn
//!
//! Phase 1 races T threads over one ring, each pushing a private sequence
//! number and popping until success, then audits that every sequence value
//! was observed exactly T times in aggregate (no loss, no duplication).
//!
//! Phase 2 schedules routines that ping-pong between two schedulers under
//! worker pools, auditing that every hop transfers exactly one reservation
//! unit and that all budget returns once the routines cancel.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskring::{routine_fn, PoolConfig, Scheduler, WorkerPool};
use taskring_core::{RingQueue, WaitStrategy};

fn conservation_test(num_threads: usize, max_sequence: u64) {
    println!(
        "conservation: threads({}) sequences({})",
        num_threads, max_sequence
    );

    let queue = Arc::new(
        RingQueue::<u64>::new(num_threads)
            .expect("ring allocation failed")
            .wait_strategy(WaitStrategy::SpinYield),
    );
    assert!(queue.try_reserve_size_before_push(num_threads));

    let tracker: Arc<Vec<AtomicU64>> = Arc::new(
        (0..=max_sequence as usize)
            .map(|_| AtomicU64::new(0))
            .collect(),
    );

    let mut handles = vec![];
    for _ in 0..num_threads {
        let queue = Arc::clone(&queue);
        let tracker = Arc::clone(&tracker);
        handles.push(thread::spawn(move || {
            for sequence in 1..=max_sequence {
                queue.push(sequence);
                let value = loop {
                    if let Some(v) = queue.try_pop() {
                        break v;
                    }
                };
                tracker[value as usize].fetch_add(1, Ordering::SeqCst);
            }
        }));
    }
    for h in handles {
        h.join().expect("conservation thread panicked");
    }

    for sequence in 1..=max_sequence as usize {
        let observed = tracker[sequence].load(Ordering::SeqCst);
        assert_eq!(
            observed, num_threads as u64,
            "sequence {} observed {} times, expected {}",
            sequence, observed, num_threads
        );
    }
    queue.unreserve_size_after_pop(num_threads);

    println!("PASSED conservation_test");
}

fn migration_test(num_routines: usize, hops: usize) {
    println!("migration: routines({}) hops({})", num_routines, hops);

    let left = Scheduler::new(num_routines).expect("scheduler allocation failed");
    let right = Scheduler::new(num_routines).expect("scheduler allocation failed");
    let completed = Arc::new(AtomicUsize::new(0));

    for _ in 0..num_routines {
        let left2 = Arc::clone(&left);
        let right2 = Arc::clone(&right);
        let completed = Arc::clone(&completed);
        let mut remaining = hops;

        left.try_schedule(routine_fn(move |cx| {
            if remaining == 0 {
                completed.fetch_add(1, Ordering::SeqCst);
                cx.cancel();
                return;
            }
            remaining -= 1;

            let other = {
                let current = cx.scheduler().expect("routine still scheduled");
                if Arc::ptr_eq(current, &left2) {
                    Arc::clone(&right2)
                } else {
                    Arc::clone(&left2)
                }
            };
            // A denied hop (other side momentarily full) just retries on
            // the next poll from wherever the routine is now
            let _ = cx.try_switch_scheduler(&other);
        }))
        .expect("initial schedule failed");
    }
    assert_eq!(left.reserved() + right.reserved(), num_routines);

    let config = PoolConfig::from_env().num_workers(2);
    let left_pool = WorkerPool::start(Arc::clone(&left), &config);
    let right_pool = WorkerPool::start(Arc::clone(&right), &config);

    let deadline = Instant::now() + Duration::from_secs(60);
    while completed.load(Ordering::SeqCst) < num_routines {
        assert!(
            Instant::now() < deadline,
            "stalled with {}/{} routines complete",
            completed.load(Ordering::SeqCst),
            num_routines
        );
        thread::sleep(Duration::from_millis(1));
    }

    left_pool.shutdown();
    right_pool.shutdown();
    left_pool.join();
    right_pool.join();

    // Every reservation unit came back
    assert_eq!(left.reserved(), 0, "left scheduler leaked reservations");
    assert_eq!(right.reserved(), 0, "right scheduler leaked reservations");

    println!("PASSED migration_test");
}

fn main() {
    let num_threads: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(32);
    let max_sequence: u64 = std::env::args()
        .nth(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(1023);

    println!("=== taskring stress ===\n");

    let start = Instant::now();
    conservation_test(num_threads, max_sequence);
    migration_test(num_threads.max(2), 64);

    println!("\ntotal time: {:?}", start.elapsed());
    println!("=== stress complete ===");
}
