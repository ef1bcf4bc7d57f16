//! MPMC queue benchmark
//!
//! Pins N threads to dedicated CPUs, optionally elevates them to SCHED_FIFO,
//! pre-fills a ring and races pop→push cycles for a fixed iteration count.
//! Reports cycles and nanoseconds per operation, then runs the same shape
//! against `crossbeam_queue::ArrayQueue` as a baseline.
//!
//! Busy-spin waiting plus real-time priority on shared CPUs invites priority
//! inversion; dedicated CPUs per thread are assumed. Pinning/priority
//! failures (no privileges, too few CPUs) degrade to a warning.
//!
//! Environment:
//! - `TASKRING_BENCH_PIN=0`     - disable CPU pinning and SCHED_FIFO
//! - `TASKRING_BENCH_RT=0`      - disable SCHED_FIFO only

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Instant;

use crossbeam_queue::ArrayQueue;
use taskring_core::env::env_get_bool;
use taskring_core::{RingQueue, WaitStrategy};

const DEFAULT_MAX_SEQUENCE: u64 = 100_000;
const NUM_TESTS: usize = 10;
const DUMMY_ELEMENT: u64 = 1;

#[derive(Clone, Copy)]
struct TestConfig {
    num_threads: usize,
    num_elements: usize,
    max_sequence: u64,
}

#[derive(Clone, Copy, Default)]
struct TestResult {
    cycles: u64,
    nanos: u64,
}

mod perf {
    //! Thread performance mode: pin to a CPU, raise to SCHED_FIFO.
    //!
    //! Main thread sits on CPU 1; worker `tid` lands on `(tid + 2) * 2`
    //! to stay clear of the main thread and of hyperthread siblings.

    pub fn main_thread_init(pin: bool) {
        if pin {
            set_affinity(1);
        }
    }

    pub fn thread_init(tid: usize, pin: bool, rt: bool) {
        if pin {
            set_affinity((tid + 2) * 2);
        }
        if rt {
            set_realtime_priority();
        }
    }

    cfg_if::cfg_if! {
        if #[cfg(target_os = "linux")] {
            use nix::sched::{sched_setaffinity, CpuSet};
            use nix::unistd::Pid;

            pub fn set_affinity(cpu: usize) {
                let mut cpuset = CpuSet::new();
                if cpuset.set(cpu).is_err() {
                    eprintln!("[WARN]  cpu {} out of range, not pinning", cpu);
                    return;
                }
                if sched_setaffinity(Pid::from_raw(0), &cpuset).is_err() {
                    eprintln!("[WARN]  failed to pin to cpu {}", cpu);
                }
            }

            pub fn set_realtime_priority() {
                unsafe {
                    let param = libc::sched_param {
                        sched_priority: libc::sched_get_priority_max(libc::SCHED_FIFO),
                    };
                    if libc::pthread_setschedparam(
                        libc::pthread_self(),
                        libc::SCHED_FIFO,
                        &param,
                    ) != 0
                    {
                        eprintln!("[WARN]  SCHED_FIFO unavailable (need privileges?)");
                    }
                }
            }
        } else {
            pub fn set_affinity(_cpu: usize) {}
            pub fn set_realtime_priority() {}
        }
    }

    cfg_if::cfg_if! {
        if #[cfg(target_arch = "x86_64")] {
            #[inline]
            pub fn rdtsc() -> u64 {
                unsafe { core::arch::x86_64::_rdtsc() }
            }
        } else {
            // No cheap cycle counter; nanos still reported
            #[inline]
            pub fn rdtsc() -> u64 {
                0
            }
        }
    }
}

trait CycleQueue: Send + Sync + 'static {
    fn pop_until(&self) -> u64;
    fn push_back(&self, value: u64);
}

impl CycleQueue for RingQueue<u64> {
    fn pop_until(&self) -> u64 {
        loop {
            if let Some(v) = self.try_pop() {
                return v;
            }
        }
    }

    fn push_back(&self, value: u64) {
        self.push(value);
    }
}

impl CycleQueue for ArrayQueue<u64> {
    fn pop_until(&self) -> u64 {
        loop {
            if let Some(v) = self.pop() {
                return v;
            }
        }
    }

    fn push_back(&self, value: u64) {
        // Every push follows a pop, so a slot is always free
        let _ = self.push(value);
    }
}

fn thread_exec(
    queue: &dyn CycleQueue,
    config: TestConfig,
    barrier: &Barrier,
    tid: usize,
    pin: bool,
    rt: bool,
) -> TestResult {
    perf::thread_init(tid, pin, rt);
    let warmup = config.max_sequence / 4;
    barrier.wait();

    // Warmup: get slots hot and every thread in the rhythm
    for _ in 0..warmup {
        let v = queue.pop_until();
        queue.push_back(v);
    }

    let ts_start = Instant::now();
    let cycle_start = perf::rdtsc();
    for _ in 0..config.max_sequence {
        let v = queue.pop_until();
        queue.push_back(std::hint::black_box(v));
    }
    let cycles = perf::rdtsc().wrapping_sub(cycle_start);
    let nanos = ts_start.elapsed().as_nanos() as u64;

    // Winddown keeps the ring live until the slowest thread finishes timing
    for _ in 0..warmup {
        let v = queue.pop_until();
        queue.push_back(v);
    }

    TestResult { cycles, nanos }
}

fn multithreaded_test(
    queue: Arc<dyn CycleQueue>,
    config: TestConfig,
    pin: bool,
    rt: bool,
) -> TestResult {
    let barrier = Arc::new(Barrier::new(config.num_threads));
    let total_cycles = Arc::new(AtomicU64::new(0));
    let total_nanos = Arc::new(AtomicU64::new(0));

    let mut handles = Vec::with_capacity(config.num_threads);
    for tid in 0..config.num_threads {
        let queue = Arc::clone(&queue);
        let barrier = Arc::clone(&barrier);
        let total_cycles = Arc::clone(&total_cycles);
        let total_nanos = Arc::clone(&total_nanos);
        handles.push(thread::spawn(move || {
            let result = thread_exec(&*queue, config, &barrier, tid, pin, rt);
            total_cycles.fetch_add(result.cycles, Ordering::SeqCst);
            total_nanos.fetch_add(result.nanos, Ordering::SeqCst);
        }));
    }
    for h in handles {
        h.join().expect("benchmark thread panicked");
    }

    TestResult {
        cycles: total_cycles.load(Ordering::SeqCst),
        nanos: total_nanos.load(Ordering::SeqCst),
    }
}

fn make_ring(config: TestConfig) -> Arc<dyn CycleQueue> {
    let queue = RingQueue::<u64>::new(config.num_elements)
        .expect("ring allocation failed")
        .wait_strategy(WaitStrategy::Spin);
    assert!(queue.try_reserve_size_before_push(config.num_elements));
    for _ in 0..config.num_elements {
        queue.push(DUMMY_ELEMENT);
    }
    Arc::new(queue)
}

fn make_crossbeam(config: TestConfig) -> Arc<dyn CycleQueue> {
    let queue = ArrayQueue::new(config.num_elements.max(1));
    for _ in 0..config.num_elements {
        let _ = queue.push(DUMMY_ELEMENT);
    }
    Arc::new(queue)
}

fn aggregate_test(
    label: &str,
    make: fn(TestConfig) -> Arc<dyn CycleQueue>,
    config: TestConfig,
    pin: bool,
    rt: bool,
) {
    let mut total = TestResult::default();
    for _ in 0..NUM_TESTS {
        let result = multithreaded_test(make(config), config, pin, rt);
        total.cycles += result.cycles;
        total.nanos += result.nanos;
    }

    let ops = (NUM_TESTS as u64 * config.max_sequence * config.num_threads as u64) as f64;
    println!(
        "[{}] threads({}) elements({}) took cycles({:.2}) nanos({:.2})",
        label,
        config.num_threads,
        config.num_elements,
        total.cycles as f64 / ops,
        total.nanos as f64 / ops,
    );
}

fn main() {
    let max_sequence: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_MAX_SEQUENCE);

    let pin = env_get_bool("TASKRING_BENCH_PIN", true);
    let rt = pin && env_get_bool("TASKRING_BENCH_RT", true);

    println!("running with iterations({})", max_sequence);
    perf::main_thread_init(pin);

    let ladder: &[(usize, usize)] = &[
        (1, 1),
        (1, 2),
        (1, 4),
        (1, 8),
        (2, 2),
        (2, 4),
        (2, 8),
        (2, 16),
        (4, 4),
        (4, 8),
        (4, 16),
        (4, 32),
    ];

    for &(num_threads, num_elements) in ladder {
        let config = TestConfig {
            num_threads,
            num_elements,
            max_sequence,
        };
        aggregate_test("taskring ", make_ring, config, pin, rt);
        aggregate_test("crossbeam", make_crossbeam, config, pin, rt);
    }
}
