//! # taskring - Cooperative Routine Scheduler
//!
//! A minimal concurrency runtime: a bounded lock-free MPMC ring queue and a
//! cooperative scheduler layered on it. Resumable routines are enqueued,
//! polled by any number of worker threads, and migrated between schedulers
//! without ever losing or duplicating their single capacity reservation.
//!
//! ## Features
//!
//! - **Lock-free ready queue**: per-slot sequence numbers for ABA safety,
//!   fetch-add producers, CAS consumers
//! - **Two-phase admission control**: capacity is reserved before work is
//!   constructed, released only when work is retired
//! - **Reservation transfer**: migrating a routine moves its reservation,
//!   never double-releases or re-acquires it
//! - **Cooperative cancellation**: takes effect at the end of the current
//!   poll, ownership of the routine returns to the caller
//! - **No blocking primitives**: all waiting is busy-spin under a
//!   configurable policy (pure spin or spin-then-yield)
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use taskring::{routine_fn, PoolConfig, Scheduler, WorkerPool};
//!
//! fn main() {
//!     let scheduler = Scheduler::new(1024).unwrap();
//!
//!     scheduler.try_schedule(routine_fn(|cx| {
//!         println!("Hello from a routine!");
//!         cx.cancel();
//!     })).unwrap();
//!
//!     let pool = WorkerPool::start(Arc::clone(&scheduler), &PoolConfig::from_env());
//!     // ... let the workers drain the queue ...
//!     pool.shutdown();
//!     pool.join();
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      User Code                          │
//! │        try_schedule(), routine_fn(), ExecContext        │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     Scheduler(s)                        │
//! │     poll → run one step → requeue / migrate / cancel    │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!          ┌─────────────────┼─────────────────┐
//!          ▼                 ▼                 ▼
//!    ┌───────────┐     ┌───────────┐     ┌───────────┐
//!    │  Worker   │     │  Worker   │     │  Worker   │
//!    │  Thread   │     │  Thread   │     │  Thread   │
//!    └───────────┘     └───────────┘     └───────────┘
//!          │                 │                 │
//!          └─────────────────┼─────────────────┘
//!                            ▼
//!    ┌─────────────────────────────────────────────────────┐
//!    │           RingQueue<Box<dyn Routine>>               │
//!    │   sequence-gated slots + reservation admission      │
//!    └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod exec;
pub mod pool;
pub mod routine;
pub mod scheduler;

// Re-exports for convenience
pub use config::PoolConfig;
pub use exec::ExecContext;
pub use pool::WorkerPool;
pub use routine::{routine_fn, FnRoutine, Routine};
pub use scheduler::{Polled, ScheduleFull, Scheduler};

// Core primitives at the facade
pub use taskring_core::{
    AllocStrategy, QueueError, QueueResult, Reservation, RingQueue, SystemAlloc, WaitStrategy,
};
