//! # taskring-core
//!
//! Core primitives for the taskring runtime: a bounded lock-free MPMC ring
//! queue with per-slot sequence numbers, two-phase capacity reservation,
//! and an injectable allocation strategy.
//!
//! This crate is platform-agnostic apart from the default allocator, which
//! uses the system aligned allocator. The cooperative scheduler built on
//! these primitives lives in the `taskring` crate.
//!
//! ## Modules
//!
//! - `queue` - MPMC ring queue and capacity reservation
//! - `alloc` - Allocation strategy trait and system default
//! - `backoff` - Busy-wait policy (spin / spin-then-yield)
//! - `error` - Error types
//! - `env` - Environment variable utilities
//! - `tprint` - Leveled debug printing macros

pub mod alloc;
pub mod backoff;
pub mod env;
pub mod error;
pub mod queue;
pub mod tprint;

// Re-exports for convenience
pub use alloc::{AllocStrategy, SystemAlloc};
pub use backoff::{Backoff, WaitStrategy};
pub use error::{QueueError, QueueResult};
pub use queue::{Reservation, RingQueue, MIN_CAPACITY};
pub use tprint::LogLevel;

/// Constants for memory layout
pub mod constants {
    /// Cache line size for alignment
    pub const CACHE_LINE_SIZE: usize = 64;
}
