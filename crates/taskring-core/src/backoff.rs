//! Busy-wait policy for queue spins and worker idling
//!
//! There is no blocking primitive anywhere in the runtime. Every wait is a
//! busy-spin whose shape is chosen by [`WaitStrategy`]: either pure spinning
//! (lowest latency, burns a core; pair with pinned/real-time threads) or
//! spinning that starts yielding the OS thread once the wait drags on.

use core::sync::atomic::{AtomicU8, Ordering};
use std::str::FromStr;

/// Spins per snooze before `SpinYield` starts yielding the OS thread
const YIELD_THRESHOLD: u32 = 64;

/// How to wait when a spin is required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WaitStrategy {
    /// Pure spin with pause hints. Never yields the OS thread.
    Spin = 0,

    /// Spin with pause hints, then yield the OS thread once the wait
    /// exceeds a fixed threshold.
    SpinYield = 1,
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::SpinYield
    }
}

impl WaitStrategy {
    /// Read the strategy from `TASKRING_WAIT` (`spin` or `yield`),
    /// defaulting to `SpinYield`.
    pub fn from_env() -> Self {
        crate::env::env_get("TASKRING_WAIT", WaitStrategy::SpinYield)
    }

    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => WaitStrategy::Spin,
            _ => WaitStrategy::SpinYield,
        }
    }
}

impl FromStr for WaitStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "spin" => Ok(WaitStrategy::Spin),
            "yield" | "spin-yield" | "spinyield" => Ok(WaitStrategy::SpinYield),
            _ => Err(()),
        }
    }
}

/// An atomic cell holding a [`WaitStrategy`]
///
/// Lets a shared structure carry its wait policy without locking.
pub struct WaitCell(AtomicU8);

impl WaitCell {
    pub const fn new(strategy: WaitStrategy) -> Self {
        WaitCell(AtomicU8::new(strategy as u8))
    }

    #[inline]
    pub fn get(&self) -> WaitStrategy {
        WaitStrategy::from_u8(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, strategy: WaitStrategy) {
        self.0.store(strategy as u8, Ordering::Relaxed);
    }
}

/// Exponential backoff for spin loops
///
/// Each `snooze` spins a growing number of pause iterations; under
/// `SpinYield` the OS thread is yielded instead once the threshold is
/// crossed.
pub struct Backoff {
    strategy: WaitStrategy,
    step: u32,
}

impl Backoff {
    #[inline]
    pub fn new(strategy: WaitStrategy) -> Self {
        Backoff { strategy, step: 0 }
    }

    /// Wait one step. Spin count doubles per call up to the threshold.
    #[inline]
    pub fn snooze(&mut self) {
        if self.step < YIELD_THRESHOLD {
            for _ in 0..(1u32 << self.step.min(6)) {
                core::hint::spin_loop();
            }
            self.step += 1;
        } else {
            match self.strategy {
                WaitStrategy::Spin => {
                    for _ in 0..(1u32 << 6) {
                        core::hint::spin_loop();
                    }
                }
                WaitStrategy::SpinYield => std::thread::yield_now(),
            }
        }
    }

    /// Reset after progress was made.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }
}
