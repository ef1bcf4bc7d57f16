//! Cooperative run-to-completion-per-poll scheduler
//!
//! A scheduler wraps exactly one ring queue of ready routines. Any worker
//! thread may poll it; each poll pops one routine, runs it for one step,
//! and re-enqueues it on whichever scheduler its execution context ends up
//! referencing — the original, another one after a migration, or none after
//! a cancellation.
//!
//! # Reservation discipline
//!
//! `try_schedule` acquires one capacity reservation per routine. A poll
//! never touches the budget on its own: the reservation consumed by the pop
//! transfers to the re-push, so a live routine holds exactly one unit no
//! matter how often it runs or which scheduler it lands on. Only
//! cancellation (or migration, which moves the unit) releases it.

use core::fmt;
use std::any::Any;
use std::sync::{Arc, Weak};

use taskring_core::alloc::AllocStrategy;
use taskring_core::backoff::WaitStrategy;
use taskring_core::error::QueueResult;
use taskring_core::queue::RingQueue;

use crate::exec::ExecContext;
use crate::routine::Routine;

/// Scheduler owning one ring queue of ready routines
///
/// Constructed behind an `Arc`: execution contexts hand out scheduler
/// references for migration, so the scheduler keeps a weak handle to its
/// own allocation.
pub struct Scheduler {
    queue: RingQueue<Box<dyn Routine>>,
    this: Weak<Scheduler>,
}

impl Scheduler {
    /// Create a scheduler using the system aligned allocator.
    pub fn new(capacity: usize) -> QueueResult<Arc<Self>> {
        let queue = RingQueue::new(capacity)?;
        Ok(Arc::new_cyclic(|this| Scheduler {
            queue,
            this: this.clone(),
        }))
    }

    /// Create a scheduler with a custom allocation strategy for its ring.
    pub fn with_allocator(
        capacity: usize,
        alloc: Box<dyn AllocStrategy>,
    ) -> QueueResult<Arc<Self>> {
        let queue = RingQueue::with_allocator(capacity, alloc)?;
        Ok(Arc::new_cyclic(|this| Scheduler {
            queue,
            this: this.clone(),
        }))
    }

    /// Set the busy-wait policy of the underlying ring.
    pub fn set_wait_strategy(&self, strategy: WaitStrategy) {
        self.queue.set_wait_strategy(strategy);
    }

    /// Ring capacity (power of two, >= 2).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Currently reserved routine slots (diagnostics).
    pub fn reserved(&self) -> usize {
        self.queue.reserved()
    }

    /// Check whether no routine is currently queued.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Schedule a routine, reserving one capacity unit for it.
    ///
    /// On failure the routine comes back unmodified inside the error and
    /// nothing was enqueued — the caller decides whether to retry, drop,
    /// or run it inline.
    pub fn try_schedule(&self, routine: Box<dyn Routine>) -> Result<(), ScheduleFull> {
        if !self.queue.try_reserve_size_before_push(1) {
            return Err(ScheduleFull(routine));
        }
        self.queue.push(routine);
        Ok(())
    }

    /// Poll one routine without a user argument.
    pub fn poll(&self) -> Polled {
        let mut unit = ();
        self.poll_with(&mut unit)
    }

    /// Pop one routine, run it for one step, and route it onward.
    ///
    /// Returns [`Polled::Empty`] without blocking when no routine is
    /// queued. Otherwise the routine (or its staged replacement) is pushed
    /// to the scheduler its context references — no new reservation, the
    /// popped routine's unit transfers — or handed back through
    /// [`Polled::Cancelled`] if it cancelled itself.
    pub fn poll_with(&self, user_arg: &mut dyn Any) -> Polled {
        let Some(mut routine) = self.queue.try_pop() else {
            return Polled::Empty;
        };

        // Constructors only hand the scheduler out inside an Arc
        let this = self.this.upgrade().expect("scheduler outlived its Arc");
        let mut cx = ExecContext::new(this, user_arg);
        routine.poll(&mut cx);

        let (target, replacement) = cx.finish();
        let next = replacement.unwrap_or(routine);
        match target {
            Some(scheduler) => {
                scheduler.queue.push(next);
                Polled::Ran
            }
            None => Polled::Cancelled(next),
        }
    }

    /// Reserve one routine slot (migration path).
    pub(crate) fn try_reserve_routine(&self) -> bool {
        self.queue.try_reserve_size_before_push(1)
    }

    /// Release one routine slot after cancellation or migration away.
    pub(crate) fn routine_retired(&self) {
        self.queue.unreserve_size_after_pop(1);
    }
}

/// Outcome of one poll
pub enum Polled {
    /// No routine was queued
    Empty,

    /// A routine ran and was re-enqueued
    Ran,

    /// A routine cancelled itself; ownership returns to the caller
    Cancelled(Box<dyn Routine>),
}

impl Polled {
    /// Check whether the queue was empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Polled::Empty)
    }

    /// Check whether a routine ran (re-enqueued or cancelled).
    #[inline]
    pub fn ran(&self) -> bool {
        !self.is_empty()
    }
}

impl fmt::Debug for Polled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polled::Empty => write!(f, "Empty"),
            Polled::Ran => write!(f, "Ran"),
            Polled::Cancelled(_) => write!(f, "Cancelled(..)"),
        }
    }
}

/// Error returned when a scheduler has no reservable capacity
///
/// Carries the rejected routine back to the caller.
pub struct ScheduleFull(pub Box<dyn Routine>);

impl fmt::Debug for ScheduleFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ScheduleFull(..)")
    }
}

impl fmt::Display for ScheduleFull {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scheduler at capacity")
    }
}

impl std::error::Error for ScheduleFull {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routine::routine_fn;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_poll_empty() {
        let scheduler = Scheduler::new(4).unwrap();
        assert!(scheduler.poll().is_empty());
        assert_eq!(scheduler.reserved(), 0);
    }

    #[test]
    fn test_schedule_and_poll() {
        let scheduler = Scheduler::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&counter);
        scheduler
            .try_schedule(routine_fn(move |_cx| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(scheduler.reserved(), 1);

        // Each poll runs the routine once and re-enqueues it
        for expected in 1..=3 {
            assert!(matches!(scheduler.poll(), Polled::Ran));
            assert_eq!(counter.load(Ordering::SeqCst), expected);
        }
        assert_eq!(scheduler.reserved(), 1);
    }

    #[test]
    fn test_schedule_rejected_at_capacity() {
        let scheduler = Scheduler::new(2).unwrap();
        scheduler.try_schedule(routine_fn(|_| {})).unwrap();
        scheduler.try_schedule(routine_fn(|_| {})).unwrap();

        let err = scheduler.try_schedule(routine_fn(|_| {})).unwrap_err();
        assert_eq!(format!("{}", err), "scheduler at capacity");
        assert_eq!(scheduler.reserved(), 2);

        // The rejected routine comes back usable
        let ScheduleFull(_routine) = err;
    }

    #[test]
    fn test_cancellation() {
        let scheduler = Scheduler::new(4).unwrap();
        scheduler
            .try_schedule(routine_fn(|cx| cx.cancel()))
            .unwrap();
        assert_eq!(scheduler.reserved(), 1);

        match scheduler.poll() {
            Polled::Cancelled(_routine) => {}
            other => panic!("expected cancellation, got {:?}", other),
        }

        // Never polled again anywhere, reservation released
        assert!(scheduler.poll().is_empty());
        assert_eq!(scheduler.reserved(), 0);
    }

    #[test]
    fn test_reservation_transfer_on_switch() {
        let source = Scheduler::new(4).unwrap();
        let target = Scheduler::new(4).unwrap();
        let runs_on_target = Arc::new(AtomicUsize::new(0));

        let t = Arc::clone(&target);
        let r = Arc::clone(&runs_on_target);
        source
            .try_schedule(routine_fn(move |cx| {
                if cx.try_switch_scheduler(&t) {
                    return;
                }
                // Already on the target scheduler
                r.fetch_add(1, Ordering::SeqCst);
                cx.cancel();
            }))
            .unwrap();
        assert_eq!(source.reserved(), 1);
        assert_eq!(target.reserved(), 0);

        // Migration: source frees one unit, target consumes one
        assert!(matches!(source.poll(), Polled::Ran));
        assert_eq!(source.reserved(), 0);
        assert_eq!(target.reserved(), 1);
        assert_eq!(source.reserved() + target.reserved(), 1);
        assert!(source.poll().is_empty());

        // The routine is now retrievable on the target
        match target.poll() {
            Polled::Cancelled(_) => {}
            other => panic!("expected the migrated routine, got {:?}", other),
        }
        assert_eq!(runs_on_target.load(Ordering::SeqCst), 1);
        assert_eq!(target.reserved(), 0);
    }

    #[test]
    fn test_switch_to_same_scheduler_fails() {
        let scheduler = Scheduler::new(4).unwrap();
        let observed = Arc::new(AtomicUsize::new(0));

        let s = Arc::clone(&scheduler);
        let o = Arc::clone(&observed);
        scheduler
            .try_schedule(routine_fn(move |cx| {
                if !cx.try_switch_scheduler(&s) {
                    o.fetch_add(1, Ordering::SeqCst);
                }
                cx.cancel();
            }))
            .unwrap();

        assert!(matches!(scheduler.poll(), Polled::Cancelled(_)));
        assert_eq!(observed.load(Ordering::SeqCst), 1);
        assert_eq!(scheduler.reserved(), 0);
    }

    #[test]
    fn test_switch_to_full_scheduler_fails() {
        let source = Scheduler::new(4).unwrap();
        let full = Scheduler::new(2).unwrap();
        full.try_schedule(routine_fn(|_| {})).unwrap();
        full.try_schedule(routine_fn(|_| {})).unwrap();

        let f = Arc::clone(&full);
        source
            .try_schedule(routine_fn(move |cx| {
                assert!(!cx.try_switch_scheduler(&f));
            }))
            .unwrap();

        // Denied migration leaves the routine on its scheduler
        assert!(matches!(source.poll(), Polled::Ran));
        assert_eq!(source.reserved(), 1);
        assert_eq!(full.reserved(), 2);
        assert!(matches!(source.poll(), Polled::Ran));
    }

    #[test]
    fn test_set_routine_replacement() {
        let scheduler = Scheduler::new(4).unwrap();
        let log = Arc::new(AtomicUsize::new(0));

        let l1 = Arc::clone(&log);
        let l2 = Arc::clone(&log);
        scheduler
            .try_schedule(routine_fn(move |cx| {
                l1.fetch_add(1, Ordering::SeqCst);
                let l2 = Arc::clone(&l2);
                assert!(cx.pending_routine().is_none());
                let previous = cx.set_routine(routine_fn(move |cx| {
                    l2.fetch_add(10, Ordering::SeqCst);
                    cx.cancel();
                }));
                assert!(previous.is_none());
                assert!(cx.pending_routine().is_some());
            }))
            .unwrap();

        assert!(matches!(scheduler.poll(), Polled::Ran));
        assert_eq!(log.load(Ordering::SeqCst), 1);

        // The staged replacement runs on the next poll
        assert!(matches!(scheduler.poll(), Polled::Cancelled(_)));
        assert_eq!(log.load(Ordering::SeqCst), 11);
        assert_eq!(scheduler.reserved(), 0);
    }

    #[test]
    fn test_poll_with_user_arg() {
        let scheduler = Scheduler::new(4).unwrap();
        scheduler
            .try_schedule(routine_fn(|cx| {
                if let Some(count) = cx.user_arg_as::<u64>() {
                    *count += 5;
                }
                cx.cancel();
            }))
            .unwrap();

        let mut count: u64 = 0;
        assert!(matches!(
            scheduler.poll_with(&mut count),
            Polled::Cancelled(_)
        ));
        assert_eq!(count, 5);
    }
}
