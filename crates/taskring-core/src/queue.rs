//! `RingQueue` — bounded lock-free MPMC ring with per-slot sequence numbers.
//!
//! Fixed power-of-two capacity, any number of producers and consumers.
//! Admission control is decoupled from the ring indices: a push never fails,
//! so callers must hold a capacity reservation before constructing work.
//!
//! # Thread safety
//!
//! - **Producers:** fetch-add on the write counter claims a strictly
//!   increasing index, then the producer waits for its slot's sequence to
//!   come around before writing. Multiple producers are safe.
//! - **Consumers:** CAS on the read counter claims an index; the consumer
//!   waits for the slot's publication, takes the value, and recycles the
//!   slot for the next lap.
//!
//! # Per-slot sequence numbers
//!
//! Slot `i` starts with sequence `i`. The push claiming write index `c` may
//! touch slot `c & mask` only once its sequence equals `c`; publishing the
//! value stores `c + 1`. The pop claiming read index `c` waits for `c + 1`,
//! takes the value, and stores `c + capacity`, handing the slot to the push
//! that will claim index `c + capacity`. A stale producer or consumer from a
//! previous lap can therefore never touch a slot out of turn.
//!
//! # Atomics
//!
//! Counter claims are Relaxed; slot sequences are Acquire on load and
//! Release on store, which carries the value write to whichever thread
//! observes the sequence update. The reservation budget is SeqCst.

use core::alloc::Layout;
use core::cell::UnsafeCell;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::alloc::{AllocStrategy, SystemAlloc};
use crate::backoff::{Backoff, WaitCell, WaitStrategy};
use crate::error::{QueueError, QueueResult};

/// Smallest capacity a queue will be built with
pub const MIN_CAPACITY: usize = 2;

/// Pad to a cache line to keep the hot counters off each other
#[repr(align(64))]
struct CachePadded<T> {
    value: T,
}

impl<T> CachePadded<T> {
    const fn new(value: T) -> Self {
        CachePadded { value }
    }
}

/// One ring entry: generation gate plus the value cell
#[repr(align(64))]
struct Slot<T> {
    sequence: AtomicU64,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded lock-free MPMC ring queue
///
/// Values move in at [`push`](RingQueue::push) and out at
/// [`try_pop`](RingQueue::try_pop); the queue owns whatever is in flight
/// and drops it on teardown.
///
/// Capacity is rounded up to the next power of two (minimum 2). The slot
/// array comes from the injected [`AllocStrategy`] and is returned to it
/// when the queue is dropped.
pub struct RingQueue<T> {
    slots: *mut Slot<T>,
    mask: u64,
    capacity: usize,
    layout: Layout,
    alloc: Box<dyn AllocStrategy>,
    wait: WaitCell,

    reserved_push_size: CachePadded<AtomicUsize>,
    read_counter: CachePadded<AtomicU64>,
    write_counter: CachePadded<AtomicU64>,
}

// Safety: the slot array is shared between threads; slot access is gated by
// the per-slot sequence numbers, and a claimed slot is exclusively owned
// between claim and publish.
unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Send> Sync for RingQueue<T> {}

impl<T> RingQueue<T> {
    /// Create a queue using the system aligned allocator.
    pub fn new(capacity: usize) -> QueueResult<Self> {
        Self::with_allocator(capacity, Box::new(SystemAlloc))
    }

    /// Create a queue with a custom allocation strategy.
    ///
    /// The strategy is used once here for the slot array and once on drop
    /// to free it.
    pub fn with_allocator(capacity: usize, alloc: Box<dyn AllocStrategy>) -> QueueResult<Self> {
        let capacity = capacity
            .max(MIN_CAPACITY)
            .checked_next_power_of_two()
            .ok_or(QueueError::CapacityOverflow)?;
        let layout =
            Layout::array::<Slot<T>>(capacity).map_err(|_| QueueError::CapacityOverflow)?;

        let slots = alloc.allocate(layout) as *mut Slot<T>;
        if slots.is_null() {
            return Err(QueueError::AllocationFailed);
        }

        // Seed slot i with sequence i: writable by the push claiming index i
        for i in 0..capacity {
            unsafe {
                slots.add(i).write(Slot {
                    sequence: AtomicU64::new(i as u64),
                    value: UnsafeCell::new(MaybeUninit::uninit()),
                });
            }
        }

        Ok(RingQueue {
            slots,
            mask: (capacity - 1) as u64,
            capacity,
            layout,
            alloc,
            wait: WaitCell::new(WaitStrategy::default()),
            reserved_push_size: CachePadded::new(AtomicUsize::new(0)),
            read_counter: CachePadded::new(AtomicU64::new(0)),
            write_counter: CachePadded::new(AtomicU64::new(0)),
        })
    }

    /// Set the busy-wait policy for internal spins (builder form).
    pub fn wait_strategy(self, strategy: WaitStrategy) -> Self {
        self.wait.set(strategy);
        self
    }

    /// Set the busy-wait policy on a shared queue.
    pub fn set_wait_strategy(&self, strategy: WaitStrategy) {
        self.wait.set(strategy);
    }

    /// Ring capacity (power of two, >= 2).
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Approximate number of entries currently in the ring.
    pub fn len(&self) -> usize {
        let write = self.write_counter.value.load(Ordering::Acquire);
        let read = self.read_counter.value.load(Ordering::Relaxed);
        write.saturating_sub(read) as usize
    }

    /// Check if the ring is currently empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Currently reserved push budget (diagnostics).
    pub fn reserved(&self) -> usize {
        self.reserved_push_size.value.load(Ordering::SeqCst)
    }

    /// Reserve push budget for `num_new_entries` future pushes.
    ///
    /// Optimistic: the budget is incremented first and rolled back in full
    /// if the new total would exceed capacity, so concurrent reservers can
    /// never oversubscribe. Returns false on rollback with the budget
    /// unchanged.
    ///
    /// Every successful reservation must eventually be returned through
    /// [`unreserve_size_after_pop`](RingQueue::unreserve_size_after_pop)
    /// once the entries are permanently retired — popped entries that will
    /// be pushed again keep their budget.
    pub fn try_reserve_size_before_push(&self, num_new_entries: usize) -> bool {
        let prev = self
            .reserved_push_size
            .value
            .fetch_add(num_new_entries, Ordering::SeqCst);
        match prev.checked_add(num_new_entries) {
            Some(total) if total <= self.capacity => true,
            _ => {
                self.reserved_push_size
                    .value
                    .fetch_sub(num_new_entries, Ordering::SeqCst);
                false
            }
        }
    }

    /// Return push budget for `num_old_entries` permanently retired entries.
    pub fn unreserve_size_after_pop(&self, num_old_entries: usize) {
        let prev = self
            .reserved_push_size
            .value
            .fetch_sub(num_old_entries, Ordering::SeqCst);
        debug_assert!(prev >= num_old_entries, "unreserve exceeds reservation");
    }

    /// Reserve push budget behind a scoped guard.
    ///
    /// The guard returns its remaining units to the budget when dropped, so
    /// a reservation cannot leak across an early return. Call
    /// [`Reservation::forget`] to keep the budget held and manage it with
    /// the manual unreserve call instead.
    pub fn try_reserve(&self, num_new_entries: usize) -> Option<Reservation<'_, T>> {
        if self.try_reserve_size_before_push(num_new_entries) {
            Some(Reservation {
                queue: self,
                remaining: num_new_entries,
            })
        } else {
            None
        }
    }

    /// Push a value. Never fails and never loses the value.
    ///
    /// The caller must hold reserved push budget for this entry. Without
    /// it the ring can be genuinely full, and this call will spin until a
    /// pop frees the claimed slot — indefinitely if none comes. Admission
    /// control is the caller's job, not the ring's.
    pub fn push(&self, value: T) {
        let index = self.write_counter.value.fetch_add(1, Ordering::Relaxed);
        let slot = unsafe { &*self.slots.add((index & self.mask) as usize) };

        // Wait for our generation of the slot to become writable
        let mut backoff = Backoff::new(self.wait.get());
        while slot.sequence.load(Ordering::Acquire) != index {
            backoff.snooze();
        }

        unsafe { (*slot.value.get()).write(value) };
        slot.sequence.store(index.wrapping_add(1), Ordering::Release);
    }

    /// Pop a value, or `None` if the ring is empty.
    ///
    /// Never blocks on genuine emptiness. May spin briefly on a slot whose
    /// push has claimed an index but not yet published the value.
    pub fn try_pop(&self) -> Option<T> {
        let mut read = self.read_counter.value.load(Ordering::Relaxed);
        loop {
            let write = self.write_counter.value.load(Ordering::Acquire);
            if read == write {
                return None;
            }

            match self.read_counter.value.compare_exchange_weak(
                read,
                read.wrapping_add(1),
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => {
                    let slot = unsafe { &*self.slots.add((read & self.mask) as usize) };

                    // Claimed index is below the write counter, so a
                    // producer owns this slot and will publish it
                    let mut backoff = Backoff::new(self.wait.get());
                    while slot.sequence.load(Ordering::Acquire) != read.wrapping_add(1) {
                        backoff.snooze();
                    }

                    let value = unsafe { (*slot.value.get()).assume_init_read() };
                    slot.sequence
                        .store(read.wrapping_add(self.capacity as u64), Ordering::Release);
                    return Some(value);
                }
                Err(actual) => {
                    // Another consumer claimed this index; re-check emptiness
                    read = actual;
                    core::hint::spin_loop();
                }
            }
        }
    }
}

impl<T> Drop for RingQueue<T> {
    fn drop(&mut self) {
        let read = *self.read_counter.value.get_mut();
        let write = *self.write_counter.value.get_mut();

        // Drop in-flight values, then hand the array back to the allocator
        let mut index = read;
        while index != write {
            let slot = unsafe { &mut *self.slots.add((index & self.mask) as usize) };
            if *slot.sequence.get_mut() == index.wrapping_add(1) {
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
            index = index.wrapping_add(1);
        }

        unsafe { self.alloc.deallocate(self.slots as *mut u8, self.layout) };
    }
}

/// Scoped push-budget reservation
///
/// Returned by [`RingQueue::try_reserve`]. Units not explicitly retired are
/// returned to the queue's budget on drop.
pub struct Reservation<'q, T> {
    queue: &'q RingQueue<T>,
    remaining: usize,
}

impl<'q, T> Reservation<'q, T> {
    /// Units still held by this guard.
    #[inline]
    pub fn count(&self) -> usize {
        self.remaining
    }

    /// Keep the budget held past the guard's lifetime.
    ///
    /// The caller takes over the manual unreserve discipline for the
    /// remaining units.
    pub fn forget(mut self) {
        self.remaining = 0;
    }
}

impl<'q, T> Drop for Reservation<'q, T> {
    fn drop(&mut self) {
        if self.remaining > 0 {
            self.queue.unreserve_size_after_pop(self.remaining);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64 as StdAtomicU64;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_capacity_rounding() {
        assert_eq!(RingQueue::<u64>::new(0).unwrap().capacity(), 2);
        assert_eq!(RingQueue::<u64>::new(1).unwrap().capacity(), 2);
        assert_eq!(RingQueue::<u64>::new(3).unwrap().capacity(), 4);
        assert_eq!(RingQueue::<u64>::new(16).unwrap().capacity(), 16);
        assert_eq!(RingQueue::<u64>::new(17).unwrap().capacity(), 32);
    }

    #[test]
    fn test_empty_pop() {
        let queue = RingQueue::<u64>::new(8).unwrap();
        assert!(queue.try_pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_single_thread_round_trip() {
        let capacity = 16;
        let queue = RingQueue::<u64>::new(capacity).unwrap();

        assert!(queue.try_reserve_size_before_push(capacity));
        for i in 1..=capacity as u64 {
            queue.push(i);
        }
        assert_eq!(queue.len(), capacity);
        for i in 1..=capacity as u64 {
            assert_eq!(queue.try_pop(), Some(i));
        }
        assert!(queue.try_pop().is_none());
        queue.unreserve_size_after_pop(capacity);
        assert_eq!(queue.reserved(), 0);
    }

    #[test]
    fn test_wraparound() {
        let capacity = 16;
        let queue = RingQueue::<u64>::new(capacity).unwrap();

        for i in 1..=(capacity as u64 * 4) {
            assert!(queue.try_reserve_size_before_push(1));
            queue.push(i);
            assert_eq!(queue.try_pop(), Some(i));
            queue.unreserve_size_after_pop(1);
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_reservation_exactness() {
        let capacity = 16;
        let queue = RingQueue::<u64>::new(capacity).unwrap();

        // One unit at a time up to capacity
        for _ in 0..capacity {
            assert!(queue.try_reserve_size_before_push(1));
        }
        // capacity + 1 fails and leaves the budget unchanged
        assert!(!queue.try_reserve_size_before_push(1));
        assert_eq!(queue.reserved(), capacity);

        // All at once after releasing everything
        queue.unreserve_size_after_pop(capacity);
        assert!(queue.try_reserve_size_before_push(capacity));
        assert!(!queue.try_reserve_size_before_push(1));
        assert_eq!(queue.reserved(), capacity);
        queue.unreserve_size_after_pop(capacity);
    }

    #[test]
    fn test_partial_reservation_tops_up() {
        let capacity = 16;
        let queue = RingQueue::<u64>::new(capacity).unwrap();

        assert!(queue.try_reserve_size_before_push(10));
        assert!(queue.try_reserve_size_before_push(capacity - 10));
        assert!(!queue.try_reserve_size_before_push(1));
        queue.unreserve_size_after_pop(capacity);
    }

    #[test]
    fn test_reservation_guard_releases_on_drop() {
        let queue = RingQueue::<u64>::new(8).unwrap();
        {
            let guard = queue.try_reserve(4).unwrap();
            assert_eq!(guard.count(), 4);
            assert_eq!(queue.reserved(), 4);
        }
        assert_eq!(queue.reserved(), 0);
    }

    #[test]
    fn test_reservation_guard_forget() {
        let queue = RingQueue::<u64>::new(8).unwrap();
        let guard = queue.try_reserve(3).unwrap();
        guard.forget();
        assert_eq!(queue.reserved(), 3);
        queue.unreserve_size_after_pop(3);
    }

    #[test]
    fn test_reservation_guard_denied() {
        let queue = RingQueue::<u64>::new(8).unwrap();
        let _held = queue.try_reserve(8).unwrap();
        assert!(queue.try_reserve(1).is_none());
        assert_eq!(queue.reserved(), 8);
    }

    #[test]
    fn test_drop_drains_in_flight_values() {
        let token = Arc::new(());
        {
            let queue = RingQueue::<Arc<()>>::new(8).unwrap();
            assert!(queue.try_reserve_size_before_push(3));
            for _ in 0..3 {
                queue.push(Arc::clone(&token));
            }
            assert_eq!(Arc::strong_count(&token), 4);
        }
        assert_eq!(Arc::strong_count(&token), 1);
    }

    #[test]
    fn test_conservation_under_contention() {
        const NUM_THREADS: usize = 8;
        const MAX_SEQUENCE: u64 = 256;

        let queue = Arc::new(
            RingQueue::<u64>::new(NUM_THREADS)
                .unwrap()
                .wait_strategy(WaitStrategy::SpinYield),
        );
        assert!(queue.try_reserve_size_before_push(NUM_THREADS));

        let tracker: Arc<Vec<StdAtomicU64>> = Arc::new(
            (0..=MAX_SEQUENCE as usize)
                .map(|_| StdAtomicU64::new(0))
                .collect(),
        );

        let mut handles = vec![];
        for _ in 0..NUM_THREADS {
            let queue = Arc::clone(&queue);
            let tracker = Arc::clone(&tracker);
            handles.push(thread::spawn(move || {
                for sequence in 1..=MAX_SEQUENCE {
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
            h.join().unwrap();
        }

        // Every sequence value observed exactly once per thread, in aggregate
        for sequence in 1..=MAX_SEQUENCE as usize {
            assert_eq!(
                tracker[sequence].load(Ordering::SeqCst),
                NUM_THREADS as u64,
                "sequence {} lost or duplicated",
                sequence
            );
        }

        queue.unreserve_size_after_pop(NUM_THREADS);
        assert!(queue.try_pop().is_none());
    }

    #[test]
    fn test_concurrent_producers_single_consumer() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 64;

        let queue = Arc::new(RingQueue::<u64>::new(PRODUCERS * PER_PRODUCER).unwrap());
        assert!(queue.try_reserve_size_before_push(PRODUCERS * PER_PRODUCER));

        let mut handles = vec![];
        for t in 0..PRODUCERS {
            let queue = Arc::clone(&queue);
            handles.push(thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    queue.push((t * 1000 + i) as u64);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let mut seen = std::collections::HashSet::new();
        while let Some(v) = queue.try_pop() {
            assert!(seen.insert(v), "duplicate value {}", v);
        }
        assert_eq!(seen.len(), PRODUCERS * PER_PRODUCER);
        queue.unreserve_size_after_pop(PRODUCERS * PER_PRODUCER);
    }
}
