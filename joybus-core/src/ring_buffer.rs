//! Lock-free single-producer single-consumer ring buffer with sticky
//! overflow/underflow diagnostics.
//!
//! Bridges the bursty host feed and the periodic bus interrupt. The buffer
//! never refuses an operation: writing into a full buffer overwrites the oldest
//! slot and sets `overflow`, reading from an empty buffer returns the
//! configured underflow value and sets `underflow`. Both flags stay set until
//! [`reset_flags`](RingBuffer::reset_flags) is called.
//!
//! # Safety Contract
//!
//! - Only ONE context may call the producer methods ([`add`](RingBuffer::add),
//!   [`add_slice`](RingBuffer::add_slice)).
//! - Only ONE context may call the consumer methods ([`get`](RingBuffer::get),
//!   [`get_blocking`](RingBuffer::get_blocking)).
//!
//! Each side only stores its own cursor. Cursors are free-running counters;
//! the slot index is the counter modulo `N`.

use core::cell::UnsafeCell;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

/// Fixed-capacity SPSC ring buffer.
///
/// `N` must be a power of two so free-running cursors stay consistent when
/// they wrap.
pub struct RingBuffer<T, const N: usize> {
    slots: UnsafeCell<[T; N]>,
    /// Total values added (only modified by the producer).
    write: AtomicUsize,
    /// Total values taken (only modified by the consumer).
    read: AtomicUsize,
    overflow: AtomicBool,
    underflow: AtomicBool,
    underflow_value: T,
}

// SAFETY: T: Send is required because values cross ISR boundaries. Each cursor
// is only advanced by its own side, and the Release store of a cursor orders
// the slot access before it becomes visible to the other side.
unsafe impl<T: Copy + Send, const N: usize> Sync for RingBuffer<T, N> {}

impl<T: Copy, const N: usize> RingBuffer<T, N> {
    const CAPACITY_IS_POWER_OF_TWO: () = assert!(
        N.is_power_of_two(),
        "ring buffer capacity must be a power of two"
    );

    /// Create an empty buffer. `underflow_value` is returned by reads from an
    /// empty buffer and fills the unused slots.
    #[must_use]
    pub const fn new(underflow_value: T) -> Self {
        #[allow(clippy::let_unit_value)]
        let () = Self::CAPACITY_IS_POWER_OF_TWO;

        Self {
            slots: UnsafeCell::new([underflow_value; N]),
            write: AtomicUsize::new(0),
            read: AtomicUsize::new(0),
            overflow: AtomicBool::new(false),
            underflow: AtomicBool::new(false),
            underflow_value,
        }
    }

    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    fn slot(&self, cursor: usize) -> *mut T {
        // SAFETY: `cursor % N` is always in bounds of the N-element array.
        unsafe { self.slots.get().cast::<T>().add(cursor % N) }
    }

    /// Number of values waiting to be read, at most `N`.
    #[inline]
    #[must_use]
    pub fn gets_available(&self) -> usize {
        let write = self.write.load(Ordering::Acquire);
        let read = self.read.load(Ordering::Acquire);
        write.wrapping_sub(read).min(N)
    }

    /// Number of values that can be added without overflowing.
    #[inline]
    #[must_use]
    pub fn adds_available(&self) -> usize {
        N - self.gets_available()
    }

    /// Append one value (producer side).
    ///
    /// Sets `overflow` if the buffer was already full; the value is stored
    /// anyway, replacing the oldest unread one.
    pub fn add(&self, value: T) {
        let write = self.write.load(Ordering::Relaxed);
        if write.wrapping_sub(self.read.load(Ordering::Acquire)) >= N {
            self.overflow.store(true, Ordering::Relaxed);
        }

        // SAFETY: We are the sole producer. A slot still owned by the consumer
        // is only rewritten in the overflow case, where data loss is already
        // being reported; T: Copy makes the torn value harmless.
        unsafe { self.slot(write).write_volatile(value) };

        self.write.store(write.wrapping_add(1), Ordering::Release);
    }

    /// Append all of `values` and publish them to the consumer at once.
    ///
    /// The consumer never observes a partially added slice.
    pub fn add_slice(&self, values: &[T]) {
        let write = self.write.load(Ordering::Relaxed);
        let used = write.wrapping_sub(self.read.load(Ordering::Acquire));
        if used.saturating_add(values.len()) > N {
            self.overflow.store(true, Ordering::Relaxed);
        }

        for (offset, &value) in values.iter().enumerate() {
            // SAFETY: See `add`.
            unsafe { self.slot(write.wrapping_add(offset)).write_volatile(value) };
        }

        self.write
            .store(write.wrapping_add(values.len()), Ordering::Release);
    }

    /// Take the oldest value (consumer side).
    ///
    /// On an empty buffer sets `underflow`, leaves the cursor untouched and
    /// returns the underflow value. After an overflow, reading resumes at the
    /// oldest value still stored, so at most `N` values are returned.
    pub fn get(&self) -> T {
        let mut read = self.read.load(Ordering::Relaxed);
        let write = self.write.load(Ordering::Acquire);
        if write == read {
            self.underflow.store(true, Ordering::Relaxed);
            return self.underflow_value;
        }
        if write.wrapping_sub(read) > N {
            read = write.wrapping_sub(N);
        }

        // SAFETY: We are the sole consumer and `read` is one of the last `N`
        // slots the producer has published.
        let value = unsafe { self.slot(read).read_volatile() };

        self.read.store(read.wrapping_add(1), Ordering::Release);
        value
    }

    /// Take the oldest value, spinning until one is available.
    pub fn get_blocking(&self) -> T {
        while self.gets_available() == 0 {
            core::hint::spin_loop();
        }
        self.get()
    }

    /// `true` once a value was added to a full buffer.
    #[inline]
    #[must_use]
    pub fn overflowed(&self) -> bool {
        self.overflow.load(Ordering::Relaxed)
    }

    /// `true` once a value was read from an empty buffer.
    #[inline]
    #[must_use]
    pub fn underflowed(&self) -> bool {
        self.underflow.load(Ordering::Relaxed)
    }

    /// Clear both sticky flags.
    pub fn reset_flags(&self) {
        self.overflow.store(false, Ordering::Relaxed);
        self.underflow.store(false, Ordering::Relaxed);
    }

    /// Drop all unread values and clear the flags.
    ///
    /// Only call while no consumer is running, e.g. after the bus interrupt
    /// has been parked.
    pub fn clear(&self) {
        let write = self.write.load(Ordering::Acquire);
        self.read.store(write, Ordering::Release);
        self.reset_flags();
    }
}
