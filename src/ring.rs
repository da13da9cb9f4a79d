//! # Ring Buffer
//!
//! Fixed-capacity FIFO storage backing [`Queue`](crate::queue::Queue).
//! Statically sized, no heap, no synchronisation; the queue wraps it in a
//! critical-section mutex.

use core::mem::MaybeUninit;

/// A fixed-capacity circular buffer of `N` slots.
///
/// Slots `head, head + 1, ..., head + len - 1` (mod `N`) are initialised;
/// every other slot is uninitialised.
pub struct RingBuffer<T, const N: usize> {
    slots: [MaybeUninit<T>; N],
    head: usize,
    len: usize,
}

impl<T, const N: usize> RingBuffer<T, N> {
    /// Create an empty buffer. Usable in `static` initialisers.
    pub const fn new() -> Self {
        Self {
            slots: [const { MaybeUninit::uninit() }; N],
            head: 0,
            len: 0,
        }
    }

    #[inline]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Append `value` at the back.
    ///
    /// Hands the value back if the buffer is full; the contents are left
    /// untouched in that case.
    pub fn push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        let tail = (self.head + self.len) % N;
        self.slots[tail].write(value);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest value.
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: `head` is inside the initialised window because len > 0,
        // and it leaves the window right after this read.
        let value = unsafe { self.slots[self.head].assume_init_read() };
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(value)
    }

    /// Borrow the oldest value without removing it.
    pub fn peek(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: `head` is inside the initialised window because len > 0.
        Some(unsafe { self.slots[self.head].assume_init_ref() })
    }

    /// Drop every stored value.
    pub fn clear(&mut self) {
        while self.pop().is_some() {}
        self.head = 0;
    }
}

impl<T, const N: usize> Default for RingBuffer<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, const N: usize> Drop for RingBuffer<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
