//! # Tick Counter
//!
//! Process-wide tick count kept by the application tick hook. It has a
//! single writer (the SysTick interrupt) and any number of readers. The
//! 64-bit value cannot be read atomically on a Cortex-M4, so reads and the
//! increment both run inside a critical section.

use core::cell::Cell;

use crate::sync::{self, Mutex};

pub struct TickCounter {
    ticks: Mutex<Cell<u64>>,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: Mutex::new(Cell::new(0)),
        }
    }

    /// Advance by one. Interrupt-safe and non-blocking.
    #[inline]
    pub fn increment(&self) {
        sync::critical_section(|cs| {
            let ticks = self.ticks.borrow(cs);
            ticks.set(ticks.get().wrapping_add(1));
        });
    }

    /// A consistent snapshot of the count.
    #[inline]
    pub fn get(&self) -> u64 {
        sync::critical_section(|cs| self.ticks.borrow(cs).get())
    }
}

impl Default for TickCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use std::thread;

    #[test]
    fn test_increment() {
        let counter = TickCounter::new();
        assert_eq!(counter.get(), 0);
        for _ in 0..1000 {
            counter.increment();
        }
        assert_eq!(counter.get(), 1000);
    }

    #[test]
    fn test_reader_sees_monotonic_values() {
        static COUNTER: TickCounter = TickCounter::new();

        let writer = thread::spawn(|| {
            for _ in 0..10_000 {
                COUNTER.increment();
            }
        });

        let mut last = 0;
        while !writer.is_finished() {
            let now = COUNTER.get();
            assert!(now >= last, "Tick count went backwards: {} after {}", now, last);
            last = now;
        }
        writer.join().unwrap();
        assert_eq!(COUNTER.get(), 10_000);
    }
}
